use veska_automation::playbook::{Condition, OnFailure, Playbook, PlaybookStep, StepAction};
use veska_core::types::WaitUntil;

pub fn calendar_day() -> Playbook {
    Playbook::new(
        "calendar_day",
        vec![
            PlaybookStep::navigate("goto_calendar", "https://calendar.google.com/calendar/u/0/r/day")
                .with_wait_for("div[role='main']"),
            PlaybookStep::screenshot("capture_day", true),
        ],
    )
}

pub fn calendar_week() -> Playbook {
    Playbook::new(
        "calendar_week",
        vec![
            PlaybookStep::navigate("goto_week", "https://calendar.google.com/calendar/u/0/r/week")
                .with_wait_for("div[role='main']"),
            PlaybookStep::screenshot("capture_week", true),
        ],
    )
}

/// Open the event editor and fill the interpreted fields. Empty values skip
/// their fill step via guards on the editor being present.
pub fn calendar_create_event(title: &str, details: &str) -> Playbook {
    let mut steps = vec![PlaybookStep::navigate(
        "open_editor",
        "https://calendar.google.com/calendar/u/0/r/eventedit",
    )
    .with_wait_for("input[aria-label='Add title']")];

    steps.push(PlaybookStep::fill(
        "fill_title",
        "input[aria-label='Add title']",
        title,
    ));
    if !details.is_empty() {
        steps.push(
            PlaybookStep::fill(
                "fill_description",
                "div[aria-label='Description']",
                details,
            )
            .with_on_failure(OnFailure::Continue),
        );
    }
    steps.push(PlaybookStep::click("save_event", "button[aria-label='Save']"));
    steps.push(PlaybookStep::screenshot("capture_result", false));

    Playbook::new("calendar_create_event", steps)
}

/// Open week view, open the first event, enter the editor.
pub fn calendar_reschedule() -> Playbook {
    Playbook::new(
        "calendar_reschedule",
        vec![
            PlaybookStep::navigate("open_week", "https://calendar.google.com/calendar/u/0/r/week")
                .with_wait_for("div[role='main']"),
            PlaybookStep::click("open_first_event", "div[role='button'][data-eventid]")
                .with_wait_for("div[role='dialog']"),
            PlaybookStep::click("edit_event", "button[id*='edit-button']")
                .with_wait_for("input[aria-label='Add title']"),
            PlaybookStep::screenshot("capture_editor", false),
        ],
    )
}

pub fn gmail_inbox() -> Playbook {
    Playbook::new(
        "gmail_inbox",
        vec![
            PlaybookStep::navigate("goto_gmail", "https://mail.google.com/mail/u/0/#inbox")
                .with_wait_for("div[role='main']"),
            PlaybookStep::screenshot("capture_inbox", true),
        ],
    )
    .with_postconditions(vec![Condition::UrlContains {
        fragment: "#inbox".into(),
    }])
}

pub fn gmail_compose(to: &str, subject: &str, body: &str) -> Playbook {
    Playbook::new(
        "gmail_compose",
        vec![
            PlaybookStep::new(
                "open_inbox",
                StepAction::Navigate {
                    url: "https://mail.google.com/mail/u/0/#inbox".into(),
                    wait_until: WaitUntil::NetworkIdle,
                },
            ),
            PlaybookStep::click("click_compose", "div[gh='cm']")
                .with_wait_for("input[aria-label='To recipients']"),
            PlaybookStep::fill("fill_to", "input[aria-label='To recipients']", to),
            PlaybookStep::fill("fill_subject", "input[name='subjectbox']", subject),
            PlaybookStep::fill("fill_body", "div[aria-label='Message Body']", body),
            PlaybookStep::click("send", "div[aria-label*='Send']"),
            PlaybookStep::screenshot("capture_sent", false),
        ],
    )
}

/// Select the first inbox row and archive it.
pub fn gmail_archive_first() -> Playbook {
    Playbook::new(
        "gmail_archive",
        vec![
            PlaybookStep::navigate("open_inbox", "https://mail.google.com/mail/u/0/#inbox")
                .with_wait_for("div[role='main']"),
            PlaybookStep::click("select_first", "div[role='row'] div[role='checkbox']"),
            PlaybookStep::click("archive", "div[aria-label='Archive']"),
        ],
    )
}

pub fn gmail_mark_first(read: bool) -> Playbook {
    let button = if read { "Mark as read" } else { "Mark as unread" };
    Playbook::new(
        if read { "gmail_mark_read" } else { "gmail_mark_unread" },
        vec![
            PlaybookStep::navigate("open_inbox", "https://mail.google.com/mail/u/0/#inbox")
                .with_wait_for("div[role='main']"),
            PlaybookStep::click("select_first", "div[role='row'] div[role='checkbox']"),
            PlaybookStep::click("toggle", format!("div[aria-label='{}']", button)),
        ],
    )
}

pub fn gmail_open_label(label: &str) -> Playbook {
    Playbook::new(
        format!("gmail_label:{}", label),
        vec![
            PlaybookStep::navigate("open_inbox", "https://mail.google.com/mail/u/0/#inbox")
                .with_wait_for("div[role='main']"),
            PlaybookStep::click("open_label", format!("a[title='{}']", label)),
            PlaybookStep::screenshot("capture_label", true),
        ],
    )
}

/// Open the first message and start a reply.
pub fn gmail_reply_first(body: &str) -> Playbook {
    Playbook::new(
        "gmail_reply",
        vec![
            PlaybookStep::navigate("open_inbox", "https://mail.google.com/mail/u/0/#inbox")
                .with_wait_for("div[role='main']"),
            PlaybookStep::click("open_first_email", "div[role='main'] tr")
                .with_wait_for("div[aria-label='Reply']"),
            PlaybookStep::click("reply", "div[aria-label='Reply']"),
            PlaybookStep::fill("fill_reply", "div[aria-label='Message Body']", body),
            PlaybookStep::click("send", "div[aria-label*='Send']"),
        ],
    )
}

pub fn drive_recent() -> Playbook {
    Playbook::new(
        "drive_recent",
        vec![
            PlaybookStep::navigate("goto_drive", "https://drive.google.com/drive/u/0/my-drive")
                .with_wait_for("div[role='main']"),
            PlaybookStep::screenshot("capture_drive", true),
        ],
    )
}

pub fn drive_search(query: &str) -> Playbook {
    Playbook::new(
        format!("drive_search:{}", query),
        vec![
            PlaybookStep::navigate("goto_drive", "https://drive.google.com/drive/u/0/my-drive")
                .with_wait_for("input[aria-label='Search in Drive']"),
            PlaybookStep::fill("enter_query", "input[aria-label='Search in Drive']", query),
            PlaybookStep::evaluate(
                "submit_search",
                r#"document.querySelector('input[aria-label="Search in Drive"]').form.submit();"#,
            ),
            PlaybookStep::wait_selector("wait_results", "div[role='main']")
                .with_wait_timeout_ms(15_000),
            PlaybookStep::screenshot("capture_results", true),
        ],
    )
}

/// Select the first Drive item and open the share dialog.
pub fn drive_share_first() -> Playbook {
    Playbook::new(
        "drive_share",
        vec![
            PlaybookStep::navigate("goto_drive", "https://drive.google.com/drive/u/0/my-drive")
                .with_wait_for("div[role='main']"),
            PlaybookStep::click("select_first_item", "div[role='grid'] div[role='gridcell']"),
            PlaybookStep::click("open_share", "div[aria-label='Share']")
                .with_wait_for("div[aria-label='Add people or groups']"),
            PlaybookStep::screenshot("capture_dialog", false),
        ],
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn compose_fills_all_fields() {
        let playbook = gmail_compose("ana@example.com", "Hi", "Body text");
        let names: Vec<&str> = playbook.steps.iter().map(|s| s.name.as_str()).collect();
        assert_eq!(
            names,
            vec![
                "open_inbox",
                "click_compose",
                "fill_to",
                "fill_subject",
                "fill_body",
                "send",
                "capture_sent"
            ]
        );
    }

    #[test]
    fn create_event_skips_empty_description() {
        let with = calendar_create_event("Standup", "daily sync");
        assert!(with.steps.iter().any(|s| s.name == "fill_description"));
        let without = calendar_create_event("Standup", "");
        assert!(!without.steps.iter().any(|s| s.name == "fill_description"));
    }

    #[test]
    fn playbooks_roundtrip() {
        for playbook in [
            calendar_day(),
            calendar_reschedule(),
            gmail_inbox(),
            gmail_archive_first(),
            drive_search("quarterly report"),
            drive_share_first(),
        ] {
            let json = serde_json::to_string(&playbook).unwrap();
            let parsed: Playbook = serde_json::from_str(&json).unwrap();
            assert_eq!(parsed, playbook);
        }
    }
}
