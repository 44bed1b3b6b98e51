use veska_automation::playbook::{OnFailure, Playbook, PlaybookStep};

/// Search Google for the business and open the first result. The caller
/// scrapes the landed page for contact details.
pub fn lookup_playbook(query: &str) -> Playbook {
    Playbook::new(
        format!("lookup:{}", query),
        vec![
            PlaybookStep::navigate("goto_google", "https://www.google.com")
                .with_wait_for("textarea[name='q']"),
            PlaybookStep::click("focus_search", "textarea[name='q']"),
            PlaybookStep::fill("type_query", "textarea[name='q']", query),
            PlaybookStep::evaluate(
                "submit_query",
                r#"document.querySelector('textarea[name="q"]').form.submit();"#,
            ),
            PlaybookStep::wait_selector("wait_results", "#search").with_wait_timeout_ms(15_000),
            PlaybookStep::click("open_first_result", "#search a")
                .with_wait_for("body")
                .with_on_failure(OnFailure::Retry { attempts: 2 }),
            PlaybookStep::screenshot("capture_page", true),
        ],
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn query_lands_in_fill_step() {
        let playbook = lookup_playbook("Target Tinley Park");
        let fill = playbook
            .steps
            .iter()
            .find(|s| s.name == "type_query")
            .unwrap();
        match &fill.action {
            veska_automation::playbook::StepAction::Fill { text, .. } => {
                assert_eq!(text, "Target Tinley Park");
            }
            other => panic!("unexpected action: {:?}", other),
        }
    }
}
