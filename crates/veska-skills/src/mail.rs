use regex::Regex;
use serde::Deserialize;
use tracing::info;

use veska_core::error::Result;
use veska_dag::{Dag, DagNode};

use crate::common::{llm_json, read_page, run_playbook};
use crate::playbooks::google;
use crate::registry::{KeywordRule, Skill, SkillDeps, SkillRequest};

const EMAIL_PROMPT: &str = "Extract email fields from this request.\n\
Return JSON: {\"to\": [\"recipient@example.com\"], \"subject\": \"...\", \"body\": \"...\"}";

const REPLY_PROMPT: &str = "Write the reply body the user is asking for.\n\
Return JSON: {\"body\": \"...\"}";

const READ_INBOX_PROMPT: &str = "You are looking at an email inbox. Summarize the unread \
messages: sender and subject for each, most recent first. Keep it under five lines.";

#[derive(Debug, Deserialize, Default)]
struct InterpretedEmail {
    #[serde(default)]
    to: Vec<String>,
    subject: Option<String>,
    body: Option<String>,
}

#[derive(Debug, Deserialize)]
struct InterpretedReply {
    body: String,
}

enum MailOp {
    Send,
    Archive,
    MarkRead(bool),
    OpenLabel(String),
    Reply,
    Inbox,
}

/// Mail triage and composition over the web UI. Compose/send requests reach
/// this skill only after the dispatcher's safety gate confirmed them.
pub struct MailSkill {
    deps: SkillDeps,
    rules: Vec<KeywordRule>,
    label_re: Option<Regex>,
}

impl MailSkill {
    pub fn new(deps: SkillDeps) -> Self {
        Self {
            deps,
            rules: vec![
                KeywordRule::substring("email"),
                KeywordRule::substring("gmail"),
                KeywordRule::substring("inbox"),
                KeywordRule::substring("mail"),
                KeywordRule::substring("message"),
            ],
            label_re: Regex::new(r"label\s+['\x22]?([\w-]+)").ok(),
        }
    }

    fn classify_op(&self, lower: &str) -> MailOp {
        if ["send", "compose", "write"].iter().any(|w| lower.contains(w)) {
            return MailOp::Send;
        }
        if lower.contains("archive") {
            return MailOp::Archive;
        }
        if lower.contains("mark") && lower.contains("unread") {
            return MailOp::MarkRead(false);
        }
        if lower.contains("mark") && lower.contains("read") {
            return MailOp::MarkRead(true);
        }
        if lower.contains("reply") {
            return MailOp::Reply;
        }
        if let Some(cap) = self.label_re.as_ref().and_then(|re| re.captures(lower)) {
            if let Some(label) = cap.get(1) {
                return MailOp::OpenLabel(label.as_str().to_string());
            }
        }
        MailOp::Inbox
    }

    fn build_send_dag(&self, request: &SkillRequest) -> Result<Dag> {
        let llm = self.deps.llm.clone();
        let utterance = request.utterance.clone();
        let interpret = DagNode::new("interpret_email", move |ctx| {
            let llm = llm.clone();
            let utterance = utterance.clone();
            async move {
                let draft: InterpretedEmail = llm_json(&llm, EMAIL_PROMPT, &utterance).await?;
                ctx.set_artifact("draft_to", serde_json::json!(draft.to)).await;
                ctx.set_artifact(
                    "draft_subject",
                    serde_json::json!(draft.subject.unwrap_or_else(|| "Untitled email".into())),
                )
                .await;
                ctx.set_artifact(
                    "draft_body",
                    serde_json::json!(draft.body.unwrap_or_default()),
                )
                .await;
                Ok(())
            }
        });

        let browser = self.deps.browser.clone();
        let compose = DagNode::new("compose_and_send", move |ctx| {
            let browser = browser.clone();
            async move {
                let to: Vec<String> = ctx
                    .artifact("draft_to")
                    .await
                    .and_then(|v| serde_json::from_value(v).ok())
                    .unwrap_or_default();
                let subject = ctx
                    .artifact("draft_subject")
                    .await
                    .and_then(|v| v.as_str().map(String::from))
                    .unwrap_or_default();
                let body = ctx
                    .artifact("draft_body")
                    .await
                    .and_then(|v| v.as_str().map(String::from))
                    .unwrap_or_default();
                let recipients = to.join(", ");
                let playbook = google::gmail_compose(&recipients, &subject, &body);
                run_playbook(browser, &playbook, &ctx).await?;
                info!(to = %recipients, "email submitted");
                ctx.set_output(
                    "summary",
                    serde_json::json!(format!("Sent email to {}", recipients)),
                )
                .await;
                Ok(())
            }
        })
        .with_deps(["interpret_email"]);

        Dag::new("mail-send", vec![interpret, compose])
    }

    fn build_reply_dag(&self, request: &SkillRequest) -> Result<Dag> {
        let llm = self.deps.llm.clone();
        let utterance = request.utterance.clone();
        let interpret = DagNode::new("interpret_reply", move |ctx| {
            let llm = llm.clone();
            let utterance = utterance.clone();
            async move {
                let reply: InterpretedReply = llm_json(&llm, REPLY_PROMPT, &utterance).await?;
                ctx.set_artifact("reply_body", serde_json::json!(reply.body)).await;
                Ok(())
            }
        });

        let browser = self.deps.browser.clone();
        let reply = DagNode::new("send_reply", move |ctx| {
            let browser = browser.clone();
            async move {
                let body = ctx
                    .artifact("reply_body")
                    .await
                    .and_then(|v| v.as_str().map(String::from))
                    .unwrap_or_default();
                let playbook = google::gmail_reply_first(&body);
                run_playbook(browser, &playbook, &ctx).await?;
                ctx.set_output("summary", serde_json::json!("Replied to the latest message"))
                    .await;
                Ok(())
            }
        })
        .with_deps(["interpret_reply"]);

        Dag::new("mail-reply", vec![interpret, reply])
    }

    /// Single fixed-playbook operation with a static summary.
    fn build_playbook_dag(
        &self,
        dag_name: &str,
        playbook: veska_automation::playbook::Playbook,
        summary: String,
    ) -> Result<Dag> {
        let browser = self.deps.browser.clone();
        let node = DagNode::new("run_playbook", move |ctx| {
            let browser = browser.clone();
            let playbook = playbook.clone();
            let summary = summary.clone();
            async move {
                run_playbook(browser, &playbook, &ctx).await?;
                ctx.set_output("summary", serde_json::json!(summary)).await;
                Ok(())
            }
        });
        Dag::new(dag_name, vec![node])
    }

    fn build_inbox_dag(&self) -> Result<Dag> {
        let browser = self.deps.browser.clone();
        let open = DagNode::new("open_inbox", move |ctx| {
            let browser = browser.clone();
            async move {
                run_playbook(browser, &google::gmail_inbox(), &ctx).await?;
                Ok(())
            }
        });

        let browser = self.deps.browser.clone();
        let vision = self.deps.vision.clone();
        let summarize = DagNode::new("read_inbox", move |ctx| {
            let browser = browser.clone();
            let vision = vision.clone();
            async move {
                let summary = read_page(&browser, &vision, READ_INBOX_PROMPT).await?;
                let summary = summary.trim().to_string();
                ctx.set_output("answer", serde_json::json!(summary.clone())).await;
                ctx.set_output("summary", serde_json::json!(summary)).await;
                Ok(())
            }
        })
        .with_deps(["open_inbox"]);

        Dag::new("mail-inbox", vec![open, summarize])
    }
}

impl Skill for MailSkill {
    fn name(&self) -> &'static str {
        "mail"
    }

    fn description(&self) -> &'static str {
        "email: inbox summaries, composing, archiving, labels and replies"
    }

    fn keyword_rules(&self) -> &[KeywordRule] {
        &self.rules
    }

    fn build_dag(&self, request: &SkillRequest) -> Result<Dag> {
        let lower = request.utterance.to_lowercase();
        match self.classify_op(&lower) {
            MailOp::Send => self.build_send_dag(request),
            MailOp::Reply => self.build_reply_dag(request),
            MailOp::Archive => self.build_playbook_dag(
                "mail-archive",
                google::gmail_archive_first(),
                "Archived the first inbox message".into(),
            ),
            MailOp::MarkRead(read) => self.build_playbook_dag(
                "mail-mark",
                google::gmail_mark_first(read),
                format!(
                    "Marked the first message as {}",
                    if read { "read" } else { "unread" }
                ),
            ),
            MailOp::OpenLabel(label) => self.build_playbook_dag(
                "mail-label",
                google::gmail_open_label(&label),
                format!("Opened label '{}'", label),
            ),
            MailOp::Inbox => self.build_inbox_dag(),
        }
    }
}
