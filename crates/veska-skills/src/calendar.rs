use serde::Deserialize;
use tracing::info;

use veska_core::error::Result;
use veska_dag::{Dag, DagNode};
use veska_llm::parse_json_lenient;

use crate::common::{llm_json, read_page, run_playbook};
use crate::playbooks::google;
use crate::registry::{KeywordRule, Skill, SkillDeps, SkillRequest};

const EVENT_PROMPT: &str = "Extract a calendar event from the request.\n\
Return JSON with keys: title, date, start_time, end_time, location, description. \
Use null for anything not mentioned.";

const READ_CALENDAR_PROMPT: &str = "You are looking at a calendar view. List the visible events \
as JSON: {\"events\": [{\"title\": \"...\", \"time\": \"...\"}]}. Return JSON only.";

#[derive(Debug, Deserialize, Default)]
struct InterpretedEvent {
    title: Option<String>,
    date: Option<String>,
    start_time: Option<String>,
    end_time: Option<String>,
    location: Option<String>,
    description: Option<String>,
}

#[derive(Debug, Deserialize)]
struct CalendarView {
    #[serde(default)]
    events: Vec<serde_json::Value>,
}

/// Calendar views, schedules and event creation over the web UI.
pub struct CalendarSkill {
    deps: SkillDeps,
    rules: Vec<KeywordRule>,
}

impl CalendarSkill {
    pub fn new(deps: SkillDeps) -> Self {
        Self {
            deps,
            rules: vec![
                KeywordRule::substring("calendar"),
                KeywordRule::substring("schedule"),
                KeywordRule::substring("meeting"),
                KeywordRule::substring("event"),
            ],
        }
    }

    fn build_create_dag(&self, request: &SkillRequest) -> Result<Dag> {
        let llm = self.deps.llm.clone();
        let utterance = request.utterance.clone();
        let interpret = DagNode::new("interpret_event", move |ctx| {
            let llm = llm.clone();
            let utterance = utterance.clone();
            async move {
                let event: InterpretedEvent = llm_json(&llm, EVENT_PROMPT, &utterance).await?;
                let title = event.title.unwrap_or_else(|| "Untitled event".to_string());
                let details = [
                    event.date,
                    event.start_time,
                    event.end_time,
                    event.location,
                    event.description,
                ]
                .into_iter()
                .flatten()
                .collect::<Vec<_>>()
                .join(" ");
                ctx.set_artifact("event_title", serde_json::json!(title)).await;
                ctx.set_artifact("event_details", serde_json::json!(details)).await;
                Ok(())
            }
        });

        let browser = self.deps.browser.clone();
        let create = DagNode::new("create_event", move |ctx| {
            let browser = browser.clone();
            async move {
                let title = ctx
                    .artifact("event_title")
                    .await
                    .and_then(|v| v.as_str().map(String::from))
                    .unwrap_or_else(|| "Untitled event".to_string());
                let details = ctx
                    .artifact("event_details")
                    .await
                    .and_then(|v| v.as_str().map(String::from))
                    .unwrap_or_default();
                let playbook = google::calendar_create_event(&title, &details);
                run_playbook(browser, &playbook, &ctx).await?;
                info!(title = %title, "calendar event submitted");
                ctx.set_output("summary", serde_json::json!(format!("Created event '{}'", title)))
                    .await;
                Ok(())
            }
        })
        .with_deps(["interpret_event"]);

        Dag::new("calendar-create", vec![interpret, create])
    }

    fn build_view_dag(&self, week: bool, reschedule: bool) -> Result<Dag> {
        let browser = self.deps.browser.clone();
        let open = DagNode::new("open_view", move |ctx| {
            let browser = browser.clone();
            async move {
                let playbook = if reschedule {
                    google::calendar_reschedule()
                } else if week {
                    google::calendar_week()
                } else {
                    google::calendar_day()
                };
                run_playbook(browser, &playbook, &ctx).await?;
                Ok(())
            }
        });

        let browser = self.deps.browser.clone();
        let vision = self.deps.vision.clone();
        let interpret = DagNode::new("read_events", move |ctx| {
            let browser = browser.clone();
            let vision = vision.clone();
            async move {
                let response = read_page(&browser, &vision, READ_CALENDAR_PROMPT).await?;
                let summary = match parse_json_lenient::<CalendarView>(&response) {
                    Ok(view) => {
                        ctx.set_artifact("events", serde_json::json!(view.events)).await;
                        format!("Found {} events", view.events.len())
                    }
                    // Free-form description still makes a usable summary.
                    Err(_) => response.trim().to_string(),
                };
                ctx.set_output("answer", serde_json::json!(summary.clone())).await;
                ctx.set_output("summary", serde_json::json!(summary)).await;
                Ok(())
            }
        })
        .with_deps(["open_view"]);

        Dag::new("calendar-view", vec![open, interpret])
    }
}

impl Skill for CalendarSkill {
    fn name(&self) -> &'static str {
        "calendar"
    }

    fn description(&self) -> &'static str {
        "calendar views, schedules, meetings and event creation"
    }

    fn keyword_rules(&self) -> &[KeywordRule] {
        &self.rules
    }

    fn build_dag(&self, request: &SkillRequest) -> Result<Dag> {
        let lower = request.utterance.to_lowercase();
        let creating = ["create", "schedule", "add"]
            .iter()
            .any(|w| lower.contains(w))
            && lower.contains("event");
        if creating {
            self.build_create_dag(request)
        } else {
            self.build_view_dag(lower.contains("week"), lower.contains("reschedule"))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::test_deps;

    #[test]
    fn create_utterances_get_the_create_dag() {
        let skill = CalendarSkill::new(test_deps());
        let dag = skill
            .build_dag(&SkillRequest::new("schedule an event with Ana tomorrow"))
            .unwrap();
        assert_eq!(dag.name(), "calendar-create");

        let dag = skill
            .build_dag(&SkillRequest::new("what's on my calendar this week"))
            .unwrap();
        assert_eq!(dag.name(), "calendar-view");
    }
}
