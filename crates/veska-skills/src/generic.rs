use veska_automation::vision::{VisionAgent, VisionRunStatus};
use veska_core::error::{Result, VeskaError};
use veska_dag::{Dag, DagNode};

use crate::common::extract_url;
use crate::registry::{KeywordRule, Skill, SkillDeps, SkillRequest};

/// Free-form browser tasks through the vision-guided perception-action loop.
/// The catch-all for web work no deterministic playbook covers.
pub struct GenericBrowserSkill {
    deps: SkillDeps,
    rules: Vec<KeywordRule>,
}

impl GenericBrowserSkill {
    pub fn new(deps: SkillDeps) -> Self {
        Self {
            deps,
            rules: vec![
                KeywordRule::substring("browser"),
                KeywordRule::substring("website"),
                KeywordRule::substring("click"),
                KeywordRule::substring("scroll"),
                KeywordRule::substring("tab"),
                KeywordRule::substring("screen"),
                KeywordRule::substring("open "),
            ],
        }
    }
}

impl Skill for GenericBrowserSkill {
    fn name(&self) -> &'static str {
        "generic_browser"
    }

    fn description(&self) -> &'static str {
        "any other browser task, driven step by step from screenshots"
    }

    fn keyword_rules(&self) -> &[KeywordRule] {
        &self.rules
    }

    fn build_dag(&self, request: &SkillRequest) -> Result<Dag> {
        let vision = self.deps.vision.clone();
        let browser = self.deps.browser.clone();
        let max_steps = self.deps.max_vision_steps;
        let task = request.utterance.clone();
        let starting_url = request
            .meta_str("url")
            .map(String::from)
            .or_else(|| extract_url(&request.utterance));

        let node = DagNode::new("vision_loop", move |ctx| {
            let agent = VisionAgent::new(vision.clone(), browser.clone())
                .with_max_steps(max_steps)
                .with_verification(true);
            let task = task.clone();
            let starting_url = starting_url.clone();
            async move {
                let outcome = agent
                    .execute(&task, starting_url.as_deref(), ctx.cancel_token())
                    .await?;

                ctx.set_artifact("history", serde_json::to_value(&outcome.history)?)
                    .await;
                ctx.set_artifact(
                    "screenshots_captured",
                    serde_json::json!(outcome.screenshots.len()),
                )
                .await;
                if let Some(ref answer) = outcome.answer {
                    ctx.set_output("answer", serde_json::json!(answer)).await;
                }

                match outcome.status {
                    VisionRunStatus::Failed => {
                        Err(VeskaError::Unavailable(outcome.reason))
                    }
                    VisionRunStatus::Complete | VisionRunStatus::Incomplete => {
                        let summary = match outcome.status {
                            VisionRunStatus::Complete => outcome.reason,
                            _ => format!("Stopped early: {}", outcome.reason),
                        };
                        ctx.set_output("summary", serde_json::json!(summary)).await;
                        Ok(())
                    }
                }
            }
        });

        Dag::new("generic-browser", vec![node])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::test_deps;

    #[test]
    fn single_node_dag() {
        let skill = GenericBrowserSkill::new(test_deps());
        let dag = skill
            .build_dag(&SkillRequest::new("open https://example.com and click pricing"))
            .unwrap();
        assert_eq!(dag.name(), "generic-browser");
        assert_eq!(dag.len(), 1);
    }
}
