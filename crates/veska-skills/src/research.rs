use regex::Regex;

use veska_core::error::Result;
use veska_dag::{Dag, DagNode};

use crate::common::{read_page, run_playbook};
use crate::playbooks::research::research_playbook;
use crate::registry::{KeywordRule, Skill, SkillDeps, SkillRequest};

const RESULT_COUNT: usize = 3;

const SUMMARIZE_PROMPT: &str =
    "Summarize the key findings from the captured search results in three to five sentences.";

/// Multi-result web research: open the top results, capture them, summarize.
pub struct ResearchSkill {
    deps: SkillDeps,
    rules: Vec<KeywordRule>,
    prefix_re: Option<Regex>,
}

impl ResearchSkill {
    pub fn new(deps: SkillDeps) -> Self {
        Self {
            deps,
            rules: vec![
                KeywordRule::substring("research"),
                KeywordRule::substring("read up"),
                KeywordRule::substring("compare"),
                KeywordRule::substring("sources"),
            ],
            prefix_re: Regex::new(r"(?i)^(?:research|read up on|compare)\s+(.+)$").ok(),
        }
    }

    fn query(&self, utterance: &str) -> String {
        self.prefix_re
            .as_ref()
            .and_then(|re| re.captures(utterance.trim()))
            .and_then(|cap| cap.get(1))
            .map(|m| m.as_str().to_string())
            .unwrap_or_else(|| utterance.trim().to_string())
    }
}

impl Skill for ResearchSkill {
    fn name(&self) -> &'static str {
        "research"
    }

    fn description(&self) -> &'static str {
        "web research across multiple search results with a synthesized summary"
    }

    fn keyword_rules(&self) -> &[KeywordRule] {
        &self.rules
    }

    fn build_dag(&self, request: &SkillRequest) -> Result<Dag> {
        let query = self.query(&request.utterance);

        let browser = self.deps.browser.clone();
        let playbook = research_playbook(&query, RESULT_COUNT);
        let sweep = DagNode::new("sweep_results", move |ctx| {
            let browser = browser.clone();
            let playbook = playbook.clone();
            async move {
                run_playbook(browser, &playbook, &ctx).await?;
                Ok(())
            }
        });

        let browser = self.deps.browser.clone();
        let vision = self.deps.vision.clone();
        let query_for_summary = query.clone();
        let summarize = DagNode::new("summarize", move |ctx| {
            let browser = browser.clone();
            let vision = vision.clone();
            let query = query_for_summary.clone();
            async move {
                let findings = read_page(&browser, &vision, SUMMARIZE_PROMPT).await?;
                let findings = findings.trim().to_string();
                ctx.set_output("answer", serde_json::json!(findings.clone())).await;
                ctx.set_output(
                    "summary",
                    serde_json::json!(format!("Research on '{}':\n{}", query, findings)),
                )
                .await;
                Ok(())
            }
        })
        .with_deps(["sweep_results"]);

        Dag::new("research", vec![sweep, summarize])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::test_deps;

    #[test]
    fn query_strips_leading_verb() {
        let skill = ResearchSkill::new(test_deps());
        assert_eq!(
            skill.query("research rust async runtimes"),
            "rust async runtimes"
        );
        assert_eq!(skill.query("local llm routers"), "local llm routers");
    }
}
