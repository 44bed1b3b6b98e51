use regex::Regex;

use veska_core::error::Result;
use veska_dag::{Dag, DagNode};

use crate::common::{read_page, run_playbook};
use crate::playbooks::google;
use crate::registry::{KeywordRule, Skill, SkillDeps, SkillRequest};

const READ_DRIVE_PROMPT: &str = "You are looking at a file listing. List the visible file names \
with their last-modified info, most recent first, under five lines.";

/// Drive browsing, search and sharing over the web UI.
pub struct DriveSkill {
    deps: SkillDeps,
    rules: Vec<KeywordRule>,
    search_re: Option<Regex>,
}

impl DriveSkill {
    pub fn new(deps: SkillDeps) -> Self {
        Self {
            deps,
            rules: vec![
                KeywordRule::substring("drive"),
                KeywordRule::substring("document"),
                KeywordRule::substring("file"),
                KeywordRule::substring("folder"),
            ],
            search_re: Regex::new(r"(?i)search\s+(?:for\s+)?(.+)").ok(),
        }
    }

    fn search_query(&self, utterance: &str) -> Option<String> {
        self.search_re
            .as_ref()
            .and_then(|re| re.captures(utterance))
            .and_then(|cap| cap.get(1))
            .map(|m| m.as_str().trim_matches(|c| "'\" ".contains(c)).to_string())
            .filter(|q| !q.is_empty())
    }

    fn build_read_dag(
        &self,
        dag_name: &str,
        playbook: veska_automation::playbook::Playbook,
        summary_prefix: String,
    ) -> Result<Dag> {
        let browser = self.deps.browser.clone();
        let open = DagNode::new("open_drive", move |ctx| {
            let browser = browser.clone();
            let playbook = playbook.clone();
            async move {
                run_playbook(browser, &playbook, &ctx).await?;
                Ok(())
            }
        });

        let browser = self.deps.browser.clone();
        let vision = self.deps.vision.clone();
        let summarize = DagNode::new("read_listing", move |ctx| {
            let browser = browser.clone();
            let vision = vision.clone();
            let prefix = summary_prefix.clone();
            async move {
                let listing = read_page(&browser, &vision, READ_DRIVE_PROMPT).await?;
                let listing = listing.trim().to_string();
                ctx.set_output("answer", serde_json::json!(listing.clone())).await;
                ctx.set_output(
                    "summary",
                    serde_json::json!(format!("{}\n{}", prefix, listing)),
                )
                .await;
                Ok(())
            }
        })
        .with_deps(["open_drive"]);

        Dag::new(dag_name, vec![open, summarize])
    }
}

impl Skill for DriveSkill {
    fn name(&self) -> &'static str {
        "drive"
    }

    fn description(&self) -> &'static str {
        "cloud files: recent documents, search and sharing"
    }

    fn keyword_rules(&self) -> &[KeywordRule] {
        &self.rules
    }

    fn build_dag(&self, request: &SkillRequest) -> Result<Dag> {
        let lower = request.utterance.to_lowercase();

        if let Some(query) = self.search_query(&request.utterance) {
            return self.build_read_dag(
                "drive-search",
                google::drive_search(&query),
                format!("Searched Drive for '{}'", query),
            );
        }
        if lower.contains("share") {
            let browser = self.deps.browser.clone();
            let node = DagNode::new("open_share_dialog", move |ctx| {
                let browser = browser.clone();
                async move {
                    run_playbook(browser, &google::drive_share_first(), &ctx).await?;
                    ctx.set_output(
                        "summary",
                        serde_json::json!("Opened the share dialog for the first Drive item"),
                    )
                    .await;
                    Ok(())
                }
            });
            return Dag::new("drive-share", vec![node]);
        }

        self.build_read_dag(
            "drive-recent",
            google::drive_recent(),
            "Recent Drive items".to_string(),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::test_deps;

    #[test]
    fn search_query_extraction() {
        let skill = DriveSkill::new(test_deps());
        assert_eq!(
            skill.search_query("search for quarterly report"),
            Some("quarterly report".to_string())
        );
        assert_eq!(
            skill.search_query("Search 'roadmap'"),
            Some("roadmap".to_string())
        );
        assert_eq!(skill.search_query("list my recent files"), None);
    }

    #[test]
    fn routes_between_dags() {
        let skill = DriveSkill::new(test_deps());
        assert_eq!(
            skill
                .build_dag(&SkillRequest::new("share the first file"))
                .unwrap()
                .name(),
            "drive-share"
        );
        assert_eq!(
            skill
                .build_dag(&SkillRequest::new("show recent documents"))
                .unwrap()
                .name(),
            "drive-recent"
        );
    }
}
