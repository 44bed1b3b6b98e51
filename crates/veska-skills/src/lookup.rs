use regex::Regex;
use serde::Deserialize;
use tracing::{info, warn};

use veska_automation::extract_phone_number;
use veska_core::error::Result;
use veska_core::types::ChatOptions;
use veska_dag::{Dag, DagNode};

use crate::common::{llm_json, run_playbook};
use crate::playbooks::lookup::lookup_playbook;
use crate::registry::{KeywordRule, Skill, SkillDeps, SkillRequest};

const QUERY_PROMPT: &str = "Extract the business or place the user wants information about.\n\
Return JSON: {\"query\": \"...\"}";

/// Regex fallbacks when the LLM cannot name the subject.
const QUERY_PATTERNS: &[&str] = &[
    r"(?:phone number|number|contact info|call)\s+(?:for|to)\s+(.+)",
    r"(?:find|get|give me|tell me)\s+(?:the\s+)?(?:phone number|number|contact info)\s+(?:for|to|of)\s+(.+)",
    r"(?:what's|what is)\s+(?:the\s+)?(?:phone number|number)\s+(?:for|to|of)\s+(.+)",
];

#[derive(Debug, Deserialize)]
struct InterpretedQuery {
    query: String,
}

/// Business lookups (phone numbers, addresses) through a deterministic
/// search playbook plus direct page scraping. No vision loop unless the
/// scrape comes up empty.
pub struct LookupSkill {
    deps: SkillDeps,
    rules: Vec<KeywordRule>,
}

impl LookupSkill {
    pub fn new(deps: SkillDeps) -> Self {
        Self {
            deps,
            rules: vec![
                KeywordRule::substring("phone number"),
                KeywordRule::substring("call"),
                KeywordRule::substring("dial"),
                KeywordRule::substring("directions"),
                KeywordRule::substring("address"),
                KeywordRule::substring("where is"),
                KeywordRule::substring("location"),
                KeywordRule::substring("map"),
                KeywordRule::substring("lookup"),
                KeywordRule::substring("search for"),
            ],
        }
    }

    fn fallback_query(utterance: &str) -> Option<String> {
        let lower = utterance.to_lowercase();
        for pattern in QUERY_PATTERNS {
            if let Ok(re) = Regex::new(pattern) {
                if let Some(cap) = re.captures(&lower) {
                    if let Some(query) = cap.get(1) {
                        return Some(query.as_str().trim().to_string());
                    }
                }
            }
        }
        None
    }
}

impl Skill for LookupSkill {
    fn name(&self) -> &'static str {
        "lookup"
    }

    fn description(&self) -> &'static str {
        "business lookups: phone numbers, addresses, directions"
    }

    fn keyword_rules(&self) -> &[KeywordRule] {
        &self.rules
    }

    fn build_dag(&self, request: &SkillRequest) -> Result<Dag> {
        let llm = self.deps.llm.clone();
        let utterance = request.utterance.clone();
        let interpret = DagNode::new("interpret_query", move |ctx| {
            let llm = llm.clone();
            let utterance = utterance.clone();
            async move {
                let query = match llm_json::<InterpretedQuery>(&llm, QUERY_PROMPT, &utterance).await
                {
                    Ok(parsed) if !parsed.query.trim().is_empty() => parsed.query.trim().to_string(),
                    _ => Self::fallback_query(&utterance).unwrap_or_else(|| utterance.clone()),
                };
                info!(query = %query, "lookup subject resolved");
                ctx.set_artifact("query", serde_json::json!(query)).await;
                Ok(())
            }
        });

        let browser = self.deps.browser.clone();
        let search = DagNode::new("run_search", move |ctx| {
            let browser = browser.clone();
            async move {
                let query = ctx
                    .artifact("query")
                    .await
                    .and_then(|v| v.as_str().map(String::from))
                    .unwrap_or_default();
                let playbook = lookup_playbook(&query);
                run_playbook(browser, &playbook, &ctx).await?;
                Ok(())
            }
        })
        .with_deps(["interpret_query"]);

        let browser = self.deps.browser.clone();
        let vision = self.deps.vision.clone();
        let extract = DagNode::new("extract_answer", move |ctx| {
            let browser = browser.clone();
            let vision = vision.clone();
            async move {
                let query = ctx
                    .artifact("query")
                    .await
                    .and_then(|v| v.as_str().map(String::from))
                    .unwrap_or_default();

                let body = match browser.get_text("body", 5_000).await {
                    Ok(text) => text,
                    Err(e) => {
                        warn!(error = %e, "could not read page body");
                        String::new()
                    }
                };

                if let Some(phone) = extract_phone_number(&body, &query) {
                    ctx.set_artifact("phone", serde_json::json!(phone)).await;
                    ctx.set_output(
                        "answer",
                        serde_json::json!(format!(
                            "The phone number for {} is {}.",
                            query, phone
                        )),
                    )
                    .await;
                } else {
                    // Regex came up empty; ask the vision model to read the page.
                    let screenshot = browser.screenshot(None, true).await?;
                    let prompt = format!(
                        "What is the phone number for {}? Answer in one sentence, or respond \
                         NO_ANSWER.",
                        query
                    );
                    let response = vision
                        .analyze(&screenshot, &prompt, &ChatOptions::default())
                        .await?;
                    let trimmed = response.trim();
                    if !trimmed.is_empty() && !trimmed.eq_ignore_ascii_case("NO_ANSWER") {
                        ctx.set_output("answer", serde_json::json!(trimmed)).await;
                    }
                }

                let summary = match ctx.output("answer").await.and_then(|v| v.as_str().map(String::from)) {
                    Some(answer) => format!("Lookup completed for {}\n{}", query, answer),
                    None => format!("Lookup completed for {}", query),
                };
                ctx.set_output("summary", serde_json::json!(summary)).await;
                Ok(())
            }
        })
        .with_deps(["run_search"]);

        Dag::new("lookup", vec![interpret, search, extract])
    }
}
