use std::sync::Arc;

use serde::Deserialize;
use tracing::{debug, warn};

use veska_core::traits::LlmClient;
use veska_core::types::{ChatMessage, ChatOptions};
use veska_llm::{parse_json_lenient, single_token_tag};
use veska_skills::SkillRegistry;

const AMBIGUITY_PROMPT: &str = "You check whether a request to an assistant is too ambiguous to \
act on. Respond with JSON: {\"ambiguous\": true/false, \"question\": \"follow-up question\"}. \
Only flag a request when clarification is absolutely necessary.";

#[derive(Debug, Deserialize)]
struct AmbiguityCheck {
    #[serde(default)]
    ambiguous: bool,
    #[serde(default)]
    question: Option<String>,
}

/// Intent routing: deterministic keyword rules first, a single-token LLM
/// fallback second, `free_form` when neither decides.
pub struct IntentRouter {
    llm: Arc<dyn LlmClient>,
    min_utterance_chars: usize,
}

impl IntentRouter {
    pub fn new(llm: Arc<dyn LlmClient>, min_utterance_chars: usize) -> Self {
        Self {
            llm,
            min_utterance_chars,
        }
    }

    /// Ambiguity pre-check. Resolves to the clarification question to ask,
    /// or `None` when the utterance is actionable as-is.
    pub async fn ambiguity_question(
        &self,
        registry: &SkillRegistry,
        utterance: &str,
    ) -> Option<String> {
        let trimmed = utterance.trim();
        if trimmed.chars().count() < self.min_utterance_chars {
            return Some("Could you say a bit more about what you need?".to_string());
        }

        let matches = registry.keyword_matches(trimmed);
        if matches.len() >= 2 {
            return Some(format!(
                "That could be {} or {}. Which one do you mean?",
                matches[0], matches[1]
            ));
        }

        match self
            .llm
            .chat(
                vec![
                    ChatMessage::system(AMBIGUITY_PROMPT),
                    ChatMessage::user(trimmed),
                ],
                &ChatOptions::default(),
            )
            .await
        {
            Ok(response) => match parse_json_lenient::<AmbiguityCheck>(&response) {
                Ok(check) if check.ambiguous => Some(
                    check
                        .question
                        .filter(|q| !q.trim().is_empty())
                        .unwrap_or_else(|| "Can you clarify what you'd like me to do?".into()),
                ),
                // Unparseable pre-checks never block a request.
                _ => None,
            },
            Err(e) => {
                debug!(error = %e, "ambiguity pre-check unavailable");
                None
            }
        }
    }

    /// Pick a skill. Keyword rules win; otherwise ask the LLM for a single
    /// skill tag, retrying once with a stricter instruction.
    pub async fn route(&self, registry: &SkillRegistry, utterance: &str) -> String {
        if let Some(first) = registry.keyword_matches(utterance).first() {
            debug!(skill = %first, "keyword route");
            return (*first).to_string();
        }

        let names = registry.names();
        let prompt = format!(
            "You are a router. Available skills:\n{}\n\nReply with exactly one skill name from \
             the list, nothing else.",
            registry.describe()
        );
        let options = ChatOptions::default();

        for attempt in 0..2 {
            let response = match self
                .llm
                .chat(
                    vec![
                        ChatMessage::system(prompt.clone()),
                        ChatMessage::user(utterance),
                    ],
                    &options,
                )
                .await
            {
                Ok(response) => response,
                Err(e) => {
                    warn!(error = %e, "router LLM failed, falling back to free_form");
                    return "free_form".to_string();
                }
            };

            if let Some(tag) = single_token_tag(&response, &names) {
                debug!(skill = %tag, attempt, "LLM route");
                return tag;
            }
        }

        "free_form".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use veska_llm::mock::{MockChat, UnavailableChat};
    use veska_skills::{builtin_registry, SkillDeps};

    fn registry() -> SkillRegistry {
        let deps = SkillDeps {
            llm: Arc::new(MockChat::new(vec![])),
            vision: Arc::new(veska_llm::mock::MockVision::new(vec![])),
            browser: Arc::new(crate::testing::StubBrowser),
            memory: Arc::new(veska_memory::MemoryStore::new()),
            max_vision_steps: 5,
        };
        builtin_registry(deps, veska_skills::daily_ops::DailyOpsPaths::default())
    }

    #[tokio::test]
    async fn keyword_route_wins_without_llm() {
        let llm = Arc::new(UnavailableChat);
        let router = IntentRouter::new(llm, 3);
        let route = router.route(&registry(), "summarize today's calendar").await;
        assert_eq!(route, "calendar");
    }

    #[tokio::test]
    async fn llm_fallback_routes_unmatched_utterances() {
        let llm = Arc::new(MockChat::new(vec!["research"]));
        let router = IntentRouter::new(llm, 3);
        let route = router.route(&registry(), "how do solid state batteries age").await;
        assert_eq!(route, "research");
    }

    #[tokio::test]
    async fn unusable_llm_reply_falls_back_to_free_form() {
        let llm = Arc::new(MockChat::new(vec!["I think maybe the best skill is unclear"]).with_fallback("still prose"));
        let router = IntentRouter::new(llm, 3);
        let route = router.route(&registry(), "hmm").await;
        assert_eq!(route, "free_form");
    }

    #[tokio::test]
    async fn short_utterances_are_ambiguous() {
        let llm = Arc::new(UnavailableChat);
        let router = IntentRouter::new(llm, 3);
        let question = router.ambiguity_question(&registry(), "go").await;
        assert!(question.is_some());
    }

    #[tokio::test]
    async fn multi_skill_matches_are_ambiguous() {
        let llm = Arc::new(UnavailableChat);
        let router = IntentRouter::new(llm, 3);
        // "calendar" and "email" fire two disjoint skill tables.
        let question = router
            .ambiguity_question(&registry(), "calendar email thing")
            .await;
        assert!(question.unwrap().contains("calendar"));
    }

    #[tokio::test]
    async fn llm_precheck_can_flag_ambiguity() {
        let llm = Arc::new(MockChat::new(vec![
            r#"{"ambiguous": true, "question": "Which account?"}"#,
        ]));
        let router = IntentRouter::new(llm, 3);
        let question = router
            .ambiguity_question(&registry(), "handle the usual thing")
            .await;
        assert_eq!(question.as_deref(), Some("Which account?"));
    }
}
