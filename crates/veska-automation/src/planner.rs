use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tracing::{debug, warn};

use veska_core::error::{Result, VeskaError};
use veska_core::traits::BrowserDriver;
use veska_core::types::{SelectorState, VisionAction};

/// Result-surface patterns: keywords in the action haystack predict which
/// selector should appear after the action lands.
const RESULT_PATTERNS: &[(&[&str], &str, u64)] = &[
    (&["search", "lookup", "phone", "google"], "#search", 60_000),
    (&["gmail", "inbox", "email"], "div[role='main']", 45_000),
    (&["calendar", "meeting"], "div[role='grid']", 45_000),
    (&["drive", "file"], "div[data-target='doclist']", 45_000),
];

const GUARD_STRATEGIES: &[&str] = &["scroll", "wait_short", "reload"];
const POST_STRATEGIES: &[&str] = &["wait_long", "scroll", "reload"];

/// Guard or validation requirement for a selector.
#[derive(Debug, Clone, Serialize)]
pub struct Expectation {
    pub label: String,
    pub selector: String,
    pub timeout_ms: u64,
}

#[derive(Debug, Serialize)]
struct AttemptLog {
    attempt: u32,
    status: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    recovery: Vec<String>,
}

/// Plans the immediate UI transitions around one vision action and validates
/// them: target reachable before, expected surface present after, with
/// bounded recovery (scroll, wait, reload) in between.
pub struct UiPlanner {
    browser: Arc<dyn BrowserDriver>,
    max_retries: u32,
}

impl UiPlanner {
    pub fn new(browser: Arc<dyn BrowserDriver>) -> Self {
        Self {
            browser,
            max_retries: 2,
        }
    }

    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    /// Execute `execute` within guard/validation/recovery phases. Returns a
    /// JSON summary of the attempts for the action history.
    pub async fn run<F, Fut>(
        &self,
        action: &VisionAction,
        mut execute: F,
    ) -> Result<serde_json::Value>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<()>>,
    {
        let preconditions = self.preconditions(action);
        let postconditions = self.postconditions(action);
        let mut attempts: Vec<AttemptLog> = Vec::new();

        for attempt in 1..=self.max_retries.max(1) {
            let mut log = AttemptLog {
                attempt,
                status: String::new(),
                recovery: Vec::new(),
            };

            if let Some(failing) = self.first_unmet(&preconditions).await {
                log.status = "guard_failed".into();
                let recovered = self
                    .attempt_recovery(GUARD_STRATEGIES, &failing, &mut log.recovery)
                    .await;
                attempts.push(log);
                if recovered {
                    continue;
                }
                return Err(VeskaError::NotFound(format!(
                    "target not reachable ({})",
                    failing.selector
                )));
            }

            execute().await?;

            match self.first_unmet(&postconditions).await {
                None => {
                    log.status = "ok".into();
                    attempts.push(log);
                    return Ok(summary(action, &attempts, "ok"));
                }
                Some(failing) => {
                    log.status = "postcondition_failed".into();
                    let recovered = self
                        .attempt_recovery(POST_STRATEGIES, &failing, &mut log.recovery)
                        .await;
                    attempts.push(log);
                    if recovered {
                        continue;
                    }
                    warn!(selector = %failing.selector, "postcondition not met after recovery");
                    return Err(VeskaError::NotFound(format!(
                        "postcondition not met ({})",
                        failing.selector
                    )));
                }
            }
        }

        Err(VeskaError::Internal("planner retries exhausted".into()))
    }

    fn preconditions(&self, action: &VisionAction) -> Vec<Expectation> {
        let Some(ref target) = action.target_description else {
            return Vec::new();
        };
        selector_candidates(target)
            .into_iter()
            .next()
            .map(|selector| {
                vec![Expectation {
                    label: "target_visible".into(),
                    selector,
                    timeout_ms: 15_000,
                }]
            })
            .unwrap_or_default()
    }

    fn postconditions(&self, action: &VisionAction) -> Vec<Expectation> {
        let haystack = format!(
            "{} {}",
            action.target_description.as_deref().unwrap_or(""),
            action.text.as_deref().unwrap_or("")
        )
        .to_lowercase();

        let mut expectations: Vec<Expectation> = RESULT_PATTERNS
            .iter()
            .filter(|(keywords, _, _)| keywords.iter().any(|k| haystack.contains(k)))
            .map(|(_, selector, timeout_ms)| Expectation {
                label: selector.to_string(),
                selector: selector.to_string(),
                timeout_ms: *timeout_ms,
            })
            .collect();

        if expectations.is_empty() {
            expectations.push(Expectation {
                label: "page_stable".into(),
                selector: "body".into(),
                timeout_ms: 8_000,
            });
        }
        expectations
    }

    async fn first_unmet(&self, expectations: &[Expectation]) -> Option<Expectation> {
        for expectation in expectations {
            let met = self
                .browser
                .wait_for_selector(
                    &expectation.selector,
                    expectation.timeout_ms,
                    SelectorState::Visible,
                )
                .await
                .unwrap_or(false);
            if !met {
                return Some(expectation.clone());
            }
        }
        None
    }

    async fn attempt_recovery(
        &self,
        strategies: &[&str],
        failing: &Expectation,
        log: &mut Vec<String>,
    ) -> bool {
        for strategy in strategies {
            debug!(strategy, selector = %failing.selector, "recovery attempt");
            let applied = match *strategy {
                "scroll" => self
                    .browser
                    .evaluate("window.scrollBy(0, 500)")
                    .await
                    .is_ok(),
                "wait_short" => {
                    tokio::time::sleep(Duration::from_millis(1_000)).await;
                    true
                }
                "wait_long" => {
                    tokio::time::sleep(Duration::from_millis(2_500)).await;
                    true
                }
                "reload" => self
                    .browser
                    .evaluate("window.location.reload()")
                    .await
                    .is_ok(),
                _ => false,
            };
            log.push(strategy.to_string());
            if applied {
                let recheck_timeout = failing.timeout_ms.min(8_000);
                let met = self
                    .browser
                    .wait_for_selector(
                        &failing.selector,
                        recheck_timeout,
                        SelectorState::Visible,
                    )
                    .await
                    .unwrap_or(false);
                if met {
                    return true;
                }
            }
        }
        false
    }
}

fn summary(action: &VisionAction, attempts: &[AttemptLog], status: &str) -> serde_json::Value {
    serde_json::json!({
        "action": action.kind,
        "target": action.target_description,
        "status": status,
        "attempts": attempts,
    })
}

/// Heuristically derive CSS selector candidates from a natural-language
/// element description.
pub fn selector_candidates(description: &str) -> Vec<String> {
    if description.is_empty() {
        return Vec::new();
    }

    let lower = description.to_lowercase();
    let mut selectors = Vec::new();

    if lower.contains("button") {
        for kw in extract_keywords(description) {
            selectors.push(format!("button:has-text('{}')", kw));
            selectors.push(format!("a:has-text('{}')", kw));
            selectors.push(format!("input[type='submit']:has-text('{}')", kw));
        }
    } else if lower.contains("link") {
        for kw in extract_keywords(description) {
            selectors.push(format!("a:has-text('{}')", kw));
        }
    } else if ["field", "input", "search"].iter().any(|w| lower.contains(w)) {
        selectors.push("input[type='search']".to_string());
        selectors.push("textarea[name='q']".to_string());
    }

    if selectors.is_empty() {
        for kw in extract_keywords(description) {
            selectors.push(format!("text={}", kw));
            selectors.push(format!("*:has-text('{}')", kw));
        }
    }

    selectors
}

/// Stop-word filtered keywords from an element description, max 3.
pub fn extract_keywords(description: &str) -> Vec<String> {
    const STOP_WORDS: &[&str] = &[
        "the", "a", "an", "in", "on", "at", "to", "for", "of", "with", "button", "link", "input",
        "field", "box", "element",
    ];

    description
        .to_lowercase()
        .split_whitespace()
        .map(|w| w.trim_matches(|c: char| ".,!?\"'".contains(c)).to_string())
        .filter(|w| !w.is_empty() && !STOP_WORDS.contains(&w.as_str()))
        .take(3)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keywords_filter_stop_words() {
        let kws = extract_keywords("the blue Submit button");
        assert_eq!(kws, vec!["blue", "submit"]);
    }

    #[test]
    fn button_descriptions_get_button_selectors() {
        let selectors = selector_candidates("the search button");
        assert!(selectors.iter().any(|s| s.starts_with("button:has-text")));
    }

    #[test]
    fn search_fields_get_input_selectors() {
        let selectors = selector_candidates("search field in header");
        assert!(selectors.contains(&"input[type='search']".to_string()));
    }

    #[test]
    fn generic_descriptions_fall_back_to_text() {
        let selectors = selector_candidates("pricing section");
        assert!(selectors.iter().any(|s| s.starts_with("text=")));
    }
}
