use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use veska_core::error::{Result, VeskaError};
use veska_core::traits::{BrowserDriver, VisionClient};
use veska_core::types::{ChatOptions, VisionAction, VisionActionKind, WaitUntil};
use veska_llm::parse_json_lenient;

use crate::planner::{selector_candidates, UiPlanner};

const DEFAULT_START_URL: &str = "https://www.google.com";
const ELEMENT_TIMEOUT_MS: u64 = 2_000;

const STRICT_JSON_CLARIFIER: &str = "Your previous reply was not valid JSON. Respond with strict \
JSON only: a single object with keys kind, target_description, text, url, duration_ms, rationale. \
No prose, no code fences.";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VisionRunStatus {
    Complete,
    Incomplete,
    Failed,
}

/// One loop iteration: what the model chose and what happened to it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActionRecord {
    pub step: usize,
    #[serde(default)]
    pub action: Option<VisionAction>,
    #[serde(default)]
    pub planner: Option<serde_json::Value>,
    #[serde(default)]
    pub error: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VisionRunOutcome {
    pub status: VisionRunStatus,
    pub reason: String,
    #[serde(default)]
    pub answer: Option<String>,
    pub steps_taken: usize,
    pub history: Vec<ActionRecord>,
    /// Raw screenshot bytes per loop iteration, in order.
    #[serde(skip)]
    pub screenshots: Vec<Vec<u8>>,
}

/// Bounded perception-action loop: screenshot, vision reasoning, browser
/// action, until the model reports completion or the step budget runs out.
///
/// The agent never touches anything but the browser driver; URLs outside
/// http/https are refused.
pub struct VisionAgent {
    vision: Arc<dyn VisionClient>,
    browser: Arc<dyn BrowserDriver>,
    planner: UiPlanner,
    max_steps: usize,
    verify_actions: bool,
}

impl VisionAgent {
    pub fn new(vision: Arc<dyn VisionClient>, browser: Arc<dyn BrowserDriver>) -> Self {
        let planner = UiPlanner::new(browser.clone());
        Self {
            vision,
            browser,
            planner,
            max_steps: 20,
            verify_actions: false,
        }
    }

    pub fn with_max_steps(mut self, max_steps: usize) -> Self {
        self.max_steps = max_steps;
        self
    }

    /// Re-screenshot after each action and ask the model whether it landed.
    /// The loop is self-correcting either way, so a failed verification only
    /// logs.
    pub fn with_verification(mut self, verify_actions: bool) -> Self {
        self.verify_actions = verify_actions;
        self
    }

    pub async fn execute(
        &self,
        task: &str,
        starting_url: Option<&str>,
        cancel: &CancellationToken,
    ) -> Result<VisionRunOutcome> {
        if self.max_steps == 0 {
            return Ok(VisionRunOutcome {
                status: VisionRunStatus::Incomplete,
                reason: "step budget is zero".into(),
                answer: None,
                steps_taken: 0,
                history: Vec::new(),
                screenshots: Vec::new(),
            });
        }

        info!(task = %task, max_steps = self.max_steps, "starting vision-action loop");

        let start = match starting_url {
            Some(url) => ensure_safe_url(url)?,
            None => DEFAULT_START_URL.to_string(),
        };
        self.browser.navigate(&start, WaitUntil::default()).await?;

        let mut history: Vec<ActionRecord> = Vec::new();
        let mut screenshots: Vec<Vec<u8>> = Vec::new();
        let options = ChatOptions::default();

        for step in 1..=self.max_steps {
            if cancel.is_cancelled() {
                self.browser.close().await.ok();
                return Err(VeskaError::Cancelled);
            }
            debug!(step, max_steps = self.max_steps, "vision loop iteration");

            let screenshot = match self.browser.screenshot(None, false).await {
                Ok(bytes) => bytes,
                Err(e) => {
                    warn!(step, error = %e, "screenshot failed");
                    history.push(ActionRecord {
                        step,
                        action: None,
                        planner: None,
                        error: Some(e.to_string()),
                    });
                    continue;
                }
            };
            screenshots.push(screenshot.clone());

            let prompt = action_prompt(task, &history);
            let action = match self.request_action(&screenshot, &prompt, &options).await {
                Ok(action) => action,
                Err(e) => {
                    warn!(step, error = %e, "unusable vision response");
                    history.push(ActionRecord {
                        step,
                        action: None,
                        planner: None,
                        error: Some(e.to_string()),
                    });
                    continue;
                }
            };

            info!(step, kind = ?action.kind, rationale = %action.rationale, "vision action");

            if action.kind == VisionActionKind::Complete {
                let reason = if action.rationale.is_empty() {
                    "task reported complete".to_string()
                } else {
                    action.rationale.clone()
                };
                history.push(ActionRecord {
                    step,
                    action: Some(action),
                    planner: None,
                    error: None,
                });
                let answer = self.answer_task(task, &options).await;
                return Ok(VisionRunOutcome {
                    status: VisionRunStatus::Complete,
                    reason,
                    answer,
                    steps_taken: step,
                    history,
                    screenshots,
                });
            }

            let mut record = ActionRecord {
                step,
                action: Some(action.clone()),
                planner: None,
                error: None,
            };
            match self.planner.run(&action, || self.perform_action(&action)).await {
                Ok(summary) => {
                    record.planner = Some(summary);
                    if self.verify_actions {
                        self.verify_action(&action, &options).await;
                    }
                }
                Err(VeskaError::Refused(reason)) => {
                    // Navigation outside http/https is unrecoverable.
                    record.error = Some(reason.clone());
                    history.push(record);
                    self.browser.close().await.ok();
                    return Ok(VisionRunOutcome {
                        status: VisionRunStatus::Failed,
                        reason,
                        answer: None,
                        steps_taken: step,
                        history,
                        screenshots,
                    });
                }
                Err(e) => {
                    warn!(step, error = %e, "action failed, loop continues");
                    record.error = Some(e.to_string());
                }
            }
            history.push(record);
        }

        warn!(max_steps = self.max_steps, "step budget exhausted");
        let answer = self.answer_task(task, &options).await;
        Ok(VisionRunOutcome {
            status: VisionRunStatus::Incomplete,
            reason: format!("step budget ({}) exhausted", self.max_steps),
            answer,
            steps_taken: self.max_steps,
            history,
            screenshots,
        })
    }

    /// Ask for the next action, with one strict-JSON retry before giving up.
    async fn request_action(
        &self,
        screenshot: &[u8],
        prompt: &str,
        options: &ChatOptions,
    ) -> Result<VisionAction> {
        let response = self.vision.analyze(screenshot, prompt, options).await?;
        match parse_json_lenient::<VisionAction>(&response) {
            Ok(action) => Ok(action),
            Err(_) => {
                let retry_prompt = format!("{}\n\n{}", prompt, STRICT_JSON_CLARIFIER);
                let retry = self
                    .vision
                    .analyze(screenshot, &retry_prompt, options)
                    .await?;
                parse_json_lenient::<VisionAction>(&retry)
            }
        }
    }

    /// Final QA pass over a full-page screenshot. `NO_ANSWER` maps to `None`.
    async fn answer_task(&self, task: &str, options: &ChatOptions) -> Option<String> {
        let screenshot = match self.browser.screenshot(None, true).await {
            Ok(bytes) => bytes,
            Err(e) => {
                warn!(error = %e, "final screenshot failed, no answer");
                return None;
            }
        };
        let prompt = format!(
            "You are looking at a web page screenshot.\n\nQuestion: {}\n\nAnswer the user's \
             question in one sentence, or respond NO_ANSWER.",
            task
        );
        match self.vision.analyze(&screenshot, &prompt, options).await {
            Ok(response) => {
                let trimmed = response.trim().to_string();
                if trimmed.is_empty() || trimmed.eq_ignore_ascii_case("NO_ANSWER") {
                    None
                } else {
                    Some(trimmed)
                }
            }
            Err(e) => {
                warn!(error = %e, "answer extraction failed");
                None
            }
        }
    }

    async fn verify_action(&self, action: &VisionAction, options: &ChatOptions) {
        let Ok(screenshot) = self.browser.screenshot(None, false).await else {
            return;
        };
        let prompt = format!(
            "An action was just performed: {}. Compare this screenshot to the expected effect. \
             Reply VERIFIED if the page reflects the action, otherwise FAILED with a short reason.",
            action.rationale
        );
        match self.vision.analyze(&screenshot, &prompt, options).await {
            Ok(response) if response.to_uppercase().contains("FAILED") => {
                warn!(rationale = %action.rationale, "verification failed, next iteration corrects");
            }
            Ok(_) => {}
            Err(e) => debug!(error = %e, "verification call failed"),
        }
    }

    async fn perform_action(&self, action: &VisionAction) -> Result<()> {
        match action.kind {
            VisionActionKind::Click => {
                let target = action.target_description.as_deref().ok_or_else(|| {
                    VeskaError::BadResponse("click action without target description".into())
                })?;
                self.click_by_description(target).await
            }
            VisionActionKind::Type => {
                let text = action.text.as_deref().ok_or_else(|| {
                    VeskaError::BadResponse("type action without text".into())
                })?;
                let description = action.target_description.as_deref().unwrap_or("input field");
                self.fill_by_description(description, text).await
            }
            VisionActionKind::Scroll => {
                let direction = action
                    .target_description
                    .as_deref()
                    .unwrap_or("down")
                    .to_lowercase();
                if direction.contains("up") {
                    self.browser.press_key("PageUp").await
                } else if direction.contains("down") {
                    self.browser.press_key("PageDown").await
                } else {
                    self.browser
                        .evaluate("window.scrollBy(0, 300)")
                        .await
                        .map(|_| ())
                }
            }
            VisionActionKind::Navigate => {
                let url = action.url.as_deref().ok_or_else(|| {
                    VeskaError::BadResponse("navigate action without url".into())
                })?;
                let url = ensure_safe_url(url)?;
                self.browser.navigate(&url, WaitUntil::default()).await?;
                Ok(())
            }
            VisionActionKind::Wait => {
                let ms = action.duration_ms.unwrap_or(2_000);
                tokio::time::sleep(Duration::from_millis(ms)).await;
                Ok(())
            }
            VisionActionKind::Complete => Ok(()),
        }
    }

    async fn click_by_description(&self, description: &str) -> Result<()> {
        for selector in selector_candidates(description) {
            match self.browser.click(&selector, ELEMENT_TIMEOUT_MS).await {
                Ok(()) => {
                    debug!(selector = %selector, "clicked");
                    return Ok(());
                }
                Err(e) => debug!(selector = %selector, error = %e, "selector failed"),
            }
        }
        // Last resort: text-content match on the whole description.
        let fallback = format!("text={}", description);
        self.browser
            .click(&fallback, ELEMENT_TIMEOUT_MS)
            .await
            .map_err(|_| VeskaError::NotFound(format!("element '{}'", description)))
    }

    async fn fill_by_description(&self, description: &str, text: &str) -> Result<()> {
        for selector in selector_candidates(description) {
            if self
                .browser
                .fill(&selector, text, ELEMENT_TIMEOUT_MS)
                .await
                .is_ok()
            {
                return Ok(());
            }
        }
        Err(VeskaError::NotFound(format!("input '{}'", description)))
    }
}

/// Build the per-step reasoning prompt: task, prior rationales, JSON schema.
fn action_prompt(task: &str, history: &[ActionRecord]) -> String {
    let mut prompt = format!(
        "You are a browser automation assistant. Decide the single next action that makes \
         progress on the task.\n\nTask: {}\n",
        task
    );
    let rationales: Vec<&str> = history
        .iter()
        .filter_map(|r| r.action.as_ref())
        .map(|a| a.rationale.as_str())
        .filter(|r| !r.is_empty())
        .collect();
    if !rationales.is_empty() {
        prompt.push_str("\nActions taken so far:\n");
        for rationale in rationales {
            prompt.push_str(&format!("- {}\n", rationale));
        }
    }
    prompt.push_str(
        "\nRespond with exactly one JSON object:\n\
         {\"kind\": \"click|type|scroll|navigate|wait|complete\", \
         \"target_description\": \"element to act on\", \"text\": \"text to type\", \
         \"url\": \"url to open\", \"duration_ms\": 0, \"rationale\": \"why\"}\n\
         Use \"complete\" once the task is done.",
    );
    prompt
}

/// Accept http/https, add https to bare hosts, refuse everything else.
fn ensure_safe_url(url: &str) -> Result<String> {
    let trimmed = url.trim();
    if trimmed.starts_with("http://") || trimmed.starts_with("https://") {
        return Ok(trimmed.to_string());
    }
    if trimmed.contains("://") || trimmed.starts_with("about:") || trimmed.starts_with("javascript:")
    {
        return Err(VeskaError::Refused(format!(
            "navigation to '{}' is not allowed",
            trimmed
        )));
    }
    Ok(format!("https://{}", trimmed))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn safe_url_schemes() {
        assert_eq!(
            ensure_safe_url("https://example.com").unwrap(),
            "https://example.com"
        );
        assert_eq!(
            ensure_safe_url("example.com/path").unwrap(),
            "https://example.com/path"
        );
        assert!(matches!(
            ensure_safe_url("file:///etc/passwd").unwrap_err(),
            VeskaError::Refused(_)
        ));
        assert!(matches!(
            ensure_safe_url("about:config").unwrap_err(),
            VeskaError::Refused(_)
        ));
    }

    #[test]
    fn prompt_includes_history_rationales() {
        let history = vec![ActionRecord {
            step: 1,
            action: Some(VisionAction {
                kind: VisionActionKind::Navigate,
                target_description: None,
                text: None,
                url: Some("https://example.com".into()),
                duration_ms: None,
                rationale: "open the site".into(),
            }),
            planner: None,
            error: None,
        }];
        let prompt = action_prompt("find the phone number", &history);
        assert!(prompt.contains("find the phone number"));
        assert!(prompt.contains("- open the site"));
        assert!(prompt.contains("\"kind\""));
    }
}
