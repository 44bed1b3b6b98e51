use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use veska_core::error::{Result, VeskaError};
use veska_core::traits::BrowserDriver;
use veska_core::types::SelectorState;

use crate::playbook::{Condition, OnFailure, Playbook, PlaybookStep, StepAction, WaitFor};

/// Default per-step wait timeout.
pub const DEFAULT_WAIT_TIMEOUT_MS: u64 = 30_000;

/// Backoff between step retries.
const RETRY_BACKOFF_MS: u64 = 500;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StepStatus {
    Ok,
    Failed,
    Skipped,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepOutcome {
    pub name: String,
    pub status: StepStatus,
    #[serde(default)]
    pub error: Option<String>,
    pub attempts: u32,
}

/// Result of one playbook run: per-step outcomes plus captured artifacts.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlaybookReport {
    pub playbook: String,
    pub steps: Vec<StepOutcome>,
    /// Evaluate results keyed by step name.
    #[serde(default)]
    pub artifacts: HashMap<String, serde_json::Value>,
    /// Screenshot bytes keyed by step name. Kept out of serialized reports.
    #[serde(skip)]
    pub screenshots: HashMap<String, Vec<u8>>,
    pub succeeded: bool,
    #[serde(default)]
    pub failure: Option<String>,
}

/// Executes deterministic browser flows without any LLM involvement.
///
/// Steps run strictly in order. A false guard skips the step. Errors follow
/// the step's failure mode: abort, continue, or bounded retry. Postconditions
/// are always evaluated, even for an empty step list.
pub struct PlaybookRunner {
    browser: Arc<dyn BrowserDriver>,
}

impl PlaybookRunner {
    pub fn new(browser: Arc<dyn BrowserDriver>) -> Self {
        Self { browser }
    }

    /// Run a playbook to completion. Returns `Err(Cancelled)` only when the
    /// token fires; step failures are reported, not raised.
    pub async fn run(
        &self,
        playbook: &Playbook,
        cancel: &CancellationToken,
    ) -> Result<PlaybookReport> {
        info!(playbook = %playbook.name, steps = playbook.steps.len(), "running playbook");
        let mut report = PlaybookReport {
            playbook: playbook.name.clone(),
            steps: Vec::new(),
            artifacts: HashMap::new(),
            screenshots: HashMap::new(),
            succeeded: true,
            failure: None,
        };

        let aborted = self
            .run_steps(&playbook.preconditions, cancel, &mut report)
            .await?;
        if !aborted {
            self.run_steps(&playbook.steps, cancel, &mut report).await?;
        }

        for condition in &playbook.postconditions {
            if !self.check_condition(condition).await {
                warn!(playbook = %playbook.name, ?condition, "postcondition failed");
                report.succeeded = false;
                report.failure = Some(format!("postcondition failed: {:?}", condition));
                break;
            }
        }

        info!(
            playbook = %playbook.name,
            succeeded = report.succeeded,
            "playbook finished"
        );
        Ok(report)
    }

    /// Run a step list. Resolves to `true` when an abort stopped the run.
    async fn run_steps(
        &self,
        steps: &[PlaybookStep],
        cancel: &CancellationToken,
        report: &mut PlaybookReport,
    ) -> Result<bool> {
        for step in steps {
            if cancel.is_cancelled() {
                self.browser.close().await.ok();
                return Err(VeskaError::Cancelled);
            }

            if let Some(ref guard) = step.guard {
                if !self.check_condition(guard).await {
                    debug!(step = %step.name, "guard false, skipping step");
                    report.steps.push(StepOutcome {
                        name: step.name.clone(),
                        status: StepStatus::Skipped,
                        error: None,
                        attempts: 0,
                    });
                    continue;
                }
            }

            let max_attempts = match step.on_failure {
                OnFailure::Retry { attempts } => attempts.max(1),
                _ => 1,
            };

            let mut attempts = 0;
            let mut last_error: Option<VeskaError> = None;
            while attempts < max_attempts {
                attempts += 1;
                match self.execute_step(step, report).await {
                    Ok(()) => {
                        last_error = None;
                        break;
                    }
                    Err(e) => {
                        warn!(step = %step.name, attempt = attempts, error = %e, "step failed");
                        last_error = Some(e);
                        if attempts < max_attempts {
                            tokio::time::sleep(Duration::from_millis(RETRY_BACKOFF_MS)).await;
                        }
                    }
                }
            }

            match last_error {
                None => report.steps.push(StepOutcome {
                    name: step.name.clone(),
                    status: StepStatus::Ok,
                    error: None,
                    attempts,
                }),
                Some(e) => {
                    report.steps.push(StepOutcome {
                        name: step.name.clone(),
                        status: StepStatus::Failed,
                        error: Some(e.to_string()),
                        attempts,
                    });
                    match step.on_failure {
                        OnFailure::Continue => {}
                        // Retry exhausts into abort.
                        OnFailure::Abort | OnFailure::Retry { .. } => {
                            report.succeeded = false;
                            report.failure = Some(format!("step '{}' failed: {}", step.name, e));
                            return Ok(true);
                        }
                    }
                }
            }
        }
        Ok(false)
    }

    async fn execute_step(&self, step: &PlaybookStep, report: &mut PlaybookReport) -> Result<()> {
        match &step.action {
            StepAction::Navigate { url, wait_until } => {
                self.browser.navigate(url, *wait_until).await?;
            }
            StepAction::Click { selector } => {
                self.browser
                    .click(selector, DEFAULT_WAIT_TIMEOUT_MS)
                    .await?;
            }
            StepAction::Fill { selector, text } => {
                self.browser
                    .fill(selector, text, DEFAULT_WAIT_TIMEOUT_MS)
                    .await?;
            }
            StepAction::Wait { until } => match until {
                WaitFor::Selector { selector } => {
                    let timeout = step.wait_timeout_ms.unwrap_or(DEFAULT_WAIT_TIMEOUT_MS);
                    let visible = self
                        .browser
                        .wait_for_selector(selector, timeout, SelectorState::Visible)
                        .await?;
                    if !visible {
                        return Err(VeskaError::NotFound(format!("selector {}", selector)));
                    }
                }
                WaitFor::Duration { duration_ms } => {
                    tokio::time::sleep(Duration::from_millis(*duration_ms)).await;
                }
            },
            StepAction::Evaluate { script } => {
                let value = self.browser.evaluate(script).await?;
                report.artifacts.insert(step.name.clone(), value);
            }
            StepAction::Screenshot { path, full_page } => {
                let bytes = self
                    .browser
                    .screenshot(path.as_deref(), *full_page)
                    .await?;
                report.artifacts.insert(
                    step.name.clone(),
                    serde_json::json!({ "screenshot_bytes": bytes.len() }),
                );
                report.screenshots.insert(step.name.clone(), bytes);
            }
            StepAction::PressKey { key } => {
                self.browser.press_key(key).await?;
            }
            StepAction::Select { selector, value } => {
                self.browser.select_option(selector, value).await?;
            }
        }

        if let Some(ref selector) = step.wait_for {
            let timeout = step.wait_timeout_ms.unwrap_or(DEFAULT_WAIT_TIMEOUT_MS);
            let visible = self
                .browser
                .wait_for_selector(selector, timeout, SelectorState::Visible)
                .await?;
            if !visible {
                return Err(VeskaError::NotFound(format!(
                    "wait_for selector {}",
                    selector
                )));
            }
        }

        Ok(())
    }

    async fn check_condition(&self, condition: &Condition) -> bool {
        match condition {
            Condition::SelectorVisible {
                selector,
                timeout_ms,
            } => self
                .browser
                .wait_for_selector(selector, *timeout_ms, SelectorState::Visible)
                .await
                .unwrap_or(false),
            Condition::SelectorAbsent {
                selector,
                timeout_ms,
            } => !self
                .browser
                .wait_for_selector(selector, *timeout_ms, SelectorState::Visible)
                .await
                .unwrap_or(false),
            Condition::UrlContains { fragment } => self
                .browser
                .evaluate("window.location.href")
                .await
                .ok()
                .and_then(|v| v.as_str().map(|s| s.contains(fragment)))
                .unwrap_or(false),
        }
    }
}
