use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use veska_core::types::WaitUntil;

/// Declarative browser action inside a playbook step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum StepAction {
    Navigate {
        url: String,
        #[serde(default)]
        wait_until: WaitUntil,
    },
    Click {
        selector: String,
    },
    Fill {
        selector: String,
        text: String,
    },
    Wait {
        #[serde(flatten)]
        until: WaitFor,
    },
    Evaluate {
        script: String,
    },
    Screenshot {
        #[serde(default)]
        path: Option<PathBuf>,
        #[serde(default)]
        full_page: bool,
    },
    PressKey {
        key: String,
    },
    Select {
        selector: String,
        value: String,
    },
}

/// What a `wait` step waits for.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum WaitFor {
    Selector { selector: String },
    Duration { duration_ms: u64 },
}

/// Declarative predicate usable as a step guard or playbook postcondition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Condition {
    SelectorVisible {
        selector: String,
        #[serde(default = "default_condition_timeout_ms")]
        timeout_ms: u64,
    },
    SelectorAbsent {
        selector: String,
        #[serde(default = "default_condition_timeout_ms")]
        timeout_ms: u64,
    },
    UrlContains {
        fragment: String,
    },
}

fn default_condition_timeout_ms() -> u64 {
    5_000
}

/// What to do when a step errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OnFailure {
    #[default]
    Abort,
    Continue,
    /// Total attempts for the step, with 500ms backoff between them.
    Retry {
        attempts: u32,
    },
}

/// Single UI step with guard, wait and failure mode.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlaybookStep {
    pub name: String,
    #[serde(flatten)]
    pub action: StepAction,
    /// Selector to await after the action completes.
    #[serde(default)]
    pub wait_for: Option<String>,
    #[serde(default)]
    pub wait_timeout_ms: Option<u64>,
    /// When present and false at runtime, the step is skipped, not failed.
    #[serde(default)]
    pub guard: Option<Condition>,
    #[serde(default)]
    pub on_failure: OnFailure,
}

impl PlaybookStep {
    pub fn new(name: impl Into<String>, action: StepAction) -> Self {
        Self {
            name: name.into(),
            action,
            wait_for: None,
            wait_timeout_ms: None,
            guard: None,
            on_failure: OnFailure::Abort,
        }
    }

    pub fn navigate(name: impl Into<String>, url: impl Into<String>) -> Self {
        Self::new(
            name,
            StepAction::Navigate {
                url: url.into(),
                wait_until: WaitUntil::default(),
            },
        )
    }

    pub fn click(name: impl Into<String>, selector: impl Into<String>) -> Self {
        Self::new(
            name,
            StepAction::Click {
                selector: selector.into(),
            },
        )
    }

    pub fn fill(
        name: impl Into<String>,
        selector: impl Into<String>,
        text: impl Into<String>,
    ) -> Self {
        Self::new(
            name,
            StepAction::Fill {
                selector: selector.into(),
                text: text.into(),
            },
        )
    }

    pub fn evaluate(name: impl Into<String>, script: impl Into<String>) -> Self {
        Self::new(
            name,
            StepAction::Evaluate {
                script: script.into(),
            },
        )
    }

    pub fn screenshot(name: impl Into<String>, full_page: bool) -> Self {
        Self::new(
            name,
            StepAction::Screenshot {
                path: None,
                full_page,
            },
        )
    }

    pub fn wait_selector(name: impl Into<String>, selector: impl Into<String>) -> Self {
        Self::new(
            name,
            StepAction::Wait {
                until: WaitFor::Selector {
                    selector: selector.into(),
                },
            },
        )
    }

    pub fn with_wait_for(mut self, selector: impl Into<String>) -> Self {
        self.wait_for = Some(selector.into());
        self
    }

    pub fn with_wait_timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.wait_timeout_ms = Some(timeout_ms);
        self
    }

    pub fn with_guard(mut self, guard: Condition) -> Self {
        self.guard = Some(guard);
        self
    }

    pub fn with_on_failure(mut self, on_failure: OnFailure) -> Self {
        self.on_failure = on_failure;
        self
    }
}

/// Ordered step list representing one deterministic browser flow.
/// Preconditions are themselves steps (they may navigate); postconditions are
/// predicates checked after the final step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Playbook {
    pub name: String,
    pub steps: Vec<PlaybookStep>,
    #[serde(default)]
    pub preconditions: Vec<PlaybookStep>,
    #[serde(default)]
    pub postconditions: Vec<Condition>,
}

impl Playbook {
    pub fn new(name: impl Into<String>, steps: Vec<PlaybookStep>) -> Self {
        Self {
            name: name.into(),
            steps,
            preconditions: Vec::new(),
            postconditions: Vec::new(),
        }
    }

    pub fn with_preconditions(mut self, preconditions: Vec<PlaybookStep>) -> Self {
        self.preconditions = preconditions;
        self
    }

    pub fn with_postconditions(mut self, postconditions: Vec<Condition>) -> Self {
        self.postconditions = postconditions;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn playbook_serde_roundtrip() {
        let playbook = Playbook::new(
            "lookup:target",
            vec![
                PlaybookStep::navigate("goto_google", "https://www.google.com")
                    .with_wait_for("textarea[name='q']"),
                PlaybookStep::fill("type_query", "textarea[name='q']", "Target Tinley Park"),
                PlaybookStep::click("open_first_result", "#search a")
                    .with_on_failure(OnFailure::Retry { attempts: 3 }),
                PlaybookStep::screenshot("capture", true).with_guard(Condition::SelectorVisible {
                    selector: "body".into(),
                    timeout_ms: 5_000,
                }),
            ],
        )
        .with_postconditions(vec![Condition::UrlContains {
            fragment: "google".into(),
        }]);

        let json = serde_json::to_string_pretty(&playbook).unwrap();
        let parsed: Playbook = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, playbook);
    }

    #[test]
    fn wait_step_variants_roundtrip() {
        for step in [
            PlaybookStep::wait_selector("wait_results", "#search"),
            PlaybookStep::new(
                "settle",
                StepAction::Wait {
                    until: WaitFor::Duration { duration_ms: 750 },
                },
            ),
        ] {
            let json = serde_json::to_string(&step).unwrap();
            let parsed: PlaybookStep = serde_json::from_str(&json).unwrap();
            assert_eq!(parsed, step);
        }
    }

    #[test]
    fn on_failure_defaults_to_abort() {
        let json = r##"{"name":"n","action":"click","selector":"#x"}"##;
        let step: PlaybookStep = serde_json::from_str(json).unwrap();
        assert_eq!(step.on_failure, OnFailure::Abort);
        assert!(step.guard.is_none());
    }
}
