use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Opaque identifier for one workflow execution.
#[derive(Debug, Clone, Hash, Eq, PartialEq, Serialize, Deserialize)]
pub struct RunId(pub String);

impl RunId {
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn from_string(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl Default for RunId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for RunId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Where a request originated. Clarifications go back through the same channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskSource {
    Text,
    Voice,
    Hotkey,
    Ambient,
}

impl std::fmt::Display for TaskSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Text => write!(f, "text"),
            Self::Voice => write!(f, "voice"),
            Self::Hotkey => write!(f, "hotkey"),
            Self::Ambient => write!(f, "ambient"),
        }
    }
}

/// A request submitted to the dispatcher.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskContext {
    pub utterance: String,
    pub source: TaskSource,
    #[serde(default)]
    pub metadata: HashMap<String, serde_json::Value>,
    /// Existing project thread to attach to, if known.
    #[serde(default)]
    pub thread_id: Option<String>,
}

impl TaskContext {
    pub fn new(utterance: impl Into<String>, source: TaskSource) -> Self {
        Self {
            utterance: utterance.into(),
            source,
            metadata: HashMap::new(),
            thread_id: None,
        }
    }

    pub fn with_meta(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.metadata.insert(key.into(), value);
        self
    }

    /// Project name for thread attachment (metadata key `project`, else "general").
    pub fn project(&self) -> &str {
        self.metadata
            .get("project")
            .and_then(|v| v.as_str())
            .unwrap_or("general")
    }
}

/// Final outcome of a dispatcher call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Ok,
    ClarificationNeeded,
    Refused,
    Failed,
}

/// Summary payload returned by the dispatcher.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskResult {
    pub status: TaskStatus,
    pub route: String,
    pub summary: String,
    #[serde(default)]
    pub answer: Option<String>,
    #[serde(default)]
    pub artifacts: HashMap<String, serde_json::Value>,
    #[serde(default)]
    pub steps: Vec<NodeEvent>,
    #[serde(default)]
    pub thread_id: Option<String>,
}

impl TaskResult {
    pub fn new(status: TaskStatus, route: impl Into<String>, summary: impl Into<String>) -> Self {
        Self {
            status,
            route: route.into(),
            summary: summary.into(),
            answer: None,
            artifacts: HashMap::new(),
            steps: Vec::new(),
            thread_id: None,
        }
    }
}

/// Lifecycle state of one DAG node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeStatus {
    Pending,
    Running,
    Ok,
    Failed,
    Skipped,
}

/// Terminal record for one node within a run. `ctx.events` preserves the
/// real-time order in which nodes reached a terminal state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeEvent {
    pub node_name: String,
    pub status: NodeStatus,
    #[serde(default)]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub finished_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub error: Option<String>,
}

/// One step chosen by the vision model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VisionAction {
    pub kind: VisionActionKind,
    /// Natural-language description of the element to act on.
    #[serde(default)]
    pub target_description: Option<String>,
    /// Text to type.
    #[serde(default)]
    pub text: Option<String>,
    /// URL for navigate actions.
    #[serde(default)]
    pub url: Option<String>,
    /// Wait duration.
    #[serde(default)]
    pub duration_ms: Option<u64>,
    /// Why the model chose this action. Fed back into the next prompt.
    #[serde(default)]
    pub rationale: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VisionActionKind {
    Click,
    Type,
    Scroll,
    Navigate,
    Wait,
    Complete,
}

/// Role in an LLM conversation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

/// A chat message sent to the text LLM.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }
}

/// Per-call options for LLM requests.
#[derive(Debug, Clone, Default)]
pub struct ChatOptions {
    /// Model override; falls back to the client default when unset.
    pub model: Option<String>,
}

/// Navigation completion condition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WaitUntil {
    Load,
    #[default]
    #[serde(rename = "domcontentloaded")]
    DomContentLoaded,
    #[serde(rename = "networkidle")]
    NetworkIdle,
}

/// Element state to wait for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SelectorState {
    Attached,
    #[default]
    Visible,
    Hidden,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn task_context_project_fallback() {
        let ctx = TaskContext::new("hello", TaskSource::Text);
        assert_eq!(ctx.project(), "general");

        let ctx = ctx.with_meta("project", serde_json::json!("veska-site"));
        assert_eq!(ctx.project(), "veska-site");
    }

    #[test]
    fn vision_action_json_roundtrip() {
        let action = VisionAction {
            kind: VisionActionKind::Navigate,
            target_description: None,
            text: None,
            url: Some("https://example.com".into()),
            duration_ms: None,
            rationale: "open the homepage".into(),
        };
        let json = serde_json::to_string(&action).unwrap();
        let parsed: VisionAction = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, action);
    }

    #[test]
    fn vision_action_kind_lowercase() {
        let json = r#"{"kind":"complete","rationale":"done"}"#;
        let parsed: VisionAction = serde_json::from_str(json).unwrap();
        assert_eq!(parsed.kind, VisionActionKind::Complete);
    }

    #[test]
    fn task_status_serde() {
        let json = serde_json::to_string(&TaskStatus::ClarificationNeeded).unwrap();
        assert_eq!(json, "\"clarification_needed\"");
    }
}
