use std::collections::{BTreeSet, HashMap};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Record categories in the memory store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MemoryKind {
    QAndA,
    Todo,
    RepoInsight,
    DailyOp,
    System,
    TaskResult,
}

impl std::fmt::Display for MemoryKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::QAndA => write!(f, "q_and_a"),
            Self::Todo => write!(f, "todo"),
            Self::RepoInsight => write!(f, "repo_insight"),
            Self::DailyOp => write!(f, "daily_op"),
            Self::System => write!(f, "system"),
            Self::TaskResult => write!(f, "task_result"),
        }
    }
}

/// A single record in the memory store. Never mutated after creation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoryItem {
    pub id: String,
    pub kind: MemoryKind,
    pub text: String,
    #[serde(default)]
    pub tags: BTreeSet<String>,
    #[serde(default)]
    pub metadata: HashMap<String, serde_json::Value>,
    pub created_at: DateTime<Utc>,
    /// Embedding for semantic search, filled only when an embedder is configured.
    #[serde(default)]
    pub embedding: Option<Vec<f32>>,
}

impl MemoryItem {
    pub fn new(kind: MemoryKind, text: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            kind,
            text: text.into(),
            tags: BTreeSet::new(),
            metadata: HashMap::new(),
            created_at: Utc::now(),
            embedding: None,
        }
    }

    pub fn with_tags<I, S>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tags = tags.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_meta(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.metadata.insert(key.into(), value);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn distinct_ids() {
        let a = MemoryItem::new(MemoryKind::System, "same text");
        let b = MemoryItem::new(MemoryKind::System, "same text");
        assert_ne!(a.id, b.id);
    }

    #[test]
    fn kind_serde_names() {
        let json = serde_json::to_string(&MemoryKind::TaskResult).unwrap();
        assert_eq!(json, "\"task_result\"");
        let json = serde_json::to_string(&MemoryKind::QAndA).unwrap();
        assert_eq!(json, "\"q_and_a\"");
    }
}
