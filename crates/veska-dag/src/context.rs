use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;

use veska_core::types::{NodeEvent, NodeStatus, RunId};

/// Shared state carried through one workflow execution.
///
/// Nodes read `inputs`, publish intermediate values into `artifacts`, and
/// write final results into `outputs`. `extra` is loose scratch space.
/// Concurrent sibling nodes must write disjoint keys; the engine guards the
/// whole context behind one async mutex, so interleaved writes are race-free
/// either way.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunContext {
    pub run_id: RunId,
    #[serde(default)]
    pub inputs: BTreeMap<String, serde_json::Value>,
    #[serde(default)]
    pub artifacts: HashMap<String, serde_json::Value>,
    #[serde(default)]
    pub outputs: HashMap<String, serde_json::Value>,
    #[serde(default)]
    pub extra: HashMap<String, serde_json::Value>,
    #[serde(default)]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub finished_at: Option<DateTime<Utc>>,
    /// Terminal node records, in the order nodes finished.
    #[serde(default)]
    pub events: Vec<NodeEvent>,
}

impl RunContext {
    pub fn new() -> Self {
        Self {
            run_id: RunId::new(),
            inputs: BTreeMap::new(),
            artifacts: HashMap::new(),
            outputs: HashMap::new(),
            extra: HashMap::new(),
            started_at: None,
            finished_at: None,
            events: Vec::new(),
        }
    }

    pub fn with_input(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.inputs.insert(key.into(), value);
        self
    }

    pub fn input(&self, key: &str) -> Option<&serde_json::Value> {
        self.inputs.get(key)
    }

    pub fn input_str(&self, key: &str) -> Option<&str> {
        self.inputs.get(key).and_then(|v| v.as_str())
    }

    pub fn output_str(&self, key: &str) -> Option<&str> {
        self.outputs.get(key).and_then(|v| v.as_str())
    }

    /// Terminal status of a node, if it reached one.
    pub fn node_status(&self, name: &str) -> Option<NodeStatus> {
        self.events
            .iter()
            .find(|e| e.node_name == name)
            .map(|e| e.status)
    }

    /// True when no node failed. Skipped nodes do not count as failures here;
    /// callers that need stricter semantics inspect `events` directly.
    pub fn succeeded(&self) -> bool {
        !self
            .events
            .iter()
            .any(|e| e.status == NodeStatus::Failed)
    }
}

impl Default for RunContext {
    fn default() -> Self {
        Self::new()
    }
}

/// Cloneable handle handed to node functions. Wraps the shared context and
/// the run's cancellation token. Every accessor suspends on the context lock.
#[derive(Clone)]
pub struct CtxHandle {
    inner: Arc<Mutex<RunContext>>,
    cancel: CancellationToken,
}

impl CtxHandle {
    pub(crate) fn new(inner: Arc<Mutex<RunContext>>, cancel: CancellationToken) -> Self {
        Self { inner, cancel }
    }

    pub async fn input(&self, key: &str) -> Option<serde_json::Value> {
        self.inner.lock().await.inputs.get(key).cloned()
    }

    pub async fn input_str(&self, key: &str) -> Option<String> {
        self.input(key)
            .await
            .and_then(|v| v.as_str().map(String::from))
    }

    pub async fn artifact(&self, key: &str) -> Option<serde_json::Value> {
        self.inner.lock().await.artifacts.get(key).cloned()
    }

    pub async fn set_artifact(&self, key: impl Into<String>, value: serde_json::Value) {
        self.inner.lock().await.artifacts.insert(key.into(), value);
    }

    pub async fn output(&self, key: &str) -> Option<serde_json::Value> {
        self.inner.lock().await.outputs.get(key).cloned()
    }

    pub async fn set_output(&self, key: impl Into<String>, value: serde_json::Value) {
        self.inner.lock().await.outputs.insert(key.into(), value);
    }

    pub async fn set_extra(&self, key: impl Into<String>, value: serde_json::Value) {
        self.inner.lock().await.extra.insert(key.into(), value);
    }

    pub async fn extra(&self, key: &str) -> Option<serde_json::Value> {
        self.inner.lock().await.extra.get(key).cloned()
    }

    /// Run a closure with exclusive access to the full context.
    pub async fn with<R>(&self, f: impl FnOnce(&mut RunContext) -> R) -> R {
        let mut guard = self.inner.lock().await;
        f(&mut guard)
    }

    /// True once the surrounding call was cancelled. Long-running nodes
    /// should check this between suspension points.
    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    pub fn cancel_token(&self) -> &CancellationToken {
        &self.cancel
    }
}
