use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};

use veska_core::error::Result;

use crate::context::CtxHandle;

pub type NodeFuture = BoxFuture<'static, Result<()>>;

/// Async node body. Receives a handle to the shared run context.
pub type NodeFn = Arc<dyn Fn(CtxHandle) -> NodeFuture + Send + Sync>;

/// Re-run policy for a failed node. Retries are transparent to dependents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    /// Base delay; doubles after every failed attempt.
    pub backoff_ms: u64,
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, backoff_ms: u64) -> Self {
        Self {
            max_attempts,
            backoff_ms,
        }
    }
}

/// Immutable node descriptor: a name unique within the DAG, the names of the
/// nodes that must finish `ok` before this one runs, and the async body.
#[derive(Clone)]
pub struct DagNode {
    pub name: String,
    pub deps: Vec<String>,
    pub func: NodeFn,
    pub timeout: Option<Duration>,
    pub retry: Option<RetryPolicy>,
}

impl DagNode {
    pub fn new<F, Fut>(name: impl Into<String>, func: F) -> Self
    where
        F: Fn(CtxHandle) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<()>> + Send + 'static,
    {
        Self {
            name: name.into(),
            deps: Vec::new(),
            func: Arc::new(move |ctx| Box::pin(func(ctx))),
            timeout: None,
            retry: None,
        }
    }

    pub fn with_deps<I, S>(mut self, deps: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.deps = deps.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = Some(retry);
        self
    }
}

impl std::fmt::Debug for DagNode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DagNode")
            .field("name", &self.name)
            .field("deps", &self.deps)
            .field("timeout", &self.timeout)
            .field("retry", &self.retry)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builder() {
        let node = DagNode::new("summarize", |_ctx| async { Ok(()) })
            .with_deps(["collect"])
            .with_timeout(Duration::from_secs(30))
            .with_retry(RetryPolicy::new(3, 250));

        assert_eq!(node.name, "summarize");
        assert_eq!(node.deps, vec!["collect"]);
        assert_eq!(node.timeout, Some(Duration::from_secs(30)));
        assert_eq!(node.retry, Some(RetryPolicy::new(3, 250)));
    }
}
