use std::collections::{BTreeSet, HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use futures::stream::{FuturesUnordered, StreamExt};
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use veska_core::error::{Result, VeskaError};
use veska_core::types::{NodeEvent, NodeStatus};

use crate::context::{CtxHandle, RunContext};
use crate::node::DagNode;

/// A named set of async nodes executed in dependency order with bounded
/// parallelism.
///
/// A node runs once all of its dependencies finished `ok`. Any failed or
/// skipped dependency skips the node; independent branches keep running.
/// Execution never raises into the caller: the returned context carries a
/// terminal [`NodeEvent`] per node.
pub struct Dag {
    name: String,
    nodes: HashMap<String, DagNode>,
    max_parallel: usize,
}

impl Dag {
    /// Build a DAG from node descriptors. Duplicate names, references to
    /// missing nodes, and cycles are rejected here, not at execution time.
    pub fn new(name: impl Into<String>, nodes: Vec<DagNode>) -> Result<Self> {
        let name = name.into();
        let mut by_name: HashMap<String, DagNode> = HashMap::with_capacity(nodes.len());
        for node in nodes {
            if by_name.contains_key(&node.name) {
                return Err(VeskaError::Internal(format!(
                    "duplicate node '{}' in DAG '{}'",
                    node.name, name
                )));
            }
            by_name.insert(node.name.clone(), node);
        }

        for node in by_name.values() {
            for dep in &node.deps {
                if !by_name.contains_key(dep) {
                    return Err(VeskaError::Internal(format!(
                        "node '{}' depends on missing node '{}' in DAG '{}'",
                        node.name, dep, name
                    )));
                }
            }
        }

        check_acyclic(&name, &by_name)?;

        Ok(Self {
            name,
            nodes: by_name,
            max_parallel: usize::MAX,
        })
    }

    /// Cap concurrent node executions. Default: all ready nodes at once.
    pub fn with_max_parallel(mut self, max_parallel: usize) -> Self {
        self.max_parallel = max_parallel.max(1);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Execute all nodes and return the completed context. Cancellation stops
    /// new launches, lets running nodes drain (bounded by their timeouts) and
    /// marks everything still pending as skipped.
    pub async fn execute(&self, mut ctx: RunContext, cancel: CancellationToken) -> RunContext {
        info!(dag = %self.name, nodes = self.nodes.len(), "starting DAG execution");
        ctx.started_at = Some(Utc::now());
        let shared = Arc::new(Mutex::new(ctx));

        let mut status: HashMap<String, NodeStatus> = self
            .nodes
            .keys()
            .map(|n| (n.clone(), NodeStatus::Pending))
            .collect();
        let mut remaining: HashMap<String, usize> = self
            .nodes
            .values()
            .map(|n| (n.name.clone(), n.deps.len()))
            .collect();
        let mut dependents: HashMap<String, Vec<String>> = HashMap::new();
        for node in self.nodes.values() {
            for dep in &node.deps {
                dependents
                    .entry(dep.clone())
                    .or_default()
                    .push(node.name.clone());
            }
        }

        // Name-ordered ready set keeps sibling launch order deterministic.
        let mut ready: BTreeSet<String> = remaining
            .iter()
            .filter(|(_, count)| **count == 0)
            .map(|(name, _)| name.clone())
            .collect();

        let mut running = FuturesUnordered::new();
        let mut in_flight = 0usize;

        loop {
            if !cancel.is_cancelled() {
                while in_flight < self.max_parallel {
                    let Some(name) = ready.iter().next().cloned() else {
                        break;
                    };
                    ready.remove(&name);
                    status.insert(name.clone(), NodeStatus::Running);
                    debug!(dag = %self.name, node = %name, "launching node");
                    let node = self.nodes[&name].clone();
                    let handle = CtxHandle::new(shared.clone(), cancel.clone());
                    running.push(run_node(node, handle));
                    in_flight += 1;
                }
            }

            if in_flight == 0 {
                break;
            }

            tokio::select! {
                completed = running.next() => {
                    let Some(outcome) = completed else { break };
                    in_flight -= 1;
                    let NodeOutcome { name, started_at, finished_at, result } = outcome;

                    let (node_status, error) = match result {
                        Ok(()) => (NodeStatus::Ok, None),
                        Err(e) => {
                            warn!(dag = %self.name, node = %name, error = %e, "node failed");
                            (NodeStatus::Failed, Some(e.to_string()))
                        }
                    };
                    status.insert(name.clone(), node_status);
                    shared.lock().await.events.push(NodeEvent {
                        node_name: name.clone(),
                        status: node_status,
                        started_at: Some(started_at),
                        finished_at: Some(finished_at),
                        error,
                    });

                    match node_status {
                        NodeStatus::Ok => {
                            for dependent in dependents.get(&name).cloned().unwrap_or_default() {
                                if let Some(count) = remaining.get_mut(&dependent) {
                                    *count = count.saturating_sub(1);
                                    if *count == 0
                                        && status.get(&dependent) == Some(&NodeStatus::Pending)
                                    {
                                        ready.insert(dependent);
                                    }
                                }
                            }
                        }
                        _ => {
                            skip_downstream(
                                &name,
                                &dependents,
                                &mut status,
                                &mut ready,
                                &shared,
                            )
                            .await;
                        }
                    }
                }
                _ = cancel.cancelled(), if !cancel.is_cancelled() => {
                    info!(dag = %self.name, "cancellation requested, draining running nodes");
                }
            }
        }

        // Anything that never reached a terminal state was either cancelled
        // before launch or downstream of a cancelled branch.
        let mut guard = shared.lock().await;
        let mut leftover: Vec<String> = status
            .iter()
            .filter(|(_, s)| matches!(s, NodeStatus::Pending | NodeStatus::Running))
            .map(|(n, _)| n.clone())
            .collect();
        leftover.sort();
        for name in leftover {
            status.insert(name.clone(), NodeStatus::Skipped);
            guard.events.push(NodeEvent {
                node_name: name,
                status: NodeStatus::Skipped,
                started_at: None,
                finished_at: None,
                error: None,
            });
        }
        guard.finished_at = Some(Utc::now());
        drop(guard);

        let ctx = match Arc::try_unwrap(shared) {
            Ok(mutex) => mutex.into_inner(),
            Err(arc) => arc.lock().await.clone(),
        };
        info!(
            dag = %self.name,
            ok = ctx.events.iter().filter(|e| e.status == NodeStatus::Ok).count(),
            failed = ctx.events.iter().filter(|e| e.status == NodeStatus::Failed).count(),
            skipped = ctx.events.iter().filter(|e| e.status == NodeStatus::Skipped).count(),
            "DAG execution complete"
        );
        ctx
    }
}

impl std::fmt::Debug for Dag {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dag")
            .field("name", &self.name)
            .field("nodes", &self.nodes.keys().collect::<Vec<_>>())
            .field("max_parallel", &self.max_parallel)
            .finish()
    }
}

struct NodeOutcome {
    name: String,
    started_at: DateTime<Utc>,
    finished_at: DateTime<Utc>,
    result: Result<()>,
}

/// Run one node: per-attempt timeout, geometric backoff between retries.
async fn run_node(node: DagNode, handle: CtxHandle) -> NodeOutcome {
    let started_at = Utc::now();
    let attempts = node.retry.map(|r| r.max_attempts.max(1)).unwrap_or(1);
    let mut last_err = None;

    for attempt in 1..=attempts {
        let fut = (node.func)(handle.clone());
        let result = match node.timeout {
            Some(t) if t.is_zero() => Err(VeskaError::timeout(node.name.clone(), 0)),
            Some(t) => match tokio::time::timeout(t, fut).await {
                Ok(r) => r,
                Err(_) => Err(VeskaError::timeout(
                    node.name.clone(),
                    t.as_millis() as u64,
                )),
            },
            None => fut.await,
        };

        match result {
            Ok(()) => {
                return NodeOutcome {
                    name: node.name,
                    started_at,
                    finished_at: Utc::now(),
                    result: Ok(()),
                };
            }
            Err(e) => {
                if attempt < attempts {
                    let base = node.retry.map(|r| r.backoff_ms).unwrap_or(0);
                    let backoff = base.saturating_mul(1u64 << (attempt - 1).min(16));
                    warn!(
                        node = %node.name,
                        attempt,
                        backoff_ms = backoff,
                        error = %e,
                        "node attempt failed, retrying"
                    );
                    tokio::time::sleep(Duration::from_millis(backoff)).await;
                }
                last_err = Some(e);
            }
        }
    }

    NodeOutcome {
        name: node.name.clone(),
        started_at,
        finished_at: Utc::now(),
        result: Err(last_err.unwrap_or_else(|| {
            VeskaError::Internal(format!("node '{}' produced no result", node.name))
        })),
    }
}

/// Mark every still-pending transitive dependent of `name` as skipped.
async fn skip_downstream(
    name: &str,
    dependents: &HashMap<String, Vec<String>>,
    status: &mut HashMap<String, NodeStatus>,
    ready: &mut BTreeSet<String>,
    shared: &Arc<Mutex<RunContext>>,
) {
    let mut stack: Vec<String> = dependents.get(name).cloned().unwrap_or_default();
    let mut guard = shared.lock().await;
    while let Some(current) = stack.pop() {
        if status.get(&current) != Some(&NodeStatus::Pending) {
            continue;
        }
        status.insert(current.clone(), NodeStatus::Skipped);
        ready.remove(&current);
        guard.events.push(NodeEvent {
            node_name: current.clone(),
            status: NodeStatus::Skipped,
            started_at: None,
            finished_at: None,
            error: None,
        });
        if let Some(next) = dependents.get(&current) {
            stack.extend(next.iter().cloned());
        }
    }
}

/// DFS cycle check over the dependency edges.
fn check_acyclic(dag_name: &str, nodes: &HashMap<String, DagNode>) -> Result<()> {
    let mut visited: HashSet<String> = HashSet::new();
    let mut names: Vec<&String> = nodes.keys().collect();
    names.sort();

    for start in names {
        if visited.contains(start) {
            continue;
        }
        // Iterative DFS with an explicit in-progress set.
        let mut in_progress: HashSet<String> = HashSet::new();
        let mut stack: Vec<(String, usize)> = vec![(start.clone(), 0)];
        while let Some((current, dep_index)) = stack.pop() {
            if dep_index == 0 {
                if in_progress.contains(&current) {
                    return Err(VeskaError::Internal(format!(
                        "cycle detected in DAG '{}' at node '{}'",
                        dag_name, current
                    )));
                }
                if visited.contains(&current) {
                    continue;
                }
                in_progress.insert(current.clone());
            }
            let deps = &nodes[&current].deps;
            if dep_index < deps.len() {
                stack.push((current.clone(), dep_index + 1));
                let dep = deps[dep_index].clone();
                if in_progress.contains(&dep) {
                    return Err(VeskaError::Internal(format!(
                        "cycle detected in DAG '{}' at node '{}'",
                        dag_name, dep
                    )));
                }
                if !visited.contains(&dep) {
                    stack.push((dep, 0));
                }
            } else {
                in_progress.remove(&current);
                visited.insert(current);
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn noop(name: &str) -> DagNode {
        DagNode::new(name, |_ctx| async { Ok(()) })
    }

    #[test]
    fn rejects_duplicate_nodes() {
        let err = Dag::new("d", vec![noop("a"), noop("a")]).unwrap_err();
        assert!(matches!(err, VeskaError::Internal(_)));
    }

    #[test]
    fn rejects_missing_dependency() {
        let nodes = vec![noop("a").with_deps(["ghost"])];
        let err = Dag::new("d", nodes).unwrap_err();
        assert!(matches!(err, VeskaError::Internal(_)));
    }

    #[test]
    fn rejects_cycle_at_construction() {
        let nodes = vec![
            noop("a").with_deps(["b"]),
            noop("b").with_deps(["c"]),
            noop("c").with_deps(["a"]),
        ];
        let err = Dag::new("d", nodes).unwrap_err();
        assert!(matches!(err, VeskaError::Internal(_)));
    }

    #[tokio::test]
    async fn linear_chain_passes_artifacts_downstream() {
        let nodes = vec![
            DagNode::new("collect", |ctx: CtxHandle| async move {
                ctx.set_artifact("raw", serde_json::json!("payload")).await;
                Ok(())
            }),
            DagNode::new("summarize", |ctx: CtxHandle| async move {
                let raw = ctx
                    .artifact("raw")
                    .await
                    .ok_or_else(|| VeskaError::Internal("raw missing".into()))?;
                ctx.set_output("summary", raw).await;
                Ok(())
            })
            .with_deps(["collect"]),
        ];
        let dag = Dag::new("chain", nodes).unwrap();
        let ctx = dag
            .execute(RunContext::new(), CancellationToken::new())
            .await;

        assert!(ctx.succeeded());
        assert_eq!(ctx.output_str("summary"), Some("payload"));
        assert_eq!(ctx.node_status("collect"), Some(NodeStatus::Ok));
        assert_eq!(ctx.node_status("summarize"), Some(NodeStatus::Ok));
    }

    #[tokio::test]
    async fn dependency_finishes_before_dependent_starts() {
        let nodes = vec![
            noop("a"),
            noop("b").with_deps(["a"]),
            noop("c").with_deps(["b"]),
        ];
        let dag = Dag::new("order", nodes).unwrap();
        let ctx = dag
            .execute(RunContext::new(), CancellationToken::new())
            .await;

        for event in &ctx.events {
            let node = &dag.nodes[&event.node_name];
            for dep in &node.deps {
                let dep_event = ctx
                    .events
                    .iter()
                    .find(|e| &e.node_name == dep)
                    .expect("dep event");
                assert_eq!(dep_event.status, NodeStatus::Ok);
                assert!(dep_event.finished_at.unwrap() <= event.started_at.unwrap());
            }
        }
    }

    #[tokio::test]
    async fn failure_skips_dependents_but_not_siblings() {
        let nodes = vec![
            DagNode::new("broken", |_ctx| async {
                Err(VeskaError::Unavailable("collaborator down".into()))
            }),
            noop("downstream").with_deps(["broken"]),
            noop("independent"),
        ];
        let dag = Dag::new("partial", nodes).unwrap();
        let ctx = dag
            .execute(RunContext::new(), CancellationToken::new())
            .await;

        assert_eq!(ctx.node_status("broken"), Some(NodeStatus::Failed));
        assert_eq!(ctx.node_status("downstream"), Some(NodeStatus::Skipped));
        assert_eq!(ctx.node_status("independent"), Some(NodeStatus::Ok));
        assert!(!ctx.succeeded());
    }

    #[tokio::test]
    async fn zero_timeout_is_immediate_failure() {
        let nodes = vec![DagNode::new("slow", |_ctx| async {
            tokio::time::sleep(Duration::from_secs(60)).await;
            Ok(())
        })
        .with_timeout(Duration::ZERO)];
        let dag = Dag::new("t0", nodes).unwrap();
        let ctx = dag
            .execute(RunContext::new(), CancellationToken::new())
            .await;

        assert_eq!(ctx.node_status("slow"), Some(NodeStatus::Failed));
        let event = &ctx.events[0];
        assert!(event.error.as_deref().unwrap_or("").contains("timed out"));
    }

    #[tokio::test]
    async fn retry_recovers_transient_failure() {
        let calls = Arc::new(AtomicUsize::new(0));
        let calls_in_node = calls.clone();
        let nodes = vec![DagNode::new("flaky", move |_ctx| {
            let calls = calls_in_node.clone();
            async move {
                if calls.fetch_add(1, Ordering::SeqCst) == 0 {
                    Err(VeskaError::Unavailable("first attempt".into()))
                } else {
                    Ok(())
                }
            }
        })
        .with_retry(crate::node::RetryPolicy::new(3, 1))];
        let dag = Dag::new("retry", nodes).unwrap();
        let ctx = dag
            .execute(RunContext::new(), CancellationToken::new())
            .await;

        assert_eq!(ctx.node_status("flaky"), Some(NodeStatus::Ok));
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn cancellation_skips_pending_nodes() {
        let cancel = CancellationToken::new();
        let cancel_in_node = cancel.clone();
        let nodes = vec![
            DagNode::new("first", move |_ctx| {
                let cancel = cancel_in_node.clone();
                async move {
                    cancel.cancel();
                    Ok(())
                }
            }),
            noop("second").with_deps(["first"]),
        ];
        let dag = Dag::new("cancelled", nodes).unwrap();
        let ctx = dag.execute(RunContext::new(), cancel).await;

        assert_eq!(ctx.node_status("first"), Some(NodeStatus::Ok));
        assert_eq!(ctx.node_status("second"), Some(NodeStatus::Skipped));
    }

    #[tokio::test]
    async fn siblings_launch_in_name_order_when_serialized() {
        let order = Arc::new(Mutex::new(Vec::<String>::new()));
        let mut nodes = Vec::new();
        for name in ["zeta", "alpha", "mid"] {
            let order = order.clone();
            nodes.push(DagNode::new(name, move |_ctx| {
                let order = order.clone();
                let name = name.to_string();
                async move {
                    order.lock().await.push(name);
                    Ok(())
                }
            }));
        }
        let dag = Dag::new("tiebreak", nodes).unwrap().with_max_parallel(1);
        dag.execute(RunContext::new(), CancellationToken::new())
            .await;

        assert_eq!(*order.lock().await, vec!["alpha", "mid", "zeta"]);
    }

    #[tokio::test]
    async fn empty_dag_completes() {
        let dag = Dag::new("empty", vec![]).unwrap();
        let ctx = dag
            .execute(RunContext::new(), CancellationToken::new())
            .await;
        assert!(ctx.events.is_empty());
        assert!(ctx.started_at.is_some());
        assert!(ctx.finished_at.is_some());
    }
}
