use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use veska_core::config::DispatchConfig;
use veska_core::error::{Result, VeskaError};
use veska_core::types::{NodeStatus, TaskContext, TaskResult, TaskSource, TaskStatus};
use veska_dag::RunContext;
use veska_knowledge::{KnowledgeGraph, ThreadStore};
use veska_memory::{MemoryItem, MemoryKind, MemoryStore};
use veska_skills::{SkillRegistry, SkillRequest};

use crate::clarify::Clarifier;
use crate::intent::IntentRouter;
use crate::safety::SafetyGate;

/// Routes each request to a skill and runs it.
///
/// Per-request pipeline: ambiguity check (one clarifying turn at most),
/// safety gate, intent routing, DAG execution under a deadline, then
/// write-back. Every call, whatever its outcome, appends exactly one
/// task-result memory item and one thread entry referencing it, and ingests
/// the thread into the knowledge graph.
pub struct Dispatcher {
    registry: Arc<SkillRegistry>,
    router: IntentRouter,
    safety: SafetyGate,
    clarifier: Arc<dyn Clarifier>,
    memory: Arc<MemoryStore>,
    threads: Arc<ThreadStore>,
    graph: Arc<KnowledgeGraph>,
    limiter: Arc<Semaphore>,
    deadline: Duration,
}

impl Dispatcher {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        registry: Arc<SkillRegistry>,
        router: IntentRouter,
        clarifier: Arc<dyn Clarifier>,
        memory: Arc<MemoryStore>,
        threads: Arc<ThreadStore>,
        graph: Arc<KnowledgeGraph>,
        config: &DispatchConfig,
    ) -> Self {
        Self {
            registry,
            router,
            safety: SafetyGate::new(&config.risky_patterns),
            clarifier,
            memory,
            threads,
            graph,
            limiter: Arc::new(Semaphore::new(config.max_concurrent.max(1))),
            deadline: Duration::from_secs(config.deadline_secs),
        }
    }

    /// Classify and execute one request. Never raises: failures come back as
    /// `TaskResult { status: failed }`.
    pub async fn dispatch(&self, task: TaskContext, cancel: CancellationToken) -> TaskResult {
        // Backpressure: overflow requests block here until a slot frees.
        // Ambient ticks take a slot only when one is immediately free, so
        // foreground requests win contention.
        if task.source == TaskSource::Ambient {
            while self.limiter.available_permits() == 0 {
                if cancel.is_cancelled() {
                    return self
                        .finish(&task, TaskResult::new(TaskStatus::Failed, "none", "cancelled"))
                        .await;
                }
                tokio::time::sleep(Duration::from_millis(250)).await;
            }
        }
        let _permit = tokio::select! {
            permit = self.limiter.clone().acquire_owned() => match permit {
                Ok(permit) => permit,
                Err(_) => {
                    return self
                        .finish(&task, TaskResult::new(TaskStatus::Failed, "none", "dispatcher shut down"))
                        .await;
                }
            },
            _ = cancel.cancelled() => {
                return self
                    .finish(&task, TaskResult::new(TaskStatus::Failed, "none", "cancelled"))
                    .await;
            }
        };

        info!(source = %task.source, utterance = %task.utterance, "dispatching");

        // Clarification: at most one follow-up turn, on the same channel.
        let mut utterance = task.utterance.trim().to_string();
        let mut forced_route: Option<&str> = None;
        if let Some(question) = self
            .router
            .ambiguity_question(&self.registry, &utterance)
            .await
        {
            info!(question = %question, "requesting clarification");
            match self.clarifier.ask(&question, task.source).await {
                Ok(Some(answer)) if !answer.trim().is_empty() => {
                    utterance = format!("{}\nClarification: {}", utterance, answer.trim());
                    if self
                        .router
                        .ambiguity_question(&self.registry, &utterance)
                        .await
                        .is_some()
                    {
                        // Still unclear after one loop: hand it to free_form.
                        forced_route = Some("free_form");
                    }
                }
                _ => {
                    let result =
                        TaskResult::new(TaskStatus::ClarificationNeeded, "none", question);
                    return self.finish(&task, result).await;
                }
            }
        }

        // Safety gate: risky verbs need an explicit confirmation token.
        if let Some(pattern) = self.safety.requires_confirmation(&utterance) {
            let question = format!(
                "That request matches a sensitive action ({}). Reply 'confirm' to proceed.",
                pattern
            );
            let confirmed = matches!(
                self.clarifier.ask(&question, task.source).await,
                Ok(Some(ref reply)) if SafetyGate::is_confirmation(reply)
            );
            if !confirmed {
                warn!(pattern = %pattern, "refusing unconfirmed sensitive request");
                let result = TaskResult::new(
                    TaskStatus::Refused,
                    "none",
                    "I won't do that without an explicit confirmation.",
                );
                return self.finish(&task, result).await;
            }
        }

        // Routing: keyword rules, then the LLM, then free_form.
        let route = match forced_route {
            Some(route) => route.to_string(),
            None => self.router.route(&self.registry, &utterance).await,
        };
        let Some(skill) = self
            .registry
            .get(&route)
            .or_else(|| self.registry.get("free_form"))
        else {
            let result = TaskResult::new(TaskStatus::Failed, route, "no skill available");
            return self.finish(&task, result).await;
        };

        let request = SkillRequest {
            utterance: utterance.clone(),
            metadata: task.metadata.clone(),
        };
        let dag = match skill.build_dag(&request) {
            Ok(dag) => dag,
            Err(e) => {
                let result = TaskResult::new(
                    TaskStatus::Failed,
                    skill.name(),
                    format!("could not build workflow: {}", e),
                );
                return self.finish(&task, result).await;
            }
        };

        let run_ctx = RunContext::new()
            .with_input("utterance", serde_json::json!(utterance))
            .with_input("source", serde_json::json!(task.source.to_string()))
            .with_input(
                "metadata",
                serde_json::to_value(&task.metadata).unwrap_or(serde_json::Value::Null),
            );

        // The skill runs under a child token so the overall deadline and the
        // caller's cancellation both reach every node.
        let run_token = cancel.child_token();
        let deadline_token = run_token.clone();
        let deadline = self.deadline;
        let timer = tokio::spawn(async move {
            tokio::time::sleep(deadline).await;
            deadline_token.cancel();
        });
        let ctx = dag.execute(run_ctx, run_token.clone()).await;
        timer.abort();

        let failed_event = ctx
            .events
            .iter()
            .find(|e| e.status == NodeStatus::Failed)
            .cloned();

        let mut result = if cancel.is_cancelled() {
            TaskResult::new(TaskStatus::Failed, skill.name(), "cancelled")
        } else if let Some(event) = failed_event {
            TaskResult::new(
                TaskStatus::Failed,
                skill.name(),
                format!(
                    "{} failed: {}",
                    event.node_name,
                    event.error.as_deref().unwrap_or("unknown error")
                ),
            )
        } else if run_token.is_cancelled() {
            TaskResult::new(TaskStatus::Failed, skill.name(), "deadline exceeded")
        } else {
            let summary = ctx
                .output_str("summary")
                .map(String::from)
                .unwrap_or_else(|| format!("Completed '{}'", skill.name()));
            TaskResult::new(TaskStatus::Ok, skill.name(), summary)
        };

        result.answer = ctx.output_str("answer").map(String::from);
        result.artifacts = ctx.artifacts.clone();
        result.steps = ctx.events.clone();

        self.finish(&task, result).await
    }

    /// Write-back then return. Runs for every outcome.
    async fn finish(&self, task: &TaskContext, mut result: TaskResult) -> TaskResult {
        match self.write_back(task, &result) {
            Ok(thread_id) => result.thread_id = Some(thread_id),
            Err(e) => warn!(error = %e, "write-back failed"),
        }
        info!(
            status = ?result.status,
            route = %result.route,
            thread = result.thread_id.as_deref().unwrap_or("-"),
            "dispatch complete"
        );
        result
    }

    fn write_back(&self, task: &TaskContext, result: &TaskResult) -> Result<String> {
        let item = MemoryItem::new(
            MemoryKind::TaskResult,
            format!(
                "Task: {}\nRoute: {}\nSummary: {}",
                task.utterance, result.route, result.summary
            ),
        )
        .with_tags(vec!["dispatcher".to_string(), result.route.clone()])
        .with_meta("status", serde_json::to_value(result.status)?)
        .with_meta("source", serde_json::json!(task.source.to_string()));
        let memory_id = self.memory.add(item)?;

        let thread = match task
            .thread_id
            .as_deref()
            .and_then(|id| self.threads.get(id).ok().flatten())
        {
            Some(thread) => thread,
            None => match self.threads.find_by_project(task.project())? {
                Some(thread) => thread,
                None => {
                    let title: String = task.utterance.chars().take(80).collect();
                    self.threads.create(task.project(), &title)?
                }
            },
        };

        self.threads.add_entry(
            &thread.thread_id,
            &format!("{} -> {}", result.route.to_uppercase(), result.summary),
            vec![memory_id],
        )?;

        let updated = self
            .threads
            .get(&thread.thread_id)?
            .ok_or_else(|| VeskaError::NotFound(format!("thread {}", thread.thread_id)))?;
        self.graph
            .ingest_thread(&updated.thread_id, &updated.title, &updated.entries)?;

        Ok(thread.thread_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clarify::{NoClarifier, StaticClarifier};
    use crate::testing::harness;
    use veska_core::types::TaskSource;
    use veska_llm::mock::MockChat;

    #[tokio::test]
    async fn trivial_dispatch_records_memory_and_thread() {
        let h = harness(Arc::new(MockChat::new(vec![])), Arc::new(NoClarifier));
        let result = h
            .dispatcher
            .dispatch(
                TaskContext::new("hello", TaskSource::Text),
                CancellationToken::new(),
            )
            .await;

        assert_eq!(result.status, TaskStatus::Ok);
        assert_eq!(result.route, "free_form");
        assert!(!result.summary.is_empty());

        let task_results = h
            .memory
            .list_by_kind(MemoryKind::TaskResult, 10)
            .unwrap();
        assert_eq!(task_results.len(), 1);

        let thread_id = result.thread_id.expect("thread attached");
        let thread = h.threads.get(&thread_id).unwrap().unwrap();
        assert_eq!(thread.entries.len(), 1);
        assert_eq!(thread.entries[0].references, vec![task_results[0].id.clone()]);

        // The thread landed in the knowledge graph too.
        assert!(h.graph.entity(&thread_id).unwrap().is_some());
    }

    #[tokio::test]
    async fn risky_request_without_confirmation_is_refused() {
        let h = harness(Arc::new(MockChat::new(vec![])), Arc::new(NoClarifier));
        let result = h
            .dispatcher
            .dispatch(
                TaskContext::new("send delete everything", TaskSource::Text),
                CancellationToken::new(),
            )
            .await;

        assert_eq!(result.status, TaskStatus::Refused);
        assert!(result.summary.contains("confirmation"));
        // The refusal is still recorded.
        assert_eq!(
            h.memory.list_by_kind(MemoryKind::TaskResult, 10).unwrap().len(),
            1
        );
    }

    #[tokio::test]
    async fn confirmed_risky_request_proceeds() {
        let h = harness(
            Arc::new(MockChat::new(vec![])),
            Arc::new(StaticClarifier::new(Some("confirm"))),
        );
        let result = h
            .dispatcher
            .dispatch(
                TaskContext::new("send my weekly summary note", TaskSource::Text),
                CancellationToken::new(),
            )
            .await;

        assert_ne!(result.status, TaskStatus::Refused);
    }

    #[tokio::test]
    async fn short_utterance_without_channel_answer_needs_clarification() {
        let h = harness(Arc::new(MockChat::new(vec![])), Arc::new(NoClarifier));
        let result = h
            .dispatcher
            .dispatch(
                TaskContext::new("go", TaskSource::Text),
                CancellationToken::new(),
            )
            .await;

        assert_eq!(result.status, TaskStatus::ClarificationNeeded);
        assert!(!result.summary.is_empty());
    }

    #[tokio::test]
    async fn replay_is_deterministic_but_appends_new_memory() {
        let h = harness(
            Arc::new(MockChat::new(vec![]).with_fallback("The answer is 4.")),
            Arc::new(NoClarifier),
        );

        let first = h
            .dispatcher
            .dispatch(
                TaskContext::new("what is two plus two", TaskSource::Text),
                CancellationToken::new(),
            )
            .await;
        let second = h
            .dispatcher
            .dispatch(
                TaskContext::new("what is two plus two", TaskSource::Text),
                CancellationToken::new(),
            )
            .await;

        assert_eq!(first.summary, second.summary);
        assert_eq!(first.answer, second.answer);

        let task_results = h
            .memory
            .list_by_kind(MemoryKind::TaskResult, 10)
            .unwrap();
        assert_eq!(task_results.len(), 2);
        assert_ne!(task_results[0].id, task_results[1].id);
    }

    #[tokio::test]
    async fn pre_cancelled_call_fails_and_is_recorded() {
        let h = harness(Arc::new(MockChat::new(vec![])), Arc::new(NoClarifier));
        let cancel = CancellationToken::new();
        cancel.cancel();

        let result = h
            .dispatcher
            .dispatch(TaskContext::new("hello there", TaskSource::Text), cancel)
            .await;

        assert_eq!(result.status, TaskStatus::Failed);
        assert_eq!(result.summary, "cancelled");
        assert_eq!(
            h.memory.list_by_kind(MemoryKind::TaskResult, 10).unwrap().len(),
            1
        );
    }
}
