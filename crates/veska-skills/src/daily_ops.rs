use std::path::PathBuf;

use serde::Deserialize;
use tracing::info;

use veska_core::error::Result;
use veska_core::types::{ChatMessage, ChatOptions};
use veska_dag::{Dag, DagNode};
use veska_memory::{MemoryItem, MemoryKind};

use crate::collectors::{cluster_status, scan_todos, system_events, tail_logs};
use crate::registry::{KeywordRule, Skill, SkillDeps, SkillRequest};

const DAILY_OPS_PROMPT: &str = "You are a personal SRE assistant.\n\n\
You will be given TODOs from notes, recent log lines, system events and cluster status.\n\n\
Produce:\n\
- A concise summary (2-3 sentences) of what's happening\n\
- A prioritized list of 3-7 concrete tasks for today, each small and specific\n\n\
Respond as JSON:\n\
{\"summary\": \"...\", \"tasks\": [{\"title\": \"...\", \"reason\": \"...\", \
\"priority\": \"high|medium|low\"}]}\n\
Sort tasks high priority first.";

/// Where the collectors look. Defaults follow the state directory layout.
#[derive(Debug, Clone)]
pub struct DailyOpsPaths {
    pub notes_dir: PathBuf,
    pub logs_dir: PathBuf,
    pub events_file: PathBuf,
    pub cluster_url: String,
}

impl Default for DailyOpsPaths {
    fn default() -> Self {
        let home = std::env::var("HOME").map(PathBuf::from).unwrap_or_default();
        Self {
            notes_dir: home.join("notes"),
            logs_dir: home.join(".veska").join("logs"),
            events_file: home.join(".veska").join("events.log"),
            cluster_url: "http://localhost:8080".to_string(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct DailyReport {
    #[serde(default)]
    summary: String,
    #[serde(default)]
    tasks: Vec<DailyTask>,
}

#[derive(Debug, Deserialize)]
struct DailyTask {
    title: String,
    #[serde(default)]
    priority: Option<String>,
}

/// Aggregates TODO / log / event / cluster inputs into a prioritized task
/// list. The four collectors run as parallel DAG nodes; any of them failing
/// soft leaves its slot empty and noted.
pub struct DailyOpsSkill {
    deps: SkillDeps,
    paths: DailyOpsPaths,
    rules: Vec<KeywordRule>,
}

impl DailyOpsSkill {
    pub fn new(deps: SkillDeps, paths: DailyOpsPaths) -> Self {
        Self {
            deps,
            paths,
            rules: vec![
                KeywordRule::substring("daily"),
                KeywordRule::substring("today's tasks"),
                KeywordRule::substring("standup"),
                KeywordRule::substring("ops"),
            ],
        }
    }
}

impl Skill for DailyOpsSkill {
    fn name(&self) -> &'static str {
        "daily_ops"
    }

    fn description(&self) -> &'static str {
        "daily operations report: todos, logs, events, cluster health"
    }

    fn keyword_rules(&self) -> &[KeywordRule] {
        &self.rules
    }

    fn build_dag(&self, _request: &SkillRequest) -> Result<Dag> {
        let notes_dir = self.paths.notes_dir.clone();
        let collect_todos = DagNode::new("collect_todos", move |ctx| {
            let notes_dir = notes_dir.clone();
            async move {
                let output = scan_todos(&notes_dir);
                ctx.set_artifact("todos", serde_json::to_value(&output)?).await;
                Ok(())
            }
        });

        let logs_dir = self.paths.logs_dir.clone();
        let collect_logs = DagNode::new("collect_logs", move |ctx| {
            let logs_dir = logs_dir.clone();
            async move {
                let output = tail_logs(&logs_dir, 5, 20);
                ctx.set_artifact("logs", serde_json::to_value(&output)?).await;
                Ok(())
            }
        });

        let events_file = self.paths.events_file.clone();
        let collect_events = DagNode::new("collect_events", move |ctx| {
            let events_file = events_file.clone();
            async move {
                let output = system_events(&events_file, 50);
                ctx.set_artifact("system_events", serde_json::to_value(&output)?)
                    .await;
                Ok(())
            }
        });

        let cluster_url = self.paths.cluster_url.clone();
        let collect_cluster = DagNode::new("collect_cluster", move |ctx| {
            let cluster_url = cluster_url.clone();
            async move {
                let output = cluster_status(&cluster_url).await;
                ctx.set_artifact("cluster", serde_json::to_value(&output)?).await;
                Ok(())
            }
        });

        let llm = self.deps.llm.clone();
        let summarize = DagNode::new("summarize", move |ctx| {
            let llm = llm.clone();
            async move {
                let inputs = ctx
                    .with(|c| {
                        serde_json::json!({
                            "todos": c.artifacts.get("todos"),
                            "logs": c.artifacts.get("logs"),
                            "system_events": c.artifacts.get("system_events"),
                            "cluster": c.artifacts.get("cluster"),
                        })
                    })
                    .await;

                let reply = llm
                    .chat(
                        vec![
                            ChatMessage::system(DAILY_OPS_PROMPT),
                            ChatMessage::user(serde_json::to_string_pretty(&inputs)?),
                        ],
                        &ChatOptions::default(),
                    )
                    .await?;

                let report = veska_llm::parse_json_lenient::<DailyReport>(&reply)
                    .unwrap_or_else(|_| DailyReport {
                        summary: reply.trim().to_string(),
                        tasks: Vec::new(),
                    });

                info!(tasks = report.tasks.len(), "daily report generated");
                let mut text = report.summary.clone();
                if !report.tasks.is_empty() {
                    text.push_str("\n\nTasks:\n");
                    for (i, task) in report.tasks.iter().enumerate() {
                        text.push_str(&format!(
                            "{}. [{}] {}\n",
                            i + 1,
                            task.priority.as_deref().unwrap_or("medium"),
                            task.title
                        ));
                    }
                }
                ctx.set_output("summary", serde_json::json!(text)).await;
                ctx.set_artifact(
                    "task_count",
                    serde_json::json!(report.tasks.len()),
                )
                .await;
                Ok(())
            }
        })
        .with_deps(["collect_todos", "collect_logs", "collect_events", "collect_cluster"]);

        let memory = self.deps.memory.clone();
        let write_memory = DagNode::new("write_memory", move |ctx| {
            let memory = memory.clone();
            async move {
                let text = ctx
                    .output("summary")
                    .await
                    .and_then(|v| v.as_str().map(String::from))
                    .unwrap_or_default();
                let item = MemoryItem::new(MemoryKind::DailyOp, text)
                    .with_tags(["daily_ops", "tasks"]);
                let id = memory.add(item)?;
                ctx.set_artifact("memory_id", serde_json::json!(id)).await;
                Ok(())
            }
        })
        .with_deps(["summarize"]);

        Dag::new(
            "daily-ops",
            vec![
                collect_todos,
                collect_logs,
                collect_events,
                collect_cluster,
                summarize,
                write_memory,
            ],
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::test_deps;
    use std::sync::Arc;
    use tokio_util::sync::CancellationToken;
    use veska_dag::RunContext;
    use veska_llm::mock::MockChat;

    #[tokio::test]
    async fn full_cycle_with_mock_llm() {
        let dir = tempfile::tempdir().unwrap();
        let deps = test_deps();
        let memory = deps.memory.clone();
        let skill = DailyOpsSkill::new(
            SkillDeps {
                llm: Arc::new(MockChat::new(vec![
                    r#"{"summary": "Quiet day.", "tasks": [{"title": "rotate keys", "reason": "due", "priority": "high"}]}"#,
                ])),
                ..deps
            },
            DailyOpsPaths {
                notes_dir: dir.path().join("notes"),
                logs_dir: dir.path().join("logs"),
                events_file: dir.path().join("events.log"),
                cluster_url: "http://127.0.0.1:1".into(),
            },
        );

        let dag = skill.build_dag(&SkillRequest::new("run my daily ops")).unwrap();
        let ctx = dag
            .execute(RunContext::new(), CancellationToken::new())
            .await;

        // Missing dirs and an unreachable cluster must not fail the DAG.
        assert!(ctx.succeeded());
        let summary = ctx.output_str("summary").unwrap();
        assert!(summary.contains("Quiet day."));
        assert!(summary.contains("rotate keys"));
        assert_eq!(memory.list_by_kind(MemoryKind::DailyOp, 10).unwrap().len(), 1);
    }
}
