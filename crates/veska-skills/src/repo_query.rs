use std::path::PathBuf;

use tracing::info;

use veska_core::error::Result;
use veska_core::types::{ChatMessage, ChatOptions};
use veska_dag::{Dag, DagNode};
use veska_memory::{MemoryItem, MemoryKind};

use crate::registry::{KeywordRule, Skill, SkillDeps, SkillRequest};
use crate::repo_index::{index_repo, summarize_structure};

const REPO_PROMPT: &str = "You are a repo-aware assistant.\n\n\
Given a question about a codebase and a structured summary of its files:\n\
- Answer concisely and accurately\n\
- Reference specific files where possible, like `src/lib.rs:42`\n\
- If you're unsure, say so. Never invent file paths or functions.";

/// Rough context cap before the prompt gets truncated.
const MAX_CONTEXT_CHARS: usize = 16_000;

/// Questions about a local codebase, answered from a structural index.
pub struct RepoQuerySkill {
    deps: SkillDeps,
    rules: Vec<KeywordRule>,
}

impl RepoQuerySkill {
    pub fn new(deps: SkillDeps) -> Self {
        Self {
            deps,
            rules: vec![
                KeywordRule::pattern(r"\brepo\b"),
                KeywordRule::substring("codebase"),
                KeywordRule::pattern(r"\bcode\b"),
                KeywordRule::substring("explain"),
            ],
        }
    }
}

impl Skill for RepoQuerySkill {
    fn name(&self) -> &'static str {
        "repo_query"
    }

    fn description(&self) -> &'static str {
        "answer questions about a local code repository"
    }

    fn keyword_rules(&self) -> &[KeywordRule] {
        &self.rules
    }

    fn build_dag(&self, request: &SkillRequest) -> Result<Dag> {
        let repo_root = request
            .meta_str("repo_root")
            .map(PathBuf::from)
            .or_else(|| std::env::current_dir().ok())
            .unwrap_or_else(|| PathBuf::from("."));

        let index_root = repo_root.clone();
        let index = DagNode::new("index", move |ctx| {
            let root = index_root.clone();
            async move {
                let files = index_repo(&root)?;
                info!(root = %root.display(), files = files.len(), "repository indexed");
                let structure = summarize_structure(&files);
                ctx.set_artifact(
                    "repo_context",
                    serde_json::json!({
                        "root": root.display().to_string(),
                        "file_count": files.len(),
                        "structure": structure,
                        "files": files.iter().take(100).collect::<Vec<_>>(),
                    }),
                )
                .await;
                Ok(())
            }
        });

        let llm = self.deps.llm.clone();
        let question = request.utterance.clone();
        let answer = DagNode::new("answer", move |ctx| {
            let llm = llm.clone();
            let question = question.clone();
            async move {
                let context = ctx
                    .artifact("repo_context")
                    .await
                    .unwrap_or(serde_json::Value::Null);
                let mut context_str = serde_json::to_string_pretty(&context)?;
                if context_str.len() > MAX_CONTEXT_CHARS {
                    context_str.truncate(MAX_CONTEXT_CHARS);
                    context_str.push_str("\n... (context truncated)");
                }

                let reply = llm
                    .chat(
                        vec![
                            ChatMessage::system(REPO_PROMPT),
                            ChatMessage::user(format!(
                                "Question: {}\n\nRepository context:\n{}",
                                question, context_str
                            )),
                        ],
                        &ChatOptions::default(),
                    )
                    .await?;
                let reply = reply.trim().to_string();
                ctx.set_output("answer", serde_json::json!(reply.clone())).await;
                ctx.set_output("summary", serde_json::json!(reply)).await;
                Ok(())
            }
        })
        .with_deps(["index"]);

        let memory = self.deps.memory.clone();
        let question = request.utterance.clone();
        let root_for_memory = repo_root.clone();
        let write_memory = DagNode::new("write_memory", move |ctx| {
            let memory = memory.clone();
            let question = question.clone();
            let root = root_for_memory.clone();
            async move {
                let reply = ctx
                    .output("answer")
                    .await
                    .and_then(|v| v.as_str().map(String::from))
                    .unwrap_or_default();
                let item = MemoryItem::new(
                    MemoryKind::RepoInsight,
                    format!("Repo: {}\nQ: {}\nA: {}", root.display(), question, reply),
                )
                .with_tags(["repo", "qa"]);
                let id = memory.add(item)?;
                ctx.set_artifact("memory_id", serde_json::json!(id)).await;
                Ok(())
            }
        })
        .with_deps(["answer"]);

        Dag::new("repo-query", vec![index, answer, write_memory])
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
    async fn answers_from_index() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("lib.rs"), "pub fn run() {}").unwrap();

        let deps = test_deps();
        let skill = RepoQuerySkill::new(SkillDeps {
            llm: Arc::new(MockChat::new(vec!["Entry point is lib.rs."])),
            ..deps
        });

        let mut request = SkillRequest::new("explain this repo");
        request.metadata.insert(
            "repo_root".into(),
            serde_json::json!(dir.path().display().to_string()),
        );

        let dag = skill.build_dag(&request).unwrap();
        let ctx = dag
            .execute(RunContext::new(), CancellationToken::new())
            .await;

        assert!(ctx.succeeded());
        assert_eq!(ctx.output_str("answer"), Some("Entry point is lib.rs."));
    }
}
