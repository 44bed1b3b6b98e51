use veska_core::error::Result;
use veska_core::types::{ChatMessage, ChatOptions};
use veska_dag::{Dag, DagNode};
use veska_memory::{MemoryItem, MemoryKind};

use crate::registry::{KeywordRule, Skill, SkillDeps, SkillRequest};

const ASSISTANT_PROMPT: &str = "You are Veska, a local assistant.\n\n\
Rules:\n\
- Keep responses concise and practical (2-4 sentences max)\n\
- Be direct and technically accurate\n\
- If you don't know something, say so immediately\n\
- Focus on actionable information and next steps";

/// Plain conversational answers. The routing fallback when nothing else
/// claims the utterance.
pub struct FreeFormSkill {
    deps: SkillDeps,
    rules: Vec<KeywordRule>,
}

impl FreeFormSkill {
    pub fn new(deps: SkillDeps) -> Self {
        // Deliberately no keyword rules: this skill is reached by fallback.
        Self {
            deps,
            rules: Vec::new(),
        }
    }
}

impl Skill for FreeFormSkill {
    fn name(&self) -> &'static str {
        "free_form"
    }

    fn description(&self) -> &'static str {
        "answer a question or chat, no browser involved"
    }

    fn keyword_rules(&self) -> &[KeywordRule] {
        &self.rules
    }

    fn build_dag(&self, request: &SkillRequest) -> Result<Dag> {
        let llm = self.deps.llm.clone();
        let utterance = request.utterance.clone();
        let answer = DagNode::new("answer", move |ctx| {
            let llm = llm.clone();
            let utterance = utterance.clone();
            async move {
                let reply = llm
                    .chat(
                        vec![
                            ChatMessage::system(ASSISTANT_PROMPT),
                            ChatMessage::user(utterance),
                        ],
                        &ChatOptions::default(),
                    )
                    .await?;
                let reply = reply.trim().to_string();
                ctx.set_output("answer", serde_json::json!(reply.clone())).await;
                ctx.set_output("summary", serde_json::json!(reply)).await;
                Ok(())
            }
        });

        let memory = self.deps.memory.clone();
        let utterance = request.utterance.clone();
        let write_memory = DagNode::new("write_memory", move |ctx| {
            let memory = memory.clone();
            let utterance = utterance.clone();
            async move {
                let reply = ctx
                    .output("answer")
                    .await
                    .and_then(|v| v.as_str().map(String::from))
                    .unwrap_or_default();
                let item = MemoryItem::new(
                    MemoryKind::QAndA,
                    format!("Q: {}\nA: {}", utterance, reply),
                )
                .with_tags(["qa", "free_form"]);
                let id = memory.add_embedded(item).await?;
                ctx.set_artifact("memory_id", serde_json::json!(id)).await;
                Ok(())
            }
        })
        .with_deps(["answer"]);

        Dag::new("free-form", vec![answer, write_memory])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::test_deps;
    use tokio_util::sync::CancellationToken;
    use veska_dag::RunContext;

    #[tokio::test]
    async fn answers_and_remembers() {
        let deps = test_deps();
        let memory = deps.memory.clone();
        let skill = FreeFormSkill::new(SkillDeps {
            llm: std::sync::Arc::new(veska_llm::mock::MockChat::new(vec![
                "Rust builds fast, reliable software.",
            ])),
            ..deps
        });

        let dag = skill
            .build_dag(&SkillRequest::new("what is rust good for"))
            .unwrap();
        let ctx = dag
            .execute(RunContext::new(), CancellationToken::new())
            .await;

        assert!(ctx.succeeded());
        assert_eq!(
            ctx.output_str("answer"),
            Some("Rust builds fast, reliable software.")
        );
        assert_eq!(memory.len(), 1);
    }
}
