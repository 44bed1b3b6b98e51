use std::collections::HashMap;
use std::sync::Arc;

use regex::Regex;
use tracing::warn;

use veska_core::error::Result;
use veska_core::traits::{BrowserDriver, LlmClient, VisionClient};
use veska_dag::Dag;
use veska_memory::MemoryStore;

/// Routing rule for the deterministic keyword classifier.
#[derive(Debug, Clone)]
pub enum KeywordRule {
    /// Case-insensitive substring match.
    Substring(String),
    Pattern(Regex),
}

impl KeywordRule {
    pub fn substring(s: &str) -> Self {
        Self::Substring(s.to_lowercase())
    }

    /// Invalid patterns degrade to a substring rule on the raw source.
    pub fn pattern(source: &str) -> Self {
        match Regex::new(source) {
            Ok(re) => Self::Pattern(re),
            Err(e) => {
                warn!(pattern = %source, error = %e, "invalid keyword pattern, using substring");
                Self::Substring(source.to_lowercase())
            }
        }
    }

    pub fn matches(&self, utterance_lower: &str) -> bool {
        match self {
            Self::Substring(needle) => utterance_lower.contains(needle.as_str()),
            Self::Pattern(re) => re.is_match(utterance_lower),
        }
    }
}

/// What a skill gets to build its workflow from.
#[derive(Debug, Clone)]
pub struct SkillRequest {
    pub utterance: String,
    pub metadata: HashMap<String, serde_json::Value>,
}

impl SkillRequest {
    pub fn new(utterance: impl Into<String>) -> Self {
        Self {
            utterance: utterance.into(),
            metadata: HashMap::new(),
        }
    }

    pub fn meta_str(&self, key: &str) -> Option<&str> {
        self.metadata.get(key).and_then(|v| v.as_str())
    }
}

/// Shared collaborators handed to every skill.
#[derive(Clone)]
pub struct SkillDeps {
    pub llm: Arc<dyn LlmClient>,
    pub vision: Arc<dyn VisionClient>,
    pub browser: Arc<dyn BrowserDriver>,
    pub memory: Arc<MemoryStore>,
    /// Step budget for vision-guided skills.
    pub max_vision_steps: usize,
}

/// A named capability: keyword rules for routing plus a DAG factory.
pub trait Skill: Send + Sync + 'static {
    fn name(&self) -> &'static str;

    /// One-line description, shown to the router LLM.
    fn description(&self) -> &'static str;

    fn keyword_rules(&self) -> &[KeywordRule];

    fn build_dag(&self, request: &SkillRequest) -> Result<Dag>;
}

/// Process-wide skill table.
#[derive(Default)]
pub struct SkillRegistry {
    skills: Vec<Arc<dyn Skill>>,
}

impl SkillRegistry {
    pub fn new() -> Self {
        Self { skills: Vec::new() }
    }

    pub fn register(&mut self, skill: Arc<dyn Skill>) {
        self.skills.push(skill);
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Skill>> {
        self.skills.iter().find(|s| s.name() == name).cloned()
    }

    pub fn names(&self) -> Vec<&'static str> {
        self.skills.iter().map(|s| s.name()).collect()
    }

    /// Skills whose keyword rules fire on the utterance, in registration order.
    pub fn keyword_matches(&self, utterance: &str) -> Vec<&'static str> {
        let lower = utterance.to_lowercase();
        self.skills
            .iter()
            .filter(|s| s.keyword_rules().iter().any(|r| r.matches(&lower)))
            .map(|s| s.name())
            .collect()
    }

    /// `name - description` lines for the router prompt.
    pub fn describe(&self) -> String {
        self.skills
            .iter()
            .map(|s| format!("{} - {}", s.name(), s.description()))
            .collect::<Vec<_>>()
            .join("\n")
    }

    pub fn len(&self) -> usize {
        self.skills.len()
    }

    pub fn is_empty(&self) -> bool {
        self.skills.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use veska_dag::DagNode;

    struct FakeSkill {
        rules: Vec<KeywordRule>,
    }

    impl Skill for FakeSkill {
        fn name(&self) -> &'static str {
            "fake"
        }

        fn description(&self) -> &'static str {
            "test skill"
        }

        fn keyword_rules(&self) -> &[KeywordRule] {
            &self.rules
        }

        fn build_dag(&self, _request: &SkillRequest) -> Result<Dag> {
            Dag::new("fake", vec![DagNode::new("noop", |_ctx| async { Ok(()) })])
        }
    }

    #[test]
    fn keyword_matching() {
        let mut registry = SkillRegistry::new();
        registry.register(Arc::new(FakeSkill {
            rules: vec![
                KeywordRule::substring("calendar"),
                KeywordRule::pattern(r"\bmeeting\b"),
            ],
        }));

        assert_eq!(
            registry.keyword_matches("Show my Calendar for today"),
            vec!["fake"]
        );
        assert_eq!(
            registry.keyword_matches("schedule a meeting with ana"),
            vec!["fake"]
        );
        assert!(registry.keyword_matches("meetings").is_empty());
        assert!(registry.keyword_matches("hello").is_empty());
    }

    #[test]
    fn describe_lists_skills() {
        let mut registry = SkillRegistry::new();
        registry.register(Arc::new(FakeSkill { rules: vec![] }));
        assert_eq!(registry.describe(), "fake - test skill");
        assert!(registry.get("fake").is_some());
        assert!(registry.get("other").is_none());
    }
}
