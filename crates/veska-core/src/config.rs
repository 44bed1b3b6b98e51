use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{Result, VeskaError};

/// Top-level Veska configuration.
///
/// Loaded from a TOML file when one exists, then overridden by the
/// environment (`USE_ROUTER`, `ROUTER_URL`, `LLM_NODES`, `LLM_MODEL`,
/// `VISION_MODEL`, `VESKA_HOME`). Every field has a local default, so a
/// missing config file is not an error.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub llm: LlmConfig,
    #[serde(default)]
    pub browser: BrowserConfig,
    #[serde(default)]
    pub dispatch: DispatchConfig,
    #[serde(default)]
    pub vision: VisionConfig,
    #[serde(default)]
    pub voice: VoiceConfig,
    #[serde(default)]
    pub ambient: AmbientConfig,
    /// Embedding endpoint for semantic memory search. Absent means memory
    /// degrades to substring matching.
    #[serde(default)]
    pub embedding: Option<EmbeddingConfig>,
    /// State directory. `None` means purely in-memory operation.
    #[serde(default)]
    pub home_dir: Option<PathBuf>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbeddingConfig {
    pub base_url: String,
    #[serde(default)]
    pub api_key: Option<String>,
    pub model: String,
    #[serde(default = "default_embedding_dims")]
    pub dimensions: usize,
}

fn default_embedding_dims() -> usize {
    768
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    /// Route requests through the external gateway instead of hitting nodes directly.
    #[serde(default = "default_use_router")]
    pub use_router: bool,
    #[serde(default = "default_router_url")]
    pub router_url: String,
    /// Direct node URLs used when the router is disabled.
    #[serde(default = "default_nodes")]
    pub nodes: Vec<String>,
    #[serde(default = "default_model")]
    pub model: String,
    #[serde(default = "default_vision_model")]
    pub vision_model: String,
    #[serde(default = "default_llm_timeout")]
    pub timeout_secs: u64,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            use_router: default_use_router(),
            router_url: default_router_url(),
            nodes: default_nodes(),
            model: default_model(),
            vision_model: default_vision_model(),
            timeout_secs: default_llm_timeout(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BrowserConfig {
    #[serde(default = "default_headless")]
    pub headless: bool,
    /// Browser profile directory for authenticated sessions.
    #[serde(default)]
    pub user_data_dir: Option<PathBuf>,
}

impl Default for BrowserConfig {
    fn default() -> Self {
        Self {
            headless: default_headless(),
            user_data_dir: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DispatchConfig {
    /// Global cap on concurrent skill executions. Overflow blocks.
    #[serde(default = "default_max_concurrent")]
    pub max_concurrent: usize,
    /// Overall deadline for one dispatch, in seconds.
    #[serde(default = "default_deadline_secs")]
    pub deadline_secs: u64,
    /// Utterances shorter than this are treated as ambiguous.
    #[serde(default = "default_min_utterance_chars")]
    pub min_utterance_chars: usize,
    /// Regex patterns that require explicit confirmation before executing.
    #[serde(default = "DispatchConfig::default_risky_patterns")]
    pub risky_patterns: Vec<String>,
}

impl DispatchConfig {
    pub fn default_risky_patterns() -> Vec<String> {
        [
            r"\bdelete\b",
            r"\bremove\b",
            r"\bwipe\b",
            r"\bsend\b",
            r"\bpay\b",
            r"\btransfer\b",
            r"\bpurchase\b",
            r"\bsubmit\b",
            r"\bpublish\b",
            r"rm\s+-rf",
        ]
        .iter()
        .map(|s| s.to_string())
        .collect()
    }
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            max_concurrent: default_max_concurrent(),
            deadline_secs: default_deadline_secs(),
            min_utterance_chars: default_min_utterance_chars(),
            risky_patterns: Self::default_risky_patterns(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VisionConfig {
    /// Step budget for the perception-action loop.
    #[serde(default = "default_max_steps")]
    pub max_steps: usize,
}

impl Default for VisionConfig {
    fn default() -> Self {
        Self {
            max_steps: default_max_steps(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VoiceConfig {
    /// Silence threshold that ends a capture, in milliseconds.
    #[serde(default = "default_silence_ms")]
    pub silence_ms: u64,
    /// Hard cap on one capture, in milliseconds.
    #[serde(default = "default_max_ms")]
    pub max_ms: u64,
    #[serde(default = "default_wake_word")]
    pub wake_word: String,
}

impl Default for VoiceConfig {
    fn default() -> Self {
        Self {
            silence_ms: default_silence_ms(),
            max_ms: default_max_ms(),
            wake_word: default_wake_word(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AmbientConfig {
    #[serde(default = "default_ambient_interval")]
    pub interval_secs: u64,
    #[serde(default = "default_ambient_task")]
    pub task: String,
}

impl Default for AmbientConfig {
    fn default() -> Self {
        Self {
            interval_secs: default_ambient_interval(),
            task: default_ambient_task(),
        }
    }
}

fn default_use_router() -> bool {
    true
}
fn default_router_url() -> String {
    "http://localhost:8000".to_string()
}
fn default_nodes() -> Vec<String> {
    vec!["http://localhost:11434".to_string()]
}
fn default_model() -> String {
    "qwen3:4b".to_string()
}
fn default_vision_model() -> String {
    "qwen3-vl:4b".to_string()
}
fn default_llm_timeout() -> u64 {
    300
}
fn default_headless() -> bool {
    true
}
fn default_max_concurrent() -> usize {
    4
}
fn default_deadline_secs() -> u64 {
    300
}
fn default_min_utterance_chars() -> usize {
    3
}
fn default_max_steps() -> usize {
    20
}
fn default_silence_ms() -> u64 {
    3000
}
fn default_max_ms() -> u64 {
    30_000
}
fn default_wake_word() -> String {
    "veska".to_string()
}
fn default_ambient_interval() -> u64 {
    1800
}
fn default_ambient_task() -> String {
    "Check my calendar for upcoming meetings".to_string()
}

impl AppConfig {
    /// Load from a TOML file and apply environment overrides.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| VeskaError::Config(format!("cannot read {}: {}", path.display(), e)))?;
        let mut config: AppConfig = toml::from_str(&content)
            .map_err(|e| VeskaError::Config(format!("invalid config {}: {}", path.display(), e)))?;
        config.apply_env();
        Ok(config)
    }

    /// Defaults plus environment overrides. Never fails.
    pub fn from_env() -> Self {
        let mut config = Self::default();
        config.apply_env();
        config
    }

    fn apply_env(&mut self) {
        if let Ok(v) = std::env::var("USE_ROUTER") {
            self.llm.use_router = matches!(v.trim(), "1" | "true" | "yes" | "on");
        }
        if let Ok(v) = std::env::var("ROUTER_URL") {
            if !v.trim().is_empty() {
                self.llm.router_url = v.trim().to_string();
            }
        }
        if let Ok(v) = std::env::var("LLM_NODES") {
            let nodes: Vec<String> = v
                .split(',')
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect();
            if !nodes.is_empty() {
                self.llm.nodes = nodes;
            }
        }
        if let Ok(v) = std::env::var("LLM_MODEL") {
            if !v.trim().is_empty() {
                self.llm.model = v.trim().to_string();
            }
        }
        if let Ok(v) = std::env::var("VISION_MODEL") {
            if !v.trim().is_empty() {
                self.llm.vision_model = v.trim().to_string();
            }
        }
        if let Ok(v) = std::env::var("VESKA_HOME") {
            if !v.trim().is_empty() {
                self.home_dir = Some(PathBuf::from(v.trim()));
            }
        }
    }

    /// `memory/` under the state directory, when persistence is enabled.
    pub fn memory_dir(&self) -> Option<PathBuf> {
        self.home_dir.as_ref().map(|h| h.join("memory"))
    }

    /// `threads/` under the state directory.
    pub fn threads_dir(&self) -> Option<PathBuf> {
        self.home_dir.as_ref().map(|h| h.join("threads"))
    }

    /// `graph.json` under the state directory.
    pub fn graph_path(&self) -> Option<PathBuf> {
        self.home_dir.as_ref().map(|h| h.join("graph.json"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn defaults() {
        let config = AppConfig::default();
        assert!(config.llm.use_router);
        assert_eq!(config.dispatch.max_concurrent, 4);
        assert_eq!(config.dispatch.deadline_secs, 300);
        assert_eq!(config.vision.max_steps, 20);
        assert_eq!(config.voice.silence_ms, 3000);
        assert!(config.home_dir.is_none());
    }

    #[test]
    fn load_from_toml() {
        let toml_content = r#"
[llm]
use_router = false
model = "llama3.2"
nodes = ["http://10.0.0.2:11434", "http://10.0.0.3:11434"]

[dispatch]
max_concurrent = 2
deadline_secs = 60

[browser]
headless = false
"#;
        let mut tmp = tempfile::NamedTempFile::new().expect("create temp file");
        tmp.write_all(toml_content.as_bytes()).expect("write toml");

        let config = AppConfig::load(tmp.path()).expect("load config");
        assert!(!config.llm.use_router);
        assert_eq!(config.llm.model, "llama3.2");
        assert_eq!(config.llm.nodes.len(), 2);
        assert_eq!(config.dispatch.max_concurrent, 2);
        assert!(!config.browser.headless);
        // Untouched sections keep defaults
        assert_eq!(config.vision.max_steps, 20);
    }

    #[test]
    fn state_layout_paths() {
        let config = AppConfig {
            home_dir: Some(PathBuf::from("/tmp/veska-home")),
            ..Default::default()
        };
        assert_eq!(
            config.memory_dir().unwrap(),
            PathBuf::from("/tmp/veska-home/memory")
        );
        assert_eq!(
            config.graph_path().unwrap(),
            PathBuf::from("/tmp/veska-home/graph.json")
        );
    }

    #[test]
    fn risky_pattern_defaults_present() {
        let patterns = DispatchConfig::default_risky_patterns();
        assert!(patterns.iter().any(|p| p.contains("delete")));
        assert!(patterns.iter().any(|p| p.contains("rm")));
    }
}
