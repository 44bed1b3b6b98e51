use std::path::Path;

use futures::future::BoxFuture;

use crate::error::Result;
use crate::types::{ChatMessage, ChatOptions, SelectorState, WaitUntil};

/// Text LLM client. The external gateway handles node routing; this client
/// only needs to tolerate concurrent calls.
pub trait LlmClient: Send + Sync + 'static {
    /// Send a chat request and return the full response text.
    fn chat(
        &self,
        messages: Vec<ChatMessage>,
        options: &ChatOptions,
    ) -> BoxFuture<'_, Result<String>>;
}

/// Vision LLM client. Responses are free-form strings that callers prompt
/// into JSON themselves.
pub trait VisionClient: Send + Sync + 'static {
    fn analyze(
        &self,
        image: &[u8],
        prompt: &str,
        options: &ChatOptions,
    ) -> BoxFuture<'_, Result<String>>;
}

/// Result of a navigation.
#[derive(Debug, Clone)]
pub struct NavigationInfo {
    pub url: String,
    pub title: String,
}

/// Browser driver contract. Implementations wrap a real browser; tests use
/// scripted mocks. All timeouts are milliseconds.
pub trait BrowserDriver: Send + Sync + 'static {
    fn navigate(&self, url: &str, wait_until: WaitUntil) -> BoxFuture<'_, Result<NavigationInfo>>;

    fn click(&self, selector: &str, timeout_ms: u64) -> BoxFuture<'_, Result<()>>;

    fn fill(&self, selector: &str, text: &str, timeout_ms: u64) -> BoxFuture<'_, Result<()>>;

    fn get_text(&self, selector: &str, timeout_ms: u64) -> BoxFuture<'_, Result<String>>;

    /// Resolves to `true` when the selector reaches the requested state
    /// within the timeout, `false` otherwise.
    fn wait_for_selector(
        &self,
        selector: &str,
        timeout_ms: u64,
        state: SelectorState,
    ) -> BoxFuture<'_, Result<bool>>;

    fn evaluate(&self, script: &str) -> BoxFuture<'_, Result<serde_json::Value>>;

    /// Capture the current page. Bytes are always returned; `path` additionally
    /// writes them to disk.
    fn screenshot(&self, path: Option<&Path>, full_page: bool) -> BoxFuture<'_, Result<Vec<u8>>>;

    fn press_key(&self, key: &str) -> BoxFuture<'_, Result<()>>;

    fn select_option(&self, selector: &str, value: &str) -> BoxFuture<'_, Result<()>>;

    /// Release browser resources. Idempotent.
    fn close(&self) -> BoxFuture<'_, Result<()>>;
}

/// Speech-to-text engine. "No speech" surfaces as an empty string, not an error.
pub trait SpeechToText: Send + Sync + 'static {
    fn transcribe_until_silence(
        &self,
        silence_ms: u64,
        max_ms: u64,
    ) -> BoxFuture<'_, Result<String>>;
}

/// Text-to-speech engine.
pub trait TextToSpeech: Send + Sync + 'static {
    fn speak(&self, text: &str, blocking: bool) -> BoxFuture<'_, Result<()>>;
}

/// Wake-word detector. When unavailable the voice frontend degrades to
/// barge-in mode.
pub trait WakeWordDetector: Send + Sync + 'static {
    /// Resolves to `true` when the wake word was heard within the timeout.
    fn listen_once(&self, timeout_ms: u64) -> BoxFuture<'_, Result<bool>>;
}

/// Embedding provider for semantic memory search. Optional; when absent the
/// memory store degrades to substring matching.
pub trait Embedder: Send + Sync + 'static {
    fn embed(&self, text: &str) -> BoxFuture<'_, Result<Vec<f32>>>;

    fn dimensions(&self) -> usize;
}
