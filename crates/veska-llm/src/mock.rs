use std::collections::VecDeque;
use std::sync::Mutex;

use futures::future::BoxFuture;

use veska_core::error::{Result, VeskaError};
use veska_core::traits::{LlmClient, VisionClient};
use veska_core::types::{ChatMessage, ChatOptions};

/// Scripted text client for tests and offline runs. Responses are consumed
/// in order; the fallback answers anything after the script runs out.
pub struct MockChat {
    responses: Mutex<VecDeque<String>>,
    fallback: String,
    calls: Mutex<Vec<Vec<ChatMessage>>>,
}

impl MockChat {
    pub fn new(responses: Vec<&str>) -> Self {
        Self {
            responses: Mutex::new(responses.into_iter().map(String::from).collect()),
            fallback: "OK".to_string(),
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn with_fallback(mut self, fallback: impl Into<String>) -> Self {
        self.fallback = fallback.into();
        self
    }

    /// Every request this client has served, oldest first.
    pub fn calls(&self) -> Vec<Vec<ChatMessage>> {
        self.calls.lock().map(|c| c.clone()).unwrap_or_default()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().map(|c| c.len()).unwrap_or(0)
    }
}

impl LlmClient for MockChat {
    fn chat(
        &self,
        messages: Vec<ChatMessage>,
        _options: &ChatOptions,
    ) -> BoxFuture<'_, Result<String>> {
        Box::pin(async move {
            if let Ok(mut calls) = self.calls.lock() {
                calls.push(messages);
            }
            let next = self
                .responses
                .lock()
                .ok()
                .and_then(|mut r| r.pop_front())
                .unwrap_or_else(|| self.fallback.clone());
            Ok(next)
        })
    }
}

/// Text client that always fails, for exercising degraded paths.
pub struct UnavailableChat;

impl LlmClient for UnavailableChat {
    fn chat(
        &self,
        _messages: Vec<ChatMessage>,
        _options: &ChatOptions,
    ) -> BoxFuture<'_, Result<String>> {
        Box::pin(async { Err(VeskaError::Unavailable("mock LLM offline".into())) })
    }
}

/// Scripted vision client. Records prompts so tests can assert on what the
/// loop asked for.
pub struct MockVision {
    responses: Mutex<VecDeque<String>>,
    fallback: String,
    prompts: Mutex<Vec<String>>,
}

impl MockVision {
    pub fn new(responses: Vec<&str>) -> Self {
        Self {
            responses: Mutex::new(responses.into_iter().map(String::from).collect()),
            fallback: "NO_ANSWER".to_string(),
            prompts: Mutex::new(Vec::new()),
        }
    }

    pub fn with_fallback(mut self, fallback: impl Into<String>) -> Self {
        self.fallback = fallback.into();
        self
    }

    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().map(|p| p.clone()).unwrap_or_default()
    }

    pub fn call_count(&self) -> usize {
        self.prompts.lock().map(|p| p.len()).unwrap_or(0)
    }
}

impl VisionClient for MockVision {
    fn analyze(
        &self,
        _image: &[u8],
        prompt: &str,
        _options: &ChatOptions,
    ) -> BoxFuture<'_, Result<String>> {
        let prompt = prompt.to_string();
        Box::pin(async move {
            if let Ok(mut prompts) = self.prompts.lock() {
                prompts.push(prompt);
            }
            let next = self
                .responses
                .lock()
                .ok()
                .and_then(|mut r| r.pop_front())
                .unwrap_or_else(|| self.fallback.clone());
            Ok(next)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn scripted_then_fallback() {
        let chat = MockChat::new(vec!["first", "second"]).with_fallback("done");
        let opts = ChatOptions::default();

        let a = chat.chat(vec![ChatMessage::user("1")], &opts).await.unwrap();
        let b = chat.chat(vec![ChatMessage::user("2")], &opts).await.unwrap();
        let c = chat.chat(vec![ChatMessage::user("3")], &opts).await.unwrap();

        assert_eq!((a.as_str(), b.as_str(), c.as_str()), ("first", "second", "done"));
        assert_eq!(chat.call_count(), 3);
    }

    #[tokio::test]
    async fn vision_records_prompts() {
        let vision = MockVision::new(vec!["looks fine"]);
        let opts = ChatOptions::default();
        vision.analyze(&[1, 2, 3], "what is here?", &opts).await.unwrap();
        assert_eq!(vision.prompts(), vec!["what is here?".to_string()]);
    }
}
