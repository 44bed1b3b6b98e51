use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use base64::Engine;
use futures::future::BoxFuture;
use serde::Deserialize;
use tracing::debug;

use veska_core::config::LlmConfig;
use veska_core::error::{Result, VeskaError};
use veska_core::traits::{LlmClient, VisionClient};
use veska_core::types::{ChatMessage, ChatOptions, Role};

/// Where requests go: the external gateway, or a round-robin over direct
/// node URLs when the router is disabled.
enum Target {
    Router(String),
    Pool { nodes: Vec<String>, cursor: AtomicUsize },
}

impl Target {
    fn from_config(config: &LlmConfig) -> Self {
        if config.use_router {
            Self::Router(config.router_url.trim_end_matches('/').to_string())
        } else {
            Self::Pool {
                nodes: config
                    .nodes
                    .iter()
                    .map(|n| n.trim_end_matches('/').to_string())
                    .collect(),
                cursor: AtomicUsize::new(0),
            }
        }
    }

    fn next_base(&self) -> Result<String> {
        match self {
            Self::Router(url) => Ok(url.clone()),
            Self::Pool { nodes, cursor } => {
                if nodes.is_empty() {
                    return Err(VeskaError::Config("no LLM nodes configured".into()));
                }
                let idx = cursor.fetch_add(1, Ordering::Relaxed) % nodes.len();
                Ok(nodes[idx].clone())
            }
        }
    }
}

fn role_name(role: Role) -> &'static str {
    match role {
        Role::System => "system",
        Role::User => "user",
        Role::Assistant => "assistant",
    }
}

#[derive(Deserialize)]
struct CompletionResponse {
    choices: Vec<CompletionChoice>,
}

#[derive(Deserialize)]
struct CompletionChoice {
    message: CompletionMessage,
}

#[derive(Deserialize)]
struct CompletionMessage {
    content: String,
}

async fn post_chat(
    client: &reqwest::Client,
    base: &str,
    body: serde_json::Value,
) -> Result<String> {
    let url = format!("{}/v1/chat/completions", base);
    let resp = client.post(&url).json(&body).send().await.map_err(|e| {
        if e.is_timeout() {
            VeskaError::timeout(url.clone(), 0)
        } else {
            VeskaError::Unavailable(format!("LLM request to {} failed: {}", url, e))
        }
    })?;

    if !resp.status().is_success() {
        let status = resp.status();
        let body = resp.text().await.unwrap_or_default();
        return Err(VeskaError::Unavailable(format!(
            "LLM API error {}: {}",
            status, body
        )));
    }

    let parsed: CompletionResponse = resp
        .json()
        .await
        .map_err(|e| VeskaError::BadResponse(format!("invalid completion response: {}", e)))?;

    parsed
        .choices
        .into_iter()
        .next()
        .map(|c| c.message.content)
        .ok_or_else(|| VeskaError::BadResponse("completion had no choices".into()))
}

/// Text client for OpenAI-compatible chat endpoints.
pub struct HttpTextClient {
    client: reqwest::Client,
    target: Target,
    default_model: String,
}

impl HttpTextClient {
    pub fn new(config: &LlmConfig) -> Self {
        Self {
            client: reqwest::Client::builder()
                .timeout(Duration::from_secs(config.timeout_secs))
                .build()
                .unwrap_or_default(),
            target: Target::from_config(config),
            default_model: config.model.clone(),
        }
    }
}

impl LlmClient for HttpTextClient {
    fn chat(
        &self,
        messages: Vec<ChatMessage>,
        options: &ChatOptions,
    ) -> BoxFuture<'_, Result<String>> {
        let model = options
            .model
            .clone()
            .unwrap_or_else(|| self.default_model.clone());
        Box::pin(async move {
            let base = self.target.next_base()?;
            debug!(base = %base, model = %model, messages = messages.len(), "chat request");
            let body = serde_json::json!({
                "model": model,
                "stream": false,
                "messages": messages
                    .iter()
                    .map(|m| serde_json::json!({
                        "role": role_name(m.role),
                        "content": m.content,
                    }))
                    .collect::<Vec<_>>(),
            });
            post_chat(&self.client, &base, body).await
        })
    }
}

/// Vision client sending the screenshot inline as a base64 data URL.
pub struct HttpVisionClient {
    client: reqwest::Client,
    target: Target,
    default_model: String,
}

impl HttpVisionClient {
    pub fn new(config: &LlmConfig) -> Self {
        Self {
            client: reqwest::Client::builder()
                .timeout(Duration::from_secs(config.timeout_secs))
                .build()
                .unwrap_or_default(),
            target: Target::from_config(config),
            default_model: config.vision_model.clone(),
        }
    }
}

impl VisionClient for HttpVisionClient {
    fn analyze(
        &self,
        image: &[u8],
        prompt: &str,
        options: &ChatOptions,
    ) -> BoxFuture<'_, Result<String>> {
        let model = options
            .model
            .clone()
            .unwrap_or_else(|| self.default_model.clone());
        let encoded = base64::engine::general_purpose::STANDARD.encode(image);
        let prompt = prompt.to_string();
        Box::pin(async move {
            let base = self.target.next_base()?;
            debug!(base = %base, model = %model, image_bytes = encoded.len(), "vision request");
            let body = serde_json::json!({
                "model": model,
                "stream": false,
                "messages": [{
                    "role": "user",
                    "content": [
                        { "type": "text", "text": prompt },
                        {
                            "type": "image_url",
                            "image_url": { "url": format!("data:image/png;base64,{}", encoded) },
                        },
                    ],
                }],
            });
            post_chat(&self.client, &base, body).await
        })
    }
}
