pub mod http;
pub mod mock;
pub mod parse;

use std::sync::Arc;

use veska_core::config::LlmConfig;
use veska_core::traits::{LlmClient, VisionClient};

pub use http::{HttpTextClient, HttpVisionClient};
pub use parse::{extract_json_block, parse_json_lenient, single_token_tag};

/// Build the text client described by the config.
pub fn create_text_client(config: &LlmConfig) -> Arc<dyn LlmClient> {
    Arc::new(HttpTextClient::new(config))
}

/// Build the vision client described by the config.
pub fn create_vision_client(config: &LlmConfig) -> Arc<dyn VisionClient> {
    Arc::new(HttpVisionClient::new(config))
}
