//! Shared fixtures for skill unit tests.

use std::path::Path;
use std::sync::Arc;

use futures::future::BoxFuture;

use veska_core::error::Result;
use veska_core::traits::{BrowserDriver, NavigationInfo};
use veska_core::types::{SelectorState, WaitUntil};
use veska_llm::mock::{MockChat, MockVision};
use veska_memory::MemoryStore;

use crate::registry::SkillDeps;

/// Browser stub where every operation succeeds.
pub(crate) struct StubBrowser;

impl BrowserDriver for StubBrowser {
    fn navigate(&self, url: &str, _wait_until: WaitUntil) -> BoxFuture<'_, Result<NavigationInfo>> {
        let url = url.to_string();
        Box::pin(async move {
            Ok(NavigationInfo {
                url,
                title: "stub".into(),
            })
        })
    }

    fn click(&self, _selector: &str, _timeout_ms: u64) -> BoxFuture<'_, Result<()>> {
        Box::pin(async { Ok(()) })
    }

    fn fill(&self, _selector: &str, _text: &str, _timeout_ms: u64) -> BoxFuture<'_, Result<()>> {
        Box::pin(async { Ok(()) })
    }

    fn get_text(&self, _selector: &str, _timeout_ms: u64) -> BoxFuture<'_, Result<String>> {
        Box::pin(async { Ok(String::new()) })
    }

    fn wait_for_selector(
        &self,
        _selector: &str,
        _timeout_ms: u64,
        _state: SelectorState,
    ) -> BoxFuture<'_, Result<bool>> {
        Box::pin(async { Ok(true) })
    }

    fn evaluate(&self, _script: &str) -> BoxFuture<'_, Result<serde_json::Value>> {
        Box::pin(async { Ok(serde_json::Value::Null) })
    }

    fn screenshot(&self, _path: Option<&Path>, _full_page: bool) -> BoxFuture<'_, Result<Vec<u8>>> {
        Box::pin(async { Ok(vec![0u8; 4]) })
    }

    fn press_key(&self, _key: &str) -> BoxFuture<'_, Result<()>> {
        Box::pin(async { Ok(()) })
    }

    fn select_option(&self, _selector: &str, _value: &str) -> BoxFuture<'_, Result<()>> {
        Box::pin(async { Ok(()) })
    }

    fn close(&self) -> BoxFuture<'_, Result<()>> {
        Box::pin(async { Ok(()) })
    }
}

pub(crate) fn test_deps() -> SkillDeps {
    SkillDeps {
        llm: Arc::new(MockChat::new(vec![])),
        vision: Arc::new(MockVision::new(vec![])),
        browser: Arc::new(StubBrowser),
        memory: Arc::new(MemoryStore::new()),
        max_vision_steps: 5,
    }
}
