//! Shared fixtures for dispatcher unit tests.

use std::path::Path;
use std::sync::Arc;

use futures::future::BoxFuture;

use veska_core::config::DispatchConfig;
use veska_core::error::Result;
use veska_core::traits::{BrowserDriver, LlmClient, NavigationInfo};
use veska_core::types::{SelectorState, WaitUntil};
use veska_knowledge::{KnowledgeGraph, ThreadStore};
use veska_llm::mock::MockVision;
use veska_memory::MemoryStore;
use veska_skills::daily_ops::DailyOpsPaths;
use veska_skills::{builtin_registry, SkillDeps};

use crate::clarify::Clarifier;
use crate::dispatcher::Dispatcher;
use crate::intent::IntentRouter;

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

pub(crate) struct TestHarness {
    pub dispatcher: Dispatcher,
    pub memory: Arc<MemoryStore>,
    pub threads: Arc<ThreadStore>,
    pub graph: Arc<KnowledgeGraph>,
}

/// Build a dispatcher over stubbed collaborators and the full builtin
/// registry.
pub(crate) fn harness(llm: Arc<dyn LlmClient>, clarifier: Arc<dyn Clarifier>) -> TestHarness {
    let memory = Arc::new(MemoryStore::new());
    let threads = Arc::new(ThreadStore::new());
    let graph = Arc::new(KnowledgeGraph::new());

    let deps = SkillDeps {
        llm: llm.clone(),
        vision: Arc::new(MockVision::new(vec![])),
        browser: Arc::new(StubBrowser),
        memory: memory.clone(),
        max_vision_steps: 3,
    };
    let registry = Arc::new(builtin_registry(deps, DailyOpsPaths::default()));

    let config = DispatchConfig::default();
    let dispatcher = Dispatcher::new(
        registry,
        IntentRouter::new(llm, config.min_utterance_chars),
        clarifier,
        memory.clone(),
        threads.clone(),
        graph.clone(),
        &config,
    );

    TestHarness {
        dispatcher,
        memory,
        threads,
        graph,
    }
}
