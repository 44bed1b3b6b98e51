//! Shared fixtures for the end-to-end tests: a scriptable browser and a
//! fully wired dispatcher over mock collaborators.
#![allow(dead_code)]

use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use futures::future::BoxFuture;

use veska_core::config::DispatchConfig;
use veska_core::error::{Result, VeskaError};
use veska_core::traits::{BrowserDriver, LlmClient, NavigationInfo, VisionClient};
use veska_core::types::{SelectorState, WaitUntil};
use veska_dispatch::{Clarifier, Dispatcher, IntentRouter};
use veska_knowledge::{KnowledgeGraph, ThreadStore};
use veska_llm::mock::MockVision;
use veska_memory::MemoryStore;
use veska_skills::daily_ops::DailyOpsPaths;
use veska_skills::{builtin_registry, SkillDeps};

/// Browser that records every call and can be told to fail selectors,
/// delay clicks, or serve a body text.
#[derive(Default)]
pub struct ScriptedBrowser {
    pub broken_selectors: HashSet<String>,
    pub click_delay: Option<Duration>,
    pub body_text: String,
    log: Mutex<Vec<String>>,
}

impl ScriptedBrowser {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_body_text(mut self, text: &str) -> Self {
        self.body_text = text.to_string();
        self
    }

    pub fn with_click_delay(mut self, delay: Duration) -> Self {
        self.click_delay = Some(delay);
        self
    }

    fn log(&self, entry: String) {
        if let Ok(mut log) = self.log.lock() {
            log.push(entry);
        }
    }

    pub fn calls(&self) -> Vec<String> {
        self.log.lock().map(|l| l.clone()).unwrap_or_default()
    }

    pub fn closed(&self) -> bool {
        self.calls().iter().any(|c| c == "close")
    }
}

impl BrowserDriver for ScriptedBrowser {
    fn navigate(&self, url: &str, _wait_until: WaitUntil) -> BoxFuture<'_, Result<NavigationInfo>> {
        let url = url.to_string();
        Box::pin(async move {
            self.log(format!("navigate:{}", url));
            Ok(NavigationInfo {
                url,
                title: "scripted".into(),
            })
        })
    }

    fn click(&self, selector: &str, _timeout_ms: u64) -> BoxFuture<'_, Result<()>> {
        let selector = selector.to_string();
        Box::pin(async move {
            if let Some(delay) = self.click_delay {
                tokio::time::sleep(delay).await;
            }
            self.log(format!("click:{}", selector));
            if self.broken_selectors.contains(&selector) {
                Err(VeskaError::NotFound(format!("selector {}", selector)))
            } else {
                Ok(())
            }
        })
    }

    fn fill(&self, selector: &str, text: &str, _timeout_ms: u64) -> BoxFuture<'_, Result<()>> {
        let entry = format!("fill:{}={}", selector, text);
        let selector = selector.to_string();
        Box::pin(async move {
            self.log(entry);
            if self.broken_selectors.contains(&selector) {
                Err(VeskaError::NotFound(format!("selector {}", selector)))
            } else {
                Ok(())
            }
        })
    }

    fn get_text(&self, selector: &str, _timeout_ms: u64) -> BoxFuture<'_, Result<String>> {
        self.log(format!("get_text:{}", selector));
        let text = self.body_text.clone();
        Box::pin(async move { Ok(text) })
    }

    fn wait_for_selector(
        &self,
        selector: &str,
        _timeout_ms: u64,
        _state: SelectorState,
    ) -> BoxFuture<'_, Result<bool>> {
        let visible = !self.broken_selectors.contains(selector);
        Box::pin(async move { Ok(visible) })
    }

    fn evaluate(&self, script: &str) -> BoxFuture<'_, Result<serde_json::Value>> {
        self.log(format!("evaluate:{}", script));
        let result = if script.contains("location.href") {
            serde_json::json!("https://mail.google.com/mail/u/0/#inbox")
        } else {
            serde_json::Value::Null
        };
        Box::pin(async move { Ok(result) })
    }

    fn screenshot(&self, _path: Option<&Path>, full_page: bool) -> BoxFuture<'_, Result<Vec<u8>>> {
        Box::pin(async move {
            self.log(format!("screenshot:full_page={}", full_page));
            Ok(vec![137u8, 80, 78, 71])
        })
    }

    fn press_key(&self, key: &str) -> BoxFuture<'_, Result<()>> {
        self.log(format!("press_key:{}", key));
        Box::pin(async { Ok(()) })
    }

    fn select_option(&self, selector: &str, value: &str) -> BoxFuture<'_, Result<()>> {
        self.log(format!("select:{}={}", selector, value));
        Box::pin(async { Ok(()) })
    }

    fn close(&self) -> BoxFuture<'_, Result<()>> {
        self.log("close".into());
        Box::pin(async { Ok(()) })
    }
}

pub struct Harness {
    pub dispatcher: Arc<Dispatcher>,
    pub memory: Arc<MemoryStore>,
    pub threads: Arc<ThreadStore>,
    pub graph: Arc<KnowledgeGraph>,
    pub browser: Arc<ScriptedBrowser>,
}

/// Wire a dispatcher over the given mocks and the full builtin skill set.
pub fn harness(
    llm: Arc<dyn LlmClient>,
    vision: Arc<dyn VisionClient>,
    browser: Arc<ScriptedBrowser>,
    clarifier: Arc<dyn Clarifier>,
) -> Harness {
    let memory = Arc::new(MemoryStore::new());
    let threads = Arc::new(ThreadStore::new());
    let graph = Arc::new(KnowledgeGraph::new());

    let deps = SkillDeps {
        llm: llm.clone(),
        vision,
        browser: browser.clone(),
        memory: memory.clone(),
        max_vision_steps: 5,
    };
    let registry = Arc::new(builtin_registry(deps, DailyOpsPaths::default()));

    let config = DispatchConfig {
        deadline_secs: 30,
        ..Default::default()
    };
    let dispatcher = Arc::new(Dispatcher::new(
        registry,
        IntentRouter::new(llm, config.min_utterance_chars),
        clarifier,
        memory.clone(),
        threads.clone(),
        graph.clone(),
        &config,
    ));

    Harness {
        dispatcher,
        memory,
        threads,
        graph,
        browser,
    }
}

pub fn quiet_vision() -> Arc<MockVision> {
    Arc::new(MockVision::new(vec![]))
}
