//! Fallback collaborators used when no real driver or speech engine is
//! wired in. Browser and ASR calls surface `Unavailable`; speech output
//! falls back to stdout.

use std::path::Path;
use std::sync::Arc;

use futures::future::BoxFuture;

use veska_core::error::{Result, VeskaError};
use veska_core::traits::{
    BrowserDriver, NavigationInfo, SpeechToText, TextToSpeech, WakeWordDetector,
};
use veska_core::types::{SelectorState, WaitUntil};

pub struct UnavailableBrowser;

fn browser_down<T: Send + 'static>() -> BoxFuture<'static, Result<T>> {
    Box::pin(async { Err(VeskaError::Unavailable("no browser driver configured".into())) })
}

impl BrowserDriver for UnavailableBrowser {
    fn navigate(&self, _url: &str, _wait_until: WaitUntil) -> BoxFuture<'_, Result<NavigationInfo>> {
        browser_down()
    }

    fn click(&self, _selector: &str, _timeout_ms: u64) -> BoxFuture<'_, Result<()>> {
        browser_down()
    }

    fn fill(&self, _selector: &str, _text: &str, _timeout_ms: u64) -> BoxFuture<'_, Result<()>> {
        browser_down()
    }

    fn get_text(&self, _selector: &str, _timeout_ms: u64) -> BoxFuture<'_, Result<String>> {
        browser_down()
    }

    fn wait_for_selector(
        &self,
        _selector: &str,
        _timeout_ms: u64,
        _state: SelectorState,
    ) -> BoxFuture<'_, Result<bool>> {
        browser_down()
    }

    fn evaluate(&self, _script: &str) -> BoxFuture<'_, Result<serde_json::Value>> {
        browser_down()
    }

    fn screenshot(&self, _path: Option<&Path>, _full_page: bool) -> BoxFuture<'_, Result<Vec<u8>>> {
        browser_down()
    }

    fn press_key(&self, _key: &str) -> BoxFuture<'_, Result<()>> {
        browser_down()
    }

    fn select_option(&self, _selector: &str, _value: &str) -> BoxFuture<'_, Result<()>> {
        browser_down()
    }

    fn close(&self) -> BoxFuture<'_, Result<()>> {
        Box::pin(async { Ok(()) })
    }
}

pub struct UnavailableAsr;

impl SpeechToText for UnavailableAsr {
    fn transcribe_until_silence(
        &self,
        _silence_ms: u64,
        _max_ms: u64,
    ) -> BoxFuture<'_, Result<String>> {
        Box::pin(async { Err(VeskaError::Unavailable("no speech-to-text engine configured".into())) })
    }
}

/// Prints instead of speaking when no TTS engine is present.
pub struct ConsoleTts;

impl TextToSpeech for ConsoleTts {
    fn speak(&self, text: &str, _blocking: bool) -> BoxFuture<'_, Result<()>> {
        println!("[veska] {}", text);
        Box::pin(async { Ok(()) })
    }
}

/// No wake-word model: the voice frontend degrades to barge-in mode.
pub fn wake_word_detector() -> Option<Arc<dyn WakeWordDetector>> {
    None
}
