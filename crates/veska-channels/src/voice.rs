use std::sync::Arc;

use futures::future::BoxFuture;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use veska_core::error::Result;
use veska_core::traits::{SpeechToText, TextToSpeech, WakeWordDetector};
use veska_core::types::{TaskContext, TaskSource};
use veska_dispatch::{Clarifier, Dispatcher};

const WAKE_TIMEOUT_MS: u64 = 30_000;
const EXIT_WORDS: &[&str] = &["exit", "quit", "goodbye"];

/// Hands-free loop: capture speech, dispatch, speak the result.
///
/// Wake-word gated when a detector is available; otherwise the loop degrades
/// to barge-in (always listening).
pub struct VoiceFrontend {
    dispatcher: Arc<Dispatcher>,
    asr: Arc<dyn SpeechToText>,
    tts: Arc<dyn TextToSpeech>,
    wake: Option<Arc<dyn WakeWordDetector>>,
    silence_ms: u64,
    max_ms: u64,
    barge_in: bool,
}

impl VoiceFrontend {
    pub fn new(
        dispatcher: Arc<Dispatcher>,
        asr: Arc<dyn SpeechToText>,
        tts: Arc<dyn TextToSpeech>,
        wake: Option<Arc<dyn WakeWordDetector>>,
        silence_ms: u64,
        max_ms: u64,
    ) -> Self {
        let barge_in = wake.is_none();
        Self {
            dispatcher,
            asr,
            tts,
            wake,
            silence_ms,
            max_ms,
            barge_in,
        }
    }

    /// Skip the wake word and treat every captured utterance as addressed to
    /// the assistant.
    pub fn with_barge_in(mut self, barge_in: bool) -> Self {
        self.barge_in = barge_in || self.wake.is_none();
        self
    }

    /// Run until an exit utterance or cancellation.
    pub async fn run(&self, cancel: CancellationToken) -> Result<()> {
        info!(barge_in = self.barge_in, "voice loop started");

        loop {
            if cancel.is_cancelled() {
                break;
            }

            if !self.barge_in {
                if let Some(ref wake) = self.wake {
                    match wake.listen_once(WAKE_TIMEOUT_MS).await {
                        Ok(true) => {}
                        Ok(false) => continue,
                        Err(e) => {
                            // Detector down: fall back to always-listening.
                            warn!(error = %e, "wake word detector unavailable, barge-in mode");
                        }
                    }
                }
            }

            let text = match self
                .asr
                .transcribe_until_silence(self.silence_ms, self.max_ms)
                .await
            {
                Ok(text) => text,
                Err(e) => {
                    warn!(error = %e, "transcription failed");
                    continue;
                }
            };
            let text = text.trim().to_string();
            if text.is_empty() {
                continue;
            }

            let lower = text.to_lowercase();
            if EXIT_WORDS.iter().any(|w| lower == *w) {
                self.speak("Goodbye.").await;
                break;
            }

            info!(utterance = %text, "voice command");
            let result = self
                .dispatcher
                .dispatch(
                    TaskContext::new(text, TaskSource::Voice),
                    cancel.child_token(),
                )
                .await;

            self.speak(&result.summary).await;
            if let Some(ref answer) = result.answer {
                if answer != &result.summary {
                    self.speak(answer).await;
                }
            }
        }

        Ok(())
    }

    async fn speak(&self, text: &str) {
        if let Err(e) = self.tts.speak(text, true).await {
            warn!(error = %e, "speech output failed");
        }
    }
}

/// Clarifier that speaks the question and listens for the answer, keeping
/// clarification on the voice channel it arrived on.
pub struct VoiceClarifier {
    asr: Arc<dyn SpeechToText>,
    tts: Arc<dyn TextToSpeech>,
    silence_ms: u64,
    max_ms: u64,
}

impl VoiceClarifier {
    pub fn new(
        asr: Arc<dyn SpeechToText>,
        tts: Arc<dyn TextToSpeech>,
        silence_ms: u64,
        max_ms: u64,
    ) -> Self {
        Self {
            asr,
            tts,
            silence_ms,
            max_ms,
        }
    }
}

impl Clarifier for VoiceClarifier {
    fn ask(&self, question: &str, _source: TaskSource) -> BoxFuture<'_, Result<Option<String>>> {
        let question = question.to_string();
        Box::pin(async move {
            self.tts.speak(&question, true).await?;
            let answer = self
                .asr
                .transcribe_until_silence(self.silence_ms, self.max_ms)
                .await?;
            let answer = answer.trim().to_string();
            Ok(if answer.is_empty() { None } else { Some(answer) })
        })
    }
}

/// Clarifier for the text CLI: print the question, read one stdin line.
pub struct StdinClarifier;

impl Clarifier for StdinClarifier {
    fn ask(&self, question: &str, _source: TaskSource) -> BoxFuture<'_, Result<Option<String>>> {
        let question = question.to_string();
        Box::pin(async move {
            println!("[veska] {}", question);
            let line = tokio::task::spawn_blocking(|| {
                let mut line = String::new();
                match std::io::stdin().read_line(&mut line) {
                    Ok(0) => None,
                    Ok(_) => Some(line),
                    Err(_) => None,
                }
            })
            .await
            .map_err(|e| veska_core::VeskaError::Internal(format!("stdin task: {}", e)))?;

            Ok(line
                .map(|l| l.trim().to_string())
                .filter(|l| !l.is_empty()))
        })
    }
}
