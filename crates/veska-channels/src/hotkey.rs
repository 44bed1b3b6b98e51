use std::collections::HashMap;
use std::sync::Arc;

use futures::future::BoxFuture;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use veska_core::error::{Result, VeskaError};
use veska_core::types::{TaskContext, TaskSource};
use veska_dispatch::Dispatcher;

/// Handler bound to a key chord. Returns the text to show the user.
pub type HotkeyHandler = Arc<dyn Fn() -> BoxFuture<'static, Result<String>> + Send + Sync>;

/// Maps named key chords to canned dispatcher macros.
#[derive(Default)]
pub struct HotkeyManager {
    handlers: HashMap<String, HotkeyHandler>,
}

impl HotkeyManager {
    pub fn new() -> Self {
        Self {
            handlers: HashMap::new(),
        }
    }

    pub fn register(&mut self, chord: impl Into<String>, handler: HotkeyHandler) {
        self.handlers.insert(chord.into().to_lowercase(), handler);
    }

    pub fn chords(&self) -> Vec<&str> {
        self.handlers.keys().map(String::as_str).collect()
    }

    /// Run the handler bound to a chord.
    pub async fn handle(&self, chord: &str) -> Result<String> {
        let handler = self
            .handlers
            .get(&chord.to_lowercase())
            .ok_or_else(|| VeskaError::NotFound(format!("hotkey '{}'", chord)))?;
        handler().await
    }

    /// Read chords from stdin until EOF, `:quit`, or cancellation.
    pub async fn listen_stdin(&self, cancel: CancellationToken) -> Result<()> {
        info!(chords = ?self.chords(), "hotkey listener started");
        loop {
            let line = tokio::select! {
                line = tokio::task::spawn_blocking(read_line) => match line {
                    Ok(Some(line)) => line,
                    _ => break,
                },
                _ = cancel.cancelled() => break,
            };

            let chord = line.trim();
            if chord.is_empty() {
                continue;
            }
            if chord == ":quit" || chord == ":exit" {
                break;
            }
            match self.handle(chord).await {
                Ok(output) => println!("{}", output),
                Err(VeskaError::NotFound(_)) => println!("No handler for '{}'", chord),
                Err(e) => warn!(chord = %chord, error = %e, "hotkey handler failed"),
            }
        }
        Ok(())
    }
}

fn read_line() -> Option<String> {
    let mut line = String::new();
    match std::io::stdin().read_line(&mut line) {
        Ok(0) => None,
        Ok(_) => Some(line),
        Err(_) => None,
    }
}

/// Register the default `*` macro: three status summaries run in sequence,
/// concatenated into one report.
pub fn default_hotkeys(dispatcher: Arc<Dispatcher>) -> HotkeyManager {
    let mut manager = HotkeyManager::new();

    let star_dispatcher = dispatcher;
    manager.register(
        "*",
        Arc::new(move || {
            let dispatcher = star_dispatcher.clone();
            Box::pin(async move {
                let commands = [
                    "Summarize today's calendar",
                    "Show unread mail messages",
                    "List my most recent drive files",
                ];
                let mut sections = Vec::new();
                for command in commands {
                    let result = dispatcher
                        .dispatch(
                            TaskContext::new(command, TaskSource::Hotkey)
                                .with_meta("macro", serde_json::json!("*")),
                            CancellationToken::new(),
                        )
                        .await;
                    sections.push(format!("[{}] {}", result.route, result.summary));
                }
                Ok(sections.join("\n"))
            })
        }),
    );

    manager
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn unknown_chord_is_not_found() {
        let manager = HotkeyManager::new();
        let err = manager.handle("*").await.unwrap_err();
        assert!(matches!(err, VeskaError::NotFound(_)));
    }

    #[tokio::test]
    async fn registered_chord_runs() {
        let mut manager = HotkeyManager::new();
        manager.register(
            "F9",
            Arc::new(|| Box::pin(async { Ok("status: fine".to_string()) })),
        );
        // Chords are case-insensitive.
        assert_eq!(manager.handle("f9").await.unwrap(), "status: fine");
    }
}
