use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use veska_core::types::{TaskContext, TaskSource};
use veska_dispatch::Dispatcher;

/// Repeatable ops cycle: a fixed list of dispatcher commands run in order,
/// on an interval, tagged with the `daily_ops` project so their thread
/// history accumulates in one place.
pub struct DailyCycleManager {
    dispatcher: Arc<Dispatcher>,
    commands: Vec<String>,
    interval: Duration,
}

impl DailyCycleManager {
    pub fn new(dispatcher: Arc<Dispatcher>, interval: Duration) -> Self {
        Self {
            dispatcher,
            commands: vec![
                "run the daily ops report".to_string(),
                "Summarize today's calendar".to_string(),
                "Show unread mail messages".to_string(),
            ],
            interval,
        }
    }

    pub fn with_commands(mut self, commands: Vec<String>) -> Self {
        self.commands = commands;
        self
    }

    /// One pass over the command list. Individual command failures are
    /// logged, not propagated.
    pub async fn run_cycle(&self, cancel: &CancellationToken) {
        info!(commands = self.commands.len(), "starting ops cycle");
        for command in &self.commands {
            if cancel.is_cancelled() {
                break;
            }
            let result = self
                .dispatcher
                .dispatch(
                    TaskContext::new(command.clone(), TaskSource::Ambient)
                        .with_meta("project", serde_json::json!("daily_ops")),
                    cancel.child_token(),
                )
                .await;
            match result.status {
                veska_core::types::TaskStatus::Ok => {
                    info!(command = %command, route = %result.route, "cycle command complete");
                }
                status => {
                    warn!(command = %command, ?status, summary = %result.summary, "cycle command did not complete");
                }
            }
        }
    }

    /// Run cycles until cancelled.
    pub async fn run(&self, cancel: CancellationToken) {
        loop {
            self.run_cycle(&cancel).await;
            tokio::select! {
                _ = tokio::time::sleep(self.interval) => {}
                _ = cancel.cancelled() => {
                    info!("cycle manager shutting down");
                    break;
                }
            }
        }
    }
}
