use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use veska_core::types::{TaskContext, TaskSource};
use veska_dispatch::Dispatcher;
use veska_memory::{MemoryItem, MemoryKind, MemoryStore};

/// Background loop that re-dispatches a fixed task on an interval.
///
/// Results are written to memory, not returned: the monitor has no channel
/// to answer on. Ticks are serialized with themselves; they share the
/// dispatcher's global concurrency budget with foreground requests.
pub struct AmbientMonitor {
    dispatcher: Arc<Dispatcher>,
    memory: Arc<MemoryStore>,
    task: String,
    interval: Duration,
    cancel: CancellationToken,
}

impl AmbientMonitor {
    pub fn new(
        dispatcher: Arc<Dispatcher>,
        memory: Arc<MemoryStore>,
        task: impl Into<String>,
        interval: Duration,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            dispatcher,
            memory,
            task: task.into(),
            interval,
            cancel,
        }
    }

    /// Run until cancelled.
    pub async fn run(&self) {
        info!(task = %self.task, interval_secs = self.interval.as_secs(), "ambient monitor started");
        loop {
            tokio::select! {
                _ = tokio::time::sleep(self.interval) => {}
                _ = self.cancel.cancelled() => {
                    info!("ambient monitor shutting down");
                    break;
                }
            }

            info!(task = %self.task, "ambient tick");
            let result = self
                .dispatcher
                .dispatch(
                    TaskContext::new(self.task.clone(), TaskSource::Ambient),
                    self.cancel.child_token(),
                )
                .await;

            let item = MemoryItem::new(
                MemoryKind::DailyOp,
                format!("Ambient '{}': {}", self.task, result.summary),
            )
            .with_tags(vec!["ambient".to_string(), result.route.clone()]);
            if let Err(e) = self.memory.add(item) {
                warn!(error = %e, "failed to record ambient result");
            }
        }
    }
}
