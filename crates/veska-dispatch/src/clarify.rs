use futures::future::BoxFuture;

use veska_core::error::Result;
use veska_core::types::TaskSource;

/// Asks the user a follow-up question through the channel the request came
/// from. `None` means the channel produced no answer (timeout, EOF, silence).
pub trait Clarifier: Send + Sync + 'static {
    fn ask(&self, question: &str, source: TaskSource) -> BoxFuture<'_, Result<Option<String>>>;
}

/// Clarifier for channels that cannot ask back (ambient runs, tests).
pub struct NoClarifier;

impl Clarifier for NoClarifier {
    fn ask(&self, _question: &str, _source: TaskSource) -> BoxFuture<'_, Result<Option<String>>> {
        Box::pin(async { Ok(None) })
    }
}

/// Fixed-answer clarifier, used by tests and canned flows.
pub struct StaticClarifier {
    answer: Option<String>,
}

impl StaticClarifier {
    pub fn new(answer: Option<&str>) -> Self {
        Self {
            answer: answer.map(String::from),
        }
    }
}

impl Clarifier for StaticClarifier {
    fn ask(&self, _question: &str, _source: TaskSource) -> BoxFuture<'_, Result<Option<String>>> {
        let answer = self.answer.clone();
        Box::pin(async move { Ok(answer) })
    }
}
