use thiserror::Error;

#[derive(Debug, Error)]
pub enum VeskaError {
    // Lookup failures (selector, entity, thread, skill)
    #[error("not found: {0}")]
    NotFound(String),

    // Per-operation deadline exceeded
    #[error("timed out after {ms}ms: {what}")]
    Timeout { what: String, ms: u64 },

    // External collaborator down or unreachable
    #[error("unavailable: {0}")]
    Unavailable(String),

    // LLM returned unparseable output after the retry ladder
    #[error("bad response: {0}")]
    BadResponse(String),

    // Router could not decide on a skill
    #[error("ambiguous request: {0}")]
    Ambiguous(String),

    // Safety gate blocked the request
    #[error("refused: {0}")]
    Refused(String),

    #[error("cancelled")]
    Cancelled,

    // Invariant violation (cycle in a DAG, missing node, poisoned lock)
    #[error("internal error: {0}")]
    Internal(String),

    #[error("config error: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl VeskaError {
    /// Timeout helper that keeps call sites terse.
    pub fn timeout(what: impl Into<String>, ms: u64) -> Self {
        Self::Timeout {
            what: what.into(),
            ms,
        }
    }
}

pub type Result<T> = std::result::Result<T, VeskaError>;
