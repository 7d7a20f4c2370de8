/// Domain-specific error types for the edge engine.
/// Only invalid required input and look-ahead violations surface to callers
/// of the evaluation path. Missing optional features never become errors:
/// signals absorb them as reduced confidence.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("look-ahead violation: {0}")]
    LookAhead(String),

    #[error("settlement error: {0}")]
    Settlement(String),

    #[error("config error: {0}")]
    Config(String),

    #[error("parse error: {0}")]
    Parse(String),

    #[error("database error: {0}")]
    Database(String),

    #[error("io error: {0}")]
    Io(String),

    #[error("channel closed: {0}")]
    ChannelClosed(String),

    #[error("worker failed: {0}")]
    Worker(String),
}

impl EngineError {
    /// Rejections are per-prop: the caller drops that prop and carries on.
    #[inline]
    pub fn is_rejection(&self) -> bool {
        matches!(self, EngineError::InvalidInput(_))
    }
}

impl From<serde_json::Error> for EngineError {
    fn from(e: serde_json::Error) -> Self {
        EngineError::Parse(e.to_string())
    }
}

impl From<rusqlite::Error> for EngineError {
    fn from(e: rusqlite::Error) -> Self {
        EngineError::Database(e.to_string())
    }
}

impl From<std::io::Error> for EngineError {
    fn from(e: std::io::Error) -> Self {
        EngineError::Io(e.to_string())
    }
}

impl From<tokio::task::JoinError> for EngineError {
    fn from(e: tokio::task::JoinError) -> Self {
        EngineError::Worker(e.to_string())
    }
}

pub type EngineResult<T> = Result<T, EngineError>;
