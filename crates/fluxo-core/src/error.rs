/// Producer-facing errors for the engine API. Expected states — publishing to
/// a topic with no subscribers, unsubscribing a handle that is already gone —
/// are silent no-ops, not errors.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("invalid queue config: {0}")]
    InvalidConfig(String),

    /// The scheduler task is gone (the engine was shut down).
    #[error("queue engine is closed")]
    Closed,
}

/// Failure reported by a subscription handler. The engine treats the message
/// as opaque: it is logged at the dead-letter transition and otherwise only
/// counted.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{message}")]
pub struct HandlerError {
    message: String,
}

impl HandlerError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

impl From<&str> for HandlerError {
    fn from(message: &str) -> Self {
        Self::new(message)
    }
}

impl From<String> for HandlerError {
    fn from(message: String) -> Self {
        Self { message }
    }
}

pub type Result<T> = std::result::Result<T, EngineError>;
