//! Error types for cmdgate-engine

use thiserror::Error;

pub type Result<T> = std::result::Result<T, EngineError>;

#[derive(Error, Debug)]
pub enum EngineError {
    #[error("Unknown command: {0}")]
    UnknownCommand(String),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Command not allowed: {0}")]
    CommandNotAllowed(String),

    /// Failure carrying an explicit wire status, passed through unchanged.
    #[error("{message}")]
    Service {
        status: u16,
        reason: String,
        message: String,
    },

    #[error("Command execution failed: {0}")]
    ExecutionFailed(String),

    #[error("Command execution timed out after {0}ms")]
    Timeout(u64),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("{0}")]
    Other(String),
}

impl EngineError {
    /// Build a structured service error
    pub fn service(status: u16, reason: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Service {
            status,
            reason: reason.into(),
            message: message.into(),
        }
    }
}
