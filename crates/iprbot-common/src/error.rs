//! Error types shared across the iprbot crates

use thiserror::Error;

/// Result type alias for iprbot operations
pub type Result<T> = std::result::Result<T, BotError>;

/// Main error type for iprbot
#[derive(Error, Debug)]
pub enum BotError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Run log error: {0}")]
    RunLog(String),
}

impl BotError {
    /// Create a run log format error
    pub fn run_log(msg: impl Into<String>) -> Self {
        Self::RunLog(msg.into())
    }
}
