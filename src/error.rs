//! Error types for tokenmeter

use thiserror::Error;

/// Result type alias for tokenmeter operations
pub type MeterResult<T> = Result<T, MeterError>;

/// Main error type for tokenmeter
#[derive(Error, Debug, Clone)]
pub enum MeterError {
    /// Configuration related errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// Errors returned by the underlying LLM client
    #[error("LLM error: {0}")]
    Llm(String),

    /// IO errors (report persistence)
    #[error("IO error: {0}")]
    Io(String),

    /// JSON serialization/deserialization errors
    #[error("JSON error: {0}")]
    Json(String),

    /// Invalid input errors
    #[error("Invalid input: {0}")]
    InvalidInput(String),
}

impl MeterError {
    /// Create a new configuration error
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }

    /// Create a new LLM error
    pub fn llm(message: impl Into<String>) -> Self {
        Self::Llm(message.into())
    }

    /// Create a new invalid input error
    pub fn invalid_input(message: impl Into<String>) -> Self {
        Self::InvalidInput(message.into())
    }
}

impl From<std::io::Error> for MeterError {
    fn from(error: std::io::Error) -> Self {
        Self::Io(error.to_string())
    }
}

impl From<serde_json::Error> for MeterError {
    fn from(error: serde_json::Error) -> Self {
        Self::Json(error.to_string())
    }
}
