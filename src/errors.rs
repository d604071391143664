use std::time::Duration;
use thiserror::Error;

/// Error taxonomy shared by every component of the research desk
#[derive(Error, Debug)]
pub enum DeskError {
    #[error("Market data provider error: {message}")]
    Provider { message: String },

    #[error("Rate limit exceeded, retry after {retry_after} seconds")]
    RateLimit { retry_after: u64 },

    #[error("Completion error: {message}")]
    Completion { message: String },

    #[error("Embedding error: {message}")]
    Embedding { message: String },

    #[error("Persistence error: {message}")]
    Persistence { message: String },

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Validation error: {field} - {message}")]
    Validation { field: String, message: String },

    #[error("Timeout error: operation took longer than {timeout_seconds}s")]
    Timeout { timeout_seconds: u64 },

    #[error("Operation cancelled")]
    Cancelled,

    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Result type for desk operations
pub type DeskResult<T> = Result<T, DeskError>;

impl DeskError {
    /// Check if error is retryable
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            DeskError::Network(_) | DeskError::RateLimit { .. } | DeskError::Timeout { .. }
        )
    }

    /// Wait the server asked for before the next attempt, on top of backoff
    pub fn retry_delay(&self) -> Option<Duration> {
        match self {
            DeskError::RateLimit { retry_after } => Some(Duration::from_secs(*retry_after)),
            _ => None,
        }
    }

    pub fn provider<S: Into<String>>(message: S) -> Self {
        DeskError::Provider {
            message: message.into(),
        }
    }

    pub fn completion<S: Into<String>>(message: S) -> Self {
        DeskError::Completion {
            message: message.into(),
        }
    }

    pub fn embedding<S: Into<String>>(message: S) -> Self {
        DeskError::Embedding {
            message: message.into(),
        }
    }

    pub fn persistence<S: Into<String>>(message: S) -> Self {
        DeskError::Persistence {
            message: message.into(),
        }
    }

    /// Create a validation error with field context
    pub fn validation_error<S: Into<String>>(field: S, message: S) -> Self {
        DeskError::Validation {
            field: field.into(),
            message: message.into(),
        }
    }
}
