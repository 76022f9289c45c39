//! Error taxonomy for the orchestrator.

use thiserror::Error;

/// Result type alias for orchestration operations.
pub type OrchestrationResult<T> = Result<T, OrchestrationError>;

/// Result type alias for provider calls.
pub type ProviderResult<T> = Result<T, ProviderError>;

/// Failures of an orchestration run. None of these are retried locally.
#[derive(Debug, Error)]
pub enum OrchestrationError {
    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("invariant violation: {0}")]
    InvariantViolation(String),

    #[error("unhealthy target: {0}")]
    UnhealthyTarget(String),

    #[error("timed out: {0}")]
    Timeout(String),

    /// An Error/Fatal provider event observed while waiting.
    #[error("fatal provider event: {0}")]
    FatalEvent(String),

    #[error("provider error: {0}")]
    Provider(#[from] ProviderError),
}

impl OrchestrationError {
    pub fn configuration(msg: impl Into<String>) -> Self {
        Self::Configuration(msg.into())
    }

    pub fn invariant(msg: impl Into<String>) -> Self {
        Self::InvariantViolation(msg.into())
    }
}

/// Pass-through failures from the remote provider.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProviderError {
    #[error("{operation} failed: {message}")]
    Api {
        operation: &'static str,
        message: String,
    },

    #[error("{operation} response is missing required field `{field}`")]
    MissingField {
        operation: &'static str,
        field: &'static str,
    },

    #[error("{operation} response has invalid `{field}`: {message}")]
    InvalidValue {
        operation: &'static str,
        field: &'static str,
        message: String,
    },

    #[error("not found: {0}")]
    NotFound(String),

    #[error("conflict: {0}")]
    Conflict(String),
}

impl ProviderError {
    pub fn api(operation: &'static str, message: impl Into<String>) -> Self {
        Self::Api {
            operation,
            message: message.into(),
        }
    }
}
