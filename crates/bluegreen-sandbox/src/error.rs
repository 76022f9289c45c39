//! Storage failures inside the sandbox.
//!
//! They surface to the engine as `ProviderError::Api`, the same way a
//! remote platform outage would.

use thiserror::Error;

use bluegreen_core::ProviderError;

/// Result type alias for sandbox store operations.
pub type SandboxResult<T> = Result<T, SandboxError>;

/// redb failures, by the step that failed.
#[derive(Debug, Error)]
pub enum SandboxError {
    #[error("failed to open database: {0}")]
    Open(String),

    #[error("transaction error: {0}")]
    Transaction(String),

    #[error("table error: {0}")]
    Table(String),

    #[error("read error: {0}")]
    Read(String),

    #[error("write error: {0}")]
    Write(String),

    /// A record could not be encoded to or decoded from JSON.
    #[error("record codec error: {0}")]
    Codec(String),
}

impl From<SandboxError> for ProviderError {
    fn from(err: SandboxError) -> Self {
        ProviderError::api("sandbox", err.to_string())
    }
}
