//! Common error types for Quillvault.

use thiserror::Error;

/// Top-level error type for Quillvault operations.
#[derive(Debug, Error)]
pub enum Error {
    /// Network or transport failure (connection errors, 5xx responses).
    #[error("Network error: {0}")]
    Network(String),

    /// Authentication rejected by the server.
    #[error("Authentication failed: {0}")]
    Auth(String),

    /// Conditional write lost the race: the stored ETag no longer matches.
    #[error("Precondition failed: {0}")]
    PreconditionFailed(String),

    /// A conditional header was required but missing.
    #[error("Precondition required: {0}")]
    PreconditionRequired(String),

    /// Path violates the vault path constraints.
    #[error("Invalid path: {0}")]
    InvalidPath(String),

    /// Invalid input provided.
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Resource not found.
    #[error("Not found: {0}")]
    NotFound(String),

    /// Object store operation failed.
    #[error("Storage error: {0}")]
    Storage(String),

    /// A queued transfer failed after exhausting its retries.
    #[error("Transfer failed: {0}")]
    Transfer(String),

    /// Local vault operation failed.
    #[error("Vault error: {0}")]
    Vault(String),

    /// I/O operation failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization or deserialization failed.
    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl Error {
    /// Whether an operation failing with this error is worth retrying.
    ///
    /// Auth and validation failures are deterministic; retrying them only
    /// repeats the rejection.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Error::Network(_) | Error::Io(_) | Error::Storage(_) | Error::Transfer(_)
        )
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::Serialization(err.to_string())
    }
}

/// Result type alias using the common Error.
pub type Result<T> = std::result::Result<T, Error>;
