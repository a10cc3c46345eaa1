//! Error types for curio-core

use thiserror::Error;

/// Result type alias using curio-core's Error
pub type Result<T> = std::result::Result<T, Error>;

/// Classified failure from the remote document store.
///
/// Classification happens at the collaborator boundary so the queue
/// processor never has to inspect error strings to decide whether an
/// operation is worth retrying.
#[derive(Error, Debug)]
pub enum RemoteError {
    /// Retryable failure (network drop, timeout, 5xx, throttling)
    #[error("Transient remote failure: {0}")]
    Transient(String),

    /// Non-retryable failure (rejected request, schema violation)
    #[error("Permanent remote failure: {0}")]
    Permanent(String),

    /// Target entity does not exist on the remote
    #[error("Remote entity not found: {0}")]
    NotFound(String),
}

impl RemoteError {
    /// Whether a retry could plausibly succeed.
    pub const fn is_transient(&self) -> bool {
        matches!(self, Self::Transient(_))
    }
}

/// Errors that can occur in curio-core operations
#[derive(Error, Debug)]
pub enum Error {
    /// libSQL error
    #[error("libSQL error: {0}")]
    LibSql(#[from] libsql::Error),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Remote store failure that escaped classification handling
    #[error("Remote store error: {0}")]
    Remote(#[from] RemoteError),

    /// Invalid input
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Persisted envelope written by an incompatible version
    #[error("Unsupported schema version {found} (expected {expected})")]
    SchemaVersion { found: u32, expected: u32 },
}
