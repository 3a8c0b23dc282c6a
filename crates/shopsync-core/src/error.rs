//! Error types for shopsync-core

use thiserror::Error;

/// Result type alias using shopsync-core's Error
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in shopsync-core operations
#[derive(Error, Debug)]
pub enum Error {
    /// Network failure or timeout while reaching the remote backend
    #[error("Connectivity error: {0}")]
    Connectivity(String),

    /// Bad master password or credentials rejected by the remote
    #[error("Authentication error: {0}")]
    Auth(String),

    /// Remote backend is reachable but its schema is missing
    #[error("Schema error: {0}")]
    Schema(String),

    /// A single item could not be pushed
    #[error("Push error: {0}")]
    Push(String),

    /// Malformed payload, argument or configuration
    #[error("Validation error: {0}")]
    Validation(String),

    /// Another sync cycle holds the cycle lock
    #[error("sync already in progress")]
    SyncInProgress,

    /// Vault encryption or key derivation failure
    #[error("Crypto error: {0}")]
    Crypto(String),

    /// Record or row not found
    #[error("Not found: {0}")]
    NotFound(String),

    /// Database error
    #[error("Database error: {0}")]
    Database(String),

    /// libSQL error
    #[error("libSQL error: {0}")]
    LibSql(#[from] libsql::Error),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl Error {
    /// Whether this error aborts a whole cycle rather than a single item.
    pub const fn is_cycle_fatal(&self) -> bool {
        matches!(
            self,
            Self::Connectivity(_) | Self::Auth(_) | Self::Schema(_)
        )
    }
}

impl From<Error> for String {
    fn from(error: Error) -> Self {
        error.to_string()
    }
}
