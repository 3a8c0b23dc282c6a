use std::io;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum CliError {
    #[error(transparent)]
    Core(#[from] shopsync_core::Error),
    #[error(transparent)]
    Io(#[from] io::Error),
    #[error(transparent)]
    Serialization(#[from] serde_json::Error),
    #[error("{0}")]
    Command(String),
    #[error("Invalid JSON arguments: {0}")]
    InvalidArgs(String),
    #[error("Master password cannot be empty")]
    EmptyPassword,
    #[error(
        "Sync is not configured. Run `shopsync config save --url <URL> --anon-key <KEY> --service-key <KEY>` first."
    )]
    SyncNotConfigured,
}
