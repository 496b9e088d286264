use std::io;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum CliError {
    #[error(transparent)]
    Core(#[from] dayopt_core::Error),
    #[error(transparent)]
    Io(#[from] io::Error),
    #[error(transparent)]
    Serialization(#[from] serde_json::Error),
    #[error("Invalid JSON payload: {0}")]
    InvalidPayload(String),
    #[error("Invalid timestamp {0:?}: expected RFC 3339")]
    InvalidTimestamp(String),
    #[error("ID cannot be empty")]
    EmptyId,
    #[error("No queued action matches id/prefix: {0}")]
    ActionNotFound(String),
    #[error("No open conflict matches id/prefix: {0}")]
    ConflictNotFound(String),
    #[error("{0}")]
    AmbiguousId(String),
    #[error("Configuration error: {0}")]
    Config(String),
    #[error(
        "Sync is not configured. Run `dayopt config set --endpoint-url <URL>` or set DAYOPT_SYNC_ENDPOINT."
    )]
    SyncNotConfigured,
}
