//! Error types for dayopt-core

use thiserror::Error;

use crate::offline::EndpointError;

/// Result type alias using dayopt-core's Error
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in dayopt-core operations
#[derive(Error, Debug)]
pub enum Error {
    /// Malformed action record, resolution or configuration
    #[error("Validation error: {0}")]
    Validation(String),

    /// Record not found
    #[error("Not found: {0}")]
    NotFound(String),

    /// Local persistence error
    #[error("Storage error: {0}")]
    Storage(String),

    /// `SQLite` error
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Server reconciliation endpoint error
    #[error("Endpoint error: {0}")]
    Endpoint(#[from] EndpointError),
}

impl Error {
    pub(crate) fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }
}
