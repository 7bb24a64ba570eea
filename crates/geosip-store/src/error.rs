//! Store error types.

use std::io;
use thiserror::Error;

/// Store error type.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The remote backend could not be reached (network, timeout, TLS).
    #[error("remote backend unreachable: {0}")]
    Transient(String),

    /// The remote backend answered with an error status.
    #[error("remote backend error {status}: {message}")]
    Remote { status: u16, message: String },

    /// Record or user not found.
    #[error("not found: {0}")]
    NotFound(String),

    /// Key already present on insert.
    #[error("already exists: {0}")]
    AlreadyExists(String),

    /// The entry may not be removed.
    #[error("protected: {0}")]
    Protected(String),

    /// Local SQLite failure.
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// Document (de)serialization failure.
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Bad or missing configuration.
    #[error("configuration error: {0}")]
    Config(String),

    /// Other error.
    #[error("{0}")]
    Other(String),
}

impl StoreError {
    /// Create a NotFound error.
    pub fn not_found(key: impl Into<String>) -> Self {
        Self::NotFound(key.into())
    }

    /// Create an AlreadyExists error.
    pub fn already_exists(key: impl Into<String>) -> Self {
        Self::AlreadyExists(key.into())
    }

    /// Create a Protected error.
    pub fn protected(key: impl Into<String>) -> Self {
        Self::Protected(key.into())
    }

    /// Create an Other error.
    pub fn other(msg: impl Into<String>) -> Self {
        Self::Other(msg.into())
    }

    /// True for failures of the remote backend itself: the class of errors a
    /// read may recover from by asking the local backend instead.
    pub fn is_transient(&self) -> bool {
        matches!(self, StoreError::Transient(_) | StoreError::Remote { .. })
    }
}

impl From<reqwest::Error> for StoreError {
    fn from(e: reqwest::Error) -> Self {
        match e.status() {
            Some(status) => StoreError::Remote {
                status: status.as_u16(),
                message: e.to_string(),
            },
            None => StoreError::Transient(e.to_string()),
        }
    }
}

/// Store result type.
pub type StoreResult<T> = Result<T, StoreError>;
