//! Store error types

use std::io;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Duplicate key: {0}")]
    DuplicateKey(String),

    #[error("Index conflict: {0}")]
    IndexConflict(String),

    #[error("Invalid query: {0}")]
    Query(String),

    #[error("Invalid collection name: {0}")]
    InvalidName(String),

    #[error("Corrupted collection file {path} at offset {offset}: {reason}")]
    CorruptedLog {
        path: PathBuf,
        offset: u64,
        reason: String,
    },

    #[error("Database is closed")]
    Closed,

    #[error("Cursor is closed")]
    CursorClosed,
}

impl StoreError {
    /// Stable machine-readable code for this error
    pub fn code(&self) -> &'static str {
        match self {
            StoreError::Io(_) => "io",
            StoreError::Serialization(_) => "serialization",
            StoreError::DuplicateKey(_) => "duplicate_key",
            StoreError::IndexConflict(_) => "index_conflict",
            StoreError::Query(_) => "query",
            StoreError::InvalidName(_) => "invalid_name",
            StoreError::CorruptedLog { .. } => "corrupted_log",
            StoreError::Closed => "closed",
            StoreError::CursorClosed => "cursor_closed",
        }
    }
}

impl From<bson::ser::Error> for StoreError {
    fn from(err: bson::ser::Error) -> Self {
        StoreError::Serialization(err.to_string())
    }
}

impl From<bson::de::Error> for StoreError {
    fn from(err: bson::de::Error) -> Self {
        StoreError::Serialization(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, StoreError>;
