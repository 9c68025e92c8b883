//! Store error types

use thiserror::Error;

/// Persistence errors
#[derive(Debug, Error)]
pub enum StoreError {
    /// Underlying SQLite failure
    #[error("database error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// A unique key was violated (duplicate pair, duplicate block entry)
    #[error("conflict: {0}")]
    Conflict(String),

    /// The requested row does not exist
    #[error("not found: {0}")]
    NotFound(&'static str),

    /// A stored JSON column could not be parsed
    #[error("corrupt record: {0}")]
    Corrupt(#[from] serde_json::Error),

    /// Schema migration failed
    #[error("migration failed: {0}")]
    Migration(String),

    /// Filesystem problem (backup target, database directory)
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl StoreError {
    /// Whether the error is a unique-key conflict
    pub fn is_conflict(&self) -> bool {
        matches!(self, Self::Conflict(_))
    }
}

/// Map SQLite constraint violations to [`StoreError::Conflict`]
pub(crate) fn constraint_to_conflict(err: rusqlite::Error, what: &str) -> StoreError {
    match &err {
        rusqlite::Error::SqliteFailure(code, _)
            if code.code == rusqlite::ErrorCode::ConstraintViolation =>
        {
            StoreError::Conflict(what.to_string())
        }
        _ => StoreError::Sqlite(err),
    }
}

/// Result type for store operations
pub type Result<T> = std::result::Result<T, StoreError>;
