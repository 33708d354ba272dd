//! Error types for the storage layer.

use thiserror::Error;

/// Result type for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;

/// Errors that can occur in storage operations.
#[derive(Debug, Error)]
pub enum StorageError {
    /// Database error from SQLite.
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// A table or column name that is not in normalized form.
    #[error("invalid identifier: {0}")]
    InvalidIdentifier(String),

    /// A name that collides with a store-managed table.
    #[error("reserved name: {0}")]
    ReservedName(String),

    /// A data table that was expected to exist does not.
    #[error("no such table: {0}")]
    MissingTable(String),

    /// The connection mutex was poisoned by a panicking writer.
    #[error("connection lock poisoned")]
    LockPoisoned,
}

impl From<tagsync_types::Error> for StorageError {
    fn from(err: tagsync_types::Error) -> Self {
        match err {
            tagsync_types::Error::InvalidIdentifier(name) => StorageError::InvalidIdentifier(name),
        }
    }
}
