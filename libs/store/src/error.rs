//! Storage error types.

use thiserror::Error;

/// Errors from persister operations.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("path not found: {0}")]
    NotFound(String),

    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
}

impl StoreError {
    /// Whether this error is a plain missing-path lookup.
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }
}
