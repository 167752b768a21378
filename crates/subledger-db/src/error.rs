//! Database errors

use thiserror::Error;

/// Database errors
#[derive(Error, Debug)]
pub enum DbError {
    /// Record not found
    #[error("record not found")]
    NotFound,

    /// Uniqueness or integrity violation
    #[error("conflict: {0}")]
    Conflict(String),

    /// Backend-specific failure
    #[error("storage error: {0}")]
    Storage(String),
}

/// Result alias for repository operations
pub type DbResult<T> = Result<T, DbError>;
