use thiserror::Error;

use crate::LogKey;

/// Errors that can occur when interacting with the saga log.
#[derive(Debug, Error)]
pub enum JournalError {
    /// A record with the same (execution, step, state) key already exists.
    /// Each signal is consumed at most once, so the second append is rejected.
    #[error("Duplicate log record: {0}")]
    DuplicateRecord(LogKey),

    /// A stored record could not be decoded.
    #[error("Corrupt log record: {0}")]
    Corrupt(String),

    /// A database error occurred.
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// A database migration error occurred.
    #[error("Migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),
}

/// Result type for saga log operations.
pub type Result<T> = std::result::Result<T, JournalError>;
