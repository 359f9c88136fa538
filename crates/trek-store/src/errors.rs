//! Store error types.

use thiserror::Error;

/// Convenient result alias for store operations.
pub type Result<T> = std::result::Result<T, StoreError>;

/// Errors from the state store.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The thread does not exist.
    #[error("thread not found: {0}")]
    ThreadNotFound(String),

    /// The persisted payload was written by a newer schema.
    #[error("unsupported state schema version {found} (supported up to {supported})")]
    UnsupportedSchema {
        /// Version found in the row.
        found: u32,
        /// Highest version this build understands.
        supported: u32,
    },

    /// Underlying SQLite failure.
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// Connection pool failure.
    #[error("connection pool error: {0}")]
    Pool(#[from] r2d2::Error),

    /// State payload failed to (de)serialize.
    #[error("state serialization error: {0}")]
    Serde(#[from] serde_json::Error),

    /// Internal invariant violation (poisoned lock, etc).
    #[error("internal store error: {0}")]
    Internal(String),
}
