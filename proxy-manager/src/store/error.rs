//! Store error types.

use thiserror::Error;

/// Errors that can occur during store operations.
#[derive(Debug, Error)]
pub enum StoreError {
    /// SQLite rejected a statement.
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// Filesystem failure while preparing the store location.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The singleton control row (id = 1) is absent.
    #[error("control row is missing")]
    MissingControlRow,

    /// The store was closed during shutdown.
    #[error("store is closed")]
    Closed,

    /// Failure produced by a test hook.
    #[error("injected failure: {0}")]
    Injected(String),
}

/// Result type for store operations.
pub type StoreResult<T> = Result<T, StoreError>;
