//! Error types for daemon operations.

use thiserror::Error;

/// Errors returned by a [`ProxyDaemon`](super::ProxyDaemon).
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DaemonError {
    /// The named proxy or toxic does not exist.
    #[error("not found: {0}")]
    NotFound(String),

    /// A proxy or toxic with that name already exists.
    #[error("already exists: {0}")]
    AlreadyExists(String),

    /// The daemon answered with an unexpected status.
    #[error("daemon returned {status}: {body}")]
    Status {
        /// HTTP status code.
        status: u16,
        /// Response body, as text.
        body: String,
    },

    /// The request never produced a response.
    #[error("transport error: {0}")]
    Transport(String),

    /// The response body was not the expected JSON.
    #[error("decode error: {0}")]
    Decode(String),

    /// The daemon cannot be reached at all.
    #[error("daemon unreachable")]
    Unreachable,
}

impl DaemonError {
    /// True for [`DaemonError::NotFound`].
    pub fn is_not_found(&self) -> bool {
        matches!(self, DaemonError::NotFound(_))
    }
}

impl From<std::io::Error> for DaemonError {
    fn from(error: std::io::Error) -> Self {
        DaemonError::Transport(error.to_string())
    }
}

impl From<hyper::Error> for DaemonError {
    fn from(error: hyper::Error) -> Self {
        DaemonError::Transport(error.to_string())
    }
}

impl From<serde_json::Error> for DaemonError {
    fn from(error: serde_json::Error) -> Self {
        DaemonError::Decode(error.to_string())
    }
}

/// Result type for daemon operations.
pub type DaemonResult<T> = Result<T, DaemonError>;
