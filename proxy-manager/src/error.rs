//! Top-level error type of the controller.

use thiserror::Error;

use crate::config::ConfigError;
use crate::daemon::DaemonError;
use crate::retry::RetryError;
use crate::store::StoreError;

/// Errors that terminate the controller with a non-zero exit status.
#[derive(Debug, Error)]
pub enum ControllerError {
    /// The configuration violates an invariant.
    #[error("invalid configuration: {0}")]
    Config(#[from] ConfigError),

    /// The store could not be opened.
    #[error("failed to open store: {0}")]
    StoreOpen(#[source] RetryError<StoreError>),

    /// The schema could not be created.
    #[error("failed to initialize store: {0}")]
    StoreInit(#[source] RetryError<StoreError>),

    /// A configured proxy could not be created at startup.
    #[error("failed to create proxy {name}: {source}")]
    ProxyCreation {
        /// Proxy that could not be created.
        name: String,
        /// Final error of the retry chain.
        #[source]
        source: RetryError<DaemonError>,
    },

    /// The control row could not be read.
    #[error("failed to fetch state of store: {0}")]
    ControlRead(#[source] RetryError<StoreError>),

    /// Too many consecutive ticks failed to list events.
    #[error("error limit reached after {count} failed event fetches: {last}")]
    ErrorLimit {
        /// Consecutive failures observed.
        count: u32,
        /// Error of the last failed fetch.
        #[source]
        last: RetryError<StoreError>,
    },

    /// The health endpoint could not be bound.
    #[error("health server error: {0}")]
    Health(#[from] std::io::Error),
}
