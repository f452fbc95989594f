//! Proxy daemon capability.
//!
//! - **ProxyDaemon**: the operations the reconciler performs on the daemon
//! - **ToxiproxyClient**: HTTP client for a real Toxiproxy instance
//! - **InMemoryDaemon**: in-process fake with failure injection for testing

pub mod error;
pub mod http;
pub mod memory;
pub mod traits;
pub mod types;

// Re-exports
pub use error::{DaemonError, DaemonResult};
pub use http::ToxiproxyClient;
pub use memory::{DaemonOp, InMemoryDaemon};
pub use traits::ProxyDaemon;
pub use types::{
    Proxy, Stream, Toxic, ToxicDirection, TIMEOUT_TOXIC_TYPE, TOXIC_NAMES, TOXIC_TIMEOUT_DOWN,
    TOXIC_TIMEOUT_UP,
};
