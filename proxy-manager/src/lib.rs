//! # proxy-manager
//!
//! Fault-injection controller for a fleet of Toxiproxy proxies.
//!
//! A test harness flips `inject` in a shared SQLite store; a trigger records
//! every flip as an event row. The controller drains those events and
//! installs or removes one timeout toxic per proxy, then tears every proxy
//! down when the harness reports `count == data_size`.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                         main / app                          │
//! │   tracing setup • signal watcher • health server (/health)  │
//! ├─────────────────────────────────────────────────────────────┤
//! │                        reconciler                           │
//! │   ensure_proxies • process_events • inject / remove passes  │
//! │   once-only shutdown (ShutdownGuard + CancellationToken)    │
//! ├──────────────────────────┬──────────────────────────────────┤
//! │  store (EventStore)      │       daemon (ProxyDaemon)       │
//! │  • SqliteStore (WAL)     │       • ToxiproxyClient (hyper)  │
//! │  • InMemoryStore         │       • InMemoryDaemon           │
//! ├──────────────────────────┴──────────────────────────────────┤
//! │        retry • providers (Time, Random) • config            │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! Every store and daemon call goes through [`retry()`] with the configured
//! [`RetryPolicy`]. Time and randomness come from [`Providers`], so tests run
//! on a paused clock with a seeded generator.

#![deny(missing_docs)]
#![cfg_attr(not(test), deny(clippy::unwrap_used))]

pub mod app;
pub mod config;
pub mod daemon;
pub mod error;
pub mod health;
pub mod providers;
pub mod reconciler;
pub mod retry;
pub mod store;

pub use config::{default_proxies, ConfigError, ControllerConfig, ProxySpec};
pub use daemon::{DaemonError, InMemoryDaemon, Proxy, ProxyDaemon, Toxic, ToxiproxyClient};
pub use error::ControllerError;
pub use providers::{
    ChaChaRandomProvider, Providers, RandomProvider, TimeProvider, TokioProviders,
    TokioTimeProvider,
};
pub use reconciler::{PassKind, PassReport, Reconciler, RunOutcome, ShutdownReason};
pub use retry::{retry, RetryError, RetryPolicy};
pub use store::{ControlState, Event, EventKind, EventStore, InMemoryStore, SqliteStore, StoreError};
