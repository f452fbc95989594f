//! Shared state store.
//!
//! - **EventStore**: trait over the control row and the event queue
//! - **SqliteStore**: the production store, a WAL-mode SQLite file
//! - **InMemoryStore**: in-memory implementation for testing

pub mod error;
pub mod memory;
pub mod sqlite;
pub mod traits;
pub mod types;

// Re-exports
pub use error::{StoreError, StoreResult};
pub use memory::InMemoryStore;
pub use sqlite::SqliteStore;
pub use traits::EventStore;
pub use types::{ControlState, Event, EventKind, INJECT_CHANGED};
