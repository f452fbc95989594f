//! Event store trait abstraction.

use async_trait::async_trait;

use crate::store::error::StoreResult;
use crate::store::types::{ControlState, Event};

/// Gateway to the control row and the event queue.
///
/// Callers wrap every method in [`retry`](crate::retry::retry); implementations
/// should report failures rather than retry internally.
#[async_trait(?Send)]
pub trait EventStore {
    /// Create the schema, the singleton control row and the change trigger.
    ///
    /// Idempotent: running it against an initialized store changes nothing.
    async fn initialize(&self) -> StoreResult<()>;

    /// Read `count` and `data_size` from the control row.
    ///
    /// # Returns
    ///
    /// - `Err(StoreError::MissingControlRow)` if the row does not exist
    async fn read_control(&self) -> StoreResult<ControlState>;

    /// All event rows, oldest first.
    async fn list_pending_events(&self) -> StoreResult<Vec<Event>>;

    /// Set `processed = 1` on an event.
    async fn mark_processed(&self, event_id: i64) -> StoreResult<()>;

    /// Delete an event row.
    async fn delete_event(&self, event_id: i64) -> StoreResult<()>;

    /// Release the underlying resources. Later calls fail with
    /// `StoreError::Closed`; closing twice is a no-op.
    async fn close(&self) -> StoreResult<()>;
}
