//! In-memory event store for testing.

use std::cell::{Cell, RefCell};

use async_trait::async_trait;

use crate::store::error::{StoreError, StoreResult};
use crate::store::traits::EventStore;
use crate::store::types::{ControlState, Event, INJECT_CHANGED};

#[derive(Debug)]
struct Control {
    count: i64,
    data_size: i64,
    inject: i64,
}

/// Event store held in memory.
///
/// Reproduces the change trigger of the SQLite schema: [`set_inject`]
/// appends an `inject_changed` event whenever the value changes. Failure
/// hooks let tests drive the reconciler's error paths.
///
/// [`set_inject`]: InMemoryStore::set_inject
#[derive(Debug)]
pub struct InMemoryStore {
    control: RefCell<Option<Control>>,
    events: RefCell<Vec<Event>>,
    next_id: Cell<i64>,
    closed: Cell<bool>,
    failing_lists: Cell<u32>,
    failing_reads: Cell<u32>,
    failing_marks: Cell<u32>,
    list_calls: Cell<u32>,
}

impl InMemoryStore {
    /// Create a store; the control row appears on [`EventStore::initialize`].
    pub fn new() -> Self {
        Self {
            control: RefCell::new(None),
            events: RefCell::new(Vec::new()),
            next_id: Cell::new(1),
            closed: Cell::new(false),
            failing_lists: Cell::new(0),
            failing_reads: Cell::new(0),
            failing_marks: Cell::new(0),
            list_calls: Cell::new(0),
        }
    }

    /// Update `inject`, appending an event if the value changed.
    pub fn set_inject(&self, inject: i64) {
        let mut control = self.control.borrow_mut();
        let Some(control) = control.as_mut() else {
            return;
        };
        if control.inject == inject {
            return;
        }
        let id = self.next_id.get();
        self.next_id.set(id + 1);
        self.events.borrow_mut().push(Event {
            id,
            event_type: INJECT_CHANGED.to_string(),
            old_value: control.inject,
            new_value: inject,
            timestamp: format!("{id:020}"),
            processed: 0,
        });
        control.inject = inject;
    }

    /// Update the progress columns.
    pub fn set_progress(&self, count: i64, data_size: i64) {
        if let Some(control) = self.control.borrow_mut().as_mut() {
            control.count = count;
            control.data_size = data_size;
        }
    }

    /// Append an arbitrary event row.
    pub fn push_event(&self, event_type: &str, old_value: i64, new_value: i64) -> i64 {
        let id = self.next_id.get();
        self.next_id.set(id + 1);
        self.events.borrow_mut().push(Event {
            id,
            event_type: event_type.to_string(),
            old_value,
            new_value,
            timestamp: format!("{id:020}"),
            processed: 0,
        });
        id
    }

    /// Make the next `n` event listings fail. `u32::MAX` fails forever.
    pub fn fail_list_events(&self, n: u32) {
        self.failing_lists.set(n);
    }

    /// Make the next `n` control reads fail.
    pub fn fail_read_control(&self, n: u32) {
        self.failing_reads.set(n);
    }

    /// Make the next `n` `mark_processed` calls fail.
    pub fn fail_mark_processed(&self, n: u32) {
        self.failing_marks.set(n);
    }

    /// Snapshot of the event table.
    pub fn events(&self) -> Vec<Event> {
        self.events.borrow().clone()
    }

    /// Number of `list_pending_events` calls, failed ones included.
    pub fn list_calls(&self) -> u32 {
        self.list_calls.get()
    }

    /// True once [`EventStore::close`] ran.
    pub fn is_closed(&self) -> bool {
        self.closed.get()
    }

    fn ensure_open(&self) -> StoreResult<()> {
        if self.closed.get() {
            Err(StoreError::Closed)
        } else {
            Ok(())
        }
    }
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

fn take_failure(counter: &Cell<u32>, what: &str) -> StoreResult<()> {
    match counter.get() {
        0 => Ok(()),
        u32::MAX => Err(StoreError::Injected(what.to_string())),
        n => {
            counter.set(n - 1);
            Err(StoreError::Injected(what.to_string()))
        }
    }
}

#[async_trait(?Send)]
impl EventStore for InMemoryStore {
    async fn initialize(&self) -> StoreResult<()> {
        self.ensure_open()?;
        let mut control = self.control.borrow_mut();
        if control.is_none() {
            *control = Some(Control {
                count: 0,
                data_size: 1,
                inject: 0,
            });
        }
        Ok(())
    }

    async fn read_control(&self) -> StoreResult<ControlState> {
        self.ensure_open()?;
        take_failure(&self.failing_reads, "read_control")?;
        self.control
            .borrow()
            .as_ref()
            .map(|c| ControlState {
                count: c.count,
                data_size: c.data_size,
            })
            .ok_or(StoreError::MissingControlRow)
    }

    async fn list_pending_events(&self) -> StoreResult<Vec<Event>> {
        self.list_calls.set(self.list_calls.get() + 1);
        self.ensure_open()?;
        take_failure(&self.failing_lists, "list_pending_events")?;
        let mut events = self.events.borrow().clone();
        events.sort_by(|a, b| a.timestamp.cmp(&b.timestamp).then(a.id.cmp(&b.id)));
        Ok(events)
    }

    async fn mark_processed(&self, event_id: i64) -> StoreResult<()> {
        self.ensure_open()?;
        take_failure(&self.failing_marks, "mark_processed")?;
        if let Some(event) = self
            .events
            .borrow_mut()
            .iter_mut()
            .find(|e| e.id == event_id)
        {
            event.processed = 1;
        }
        Ok(())
    }

    async fn delete_event(&self, event_id: i64) -> StoreResult<()> {
        self.ensure_open()?;
        self.events.borrow_mut().retain(|e| e.id != event_id);
        Ok(())
    }

    async fn close(&self) -> StoreResult<()> {
        self.closed.set(true);
        Ok(())
    }
}
