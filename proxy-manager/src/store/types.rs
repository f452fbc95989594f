//! Rows read from the shared store.

/// Event type written by the `inject` change trigger.
pub const INJECT_CHANGED: &str = "inject_changed";

/// The singleton control row.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ControlState {
    /// External progress counter.
    pub count: i64,

    /// Target of `count`.
    pub data_size: i64,
}

impl ControlState {
    /// True once external progress has reached its target.
    pub fn is_complete(&self) -> bool {
        self.count == self.data_size
    }
}

/// A row of the `events` table.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Event {
    /// Monotonic row id.
    pub id: i64,

    /// Event type, `inject_changed` for trigger-written rows.
    pub event_type: String,

    /// `inject` before the update.
    pub old_value: i64,

    /// `inject` after the update.
    pub new_value: i64,

    /// Insertion time as stored by SQLite (`YYYY-MM-DD HH:MM:SS`).
    pub timestamp: String,

    /// 1 once the reconciler has applied the event.
    pub processed: i64,
}

/// What an event asks the reconciler to do.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum EventKind {
    /// `inject` flipped to 1: install toxics.
    Inject,

    /// `inject` flipped to anything else: clear toxics.
    Remove,

    /// Not written by the inject trigger.
    Unknown(String),
}

impl Event {
    /// Classify the event.
    pub fn kind(&self) -> EventKind {
        if self.event_type != INJECT_CHANGED {
            return EventKind::Unknown(self.event_type.clone());
        }
        if self.new_value == 1 {
            EventKind::Inject
        } else {
            EventKind::Remove
        }
    }

    /// False until the reconciler marks the row.
    pub fn is_pending(&self) -> bool {
        self.processed == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn event(event_type: &str, new_value: i64) -> Event {
        Event {
            id: 1,
            event_type: event_type.to_string(),
            old_value: 1 - new_value,
            new_value,
            timestamp: "2024-01-01 00:00:00".to_string(),
            processed: 0,
        }
    }

    #[test]
    fn classifies_inject_events() {
        assert_eq!(event(INJECT_CHANGED, 1).kind(), EventKind::Inject);
        assert_eq!(event(INJECT_CHANGED, 0).kind(), EventKind::Remove);
        assert_eq!(
            event("count_changed", 1).kind(),
            EventKind::Unknown("count_changed".to_string())
        );
    }

    #[test]
    fn completion_requires_equality() {
        assert!(ControlState { count: 5, data_size: 5 }.is_complete());
        assert!(!ControlState { count: 0, data_size: 1 }.is_complete());
    }
}
