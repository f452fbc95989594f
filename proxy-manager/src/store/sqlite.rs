//! SQLite-backed event store.
//!
//! The database is shared with the test harness, which only ever updates the
//! control row. Writes to `control.inject` are turned into `events` rows by a
//! trigger, so the controller never races the writer for the intent itself.

use std::cell::RefCell;
use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use rusqlite::{params, Connection, OptionalExtension, Row};

use crate::store::error::{StoreError, StoreResult};
use crate::store::traits::EventStore;
use crate::store::types::{ControlState, Event};

/// How long a statement waits on a lock held by an external writer.
const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

const SCHEMA: &str = "
    CREATE TABLE IF NOT EXISTS control (
        id INTEGER PRIMARY KEY,
        count INTEGER DEFAULT 0,
        data_size INTEGER DEFAULT 1,
        inject INTEGER DEFAULT 0
    );

    INSERT OR IGNORE INTO control (id, count, data_size, inject)
    VALUES (1, 0, 1, 0);

    CREATE TABLE IF NOT EXISTS events (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        event_type TEXT NOT NULL,
        old_value INTEGER,
        new_value INTEGER,
        timestamp DATETIME DEFAULT CURRENT_TIMESTAMP,
        processed INTEGER DEFAULT 0
    );

    CREATE TRIGGER IF NOT EXISTS inject_change_trigger
    AFTER UPDATE OF inject ON control
    WHEN NEW.inject != OLD.inject
    BEGIN
        INSERT INTO events (event_type, old_value, new_value)
        VALUES ('inject_changed', OLD.inject, NEW.inject);
    END;
";

/// Event store over a single SQLite file in WAL mode.
#[derive(Debug)]
pub struct SqliteStore {
    path: PathBuf,
    conn: RefCell<Option<Connection>>,
}

impl SqliteStore {
    /// Open (creating on demand) the database at `path`.
    ///
    /// Missing parent directories are created. The schema is not touched
    /// until [`EventStore::initialize`] runs.
    pub fn open(path: impl AsRef<Path>) -> StoreResult<Self> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let conn = Connection::open(&path)?;
        conn.busy_timeout(BUSY_TIMEOUT)?;
        tracing::debug!(path = %path.display(), "opened store");
        Ok(Self {
            path,
            conn: RefCell::new(Some(conn)),
        })
    }

    /// Open a private in-memory database.
    pub fn open_in_memory() -> StoreResult<Self> {
        let conn = Connection::open_in_memory()?;
        Ok(Self {
            path: PathBuf::from(":memory:"),
            conn: RefCell::new(Some(conn)),
        })
    }

    /// Location of the database file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Update `control.inject` the way the harness does; fires the trigger
    /// when the value changes.
    pub fn set_inject(&self, inject: i64) -> StoreResult<()> {
        self.with_conn(|conn| {
            conn.execute("UPDATE control SET inject = ?1 WHERE id = 1", params![inject])
                .map(|_| ())
        })
    }

    /// Update the progress columns of the control row.
    pub fn set_progress(&self, count: i64, data_size: i64) -> StoreResult<()> {
        self.with_conn(|conn| {
            conn.execute(
                "UPDATE control SET count = ?1, data_size = ?2 WHERE id = 1",
                params![count, data_size],
            )
            .map(|_| ())
        })
    }

    /// Current value of `control.inject`.
    pub fn inject(&self) -> StoreResult<i64> {
        self.with_conn(|conn| {
            conn.query_row("SELECT inject FROM control WHERE id = 1", [], |row| {
                row.get(0)
            })
        })
    }

    fn with_conn<T>(
        &self,
        f: impl FnOnce(&mut Connection) -> rusqlite::Result<T>,
    ) -> StoreResult<T> {
        let mut guard = self.conn.borrow_mut();
        let conn = guard.as_mut().ok_or(StoreError::Closed)?;
        Ok(f(conn)?)
    }
}

fn event_from_row(row: &Row<'_>) -> rusqlite::Result<Event> {
    Ok(Event {
        id: row.get(0)?,
        event_type: row.get(1)?,
        old_value: row.get::<_, Option<i64>>(2)?.unwrap_or(0),
        new_value: row.get::<_, Option<i64>>(3)?.unwrap_or(0),
        timestamp: row.get::<_, Option<String>>(4)?.unwrap_or_default(),
        processed: row.get::<_, Option<i64>>(5)?.unwrap_or(0),
    })
}

#[async_trait(?Send)]
impl EventStore for SqliteStore {
    async fn initialize(&self) -> StoreResult<()> {
        self.with_conn(|conn| {
            let mode: String =
                conn.pragma_update_and_check(None, "journal_mode", "WAL", |row| row.get(0))?;
            tracing::debug!(journal_mode = %mode, "journal mode set");
            conn.execute_batch(SCHEMA)
        })
    }

    async fn read_control(&self) -> StoreResult<ControlState> {
        let state = self.with_conn(|conn| {
            conn.query_row(
                "SELECT count, data_size FROM control WHERE id = 1",
                [],
                |row| {
                    Ok(ControlState {
                        count: row.get::<_, Option<i64>>(0)?.unwrap_or(0),
                        data_size: row.get::<_, Option<i64>>(1)?.unwrap_or(1),
                    })
                },
            )
            .optional()
        })?;
        state.ok_or(StoreError::MissingControlRow)
    }

    async fn list_pending_events(&self) -> StoreResult<Vec<Event>> {
        self.with_conn(|conn| {
            let tx = conn.transaction()?;
            let events = {
                let mut stmt = tx.prepare(
                    "SELECT id, event_type, old_value, new_value, timestamp, processed
                     FROM events
                     ORDER BY timestamp ASC, id ASC",
                )?;
                let rows = stmt.query_map([], event_from_row)?;
                rows.collect::<rusqlite::Result<Vec<_>>>()?
            };
            tx.commit()?;
            Ok(events)
        })
    }

    async fn mark_processed(&self, event_id: i64) -> StoreResult<()> {
        self.with_conn(|conn| {
            conn.execute(
                "UPDATE events SET processed = 1 WHERE id = ?1",
                params![event_id],
            )
            .map(|_| ())
        })
    }

    async fn delete_event(&self, event_id: i64) -> StoreResult<()> {
        self.with_conn(|conn| {
            conn.execute("DELETE FROM events WHERE id = ?1", params![event_id])
                .map(|_| ())
        })
    }

    async fn close(&self) -> StoreResult<()> {
        let conn = self.conn.borrow_mut().take();
        if let Some(conn) = conn {
            conn.close().map_err(|(_, e)| StoreError::Sqlite(e))?;
            tracing::debug!(path = %self.path.display(), "closed store");
        }
        Ok(())
    }
}
