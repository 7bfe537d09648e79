//! Durable key-value store for queue state and the activity log.
//!
//! ## Database Schema
//!
//! ```sql
//! CREATE TABLE kv (
//!     key TEXT PRIMARY KEY,
//!     value TEXT NOT NULL      -- JSON
//! );
//! ```
//!
//! Keys: `version`, `pendingTasks`, `currentTask`, `activePageHandle`,
//! `dispatchGuard`, `campaignStats`, `logs`.
//!
//! All queue mutations go through [`TaskStore::update`], a read-modify-write
//! over the whole [`QueueState`] committed in one transaction.

mod activity;
mod state;

pub use activity::{ActivityLog, DEFAULT_LOG_CAPACITY, LogEntry, Severity};
pub use state::QueueState;

use rusqlite::{Connection, OptionalExtension, Transaction, params};
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::path::Path;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::debug;

use crate::error::Result;

const KEY_VERSION: &str = "version";
const KEY_PENDING: &str = "pendingTasks";
const KEY_CURRENT: &str = "currentTask";
const KEY_ACTIVE_PAGE: &str = "activePageHandle";
const KEY_GUARD: &str = "dispatchGuard";
const KEY_STATS: &str = "campaignStats";
const KEY_LOGS: &str = "logs";

const SCHEMA: &str = "CREATE TABLE IF NOT EXISTS kv (key TEXT PRIMARY KEY, value TEXT NOT NULL);";

/// SQLite-backed store shared by the controller and the page contexts.
#[derive(Clone)]
pub struct TaskStore {
    conn: Arc<Mutex<Connection>>,
    log_capacity: usize,
}

impl TaskStore {
    /// Open or create the store at `path`.
    pub fn open(path: &Path, log_capacity: usize) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(path)?;
        Self::with_connection(conn, log_capacity)
    }

    /// Volatile store, used by tests and dry runs.
    pub fn open_in_memory(log_capacity: usize) -> Result<Self> {
        Self::with_connection(Connection::open_in_memory()?, log_capacity)
    }

    fn with_connection(conn: Connection, log_capacity: usize) -> Result<Self> {
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
            log_capacity,
        })
    }

    /// Current queue record.
    pub async fn snapshot(&self) -> Result<QueueState> {
        let mut conn = self.conn.lock().await;
        let tx = conn.transaction()?;
        let state = load_state(&tx)?;
        tx.commit()?;
        Ok(state)
    }

    /// Read-modify-write the queue record.
    ///
    /// The closure's changes are committed only if the result still satisfies
    /// [`QueueState::check_invariants`]; otherwise nothing is written and
    /// `Error::Invariant` is returned.
    pub async fn update<F, R>(&self, f: F) -> Result<R>
    where
        F: FnOnce(&mut QueueState) -> R,
    {
        let mut conn = self.conn.lock().await;
        let tx = conn.transaction()?;
        let mut state = load_state(&tx)?;
        let before = state.clone();

        let out = f(&mut state);
        if state == before {
            return Ok(out);
        }
        state.check_invariants()?;
        state.version = before.version + 1;
        save_state(&tx, &state)?;
        tx.commit()?;
        debug!(version = state.version, "Queue state committed");
        Ok(out)
    }

    /// Append one activity entry, evicting the oldest beyond capacity.
    pub async fn append_log(&self, entry: LogEntry) -> Result<()> {
        let mut conn = self.conn.lock().await;
        let tx = conn.transaction()?;
        let mut log = load_log(&tx, self.log_capacity)?;
        log.push(entry);
        put(&tx, KEY_LOGS, &log.entries().collect::<Vec<_>>())?;
        tx.commit()?;
        Ok(())
    }

    /// Activity entries, newest first.
    pub async fn logs(&self) -> Result<Vec<LogEntry>> {
        let mut conn = self.conn.lock().await;
        let tx = conn.transaction()?;
        let log = load_log(&tx, self.log_capacity)?;
        tx.commit()?;
        Ok(log.newest_first())
    }

    pub async fn clear_logs(&self) -> Result<()> {
        let conn = self.conn.lock().await;
        conn.execute("DELETE FROM kv WHERE key = ?1", params![KEY_LOGS])?;
        Ok(())
    }
}

fn get<T: DeserializeOwned>(tx: &Transaction<'_>, key: &str) -> Result<Option<T>> {
    let raw: Option<String> = tx
        .query_row("SELECT value FROM kv WHERE key = ?1", params![key], |row| {
            row.get(0)
        })
        .optional()?;
    match raw {
        Some(json) => Ok(Some(serde_json::from_str(&json)?)),
        None => Ok(None),
    }
}

fn put<T: Serialize + ?Sized>(tx: &Transaction<'_>, key: &str, value: &T) -> Result<()> {
    let json = serde_json::to_string(value)?;
    tx.execute(
        "INSERT INTO kv (key, value) VALUES (?1, ?2) \
         ON CONFLICT(key) DO UPDATE SET value = excluded.value",
        params![key, json],
    )?;
    Ok(())
}

fn put_optional<T: Serialize>(tx: &Transaction<'_>, key: &str, value: Option<&T>) -> Result<()> {
    match value {
        Some(v) => put(tx, key, v),
        None => {
            tx.execute("DELETE FROM kv WHERE key = ?1", params![key])?;
            Ok(())
        }
    }
}

fn load_state(tx: &Transaction<'_>) -> Result<QueueState> {
    Ok(QueueState {
        version: get(tx, KEY_VERSION)?.unwrap_or(0),
        pending_tasks: get(tx, KEY_PENDING)?.unwrap_or_default(),
        current_task: get(tx, KEY_CURRENT)?,
        active_page: get(tx, KEY_ACTIVE_PAGE)?,
        dispatch_guard: get(tx, KEY_GUARD)?,
        campaign_stats: get(tx, KEY_STATS)?.unwrap_or_default(),
    })
}

fn save_state(tx: &Transaction<'_>, state: &QueueState) -> Result<()> {
    put(tx, KEY_VERSION, &state.version)?;
    put(tx, KEY_PENDING, &state.pending_tasks)?;
    put_optional(tx, KEY_CURRENT, state.current_task.as_ref())?;
    put_optional(tx, KEY_ACTIVE_PAGE, state.active_page.as_ref())?;
    put_optional(tx, KEY_GUARD, state.dispatch_guard.as_ref())?;
    put(tx, KEY_STATS, &state.campaign_stats)?;
    Ok(())
}

fn load_log(tx: &Transaction<'_>, capacity: usize) -> Result<ActivityLog> {
    let entries: Vec<LogEntry> = get(tx, KEY_LOGS)?.unwrap_or_default();
    Ok(ActivityLog::from_entries(capacity, entries))
}
