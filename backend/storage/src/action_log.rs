//! Append-only log of pipeline events, keyed by session.
use std::sync::{PoisonError, RwLock};

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rusqlite::{Connection, params};
use tokio::sync::Mutex;
use tracing::{debug, info};
use uuid::Uuid;

use hearth_core::{Event, EventKind};

#[async_trait]
pub trait ActionLog: Send + Sync {
    async fn append(&self, event: Event) -> Result<()>;

    /// Most recent events for a session, newest first.
    async fn recent(&self, session_id: &str, limit: usize) -> Result<Vec<Event>>;
}

#[derive(Default)]
pub struct InMemoryActionLog {
    events: RwLock<Vec<Event>>,
}

impl InMemoryActionLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.events
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl ActionLog for InMemoryActionLog {
    async fn append(&self, event: Event) -> Result<()> {
        self.events
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push(event);
        Ok(())
    }

    async fn recent(&self, session_id: &str, limit: usize) -> Result<Vec<Event>> {
        let events = self.events.read().unwrap_or_else(PoisonError::into_inner);
        Ok(events
            .iter()
            .rev()
            .filter(|e| e.session_id == session_id)
            .take(limit)
            .cloned()
            .collect())
    }
}

/// SQLite-backed action log.
pub struct SqliteActionLog {
    conn: Mutex<Connection>,
}

impl SqliteActionLog {
    /// Open or create the log at the given path.
    pub fn open(path: &str) -> Result<Self> {
        let conn = Connection::open(path).context("Failed to open SQLite database")?;
        conn.execute_batch("PRAGMA journal_mode=WAL;")?;
        Self::init_schema(&conn)?;
        info!(path = %path, "Action log opened");
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Create an in-memory log (for testing).
    pub fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().context("Failed to open in-memory SQLite")?;
        Self::init_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn init_schema(conn: &Connection) -> Result<()> {
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS action_log (
                id         TEXT PRIMARY KEY,
                session_id TEXT NOT NULL,
                timestamp  TEXT NOT NULL,
                kind       TEXT NOT NULL,
                payload    TEXT NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_action_log_session ON action_log(session_id);
            CREATE INDEX IF NOT EXISTS idx_action_log_ts ON action_log(timestamp);",
        )?;
        Ok(())
    }
}

#[async_trait]
impl ActionLog for SqliteActionLog {
    async fn append(&self, event: Event) -> Result<()> {
        let payload = serde_json::to_string(&event.payload)?;
        let conn = self.conn.lock().await;
        conn.execute(
            "INSERT INTO action_log (id, session_id, timestamp, kind, payload)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                event.id.to_string(),
                event.session_id,
                event.timestamp.to_rfc3339(),
                event.kind.to_string(),
                payload,
            ],
        )?;
        debug!(session_id = %event.session_id, kind = %event.kind, "Action logged");
        Ok(())
    }

    async fn recent(&self, session_id: &str, limit: usize) -> Result<Vec<Event>> {
        let conn = self.conn.lock().await;
        let mut stmt = conn.prepare(
            "SELECT id, session_id, timestamp, kind, payload
             FROM action_log WHERE session_id = ?1
             ORDER BY timestamp DESC, rowid DESC LIMIT ?2",
        )?;

        let events = stmt
            .query_map(params![session_id, limit as i64], |row| {
                let id: String = row.get(0)?;
                let session_id: String = row.get(1)?;
                let timestamp: String = row.get(2)?;
                let kind: String = row.get(3)?;
                let payload: String = row.get(4)?;
                Ok((id, session_id, timestamp, kind, payload))
            })?
            .filter_map(|r| r.ok())
            .filter_map(|(id, session_id, timestamp, kind, payload)| {
                Some(Event {
                    id: Uuid::parse_str(&id).ok()?,
                    session_id,
                    timestamp: DateTime::parse_from_rfc3339(&timestamp)
                        .ok()?
                        .with_timezone(&Utc),
                    kind: serde_json::from_value::<EventKind>(serde_json::Value::String(kind))
                        .ok()?,
                    payload: serde_json::from_str(&payload).ok()?,
                })
            })
            .collect();

        Ok(events)
    }
}
