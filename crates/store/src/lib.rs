//! Embedded persistence store for sessions, messages, and clients.
//!
//! SQLite with WAL journaling, `synchronous=NORMAL`, and foreign keys
//! enforced. One connection shared behind a mutex; writes that touch more
//! than one row run in a transaction so `sessions.message_count` can never
//! drift from the actual row count.

pub mod types;

use std::path::Path;
use std::sync::Arc;

use parking_lot::Mutex;
use rusqlite::{Connection, OptionalExtension};
use serde_json::Value;

use ccsdk_domain::{Error, Result};

pub use types::{
    ClientRecord, MessageRecord, MessageType, NewMessage, SessionPatch, SessionRecord, StoreStats,
};

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS sessions (
    id                TEXT PRIMARY KEY,
    engine_session_id TEXT,
    created_at        INTEGER NOT NULL,
    last_activity     INTEGER NOT NULL,
    message_count     INTEGER NOT NULL DEFAULT 0,
    is_active         INTEGER NOT NULL DEFAULT 0,
    metadata          TEXT
);

CREATE TABLE IF NOT EXISTS messages (
    id         INTEGER PRIMARY KEY AUTOINCREMENT,
    session_id TEXT NOT NULL REFERENCES sessions(id) ON DELETE CASCADE,
    type       TEXT NOT NULL,
    subtype    TEXT,
    content    TEXT,
    timestamp  INTEGER NOT NULL,
    cost       REAL,
    duration   INTEGER,
    metadata   TEXT
);

CREATE TABLE IF NOT EXISTS clients (
    id                 TEXT PRIMARY KEY,
    connected_at       INTEGER NOT NULL,
    disconnected_at    INTEGER,
    current_session_id TEXT
);

CREATE INDEX IF NOT EXISTS idx_messages_session   ON messages(session_id);
CREATE INDEX IF NOT EXISTS idx_messages_timestamp ON messages(timestamp);
CREATE INDEX IF NOT EXISTS idx_messages_type      ON messages(type);
CREATE INDEX IF NOT EXISTS idx_sessions_activity  ON sessions(last_activity);
CREATE INDEX IF NOT EXISTS idx_sessions_active    ON sessions(is_active);
";

/// Shared handle to the embedded database.
#[derive(Clone)]
pub struct Database {
    conn: Arc<Mutex<Connection>>,
}

fn store_err(e: rusqlite::Error) -> Error {
    Error::Store(e.to_string())
}

impl Database {
    /// Open (or create) the database file at `path` and apply the schema.
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let conn = Connection::open(path).map_err(store_err)?;
        Self::configure(&conn)?;

        tracing::info!(path = %path.display(), "database ready");
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// In-memory database for tests.
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().map_err(store_err)?;
        Self::configure(&conn)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    fn configure(conn: &Connection) -> Result<()> {
        // journal_mode returns the new mode, so it needs query_row.
        conn.query_row("PRAGMA journal_mode = WAL", [], |_| Ok(()))
            .map_err(store_err)?;
        conn.execute_batch(
            "PRAGMA synchronous = NORMAL;
             PRAGMA foreign_keys = ON;
             PRAGMA busy_timeout = 5000;",
        )
        .map_err(store_err)?;
        conn.execute_batch(SCHEMA).map_err(store_err)?;
        Ok(())
    }

    // ── Sessions ─────────────────────────────────────────────────────

    /// Insert a new session row, active with zero messages.
    pub fn create_session(
        &self,
        id: &str,
        created_at: i64,
        metadata: Option<&Value>,
    ) -> Result<()> {
        let conn = self.conn.lock();
        conn.execute(
            "INSERT INTO sessions (id, created_at, last_activity, message_count, is_active, metadata)
             VALUES (?1, ?2, ?2, 0, 1, ?3)",
            (id, created_at, metadata.map(Value::to_string)),
        )
        .map_err(store_err)?;
        Ok(())
    }

    /// Partial update. Unset patch fields keep their current values.
    pub fn update_session(&self, id: &str, patch: &SessionPatch) -> Result<()> {
        let conn = self.conn.lock();
        let changed = conn
            .execute(
                "UPDATE sessions SET
                    engine_session_id = COALESCE(?1, engine_session_id),
                    last_activity     = COALESCE(?2, last_activity),
                    message_count     = COALESCE(?3, message_count),
                    is_active         = COALESCE(?4, is_active),
                    metadata          = COALESCE(?5, metadata)
                 WHERE id = ?6",
                (
                    patch.engine_session_id.as_deref(),
                    patch.last_activity,
                    patch.message_count.map(|c| c as i64),
                    patch.is_active.map(i64::from),
                    patch.metadata.as_ref().map(Value::to_string),
                    id,
                ),
            )
            .map_err(store_err)?;
        if changed == 0 {
            return Err(Error::NotFound(format!("session {id}")));
        }
        Ok(())
    }

    pub fn get_session(&self, id: &str) -> Result<Option<SessionRecord>> {
        let conn = self.conn.lock();
        conn.query_row(
            "SELECT id, engine_session_id, created_at, last_activity, message_count,
                    is_active, metadata
             FROM sessions WHERE id = ?1",
            (id,),
            row_to_session,
        )
        .optional()
        .map_err(store_err)
    }

    /// Sessions ordered by most recent activity.
    pub fn list_sessions(&self, limit: u32, offset: u32) -> Result<Vec<SessionRecord>> {
        let conn = self.conn.lock();
        let mut stmt = conn
            .prepare(
                "SELECT id, engine_session_id, created_at, last_activity, message_count,
                        is_active, metadata
                 FROM sessions ORDER BY last_activity DESC LIMIT ?1 OFFSET ?2",
            )
            .map_err(store_err)?;
        let rows = stmt
            .query_map((limit, offset), row_to_session)
            .map_err(store_err)?;
        rows.collect::<rusqlite::Result<Vec<_>>>().map_err(store_err)
    }

    pub fn list_active_sessions(&self) -> Result<Vec<SessionRecord>> {
        let conn = self.conn.lock();
        let mut stmt = conn
            .prepare(
                "SELECT id, engine_session_id, created_at, last_activity, message_count,
                        is_active, metadata
                 FROM sessions WHERE is_active = 1 ORDER BY last_activity DESC",
            )
            .map_err(store_err)?;
        let rows = stmt.query_map([], row_to_session).map_err(store_err)?;
        rows.collect::<rusqlite::Result<Vec<_>>>().map_err(store_err)
    }

    /// Delete a session row; messages cascade. Returns whether a row
    /// existed.
    pub fn delete_session(&self, id: &str) -> Result<bool> {
        let conn = self.conn.lock();
        let changed = conn
            .execute("DELETE FROM sessions WHERE id = ?1", (id,))
            .map_err(store_err)?;
        Ok(changed > 0)
    }

    // ── Messages ─────────────────────────────────────────────────────

    /// Insert a message and bump the parent session's `message_count` and
    /// `last_activity` in one transaction. Returns the new message id.
    pub fn append_message(&self, msg: &NewMessage) -> Result<i64> {
        let conn = self.conn.lock();
        let tx = conn.unchecked_transaction().map_err(store_err)?;

        tx.execute(
            "INSERT INTO messages (session_id, type, subtype, content, timestamp, cost, duration, metadata)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            (
                &msg.session_id,
                msg.kind,
                msg.subtype.as_deref(),
                msg.content.as_deref(),
                msg.timestamp,
                msg.cost,
                msg.duration,
                msg.metadata.as_ref().map(Value::to_string),
            ),
        )
        .map_err(store_err)?;
        let id = tx.last_insert_rowid();

        tx.execute(
            "UPDATE sessions SET
                message_count = message_count + 1,
                last_activity = MAX(last_activity, ?1)
             WHERE id = ?2",
            (msg.timestamp, &msg.session_id),
        )
        .map_err(store_err)?;

        tx.commit().map_err(store_err)?;
        Ok(id)
    }

    /// Messages of one session in chronological order.
    pub fn list_messages(&self, session_id: &str, limit: u32) -> Result<Vec<MessageRecord>> {
        let conn = self.conn.lock();
        let mut stmt = conn
            .prepare(
                "SELECT id, session_id, type, subtype, content, timestamp, cost, duration, metadata
                 FROM messages WHERE session_id = ?1
                 ORDER BY timestamp ASC, id ASC LIMIT ?2",
            )
            .map_err(store_err)?;
        let rows = stmt
            .query_map((session_id, limit), row_to_message)
            .map_err(store_err)?;
        rows.collect::<rusqlite::Result<Vec<_>>>().map_err(store_err)
    }

    /// Substring search across message content, newest first.
    pub fn search_messages(&self, query: &str, limit: u32) -> Result<Vec<MessageRecord>> {
        let conn = self.conn.lock();
        let mut stmt = conn
            .prepare(
                "SELECT m.id, m.session_id, m.type, m.subtype, m.content, m.timestamp,
                        m.cost, m.duration, m.metadata
                 FROM messages m
                 JOIN sessions s ON s.id = m.session_id
                 WHERE m.content LIKE '%' || ?1 || '%'
                 ORDER BY m.timestamp DESC LIMIT ?2",
            )
            .map_err(store_err)?;
        let rows = stmt
            .query_map((query, limit), row_to_message)
            .map_err(store_err)?;
        rows.collect::<rusqlite::Result<Vec<_>>>().map_err(store_err)
    }

    // ── Aggregates & maintenance ─────────────────────────────────────

    pub fn stats(&self) -> Result<StoreStats> {
        let conn = self.conn.lock();

        let (total_sessions, active_sessions): (u64, u64) = conn
            .query_row(
                "SELECT COUNT(*), COALESCE(SUM(is_active), 0) FROM sessions",
                [],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .map_err(store_err)?;

        let (total_messages, total_cost): (u64, f64) = conn
            .query_row(
                "SELECT COUNT(*), COALESCE(SUM(cost), 0.0) FROM messages",
                [],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .map_err(store_err)?;

        let mut stmt = conn
            .prepare("SELECT type, COUNT(*) FROM messages GROUP BY type")
            .map_err(store_err)?;
        let rows = stmt
            .query_map([], |row| Ok((row.get::<_, String>(0)?, row.get::<_, u64>(1)?)))
            .map_err(store_err)?;
        let messages_by_type = rows
            .collect::<rusqlite::Result<_>>()
            .map_err(store_err)?;

        Ok(StoreStats {
            total_sessions,
            active_sessions,
            total_messages,
            total_cost,
            messages_by_type,
        })
    }

    /// Delete inactive sessions idle for more than `days`. Messages
    /// cascade. Returns the number of sessions removed.
    pub fn cleanup_old_sessions(&self, days: u32) -> Result<usize> {
        let cutoff =
            chrono::Utc::now().timestamp_millis() - i64::from(days) * 24 * 60 * 60 * 1000;
        let conn = self.conn.lock();
        conn.execute(
            "DELETE FROM sessions WHERE is_active = 0 AND last_activity < ?1",
            (cutoff,),
        )
        .map_err(store_err)
    }

    /// Snapshot the database to `path` atomically.
    pub fn backup(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let conn = self.conn.lock();
        conn.execute("VACUUM INTO ?1", (path.to_string_lossy().into_owned(),))
            .map_err(store_err)?;
        Ok(())
    }

    // ── Clients ──────────────────────────────────────────────────────

    pub fn record_client_connect(&self, id: &str, connected_at: i64) -> Result<()> {
        let conn = self.conn.lock();
        conn.execute(
            "INSERT OR REPLACE INTO clients (id, connected_at, disconnected_at, current_session_id)
             VALUES (?1, ?2, NULL, NULL)",
            (id, connected_at),
        )
        .map_err(store_err)?;
        Ok(())
    }

    pub fn record_client_disconnect(&self, id: &str, disconnected_at: i64) -> Result<()> {
        let conn = self.conn.lock();
        conn.execute(
            "UPDATE clients SET disconnected_at = ?1, current_session_id = NULL WHERE id = ?2",
            (disconnected_at, id),
        )
        .map_err(store_err)?;
        Ok(())
    }

    pub fn update_client_session(&self, id: &str, session_id: Option<&str>) -> Result<()> {
        let conn = self.conn.lock();
        conn.execute(
            "UPDATE clients SET current_session_id = ?1 WHERE id = ?2",
            (session_id, id),
        )
        .map_err(store_err)?;
        Ok(())
    }

    pub fn get_client(&self, id: &str) -> Result<Option<ClientRecord>> {
        let conn = self.conn.lock();
        conn.query_row(
            "SELECT id, connected_at, disconnected_at, current_session_id
             FROM clients WHERE id = ?1",
            (id,),
            |row| {
                Ok(ClientRecord {
                    id: row.get(0)?,
                    connected_at: row.get(1)?,
                    disconnected_at: row.get(2)?,
                    current_session_id: row.get(3)?,
                })
            },
        )
        .optional()
        .map_err(store_err)
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Row mapping
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

fn parse_metadata(raw: Option<String>) -> Option<Value> {
    raw.and_then(|s| serde_json::from_str(&s).ok())
}

fn row_to_session(row: &rusqlite::Row<'_>) -> rusqlite::Result<SessionRecord> {
    Ok(SessionRecord {
        id: row.get(0)?,
        engine_session_id: row.get(1)?,
        created_at: row.get(2)?,
        last_activity: row.get(3)?,
        message_count: row.get::<_, i64>(4)?.max(0) as u64,
        is_active: row.get::<_, i64>(5)? != 0,
        metadata: parse_metadata(row.get(6)?),
    })
}

fn row_to_message(row: &rusqlite::Row<'_>) -> rusqlite::Result<MessageRecord> {
    Ok(MessageRecord {
        id: row.get(0)?,
        session_id: row.get(1)?,
        kind: row.get(2)?,
        subtype: row.get(3)?,
        content: row.get(4)?,
        timestamp: row.get(5)?,
        cost: row.get(6)?,
        duration: row.get(7)?,
        metadata: parse_metadata(row.get(8)?),
    })
}
