// 📜 Audit Log - every state change is an event
//
// Append-only SQLite table next to the CSV state. Events are written inside a
// SQLite transaction that only commits once the CSV save it describes has
// succeeded, so a rejected or failed operation leaves no trace here either.

use crate::error::{TrackerError, TrackerResult};
use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::{params, Connection};
use serde::{Deserialize, Serialize};
use std::path::Path;

pub const ENTITY_PLAYER: &str = "player";
pub const ENTITY_REFERRAL: &str = "referral";
pub const ENTITY_SNAPSHOT: &str = "snapshot";
pub const ENTITY_TABLE: &str = "table";

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct AuditEvent {
    pub event_id: String,
    pub timestamp: DateTime<Utc>,
    pub event_type: String,
    pub entity_type: String,
    pub entity_id: String,
    pub data: serde_json::Value,
    pub actor: String,
}

impl AuditEvent {
    pub fn new(
        event_type: &str,
        entity_type: &str,
        entity_id: &str,
        data: serde_json::Value,
        actor: &str,
    ) -> Self {
        Self {
            event_id: uuid::Uuid::new_v4().to_string(),
            timestamp: Utc::now(),
            event_type: event_type.to_string(),
            entity_type: entity_type.to_string(),
            entity_id: entity_id.to_string(),
            data,
            actor: actor.to_string(),
        }
    }
}

pub struct AuditLog {
    conn: Connection,
}

impl AuditLog {
    /// Open (or create) the audit database at `path`.
    pub fn open(path: &Path) -> TrackerResult<Self> {
        if let Some(dir) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(dir)
                .map_err(|e| TrackerError::store(format!("create {}", dir.display()), e))?;
        }

        let conn = Connection::open(path)
            .map_err(|e| TrackerError::store(format!("open audit log {}", path.display()), e))?;
        Self::with_connection(conn)
    }

    pub fn open_in_memory() -> TrackerResult<Self> {
        let conn = Connection::open_in_memory()
            .map_err(|e| TrackerError::store("open in-memory audit log", e))?;
        Self::with_connection(conn)
    }

    fn with_connection(conn: Connection) -> TrackerResult<Self> {
        setup_schema(&conn).map_err(|e| TrackerError::store("create audit schema", e))?;
        Ok(AuditLog { conn })
    }

    /// Insert one event immediately.
    pub fn record(&self, event: &AuditEvent) -> TrackerResult<()> {
        insert_event(&self.conn, event).map_err(|e| TrackerError::store("write audit event", e))
    }

    /// Run `apply` with `events` staged in an open transaction.
    ///
    /// The events commit only when `apply` returns Ok; an Err rolls them back
    /// and is returned unchanged.
    pub fn with_events<T>(
        &mut self,
        events: &[AuditEvent],
        apply: impl FnOnce() -> TrackerResult<T>,
    ) -> TrackerResult<T> {
        let tx = self
            .conn
            .transaction()
            .map_err(|e| TrackerError::store("begin audit transaction", e))?;

        for event in events {
            insert_event(&tx, event).map_err(|e| TrackerError::store("stage audit event", e))?;
        }

        // dropping `tx` without commit rolls the staged events back
        let value = apply()?;

        if let Err(e) = tx.commit() {
            // state is already saved at this point; losing the audit row is
            // reported but does not undo the change
            tracing::error!(error = %e, events = events.len(), "audit commit failed");
        }
        Ok(value)
    }

    /// Events for one entity, newest first.
    pub fn events_for_entity(&self, entity_type: &str, entity_id: &str) -> TrackerResult<Vec<AuditEvent>> {
        query_events(
            &self.conn,
            "SELECT event_id, timestamp, event_type, entity_type, entity_id, data, actor
             FROM events
             WHERE entity_type = ?1 AND entity_id = ?2
             ORDER BY timestamp DESC, id DESC",
            params![entity_type, entity_id],
        )
        .map_err(|e| TrackerError::store("read audit events", e))
    }

    /// Most recent events of any kind.
    pub fn recent(&self, limit: usize) -> TrackerResult<Vec<AuditEvent>> {
        query_events(
            &self.conn,
            "SELECT event_id, timestamp, event_type, entity_type, entity_id, data, actor
             FROM events
             ORDER BY timestamp DESC, id DESC
             LIMIT ?1",
            params![limit as i64],
        )
        .map_err(|e| TrackerError::store("read audit events", e))
    }

    pub fn count(&self) -> TrackerResult<i64> {
        self.conn
            .query_row("SELECT COUNT(*) FROM events", [], |row| row.get(0))
            .map_err(|e| TrackerError::store("count audit events", e))
    }
}

// ============================================================================
// SQL
// ============================================================================

fn setup_schema(conn: &Connection) -> anyhow::Result<()> {
    // WAL for crash recovery (in-memory databases silently stay in "memory")
    conn.pragma_update(None, "journal_mode", "WAL")?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS events (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            event_id TEXT UNIQUE NOT NULL,
            timestamp TEXT NOT NULL,
            event_type TEXT NOT NULL,
            entity_type TEXT NOT NULL,
            entity_id TEXT NOT NULL,
            data TEXT NOT NULL,
            actor TEXT NOT NULL,
            created_at DATETIME DEFAULT CURRENT_TIMESTAMP
        )",
        [],
    )?;

    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_events_entity ON events(entity_type, entity_id)",
        [],
    )?;

    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_events_timestamp ON events(timestamp)",
        [],
    )?;

    Ok(())
}

fn insert_event(conn: &Connection, event: &AuditEvent) -> anyhow::Result<()> {
    let data_json = serde_json::to_string(&event.data)?;

    conn.execute(
        "INSERT INTO events (
            event_id, timestamp, event_type, entity_type, entity_id, data, actor
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        params![
            event.event_id,
            event.timestamp.to_rfc3339_opts(SecondsFormat::Micros, true),
            event.event_type,
            event.entity_type,
            event.entity_id,
            data_json,
            event.actor,
        ],
    )?;

    Ok(())
}

fn query_events(
    conn: &Connection,
    sql: &str,
    args: impl rusqlite::Params,
) -> anyhow::Result<Vec<AuditEvent>> {
    let mut stmt = conn.prepare(sql)?;

    let events = stmt
        .query_map(args, |row| {
            let timestamp_str: String = row.get(1)?;
            let data_json: String = row.get(5)?;

            Ok(AuditEvent {
                event_id: row.get(0)?,
                timestamp: DateTime::parse_from_rfc3339(&timestamp_str)
                    .map_err(|e| {
                        rusqlite::Error::FromSqlConversionFailure(1, rusqlite::types::Type::Text, Box::new(e))
                    })?
                    .with_timezone(&Utc),
                event_type: row.get(2)?,
                entity_type: row.get(3)?,
                entity_id: row.get(4)?,
                data: serde_json::from_str(&data_json).map_err(|e| {
                    rusqlite::Error::FromSqlConversionFailure(5, rusqlite::types::Type::Text, Box::new(e))
                })?,
                actor: row.get(6)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;

    Ok(events)
}
