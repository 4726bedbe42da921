//! Durable investigation store
//!
//! Append-only event log plus a keyed record for terminal findings, on
//! SQLite through sqlx. Events are never updated or deleted; replaying a
//! log reconstructs the investigation exactly.

use sqlx::sqlite::SqlitePoolOptions;
use sqlx::{Row as _, SqlitePool};

use crate::models::Finding;

use super::state::{Event, EventType};

/// SQLite-backed store for events and findings
pub struct SqliteEventStore {
    pool: SqlitePool,
}

impl SqliteEventStore {
    /// Open (or create) a store at `url`, e.g. `sqlite://investigations.db`
    /// or `sqlite::memory:`.
    pub async fn open(url: &str) -> Result<Self, sqlx::Error> {
        let pool = SqlitePoolOptions::new()
            .max_connections(if url.contains(":memory:") { 1 } else { 4 })
            .connect(url)
            .await?;
        let store = Self { pool };
        store.migrate().await?;
        Ok(store)
    }

    pub fn from_pool(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Create tables when absent; the schema is append-only by design
    pub async fn migrate(&self) -> Result<(), sqlx::Error> {
        sqlx::query(
            "CREATE TABLE IF NOT EXISTS investigation_events (
                investigation_id TEXT NOT NULL,
                seq INTEGER NOT NULL,
                event_type TEXT NOT NULL,
                timestamp TEXT NOT NULL,
                data TEXT NOT NULL,
                PRIMARY KEY (investigation_id, seq)
            )",
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            "CREATE TABLE IF NOT EXISTS findings (
                investigation_id TEXT PRIMARY KEY,
                finding TEXT NOT NULL,
                created_at TEXT NOT NULL
            )",
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Append one event. `(investigation_id, seq)` is the identity; a
    /// replayed append of the same position is a conflict.
    pub async fn append_event(
        &self,
        investigation_id: &str,
        event: &Event,
    ) -> Result<(), sqlx::Error> {
        sqlx::query(
            "INSERT INTO investigation_events (investigation_id, seq, event_type, timestamp, data) \
             VALUES (?, ?, ?, ?, ?)",
        )
        .bind(investigation_id)
        .bind(event.seq as i64)
        .bind(event.event_type.as_str())
        .bind(event.timestamp.to_rfc3339())
        .bind(serde_json::Value::Object(event.data.clone()).to_string())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// All events for an investigation, in sequence order
    pub async fn load_events(&self, investigation_id: &str) -> Result<Vec<Event>, sqlx::Error> {
        let rows = sqlx::query(
            "SELECT seq, event_type, timestamp, data FROM investigation_events \
             WHERE investigation_id = ? ORDER BY seq",
        )
        .bind(investigation_id)
        .fetch_all(&self.pool)
        .await?;

        let events = rows
            .iter()
            .filter_map(|row| {
                let seq: i64 = row.try_get("seq").ok()?;
                let event_type: String = row.try_get("event_type").ok()?;
                let timestamp: String = row.try_get("timestamp").ok()?;
                let data: String = row.try_get("data").ok()?;

                let event_type: EventType =
                    serde_json::from_value(serde_json::Value::String(event_type)).ok()?;
                let timestamp = chrono::DateTime::parse_from_rfc3339(&timestamp)
                    .ok()?
                    .with_timezone(&chrono::Utc);
                let data = match serde_json::from_str(&data).ok()? {
                    serde_json::Value::Object(map) => map,
                    _ => serde_json::Map::new(),
                };

                Some(Event { seq: seq as u64, event_type, timestamp, data })
            })
            .collect();

        Ok(events)
    }

    /// Record the terminal finding for an investigation
    pub async fn save_finding(&self, finding: &Finding) -> Result<(), sqlx::Error> {
        let payload = serde_json::to_string(finding)
            .map_err(|e| sqlx::Error::Protocol(format!("finding serialization: {e}")))?;
        sqlx::query(
            "INSERT OR REPLACE INTO findings (investigation_id, finding, created_at) \
             VALUES (?, ?, ?)",
        )
        .bind(&finding.investigation_id)
        .bind(payload)
        .bind(chrono::Utc::now().to_rfc3339())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn load_finding(
        &self,
        investigation_id: &str,
    ) -> Result<Option<Finding>, sqlx::Error> {
        let row = sqlx::query("SELECT finding FROM findings WHERE investigation_id = ?")
            .bind(investigation_id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(row.and_then(|row| {
            let payload: String = row.try_get("finding").ok()?;
            serde_json::from_str(&payload).ok()
        }))
    }
}
