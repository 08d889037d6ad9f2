//! Optional persistence for change events.
//!
//! Write-through storage in a `delta_changes` table so the in-memory logs
//! can be re-seeded after a restart. The in-memory tracker stays the
//! authority for serving feeds.

use super::{ChangeEvent, ChangeOp};
use crate::connection::{Connection, Queryable};
use crate::error::{Error, Result};
use oxidata_sql::SqlParam;

const CREATE_SQL: &str = "CREATE TABLE IF NOT EXISTS delta_changes (\
     id INTEGER PRIMARY KEY AUTOINCREMENT, \
     resource_name TEXT NOT NULL, \
     entity_id INTEGER NOT NULL, \
     operation TEXT NOT NULL, \
     timestamp INTEGER NOT NULL, \
     data TEXT\
     ); \
     CREATE INDEX IF NOT EXISTS idx_delta_changes_resource_ts \
     ON delta_changes (resource_name, timestamp)";

/// Accessor for the `delta_changes` table.
pub struct DeltaStore;

impl DeltaStore {
    /// Create the table and index if missing.
    pub async fn ensure_schema(conn: &mut dyn Connection) -> Result<()> {
        conn.exec(CREATE_SQL).await
    }

    /// Persist one event.
    pub async fn persist<Q: Queryable + ?Sized>(
        queryable: &mut Q,
        event: &ChangeEvent,
    ) -> Result<()> {
        let data = event
            .data
            .as_ref()
            .map(|d| SqlParam::Text(d.to_string()))
            .unwrap_or(SqlParam::Null);

        queryable
            .execute(
                "INSERT INTO delta_changes \
                 (resource_name, entity_id, operation, timestamp, data) \
                 VALUES (?, ?, ?, ?, ?)",
                &[
                    SqlParam::text(&event.resource),
                    SqlParam::Int(event.entity_id),
                    SqlParam::text(event.op.as_str()),
                    SqlParam::Int(event.timestamp),
                    data,
                ],
            )
            .await?;
        Ok(())
    }

    /// Load every persisted event in timestamp order.
    pub async fn load_all<Q: Queryable + ?Sized>(queryable: &mut Q) -> Result<Vec<ChangeEvent>> {
        let rows = queryable
            .fetch_all(
                "SELECT resource_name, entity_id, operation, timestamp, data \
                 FROM delta_changes ORDER BY timestamp ASC",
                &[],
            )
            .await?;

        rows.into_iter().map(row_to_event).collect()
    }

    /// Drop persisted events with `timestamp <= cutoff`.
    pub async fn prune<Q: Queryable + ?Sized>(queryable: &mut Q, cutoff: i64) -> Result<u64> {
        let result = queryable
            .execute(
                "DELETE FROM delta_changes WHERE timestamp <= ?",
                &[SqlParam::Int(cutoff)],
            )
            .await?;
        Ok(result.rows_affected)
    }
}

fn row_to_event(row: crate::connection::JsonRow) -> Result<ChangeEvent> {
    let text = |key: &str| -> Result<String> {
        row.get(key)
            .and_then(|v| v.as_str())
            .map(str::to_string)
            .ok_or_else(|| Error::Internal(format!("delta_changes row missing {}", key)))
    };
    let int = |key: &str| -> Result<i64> {
        row.get(key)
            .and_then(|v| v.as_i64())
            .ok_or_else(|| Error::Internal(format!("delta_changes row missing {}", key)))
    };

    let operation = text("operation")?;
    let op = ChangeOp::parse(&operation)
        .ok_or_else(|| Error::Internal(format!("unknown operation: {}", operation)))?;

    let data = match row.get("data") {
        Some(serde_json::Value::String(raw)) => serde_json::from_str(raw).ok(),
        _ => None,
    };

    Ok(ChangeEvent {
        resource: text("resource_name")?,
        entity_id: int("entity_id")?,
        op,
        timestamp: int("timestamp")?,
        data,
    })
}
