//! CRUD operations for [`PositionRecord`] rows.

use chrono::{DateTime, Utc};
use rusqlite::params;

use meshgate_shared::types::{NodeId, Position};

use crate::database::Database;
use crate::error::{Result, StoreError};
use crate::models::PositionRecord;

impl Database {
    // ------------------------------------------------------------------
    // Write
    // ------------------------------------------------------------------

    /// Store `position` unless the node already has one that is as new or newer.
    ///
    /// Returns `true` if the row was inserted or replaced. The comparison and
    /// the write happen in a single statement, so concurrent writers for the
    /// same node can never interleave between them.
    pub fn upsert_position_if_newer(&self, position: &Position) -> Result<bool> {
        let affected = self.conn().execute(
            "INSERT INTO node (id, timestamp, latitude, longitude)
             VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT(id) DO UPDATE SET
                 timestamp = excluded.timestamp,
                 latitude  = excluded.latitude,
                 longitude = excluded.longitude
             WHERE excluded.timestamp > node.timestamp",
            params![
                position.node_id.0,
                position.observed_at.timestamp(),
                position.latitude,
                position.longitude,
            ],
        )?;
        Ok(affected > 0)
    }

    // ------------------------------------------------------------------
    // Read
    // ------------------------------------------------------------------

    /// Every stored position that has both coordinates, ordered by node id.
    pub fn load_positions(&self) -> Result<Vec<Position>> {
        let mut stmt = self.conn().prepare(
            "SELECT id, timestamp, latitude, longitude
             FROM node
             ORDER BY id ASC",
        )?;

        let rows = stmt.query_map([], row_to_record)?;

        let mut positions = Vec::new();
        for row in rows {
            let record = row?;
            match record.to_position() {
                Some(position) => positions.push(position),
                None => tracing::debug!(node = %record.node_id, "skipping stored node without coordinates"),
            }
        }
        Ok(positions)
    }

    /// Fetch the stored record for one node.
    pub fn get_position(&self, node_id: NodeId) -> Result<PositionRecord> {
        self.conn()
            .query_row(
                "SELECT id, timestamp, latitude, longitude
                 FROM node
                 WHERE id = ?1",
                params![node_id.0],
                row_to_record,
            )
            .map_err(|e| match e {
                rusqlite::Error::QueryReturnedNoRows => StoreError::NotFound,
                other => StoreError::Sqlite(other),
            })
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Map a `rusqlite::Row` to a [`PositionRecord`].
fn row_to_record(row: &rusqlite::Row<'_>) -> rusqlite::Result<PositionRecord> {
    let id: u32 = row.get(0)?;
    let secs: i64 = row.get(1)?;
    let latitude: Option<f64> = row.get(2)?;
    let longitude: Option<f64> = row.get(3)?;

    let observed_at: DateTime<Utc> = DateTime::from_timestamp(secs, 0).ok_or_else(|| {
        rusqlite::Error::FromSqlConversionFailure(
            1,
            rusqlite::types::Type::Integer,
            Box::new(StoreError::InvalidTimestamp(secs)),
        )
    })?;

    Ok(PositionRecord {
        node_id: NodeId(id),
        observed_at,
        latitude,
        longitude,
    })
}
