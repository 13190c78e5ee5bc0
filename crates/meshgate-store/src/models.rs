//! Domain model structs persisted in the local SQLite database.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use meshgate_shared::types::{NodeId, Position};

// ---------------------------------------------------------------------------
// Node position
// ---------------------------------------------------------------------------

/// One row of the `node` table: the most recently accepted position of a node.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PositionRecord {
    /// Mesh node number (primary key).
    pub node_id: NodeId,
    /// Device-reported time of the accepted position.
    pub observed_at: DateTime<Utc>,
    /// Decimal degrees. Rows written by older tooling may lack coordinates.
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
}

impl PositionRecord {
    /// The record as a usable [`Position`], if it carries both coordinates.
    pub fn to_position(&self) -> Option<Position> {
        Some(Position {
            node_id: self.node_id,
            latitude: self.latitude?,
            longitude: self.longitude?,
            observed_at: self.observed_at,
        })
    }
}
