use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::constants::COORDINATE_SCALE;
use crate::error::NodeIdError;

// Mesh node identity = the radio's 32-bit node number
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(pub u32);

impl NodeId {
    /// Parse a configured user id, e.g. `e2e52528` or `!e2e52528`.
    pub fn from_hex(s: &str) -> Result<Self, NodeIdError> {
        let trimmed = s.trim();
        let digits = trimmed.strip_prefix('!').unwrap_or(trimmed);
        u32::from_str_radix(digits, 16)
            .map(Self)
            .map_err(|_| NodeIdError::InvalidHex(s.to_string()))
    }

    pub fn is_unset(&self) -> bool {
        self.0 == 0
    }
}

impl std::fmt::Display for NodeId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "!{:08x}", self.0)
    }
}

impl From<u32> for NodeId {
    fn from(value: u32) -> Self {
        Self(value)
    }
}

/// A node position as reported by the node itself.
///
/// `observed_at` is the device/packet time, never the time we received it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub node_id: NodeId,
    pub latitude: f64,
    pub longitude: f64,
    pub observed_at: DateTime<Utc>,
}

impl Position {
    /// Build a position from the fixed-point wire representation.
    ///
    /// A zero latitude or longitude means "unset" on the wire and yields `None`.
    pub fn from_fixed(
        node_id: NodeId,
        latitude_i: i32,
        longitude_i: i32,
        observed_at: DateTime<Utc>,
    ) -> Option<Self> {
        if latitude_i == 0 || longitude_i == 0 {
            return None;
        }
        Some(Self {
            node_id,
            latitude: f64::from(latitude_i) * COORDINATE_SCALE,
            longitude: f64::from(longitude_i) * COORDINATE_SCALE,
            observed_at,
        })
    }
}
