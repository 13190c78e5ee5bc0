//! Position extraction from decoded telemetry packets.

use std::sync::Arc;

use chrono::Utc;
use meshgate_geo::LocationCache;
use meshgate_shared::protocol::PositionReport;
use meshgate_shared::{MeshPacket, NodeId, Position};
use meshgate_store::Database;
use prost::Message;
use tracing::{debug, warn};

/// Applies reported positions to the store and, when accepted, the cache.
///
/// Each session owns one tracker and with it one database handle.
pub struct PositionTracker {
    session: &'static str,
    db: Database,
    cache: Arc<LocationCache>,
}

impl PositionTracker {
    pub fn new(session: &'static str, db: Database, cache: Arc<LocationCache>) -> Self {
        Self { session, db, cache }
    }

    pub fn cache(&self) -> &Arc<LocationCache> {
        &self.cache
    }

    /// Handle a decoded packet from `node_id`.
    ///
    /// Only position packets are considered. Returns the position if it was
    /// newer than the stored one and has been applied.
    pub async fn handle_telemetry(&mut self, node_id: NodeId, packet: &MeshPacket) -> Option<Position> {
        let data = packet.decoded().filter(|data| data.is_position())?;

        let report = match PositionReport::decode(data.payload.as_slice()) {
            Ok(report) => report,
            Err(e) => {
                debug!(session = self.session, node = %node_id, error = %e, "malformed position payload");
                return None;
            }
        };

        let observed_at = report.reported_at().unwrap_or_else(Utc::now);
        let Some(position) = Position::from_fixed(
            node_id,
            report.latitude_i.unwrap_or(0),
            report.longitude_i.unwrap_or(0),
            observed_at,
        ) else {
            debug!(session = self.session, node = %node_id, "position without coordinates");
            return None;
        };

        match self.db.upsert_position_if_newer(&position) {
            Ok(true) => {}
            Ok(false) => {
                debug!(
                    session = self.session,
                    node = %node_id,
                    observed_at = %position.observed_at,
                    "stale position ignored"
                );
                return None;
            }
            Err(e) => {
                warn!(session = self.session, node = %node_id, error = %e, "failed to store position");
                return None;
            }
        }

        self.cache
            .update_position(node_id, position.latitude, position.longitude)
            .await;
        debug!(
            session = self.session,
            node = %node_id,
            latitude = position.latitude,
            longitude = position.longitude,
            "updated position"
        );
        Some(position)
    }
}
