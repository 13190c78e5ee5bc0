//! In-memory location cache shared by both broker sessions.
//!
//! Entries are keyed by node id and only exist for nodes with at least one
//! accepted position. Place data is resolved lazily: a coordinate change
//! marks the entry stale, and the next `get(.., need_place = true)` calls the
//! reverse geocoder once.

use std::collections::HashMap;
use std::sync::Arc;

use meshgate_shared::types::{NodeId, Position};
use tokio::sync::RwLock;
use tracing::{debug, warn};

use crate::distance::geodesic_distance;
use crate::geocoder::ReverseGeocoder;
use crate::place::{PlaceInfo, Precision};

#[derive(Debug, Clone, PartialEq)]
pub struct LocationEntry {
    pub node_id: NodeId,
    pub latitude: f64,
    pub longitude: f64,
    pub place: Option<PlaceInfo>,
    /// Coordinates changed since `place` was computed.
    pub stale: bool,
}

impl LocationEntry {
    fn new(node_id: NodeId, latitude: f64, longitude: f64) -> Self {
        Self {
            node_id,
            latitude,
            longitude,
            place: None,
            stale: true,
        }
    }

    pub fn distance_metres(&self, other: &LocationEntry) -> f64 {
        geodesic_distance(self.latitude, self.longitude, other.latitude, other.longitude)
    }

    pub fn topic(&self, precision: Precision) -> Option<String> {
        self.place.as_ref()?.topic(precision)
    }

    pub fn most_precise_topic(&self, max_precision: Precision) -> Option<String> {
        self.place.as_ref()?.most_precise_topic(max_precision)
    }
}

pub struct LocationCache {
    entries: RwLock<HashMap<NodeId, LocationEntry>>,
    geocoder: Arc<dyn ReverseGeocoder>,
}

impl LocationCache {
    pub fn new(geocoder: Arc<dyn ReverseGeocoder>) -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            geocoder,
        }
    }

    /// Record a node's accepted coordinates.
    ///
    /// Creates the entry on first sight. Changed coordinates mark it stale;
    /// identical coordinates leave it untouched.
    pub async fn update_position(&self, node_id: NodeId, latitude: f64, longitude: f64) {
        let mut entries = self.entries.write().await;
        match entries.get_mut(&node_id) {
            Some(entry) => {
                if entry.latitude != latitude || entry.longitude != longitude {
                    entry.latitude = latitude;
                    entry.longitude = longitude;
                    entry.stale = true;
                }
            }
            None => {
                entries.insert(node_id, LocationEntry::new(node_id, latitude, longitude));
            }
        }
    }

    /// Seed the cache from stored positions.
    pub async fn load(&self, positions: &[Position]) {
        for position in positions {
            self.update_position(position.node_id, position.latitude, position.longitude)
                .await;
        }
    }

    /// Snapshot of a node's entry.
    ///
    /// With `need_place`, a stale entry is reverse-geocoded first. A failed
    /// lookup still returns the entry, stale and with its previous place.
    pub async fn get(&self, node_id: NodeId, need_place: bool) -> Option<LocationEntry> {
        let stale = self.entries.read().await.get(&node_id)?.stale;

        if need_place && stale {
            self.refresh_place(node_id).await;
        }

        self.entries.read().await.get(&node_id).cloned()
    }

    /// Resolve place data for the node's current coordinates.
    ///
    /// Returns `true` if the entry was updated. The lock is not held while
    /// the geocoder runs; the result is dropped if the coordinates moved in
    /// the meantime, since it describes the old position.
    pub async fn refresh_place(&self, node_id: NodeId) -> bool {
        let (latitude, longitude) = match self.entries.read().await.get(&node_id) {
            Some(entry) => (entry.latitude, entry.longitude),
            None => return false,
        };

        let place = match self.geocoder.reverse(latitude, longitude).await {
            Ok(result) => match PlaceInfo::from_result(result) {
                Some(place) => place,
                None => {
                    warn!(node = %node_id, "reverse geocode returned no country");
                    return false;
                }
            },
            Err(e) => {
                warn!(node = %node_id, error = %e, "reverse geocode failed");
                return false;
            }
        };

        let mut entries = self.entries.write().await;
        match entries.get_mut(&node_id) {
            Some(entry) if entry.latitude == latitude && entry.longitude == longitude => {
                debug!(
                    node = %node_id,
                    place = ?place.most_precise_topic(Precision::City),
                    "place resolved"
                );
                entry.place = Some(place);
                entry.stale = false;
                true
            }
            _ => false,
        }
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }
}
