//! Geodesic distance on the WGS-84 ellipsoid.

use std::sync::OnceLock;

use geographiclib_rs::{Geodesic, InverseGeodesic};

fn wgs84() -> &'static Geodesic {
    static WGS84: OnceLock<Geodesic> = OnceLock::new();
    WGS84.get_or_init(Geodesic::wgs84)
}

/// Shortest distance in metres between two points given in decimal degrees.
pub fn geodesic_distance(lat1: f64, lon1: f64, lat2: f64, lon2: f64) -> f64 {
    <Geodesic as InverseGeodesic<f64>>::inverse(wgs84(), lat1, lon1, lat2, lon2)
}
