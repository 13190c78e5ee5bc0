//! Geographic state for the bridge.
//!
//! Holds the in-memory location cache shared by both broker sessions, the
//! place/topic derivation from reverse-geocoded data, and the external geo
//! collaborators (reverse geocoder, country table, geodesic distance).

pub mod cache;
pub mod country;
pub mod distance;
pub mod geocoder;
pub mod place;

mod error;

pub use cache::{LocationCache, LocationEntry};
pub use distance::geodesic_distance;
pub use error::{GeoError, Result};
pub use geocoder::{ArcGisGeocoder, DisabledGeocoder, PlaceResult, ReverseGeocoder};
pub use place::{PlaceInfo, Precision};
