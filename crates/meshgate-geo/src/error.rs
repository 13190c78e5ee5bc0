use thiserror::Error;

#[derive(Error, Debug)]
pub enum GeoError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Geocoder returned an error: {0}")]
    Api(String),

    #[error("Malformed geocoder response: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("No place found at this location")]
    NoResult,

    #[error("Reverse geocoding is disabled")]
    Disabled,
}

pub type Result<T> = std::result::Result<T, GeoError>;
