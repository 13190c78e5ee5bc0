use std::path::PathBuf;

use meshgate_shared::{CryptoError, NodeIdError};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid YAML: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("Invalid client id {id:?}: {source}")]
    ClientId {
        id: String,
        #[source]
        source: NodeIdError,
    },

    #[error("Client {id:?} has invalid max_distance {value}")]
    MaxDistance { id: String, value: f64 },

    #[error("Invalid telemetry key: {0}")]
    TelemetryKey(#[source] CryptoError),

    #[error("Telemetry channel id must not be empty")]
    EmptyTelemetryChannel,

    #[error("Broker {0} has an empty address")]
    EmptyAddress(&'static str),
}

#[derive(Debug, Error)]
pub enum BridgeError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("Storage error: {0}")]
    Store(#[from] meshgate_store::StoreError),

    #[error("Geocoder error: {0}")]
    Geo(#[from] meshgate_geo::GeoError),

    #[error("Session task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}

pub type Result<T> = std::result::Result<T, BridgeError>;
