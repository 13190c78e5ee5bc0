//! Bridge configuration loaded from a YAML file.
//!
//! [`BridgeConfig`] mirrors the file layout. [`BridgeConfig::validate`] turns
//! it into [`BridgeSettings`], the checked runtime form the sessions use:
//! client ids parsed to node ids, the telemetry key decoded, and the remote
//! subscription list expanded with the configured imports.

use std::path::Path;
use std::time::Duration;

use meshgate_geo::geocoder::ARCGIS_REVERSE_URL;
use meshgate_shared::constants::{
    DEFAULT_FIRMWARE_KEY, DEFAULT_MAX_DISTANCE_METRES, DEFAULT_MQTT_PORT,
};
use meshgate_shared::{ChannelKey, NodeId};
use serde::Deserialize;

use crate::error::ConfigError;

// ---------------------------------------------------------------------------
// File layout
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize)]
pub struct BridgeConfig {
    #[serde(default)]
    pub clients: Vec<ClientEntry>,
    pub telemetry: TelemetryEntry,
    #[serde(default)]
    pub imports: Vec<ImportEntry>,
    pub mqtt: MqttSection,
    #[serde(default)]
    pub geocoder: GeocoderConfig,
}

/// A local radio whose traffic is bridged.
#[derive(Debug, Clone, Deserialize)]
pub struct ClientEntry {
    /// Node id as hex, optionally `!`-prefixed. Also used verbatim in the client's topic.
    pub id: String,
    /// Forwarding radius in metres.
    #[serde(default = "default_max_distance")]
    pub max_distance: f64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TelemetryEntry {
    /// Channel id whose packets carry positions.
    pub id: String,
    /// Base64 channel key.
    pub key: String,
}

/// A remote region/channel to pull traffic from.
#[derive(Debug, Clone, Deserialize)]
pub struct ImportEntry {
    pub region: String,
    pub remote: String,
    #[serde(default)]
    pub local: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MqttSection {
    pub local: BrokerConfig,
    pub remote: BrokerConfig,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct BrokerConfig {
    pub address: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
    #[serde(default)]
    pub subscriptions: Vec<String>,
    /// MQTT client id. Generated per session when absent.
    #[serde(default)]
    pub client_id: Option<String>,
    #[serde(default = "default_keep_alive")]
    pub keep_alive_secs: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct GeocoderConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_endpoint")]
    pub endpoint: String,
    #[serde(default = "default_geocoder_timeout")]
    pub timeout_secs: u64,
}

impl Default for GeocoderConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            endpoint: default_endpoint(),
            timeout_secs: default_geocoder_timeout(),
        }
    }
}

impl GeocoderConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl BrokerConfig {
    /// Keep-alive interval, never shorter than 5 s.
    pub fn keep_alive(&self) -> Duration {
        Duration::from_secs(self.keep_alive_secs.max(5))
    }
}

fn default_max_distance() -> f64 {
    DEFAULT_MAX_DISTANCE_METRES
}

fn default_port() -> u16 {
    DEFAULT_MQTT_PORT
}

fn default_keep_alive() -> u64 {
    30
}

fn default_true() -> bool {
    true
}

fn default_endpoint() -> String {
    ARCGIS_REVERSE_URL.to_string()
}

fn default_geocoder_timeout() -> u64 {
    10
}

// ---------------------------------------------------------------------------
// Validated settings
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
pub struct ClientConfig {
    /// The id exactly as configured; used to build the client's topic.
    pub id: String,
    pub node_id: NodeId,
    pub max_distance_metres: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TelemetryChannel {
    pub channel_id: String,
    pub key: ChannelKey,
}

#[derive(Debug, Clone)]
pub struct BridgeSettings {
    pub clients: Vec<ClientConfig>,
    pub telemetry: TelemetryChannel,
    pub local: BrokerConfig,
    /// Remote broker, with import subscriptions merged in.
    pub remote: BrokerConfig,
    pub geocoder: GeocoderConfig,
}

impl BridgeConfig {
    /// Read and parse a YAML config file.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_yaml(&text)
    }

    pub fn from_yaml(text: &str) -> Result<Self, ConfigError> {
        Ok(serde_yaml::from_str(text)?)
    }

    pub fn validate(self) -> Result<BridgeSettings, ConfigError> {
        let clients = self
            .clients
            .into_iter()
            .map(|entry| {
                let node_id = NodeId::from_hex(&entry.id).map_err(|source| ConfigError::ClientId {
                    id: entry.id.clone(),
                    source,
                })?;
                if !entry.max_distance.is_finite() || entry.max_distance < 0.0 {
                    return Err(ConfigError::MaxDistance {
                        id: entry.id,
                        value: entry.max_distance,
                    });
                }
                Ok(ClientConfig {
                    id: entry.id,
                    node_id,
                    max_distance_metres: entry.max_distance,
                })
            })
            .collect::<Result<Vec<_>, _>>()?;

        if self.telemetry.id.trim().is_empty() {
            return Err(ConfigError::EmptyTelemetryChannel);
        }
        let telemetry = TelemetryChannel {
            channel_id: self.telemetry.id,
            key: ChannelKey::parse(&self.telemetry.key).map_err(ConfigError::TelemetryKey)?,
        };

        if self.mqtt.local.address.trim().is_empty() {
            return Err(ConfigError::EmptyAddress("local"));
        }
        if self.mqtt.remote.address.trim().is_empty() {
            return Err(ConfigError::EmptyAddress("remote"));
        }

        let mut remote = self.mqtt.remote;
        remote.subscriptions = merge_subscriptions(&remote.subscriptions, &self.imports);

        Ok(BridgeSettings {
            clients,
            telemetry,
            local: self.mqtt.local,
            remote,
            geocoder: self.geocoder,
        })
    }
}

/// Remote topic for an import: `msh/<region>/2/e/<remote>/#`.
pub fn import_topic(import: &ImportEntry) -> String {
    format!(
        "msh/{}/{}/e/{}/#",
        import.region, DEFAULT_FIRMWARE_KEY, import.remote
    )
}

/// Explicit subscriptions followed by import topics, first occurrence wins.
fn merge_subscriptions(explicit: &[String], imports: &[ImportEntry]) -> Vec<String> {
    let mut merged: Vec<String> = Vec::with_capacity(explicit.len() + imports.len());
    let candidates = explicit.iter().cloned().chain(imports.iter().map(import_topic));
    for topic in candidates {
        if !merged.contains(&topic) {
            merged.push(topic);
        }
    }
    merged
}
