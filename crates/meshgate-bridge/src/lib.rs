//! # meshgate-bridge
//!
//! Bridges mesh-radio traffic between a local MQTT broker and a remote one.
//!
//! - The **local** session absorbs positions from the telemetry channel and
//!   fans every other packet out to the other configured clients.
//! - The **remote** session forwards public-channel traffic to each client
//!   whose last known position is within its configured radius of the sender.
//!
//! Both sessions share one location cache and one SQLite position store, and
//! reconnect on their own until stopped.

pub mod bridge;
pub mod config;
pub mod error;
pub mod mqtt;
pub mod router;
pub mod session;
pub mod telemetry;
pub mod transport;

pub use bridge::{Bridge, Endpoint};
pub use config::{BridgeConfig, BridgeSettings, ClientConfig, TelemetryChannel};
pub use error::{BridgeError, ConfigError, Result};
pub use session::{SessionHandle, SessionState};
