//! Seams between a broker session and the MQTT client library.
//!
//! A session reads events from an [`EventSource`] and writes through a
//! [`BrokerLink`]. The rumqttc-backed implementations live in `mqtt`; tests
//! supply in-memory fakes.

use async_trait::async_trait;
use bytes::Bytes;
use thiserror::Error;

/// Something that happened on the broker connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Inbound {
    /// The broker accepted our connection.
    Connected,
    /// A message arrived on a subscribed topic.
    Publish { topic: String, payload: Bytes },
    /// Our DISCONNECT went out to the broker.
    Disconnected,
    /// Protocol traffic the session does not act on (acks, pings).
    Other,
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TransportError {
    #[error("connection timed out")]
    Timeout,

    #[error("connection refused: {0}")]
    Refused(String),

    #[error("connection closed")]
    Closed,

    #[error("{0}")]
    Other(String),
}

/// Outbound half of a broker connection.
#[async_trait]
pub trait BrokerLink: Send + Sync {
    async fn subscribe(&self, topic: &str) -> Result<(), TransportError>;

    async fn publish(&self, topic: &str, payload: Bytes) -> Result<(), TransportError>;

    async fn disconnect(&self) -> Result<(), TransportError>;
}

/// Inbound half of a broker connection.
///
/// Polling after an error reconnects.
#[async_trait]
pub trait EventSource: Send {
    async fn next(&mut self) -> Result<Inbound, TransportError>;
}
