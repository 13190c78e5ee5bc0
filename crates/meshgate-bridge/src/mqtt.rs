//! rumqttc-backed broker transport.

use std::io::ErrorKind;

use async_trait::async_trait;
use bytes::Bytes;
use rumqttc::{
    AsyncClient, ClientError, ConnectReturnCode, ConnectionError, Event, EventLoop, MqttOptions,
    Outgoing, Packet, QoS,
};
use tracing::debug;

use crate::config::BrokerConfig;
use crate::transport::{BrokerLink, EventSource, Inbound, TransportError};

/// Request queue depth between the client handle and the event loop.
const REQUEST_CAPACITY: usize = 1024;

/// Build the client handle and event loop for one broker.
///
/// Nothing touches the network until the event loop is first polled.
pub fn connect(name: &str, config: &BrokerConfig) -> (MqttLink, MqttEvents) {
    let client_id = config
        .client_id
        .clone()
        .unwrap_or_else(|| format!("meshgate-{name}-{:08x}", rand::random::<u32>()));

    let mut options = MqttOptions::new(client_id.clone(), config.address.clone(), config.port);
    options.set_keep_alive(config.keep_alive());
    if let Some(username) = &config.username {
        options.set_credentials(
            username.clone(),
            config.password.clone().unwrap_or_default(),
        );
    }

    debug!(
        session = name,
        client_id = %client_id,
        address = %config.address,
        port = config.port,
        "MQTT client configured"
    );

    let (client, eventloop) = AsyncClient::new(options, REQUEST_CAPACITY);
    (MqttLink { client }, MqttEvents { eventloop })
}

pub struct MqttLink {
    client: AsyncClient,
}

#[async_trait]
impl BrokerLink for MqttLink {
    async fn subscribe(&self, topic: &str) -> Result<(), TransportError> {
        self.client
            .subscribe(topic, QoS::AtMostOnce)
            .await
            .map_err(client_error)
    }

    /// Queues without waiting. A session's own event loop is not polled
    /// while its handler runs, so waiting on a full queue could stall it.
    async fn publish(&self, topic: &str, payload: Bytes) -> Result<(), TransportError> {
        self.client
            .try_publish(topic, QoS::AtMostOnce, false, payload.to_vec())
            .map_err(client_error)
    }

    /// Queues DISCONNECT without waiting; the session flushes it.
    async fn disconnect(&self) -> Result<(), TransportError> {
        self.client.try_disconnect().map_err(client_error)
    }
}

pub struct MqttEvents {
    eventloop: EventLoop,
}

#[async_trait]
impl EventSource for MqttEvents {
    async fn next(&mut self) -> Result<Inbound, TransportError> {
        match self.eventloop.poll().await {
            Ok(Event::Incoming(Packet::ConnAck(ack))) => match ack.code {
                ConnectReturnCode::Success => Ok(Inbound::Connected),
                code => Err(TransportError::Refused(format!("{code:?}"))),
            },
            Ok(Event::Incoming(Packet::Publish(publish))) => Ok(Inbound::Publish {
                topic: publish.topic,
                payload: publish.payload,
            }),
            Ok(Event::Outgoing(Outgoing::Disconnect)) => Ok(Inbound::Disconnected),
            Ok(_) => Ok(Inbound::Other),
            Err(e) => Err(classify(e)),
        }
    }
}

/// Sort a rumqttc failure into the classes the reconnect policy cares about.
fn classify(error: ConnectionError) -> TransportError {
    match error {
        ConnectionError::NetworkTimeout | ConnectionError::FlushTimeout => TransportError::Timeout,
        ConnectionError::Io(e) if e.kind() == ErrorKind::TimedOut => TransportError::Timeout,
        ConnectionError::ConnectionRefused(code) => TransportError::Refused(format!("{code:?}")),
        ConnectionError::RequestsDone => TransportError::Closed,
        other => TransportError::Other(other.to_string()),
    }
}

fn client_error(error: ClientError) -> TransportError {
    TransportError::Other(error.to_string())
}
