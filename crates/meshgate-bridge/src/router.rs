//! Forwarding decisions for the two broker sessions.
//!
//! [`LocalRouter`] handles traffic from the local broker: telemetry-channel
//! positions are absorbed, everything else is fanned out to the other
//! clients' topics. [`RemoteRouter`] handles traffic from the remote broker:
//! packets readable with the public key are forwarded to each client whose
//! own position is within its radius of the sender.

use async_trait::async_trait;
use bytes::Bytes;
use meshgate_geo::Precision;
use meshgate_shared::constants::{REMOTE_TOPIC_PREFIX_SEGMENTS, ROUTER_TOPIC_ROOT};
use meshgate_shared::{decode_envelope, decrypt_packet, ChannelKey, NodeId};
use tracing::{debug, info, warn};

use crate::config::{ClientConfig, TelemetryChannel};
use crate::session::{MessageHandler, SessionHandle};
use crate::telemetry::PositionTracker;

/// Topic of a client on the local broker: `msh/router/<id>[/<suffix>]`.
pub fn client_topic(client_id: &str, suffix: Option<&str>) -> String {
    match suffix {
        Some(suffix) => format!("{ROUTER_TOPIC_ROOT}/{client_id}/{suffix}"),
        None => format!("{ROUTER_TOPIC_ROOT}/{client_id}"),
    }
}

/// A remote topic without its region and firmware-version segments.
///
/// `msh/EU_868/2/e/LongFast/!e2e52528` becomes `2/e/LongFast/!e2e52528`.
pub fn strip_topic_prefix(topic: &str) -> Option<&str> {
    topic
        .splitn(REMOTE_TOPIC_PREFIX_SEGMENTS + 1, '/')
        .nth(REMOTE_TOPIC_PREFIX_SEGMENTS)
        .filter(|rest| !rest.is_empty())
}

/// Every client except the one that sent the packet.
pub fn fan_out_targets(
    clients: &[ClientConfig],
    sender: NodeId,
) -> impl Iterator<Item = &ClientConfig> {
    clients.iter().filter(move |client| client.node_id != sender)
}

// ---------------------------------------------------------------------------
// Local
// ---------------------------------------------------------------------------

pub struct LocalRouter {
    tracker: PositionTracker,
    clients: Vec<ClientConfig>,
    telemetry: TelemetryChannel,
    local: SessionHandle,
}

impl LocalRouter {
    pub fn new(
        tracker: PositionTracker,
        clients: Vec<ClientConfig>,
        telemetry: TelemetryChannel,
        local: SessionHandle,
    ) -> Self {
        Self {
            tracker,
            clients,
            telemetry,
            local,
        }
    }

    /// Resolve and log the region of a client that just moved.
    async fn report_client_region(&mut self, node_id: NodeId) {
        let Some(client) = self.clients.iter().find(|c| c.node_id == node_id) else {
            return;
        };

        let cache = self.tracker.cache().clone();
        let region = cache
            .get(node_id, true)
            .await
            .and_then(|entry| entry.most_precise_topic(Precision::City));

        match region {
            Some(region) => info!(client = %client.id, region = %region, "client region"),
            None => debug!(client = %client.id, "client region unknown"),
        }
    }
}

#[async_trait]
impl MessageHandler for LocalRouter {
    async fn on_connect(&mut self, session: &SessionHandle) {
        session.subscribe(&format!("{ROUTER_TOPIC_ROOT}/#")).await;
    }

    async fn on_message(&mut self, topic: &str, payload: &Bytes) {
        let envelope = match decode_envelope(payload) {
            Ok(envelope) => envelope,
            Err(e) => {
                debug!(session = "local", topic = %topic, error = %e, "dropping malformed envelope");
                return;
            }
        };
        let sender = envelope.packet.sender();

        if envelope.channel_id == self.telemetry.channel_id {
            match decrypt_packet(&envelope.packet, &self.telemetry.key) {
                Ok(packet) => {
                    if self.tracker.handle_telemetry(sender, &packet).await.is_some() {
                        self.report_client_region(sender).await;
                    }
                    // Telemetry stays on this side
                    return;
                }
                Err(e) => {
                    debug!(node = %sender, error = %e, "telemetry packet not decryptable, forwarding as-is");
                }
            }
        }

        for client in fan_out_targets(&self.clients, sender) {
            self.local
                .publish(&client_topic(&client.id, None), payload.clone())
                .await;
        }
    }
}

// ---------------------------------------------------------------------------
// Remote
// ---------------------------------------------------------------------------

pub struct RemoteRouter {
    tracker: PositionTracker,
    clients: Vec<ClientConfig>,
    subscriptions: Vec<String>,
    key: ChannelKey,
    local: SessionHandle,
}

impl RemoteRouter {
    pub fn new(
        tracker: PositionTracker,
        clients: Vec<ClientConfig>,
        subscriptions: Vec<String>,
        local: SessionHandle,
    ) -> Self {
        Self {
            tracker,
            clients,
            subscriptions,
            key: ChannelKey::default_channel(),
            local,
        }
    }
}

#[async_trait]
impl MessageHandler for RemoteRouter {
    async fn on_connect(&mut self, session: &SessionHandle) {
        if self.subscriptions.is_empty() {
            warn!(session = session.name(), "no remote subscriptions configured");
        }
        for topic in &self.subscriptions {
            session.subscribe(topic).await;
        }
    }

    async fn on_message(&mut self, topic: &str, payload: &Bytes) {
        let envelope = match decode_envelope(payload) {
            Ok(envelope) => envelope,
            Err(e) => {
                debug!(session = "remote", topic = %topic, error = %e, "dropping malformed envelope");
                return;
            }
        };

        let packet = match decrypt_packet(&envelope.packet, &self.key) {
            Ok(packet) => packet,
            Err(e) => {
                debug!(topic = %topic, channel = %envelope.channel_id, error = %e, "not readable with the public key");
                return;
            }
        };

        let sender = packet.sender();
        if sender.is_unset() {
            return;
        }
        self.tracker.handle_telemetry(sender, &packet).await;

        let cache = self.tracker.cache().clone();
        let Some(remote_entry) = cache.get(sender, false).await else {
            return;
        };

        let suffix = strip_topic_prefix(topic);
        for client in &self.clients {
            let Some(entry) = cache.get(client.node_id, false).await else {
                continue;
            };

            let distance = entry.distance_metres(&remote_entry);
            if distance > client.max_distance_metres {
                continue;
            }

            debug!(
                client = %client.id,
                node = %sender,
                distance_m = distance.round(),
                "forwarding remote packet"
            );
            self.local
                .publish(&client_topic(&client.id, suffix), payload.clone())
                .await;
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use meshgate_geo::{DisabledGeocoder, LocationCache};
    use meshgate_shared::crypto::{encrypt_packet, packet_nonce};
    use meshgate_shared::protocol::{encode_envelope, Data, PayloadVariant, PortNum, PositionReport};
    use meshgate_shared::MeshPacket;
    use meshgate_store::Database;
    use prost::Message;

    use super::*;
    use crate::transport::testing::RecordingLink;

    const REMOTE_TOPIC: &str = "msh/EU_868/2/e/LongFast/!0000beef";

    fn client(id: &str, max_distance_metres: f64) -> ClientConfig {
        ClientConfig {
            id: id.to_string(),
            node_id: NodeId::from_hex(id).unwrap(),
            max_distance_metres,
        }
    }

    fn text_packet(from: u32) -> MeshPacket {
        MeshPacket {
            from,
            id: 77,
            payload_variant: Some(PayloadVariant::Decoded(Data {
                portnum: PortNum::TextMessageApp as i32,
                payload: b"hi".to_vec(),
                ..Default::default()
            })),
            ..Default::default()
        }
    }

    fn position_packet(from: u32, lat: f64, lon: f64, time: u32) -> MeshPacket {
        let report = PositionReport {
            latitude_i: Some((lat * 1e7).round() as i32),
            longitude_i: Some((lon * 1e7).round() as i32),
            time,
            ..Default::default()
        };
        MeshPacket {
            from,
            id: 99,
            payload_variant: Some(PayloadVariant::Decoded(Data {
                portnum: PortNum::PositionApp as i32,
                payload: report.encode_to_vec(),
                ..Default::default()
            })),
            ..Default::default()
        }
    }

    /// Encrypted packet whose plaintext under `key` is not a valid `Data`.
    fn undecodable(from: u32, key: &ChannelKey) -> MeshPacket {
        let mut ciphertext = vec![0xff, 0xff, 0xff];
        key.apply_keystream(&packet_nonce(5, from), &mut ciphertext).unwrap();
        MeshPacket {
            from,
            id: 5,
            payload_variant: Some(PayloadVariant::Encrypted(ciphertext)),
            ..Default::default()
        }
    }

    fn sealed(channel: &str, packet: &MeshPacket, key: &ChannelKey) -> Bytes {
        let encrypted = encrypt_packet(packet, key).unwrap();
        Bytes::from(encode_envelope(channel, "!gateway", encrypted))
    }

    fn new_cache() -> Arc<LocationCache> {
        Arc::new(LocationCache::new(Arc::new(DisabledGeocoder)))
    }

    fn tracker(session: &'static str, cache: &Arc<LocationCache>) -> PositionTracker {
        PositionTracker::new(session, Database::open_in_memory().unwrap(), cache.clone())
    }

    fn telemetry() -> TelemetryChannel {
        TelemetryChannel {
            channel_id: "Telemetry".into(),
            key: ChannelKey::default_channel(),
        }
    }

    fn local_router(clients: Vec<ClientConfig>) -> (LocalRouter, Arc<RecordingLink>, Arc<LocationCache>) {
        let link = Arc::new(RecordingLink::default());
        let cache = new_cache();
        let handle = SessionHandle::new("local", link.clone());
        let router = LocalRouter::new(tracker("local", &cache), clients, telemetry(), handle);
        (router, link, cache)
    }

    fn remote_router(clients: Vec<ClientConfig>) -> (RemoteRouter, Arc<RecordingLink>, Arc<LocationCache>) {
        let link = Arc::new(RecordingLink::default());
        let cache = new_cache();
        let handle = SessionHandle::new("local", link.clone());
        let router = RemoteRouter::new(
            tracker("remote", &cache),
            clients,
            vec!["msh/EU_868/2/e/LongFast/#".into()],
            handle,
        );
        (router, link, cache)
    }

    #[test]
    fn test_client_topic() {
        assert_eq!(client_topic("!e2e52528", None), "msh/router/!e2e52528");
        assert_eq!(
            client_topic("e2e52528", Some("2/e/LongFast/!0000beef")),
            "msh/router/e2e52528/2/e/LongFast/!0000beef"
        );
    }

    #[test]
    fn test_strip_topic_prefix() {
        assert_eq!(strip_topic_prefix(REMOTE_TOPIC), Some("2/e/LongFast/!0000beef"));
        assert_eq!(strip_topic_prefix("msh/EU_868"), None);
        assert_eq!(strip_topic_prefix("msh/EU_868/"), None);
    }

    #[test]
    fn test_fan_out_excludes_only_sender() {
        let clients = vec![client("0000000a", 1.0), client("0000000b", 1.0), client("0000000c", 1.0)];

        let targets: Vec<&str> = fan_out_targets(&clients, NodeId(0xb)).map(|c| c.id.as_str()).collect();
        assert_eq!(targets, vec!["0000000a", "0000000c"]);

        // Unconfigured sender reaches everyone
        assert_eq!(fan_out_targets(&clients, NodeId(0x99)).count(), 3);
    }

    #[tokio::test]
    async fn test_local_fan_out_skips_sender() {
        let clients = vec![client("!0000000a", 1.0), client("!0000000b", 1.0), client("!0000000c", 1.0)];
        let (mut router, link, _) = local_router(clients);
        let payload = sealed("LongFast", &text_packet(0xa), &ChannelKey::default_channel());

        router.on_message("msh/router/!0000000a", &payload).await;

        assert_eq!(
            link.published_topics(),
            vec!["msh/router/!0000000b", "msh/router/!0000000c"]
        );
        let published = link.published.lock().unwrap();
        assert!(published.iter().all(|(_, body)| *body == payload));
    }

    #[tokio::test]
    async fn test_local_telemetry_updates_position_without_fan_out() {
        let clients = vec![client("0000000a", 1.0), client("0000000b", 1.0)];
        let (mut router, link, cache) = local_router(clients);
        let payload = sealed(
            "Telemetry",
            &position_packet(0xa, 50.0, 8.0, 1_700_000_000),
            &ChannelKey::default_channel(),
        );

        router.on_message("msh/router/0000000a", &payload).await;

        assert!(link.published_topics().is_empty());
        let entry = cache.get(NodeId(0xa), false).await.unwrap();
        assert!((entry.latitude - 50.0).abs() < 1e-6);
    }

    #[tokio::test]
    async fn test_local_undecryptable_telemetry_is_fanned_out() {
        let clients = vec![client("0000000a", 1.0), client("0000000b", 1.0)];
        let (mut router, link, cache) = local_router(clients);
        let packet = undecodable(0xa, &ChannelKey::default_channel());
        let payload = Bytes::from(encode_envelope("Telemetry", "!gateway", packet));

        router.on_message("msh/router/0000000a", &payload).await;

        assert_eq!(link.published_topics(), vec!["msh/router/0000000b"]);
        assert!(cache.is_empty().await);
    }

    #[tokio::test]
    async fn test_local_drops_malformed_payload() {
        let (mut router, link, _) = local_router(vec![client("0000000a", 1.0)]);

        router.on_message("msh/router/x", &Bytes::from_static(&[0xff; 8])).await;
        router.on_message("msh/router/x", &Bytes::from(vec![0u8; 300])).await;

        assert!(link.published_topics().is_empty());
    }

    #[tokio::test]
    async fn test_remote_forwards_within_radius() {
        let (mut router, link, cache) = remote_router(vec![client("!0000000a", 1_000.0)]);
        cache.update_position(NodeId(0xa), 50.0, 8.0).await;

        // ~500 m north
        let payload = sealed(
            "LongFast",
            &position_packet(0xbeef, 50.0045, 8.0, 1_700_000_000),
            &ChannelKey::default_channel(),
        );
        router.on_message(REMOTE_TOPIC, &payload).await;

        assert_eq!(
            link.published_topics(),
            vec!["msh/router/!0000000a/2/e/LongFast/!0000beef"]
        );
        assert_eq!(link.published.lock().unwrap()[0].1, payload);
    }

    #[tokio::test]
    async fn test_remote_drops_outside_radius() {
        let (mut router, link, cache) = remote_router(vec![client("!0000000a", 1_000.0)]);
        cache.update_position(NodeId(0xa), 50.0, 8.0).await;

        // ~1500 m north
        let payload = sealed(
            "LongFast",
            &position_packet(0xbeef, 50.0135, 8.0, 1_700_000_000),
            &ChannelKey::default_channel(),
        );
        router.on_message(REMOTE_TOPIC, &payload).await;

        assert!(link.published_topics().is_empty());
        // Position is still recorded
        assert!(cache.get(NodeId(0xbeef), false).await.is_some());
    }

    #[tokio::test]
    async fn test_remote_non_position_uses_cached_sender() {
        let (mut router, link, cache) = remote_router(vec![
            client("0000000a", 1_000.0),
            client("0000000b", 1_000.0),
        ]);
        cache.update_position(NodeId(0xa), 50.0, 8.0).await;
        cache.update_position(NodeId(0xbeef), 50.001, 8.0).await;

        let payload = sealed("LongFast", &text_packet(0xbeef), &ChannelKey::default_channel());
        router.on_message(REMOTE_TOPIC, &payload).await;

        // Client b has no known position yet
        assert_eq!(
            link.published_topics(),
            vec!["msh/router/0000000a/2/e/LongFast/!0000beef"]
        );
    }

    #[tokio::test]
    async fn test_remote_unknown_sender_not_forwarded() {
        let (mut router, link, cache) = remote_router(vec![client("0000000a", 80_000.0)]);
        cache.update_position(NodeId(0xa), 50.0, 8.0).await;

        let payload = sealed("LongFast", &text_packet(0xbeef), &ChannelKey::default_channel());
        router.on_message(REMOTE_TOPIC, &payload).await;

        assert!(link.published_topics().is_empty());
    }

    #[tokio::test]
    async fn test_remote_requires_public_key() {
        let (mut router, link, cache) = remote_router(vec![client("0000000a", 80_000.0)]);
        cache.update_position(NodeId(0xa), 50.0, 8.0).await;
        cache.update_position(NodeId(0xbeef), 50.0, 8.0).await;

        let payload = Bytes::from(encode_envelope(
            "Private",
            "!gateway",
            undecodable(0xbeef, &ChannelKey::default_channel()),
        ));
        router.on_message(REMOTE_TOPIC, &payload).await;

        assert!(link.published_topics().is_empty());
    }

    #[tokio::test]
    async fn test_remote_subscribes_on_connect() {
        let (mut router, _, _) = remote_router(Vec::new());
        let remote_link = Arc::new(RecordingLink::default());
        let remote = SessionHandle::new("remote", remote_link.clone());

        router.on_connect(&remote).await;

        assert_eq!(
            *remote_link.subscribed.lock().unwrap(),
            vec!["msh/EU_868/2/e/LongFast/#".to_string()]
        );
    }
}
