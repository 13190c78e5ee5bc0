//! Mesh wire protocol: the subset of the mesh protobuf schema the bridge reads.
//!
//! Field numbers and scalar encodings match the upstream `mqtt.proto` /
//! `mesh.proto` definitions so that envelopes produced by real gateways decode
//! unchanged. Fields the bridge never looks at are left out; prost skips
//! unknown fields on decode.

use chrono::{DateTime, Utc};
use prost::Message;

use crate::constants::DATA_PAYLOAD_LEN;
use crate::error::CodecError;
use crate::types::NodeId;

/// Outer wrapper published by gateways on `msh/...` topics.
#[derive(Clone, PartialEq, Message)]
pub struct ServiceEnvelope {
    #[prost(message, optional, tag = "1")]
    pub packet: Option<MeshPacket>,
    #[prost(string, tag = "2")]
    pub channel_id: String,
    #[prost(string, tag = "3")]
    pub gateway_id: String,
}

/// A unit of mesh traffic, either already decoded or still encrypted.
#[derive(Clone, PartialEq, Message)]
pub struct MeshPacket {
    #[prost(fixed32, tag = "1")]
    pub from: u32,
    #[prost(fixed32, tag = "2")]
    pub to: u32,
    #[prost(uint32, tag = "3")]
    pub channel: u32,
    #[prost(oneof = "PayloadVariant", tags = "4, 5")]
    pub payload_variant: Option<PayloadVariant>,
    #[prost(fixed32, tag = "6")]
    pub id: u32,
    #[prost(fixed32, tag = "7")]
    pub rx_time: u32,
    #[prost(uint32, tag = "9")]
    pub hop_limit: u32,
}

#[derive(Clone, PartialEq, prost::Oneof)]
pub enum PayloadVariant {
    #[prost(message, tag = "4")]
    Decoded(Data),
    #[prost(bytes, tag = "5")]
    Encrypted(Vec<u8>),
}

/// Decrypted application payload of a packet.
#[derive(Clone, PartialEq, Message)]
pub struct Data {
    #[prost(enumeration = "PortNum", tag = "1")]
    pub portnum: i32,
    #[prost(bytes = "vec", tag = "2")]
    pub payload: Vec<u8>,
    #[prost(bool, tag = "3")]
    pub want_response: bool,
    #[prost(fixed32, tag = "4")]
    pub dest: u32,
    #[prost(fixed32, tag = "5")]
    pub source: u32,
}

/// Application port numbers. Only the ones the bridge names are listed.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, prost::Enumeration)]
#[repr(i32)]
pub enum PortNum {
    UnknownApp = 0,
    TextMessageApp = 1,
    RemoteHardwareApp = 2,
    PositionApp = 3,
    NodeinfoApp = 4,
    RoutingApp = 5,
    AdminApp = 6,
    TelemetryApp = 67,
    TracerouteApp = 70,
    NeighborinfoApp = 71,
    MapReportApp = 73,
}

/// Inner payload of a `PositionApp` packet.
#[derive(Clone, PartialEq, Message)]
pub struct PositionReport {
    #[prost(sfixed32, optional, tag = "1")]
    pub latitude_i: Option<i32>,
    #[prost(sfixed32, optional, tag = "2")]
    pub longitude_i: Option<i32>,
    #[prost(int32, optional, tag = "3")]
    pub altitude: Option<i32>,
    /// Wall-clock time the position was taken (seconds since epoch).
    #[prost(fixed32, tag = "4")]
    pub time: u32,
    /// Time of the GPS solution (seconds since epoch).
    #[prost(fixed32, tag = "7")]
    pub timestamp: u32,
}

impl PositionReport {
    /// Best timestamp the device reported: the GPS `timestamp`, then `time`.
    ///
    /// Zero means "not set" on the wire. Returns `None` when neither is usable.
    // GPS fix time outranks the device clock; older bridges let `time` win.
    pub fn reported_at(&self) -> Option<DateTime<Utc>> {
        [self.timestamp, self.time]
            .into_iter()
            .filter(|secs| *secs > 0)
            .find_map(|secs| DateTime::from_timestamp(i64::from(secs), 0))
    }
}

impl MeshPacket {
    pub fn sender(&self) -> NodeId {
        NodeId(self.from)
    }

    pub fn decoded(&self) -> Option<&Data> {
        match &self.payload_variant {
            Some(PayloadVariant::Decoded(data)) => Some(data),
            _ => None,
        }
    }

    pub fn encrypted(&self) -> Option<&[u8]> {
        match &self.payload_variant {
            Some(PayloadVariant::Encrypted(bytes)) => Some(bytes),
            _ => None,
        }
    }
}

impl Data {
    pub fn is_position(&self) -> bool {
        self.portnum == PortNum::PositionApp as i32
    }
}

/// A decoded envelope: the channel it was published on and its packet.
#[derive(Debug, Clone, PartialEq)]
pub struct ChannelEnvelope {
    pub channel_id: String,
    pub gateway_id: String,
    pub packet: MeshPacket,
}

/// Parse an inbound broker payload into a [`ChannelEnvelope`].
///
/// Payloads longer than [`DATA_PAYLOAD_LEN`] are rejected before any parsing.
pub fn decode_envelope(bytes: &[u8]) -> Result<ChannelEnvelope, CodecError> {
    if bytes.len() > DATA_PAYLOAD_LEN {
        return Err(CodecError::TooLarge {
            size: bytes.len(),
            max: DATA_PAYLOAD_LEN,
        });
    }

    let envelope = ServiceEnvelope::decode(bytes)?;
    let packet = envelope.packet.ok_or(CodecError::MissingPacket)?;

    Ok(ChannelEnvelope {
        channel_id: envelope.channel_id,
        gateway_id: envelope.gateway_id,
        packet,
    })
}

/// Serialize an envelope. Used by tests and tooling that fabricate traffic.
pub fn encode_envelope(channel_id: &str, gateway_id: &str, packet: MeshPacket) -> Vec<u8> {
    ServiceEnvelope {
        packet: Some(packet),
        channel_id: channel_id.to_string(),
        gateway_id: gateway_id.to_string(),
    }
    .encode_to_vec()
}
