//! # meshgate-shared
//!
//! Types shared by every meshgate crate: mesh node identities and positions,
//! the mesh wire protocol (protobuf envelopes and packets), and channel
//! encryption.

pub mod constants;
pub mod crypto;
pub mod error;
pub mod protocol;
pub mod types;

pub use crypto::{decrypt_packet, ChannelKey};
pub use error::{CodecError, CryptoError, NodeIdError};
pub use protocol::{decode_envelope, ChannelEnvelope, MeshPacket};
pub use types::{NodeId, Position};
