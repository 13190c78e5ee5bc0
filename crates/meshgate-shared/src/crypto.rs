//! Channel encryption as used by mesh gateways on MQTT.
//!
//! Packets are encrypted with AES-CTR (128-bit big-endian counter). The key
//! size selects AES-128/192/256. The 16-byte initial counter block is
//! `packet.id` (u64 LE) followed by `packet.from` (u64 LE).

use aes::{Aes128, Aes192, Aes256};
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use ctr::cipher::{KeyIvInit, StreamCipher};
use prost::Message;

use crate::constants::{DEFAULT_CHANNEL_KEY, DEFAULT_PSK, LEGACY_DEFAULT_KEY, NONCE_SIZE};
use crate::error::CryptoError;
use crate::protocol::{Data, MeshPacket, PayloadVariant};

type Aes128Ctr = ctr::Ctr128BE<Aes128>;
type Aes192Ctr = ctr::Ctr128BE<Aes192>;
type Aes256Ctr = ctr::Ctr128BE<Aes256>;

/// Normalize a configured base64 key and substitute the legacy default.
///
/// URL-safe characters are mapped to the standard alphabet and the string is
/// right-padded with `=` to a multiple of four.
pub fn expand_key(key: &str) -> String {
    if key == DEFAULT_CHANNEL_KEY {
        return LEGACY_DEFAULT_KEY.to_string();
    }

    let mut normalized: String = key
        .trim()
        .chars()
        .map(|c| match c {
            '-' => '+',
            '_' => '/',
            other => other,
        })
        .collect();
    while normalized.len() % 4 != 0 {
        normalized.push('=');
    }
    normalized
}

/// A decoded channel key, ready for AES.
#[derive(Clone, PartialEq, Eq)]
pub struct ChannelKey(Vec<u8>);

impl ChannelKey {
    /// Parse a configured base64 key (after [`expand_key`]).
    pub fn parse(key: &str) -> Result<Self, CryptoError> {
        let bytes = STANDARD
            .decode(expand_key(key))
            .map_err(|e| CryptoError::InvalidKeyEncoding(e.to_string()))?;
        Self::from_bytes(bytes)
    }

    pub fn from_bytes(bytes: Vec<u8>) -> Result<Self, CryptoError> {
        match bytes.len() {
            16 | 24 | 32 => Ok(Self(bytes)),
            other => Err(CryptoError::InvalidKeyLength(other)),
        }
    }

    /// The key shared by every public channel.
    pub fn default_channel() -> Self {
        Self(DEFAULT_PSK.to_vec())
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// Apply the AES-CTR keystream in place. Encryption and decryption are the same operation.
    pub fn apply_keystream(&self, nonce: &[u8; NONCE_SIZE], buf: &mut [u8]) -> Result<(), CryptoError> {
        let len = self.0.len();
        let bad_len = |_| CryptoError::InvalidKeyLength(len);
        match len {
            16 => Aes128Ctr::new_from_slices(&self.0, nonce)
                .map_err(bad_len)?
                .apply_keystream(buf),
            24 => Aes192Ctr::new_from_slices(&self.0, nonce)
                .map_err(bad_len)?
                .apply_keystream(buf),
            32 => Aes256Ctr::new_from_slices(&self.0, nonce)
                .map_err(bad_len)?
                .apply_keystream(buf),
            other => return Err(CryptoError::InvalidKeyLength(other)),
        }
        Ok(())
    }
}

impl std::fmt::Debug for ChannelKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "ChannelKey(<{} bytes>)", self.0.len())
    }
}

pub fn packet_nonce(packet_id: u32, from: u32) -> [u8; NONCE_SIZE] {
    let mut nonce = [0u8; NONCE_SIZE];
    nonce[..8].copy_from_slice(&u64::from(packet_id).to_le_bytes());
    nonce[8..].copy_from_slice(&u64::from(from).to_le_bytes());
    nonce
}

/// Return the packet with its decoded payload populated.
///
/// Already-decoded packets (and packets with no payload at all) are returned
/// unchanged. Encrypted packets are decrypted with `key` and the plaintext is
/// parsed as [`Data`]; any failure is reported as an error and the input is
/// left untouched.
pub fn decrypt_packet(packet: &MeshPacket, key: &ChannelKey) -> Result<MeshPacket, CryptoError> {
    let ciphertext = match &packet.payload_variant {
        Some(PayloadVariant::Encrypted(bytes)) => bytes,
        _ => return Ok(packet.clone()),
    };

    let mut plaintext = ciphertext.clone();
    key.apply_keystream(&packet_nonce(packet.id, packet.from), &mut plaintext)?;

    let data = Data::decode(plaintext.as_slice()).map_err(|_| CryptoError::DecryptionFailed)?;

    let mut decoded = packet.clone();
    decoded.payload_variant = Some(PayloadVariant::Decoded(data));
    Ok(decoded)
}

/// Encrypt a decoded packet in place of its payload. Inverse of [`decrypt_packet`].
pub fn encrypt_packet(packet: &MeshPacket, key: &ChannelKey) -> Result<MeshPacket, CryptoError> {
    let data = match &packet.payload_variant {
        Some(PayloadVariant::Decoded(data)) => data,
        _ => return Ok(packet.clone()),
    };

    let mut ciphertext = data.encode_to_vec();
    key.apply_keystream(&packet_nonce(packet.id, packet.from), &mut ciphertext)?;

    let mut encrypted = packet.clone();
    encrypted.payload_variant = Some(PayloadVariant::Encrypted(ciphertext));
    Ok(encrypted)
}
