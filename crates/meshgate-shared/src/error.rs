use thiserror::Error;

#[derive(Error, Debug)]
pub enum CodecError {
    #[error("Envelope too large: {size} bytes (max {max})")]
    TooLarge { size: usize, max: usize },

    #[error("Malformed protobuf: {0}")]
    Decode(#[from] prost::DecodeError),

    #[error("Envelope carries no packet")]
    MissingPacket,

    #[error("Crypto error: {0}")]
    Crypto(#[from] CryptoError),
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CryptoError {
    #[error("Invalid channel key encoding: {0}")]
    InvalidKeyEncoding(String),

    #[error("Invalid key length: {0} bytes")]
    InvalidKeyLength(usize),

    #[error("Decryption failed: inner message did not parse")]
    DecryptionFailed,
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum NodeIdError {
    #[error("Invalid node id {0:?}: expected hex")]
    InvalidHex(String),
}
