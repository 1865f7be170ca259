use strata_types::NetworkId;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("unsupported protocol version: {0}")]
    UnsupportedVersion(u16),

    #[error("unsupported network identifier: expected {expected}, got {actual}")]
    UnsupportedNetwork {
        expected: NetworkId,
        actual: NetworkId,
    },

    #[error("message too large: {size} > {max}")]
    MessageTooLarge { size: usize, max: usize },

    #[error("malformed message: {0}")]
    Malformed(String),

    #[error("stale handshake: timestamp {timestamp}, local clock {now}")]
    StaleHandshake { timestamp: u64, now: u64 },

    #[error("handshake failed: {0}")]
    HandshakeFailed(String),

    #[error("crypto error: {0}")]
    Crypto(#[from] strata_crypto::CryptoError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
