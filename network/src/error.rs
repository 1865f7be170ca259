use std::net::SocketAddr;

use thiserror::Error;

use crate::connection::ConnectionId;
use crate::listener::AcceptError;

#[derive(Debug, Error)]
pub enum NetworkError {
    #[error("accept loop stopped: {0}")]
    Admission(#[from] AcceptError),

    #[error("protocol error: {0}")]
    Protocol(#[from] strata_protocol::ProtocolError),

    #[error("crypto error: {0}")]
    Crypto(#[from] strata_crypto::CryptoError),

    #[error("connection {0} has no authenticated remote key")]
    Unauthenticated(ConnectionId),

    #[error("connection closed")]
    ConnectionClosed,

    #[error("incoming queue {shard} closed")]
    QueueClosed { shard: usize },

    #[error("dial {addr} failed: {reason}")]
    DialFailed { addr: SocketAddr, reason: String },

    #[error("config error: {0}")]
    Config(String),

    #[error("metrics error: {0}")]
    Metrics(#[from] prometheus::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
