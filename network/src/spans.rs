//! Pre-built [`tracing::Span`] constructors for the network core.
//!
//! Consistent span names and field sets make per-connection logs easy to
//! filter and correlate.

use std::net::SocketAddr;

use tracing::{debug_span, info_span, Span};

use crate::events::Direction;

/// Span covering the accept loop of one listener.
pub fn accept_loop_span(local: Option<SocketAddr>) -> Span {
    match local {
        Some(addr) => info_span!("accept_loop", local = %addr),
        None => info_span!("accept_loop"),
    }
}

/// Span covering the lifetime of one connection's read path.
pub fn connection_span(conn: u64, addr: SocketAddr, direction: Direction) -> Span {
    info_span!("connection", conn, addr = %addr, direction = %direction)
}

/// Span covering one pre-session handshake attempt.
pub fn handshake_span(conn: u64) -> Span {
    debug_span!("handshake", conn)
}
