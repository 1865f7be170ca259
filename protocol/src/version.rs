//! Protocol version management.

/// Current handshake protocol version.
pub const PROTOCOL_VERSION: u16 = 1;

/// Minimum supported protocol version.
pub const MIN_PROTOCOL_VERSION: u16 = 1;

/// Client identifier announced inside handshakes.
pub const CLIENT_VERSION: &str = concat!("strata/", env!("CARGO_PKG_VERSION"));

/// Check if a peer's protocol version is compatible.
pub fn is_compatible(peer_version: u16) -> bool {
    (MIN_PROTOCOL_VERSION..=PROTOCOL_VERSION).contains(&peer_version)
}
