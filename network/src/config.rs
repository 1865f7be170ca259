//! Network configuration with TOML file support.

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

use strata_protocol::{CLIENT_VERSION, MAX_MESSAGE_SIZE};
use strata_types::NetworkId;

use crate::NetworkError;

/// Options consumed by [`crate::Net`].
///
/// Can be loaded from a TOML file via [`NetConfig::from_toml_file`] or
/// built programmatically (e.g. for tests). Missing keys take their defaults.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetConfig {
    /// Network this node belongs to; handshakes for other networks are refused.
    #[serde(default)]
    pub network_id: NetworkId,

    /// Client identifier announced to peers.
    #[serde(default = "default_client_version")]
    pub client_version: String,

    /// Port announced in outbound handshakes and bound by the daemon.
    #[serde(default = "default_listen_port")]
    pub listen_port: u16,

    /// Inbound connections allowed to be accepted but not yet authenticated.
    #[serde(default = "default_max_pending_connections")]
    pub max_pending_connections: usize,

    /// How long an unauthenticated connection may hold its pending slot.
    #[serde(default = "default_session_timeout_ms")]
    pub session_timeout_ms: u64,

    /// Number of inbound shard queues.
    #[serde(default = "default_queues_count")]
    pub queues_count: usize,

    /// Capacity of each shard queue; producers wait when a shard is full.
    #[serde(default = "default_msg_queue_size")]
    pub msg_queue_size: usize,

    /// Largest frame body accepted from a peer.
    #[serde(default = "default_max_message_size")]
    pub max_message_size: usize,

    /// Upper bound on establishing an outbound TCP connection.
    #[serde(default = "default_dial_timeout_ms")]
    pub dial_timeout_ms: u64,

    /// Inbound handshakes stamped further than this from the local clock are refused.
    #[serde(default = "default_handshake_max_age_ms")]
    pub handshake_max_age_ms: u64,
}

// ── Serde default helpers ──────────────────────────────────────────────

fn default_client_version() -> String {
    CLIENT_VERSION.to_string()
}

fn default_listen_port() -> u16 {
    7513
}

fn default_max_pending_connections() -> usize {
    50
}

fn default_session_timeout_ms() -> u64 {
    15_000
}

fn default_queues_count() -> usize {
    6
}

fn default_msg_queue_size() -> usize {
    100
}

fn default_max_message_size() -> usize {
    MAX_MESSAGE_SIZE
}

fn default_dial_timeout_ms() -> u64 {
    5_000
}

fn default_handshake_max_age_ms() -> u64 {
    30_000
}

// ── Impl ───────────────────────────────────────────────────────────────

impl NetConfig {
    /// Load configuration from a TOML file.
    pub fn from_toml_file(path: impl AsRef<Path>) -> Result<Self, NetworkError> {
        let content = std::fs::read_to_string(path.as_ref()).map_err(|e| {
            NetworkError::Config(format!("cannot read {}: {e}", path.as_ref().display()))
        })?;
        Self::from_toml_str(&content)
    }

    /// Parse configuration from a TOML string.
    pub fn from_toml_str(s: &str) -> Result<Self, NetworkError> {
        toml::from_str(s).map_err(|e| NetworkError::Config(e.to_string()))
    }

    /// Serialize the configuration to a TOML string.
    pub fn to_toml_string(&self) -> Result<String, NetworkError> {
        toml::to_string_pretty(self).map_err(|e| NetworkError::Config(e.to_string()))
    }

    /// Reject sizes that would leave the node unable to accept or route anything.
    pub fn validate(&self) -> Result<(), NetworkError> {
        if self.max_pending_connections == 0 {
            return Err(NetworkError::Config(
                "max_pending_connections must be at least 1".into(),
            ));
        }
        if self.queues_count == 0 {
            return Err(NetworkError::Config("queues_count must be at least 1".into()));
        }
        if self.msg_queue_size == 0 {
            return Err(NetworkError::Config("msg_queue_size must be at least 1".into()));
        }
        if self.max_message_size == 0 || self.max_message_size > u32::MAX as usize {
            return Err(NetworkError::Config(format!(
                "max_message_size must be within 1..={}",
                u32::MAX
            )));
        }
        Ok(())
    }

    pub fn session_timeout(&self) -> Duration {
        Duration::from_millis(self.session_timeout_ms)
    }

    pub fn dial_timeout(&self) -> Duration {
        Duration::from_millis(self.dial_timeout_ms)
    }

    pub fn handshake_max_age(&self) -> Duration {
        Duration::from_millis(self.handshake_max_age_ms)
    }
}

impl Default for NetConfig {
    fn default() -> Self {
        Self {
            network_id: NetworkId::default(),
            client_version: default_client_version(),
            listen_port: default_listen_port(),
            max_pending_connections: default_max_pending_connections(),
            session_timeout_ms: default_session_timeout_ms(),
            queues_count: default_queues_count(),
            msg_queue_size: default_msg_queue_size(),
            max_message_size: default_max_message_size(),
            dial_timeout_ms: default_dial_timeout_ms(),
            handshake_max_age_ms: default_handshake_max_age_ms(),
        }
    }
}
