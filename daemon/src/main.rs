//! Strata daemon: runs the network core on a TCP listener.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use strata_crypto::{generate_keypair, keypair_from_seed};
use strata_network::{Net, NetConfig};
use strata_types::{KeyPair, NetworkId, PublicKey};
use strata_utils::LogFormat;
use tokio::net::TcpListener;

#[derive(Parser)]
#[command(name = "strata-daemon", about = "Strata peer-to-peer node daemon")]
struct Cli {
    /// Path to a TOML configuration file. File settings are the base;
    /// CLI flags and env vars override them.
    #[arg(long, env = "STRATA_CONFIG")]
    config: Option<PathBuf>,

    /// Network identifier; handshakes from other networks are refused.
    #[arg(long, env = "STRATA_NETWORK_ID")]
    network_id: Option<u32>,

    /// Port to listen on and announce in handshakes.
    #[arg(long, env = "STRATA_PORT")]
    port: Option<u16>,

    /// Address to bind the listener to.
    #[arg(long, default_value = "0.0.0.0", env = "STRATA_BIND")]
    bind: String,

    /// Maximum inbound connections waiting for a handshake.
    #[arg(long, env = "STRATA_MAX_PENDING")]
    max_pending: Option<usize>,

    /// Hex-encoded 32-byte identity seed. A fresh identity is generated
    /// when omitted.
    #[arg(long, env = "STRATA_IDENTITY_SEED", hide_env_values = true)]
    identity_seed: Option<String>,

    /// Peers to dial at startup, as `host:port@public_key_hex` (comma-separated).
    #[arg(long, env = "STRATA_CONNECT", value_delimiter = ',')]
    connect: Vec<PeerSpec>,

    /// Log output format: "human" or "json".
    #[arg(long, default_value = "human", env = "STRATA_LOG_FORMAT")]
    log_format: LogFormat,

    /// Log level: "trace", "debug", "info", "warn", "error".
    #[arg(long, default_value = "info", env = "STRATA_LOG_LEVEL")]
    log_level: String,
}

/// A peer to dial: its address and the identity expected to answer there.
#[derive(Clone, Debug, PartialEq, Eq)]
struct PeerSpec {
    addr: SocketAddr,
    key: PublicKey,
}

impl FromStr for PeerSpec {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (addr, key) = s
            .split_once('@')
            .ok_or_else(|| format!("expected host:port@public_key, got {s:?}"))?;
        Ok(Self {
            addr: addr.parse().map_err(|e| format!("bad address {addr:?}: {e}"))?,
            key: key.parse().map_err(|e| format!("bad public key: {e}"))?,
        })
    }
}

fn identity_from_seed(seed_hex: &str) -> anyhow::Result<KeyPair> {
    let bytes = hex::decode(seed_hex.trim()).context("identity seed is not valid hex")?;
    let seed: [u8; 32] = bytes
        .as_slice()
        .try_into()
        .map_err(|_| anyhow::anyhow!("identity seed must be 32 bytes, got {}", bytes.len()))?;
    Ok(keypair_from_seed(&seed))
}

fn load_config(cli: &Cli) -> anyhow::Result<NetConfig> {
    let mut config = match &cli.config {
        Some(path) => {
            let config = NetConfig::from_toml_file(path)?;
            tracing::info!("Loaded config from {}", path.display());
            config
        }
        None => NetConfig::default(),
    };
    if let Some(id) = cli.network_id {
        config.network_id = NetworkId(id);
    }
    if let Some(port) = cli.port {
        config.listen_port = port;
    }
    if let Some(max_pending) = cli.max_pending {
        config.max_pending_connections = max_pending;
    }
    config.validate()?;
    Ok(config)
}

/// Resolves on SIGINT or SIGTERM.
async fn shutdown_signal() {
    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::warn!("cannot install SIGTERM handler: {e}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = tokio::signal::ctrl_c() => { tracing::info!("received SIGINT, shutting down"); }
        _ = terminate => { tracing::info!("received SIGTERM, shutting down"); }
    }
}

/// Log every message that reaches a shard; stands in for an application
/// consumer.
fn spawn_shard_drainers(net: &Arc<Net>) {
    for shard in 0..net.queues_count() {
        let net = Arc::clone(net);
        tokio::spawn(async move {
            while let Some(event) = net.incoming_messages()[shard].recv().await {
                tracing::info!(
                    shard,
                    peer = ?event.conn.remote_public_key(),
                    len = event.message.len(),
                    "message received"
                );
            }
        });
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    strata_utils::init_logging(cli.log_format, &cli.log_level)?;

    let config = load_config(&cli)?;
    let identity = match &cli.identity_seed {
        Some(seed) => identity_from_seed(seed)?,
        None => generate_keypair()?,
    };

    let bind_addr = format!("{}:{}", cli.bind, config.listen_port);
    let listener = TcpListener::bind(&bind_addr)
        .await
        .with_context(|| format!("cannot bind {bind_addr}"))?;

    tracing::info!(
        "Starting Strata node {} on network {} (P2P:{})",
        identity.public,
        config.network_id,
        bind_addr,
    );

    let net = Net::new(config, identity)?;
    net.subscribe_on_new_remote_connections(|event| {
        tracing::info!(
            peer = ?event.conn.remote_public_key(),
            addr = %event.conn.remote_addr(),
            direction = %event.direction,
            "new remote connection"
        );
    });
    spawn_shard_drainers(&net);

    let mut accept_loop = net.start(listener);

    for peer in &cli.connect {
        match net.dial(peer.addr, peer.key).await {
            Ok(_) => tracing::info!("Connected to {}", peer.addr),
            Err(e) => tracing::warn!("Failed to connect to {}: {e}", peer.addr),
        }
    }

    tokio::select! {
        _ = shutdown_signal() => {
            net.shutdown();
            accept_loop.await??;
        }
        result = &mut accept_loop => {
            result??;
        }
    }

    tracing::info!(
        accepted = net.metrics().accepted.get(),
        handshakes = net.metrics().handshakes_completed.get(),
        messages = net.metrics().messages_enqueued.get(),
        "Strata daemon exited cleanly"
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_peer_spec() {
        let key = PublicKey([0xAB; 32]);
        let spec: PeerSpec = format!("127.0.0.1:7513@{}", key.to_hex()).parse().unwrap();
        assert_eq!(spec.addr, "127.0.0.1:7513".parse::<SocketAddr>().unwrap());
        assert_eq!(spec.key, key);
    }

    #[test]
    fn rejects_peer_spec_without_key() {
        assert!("127.0.0.1:7513".parse::<PeerSpec>().is_err());
        assert!("nonsense@abcd".parse::<PeerSpec>().is_err());
    }

    #[test]
    fn seed_must_be_32_bytes() {
        assert!(identity_from_seed(&"00".repeat(32)).is_ok());
        assert!(identity_from_seed("00ff").is_err());
        assert!(identity_from_seed("zz").is_err());
    }

    #[test]
    fn cli_overrides_config() {
        let cli = Cli::parse_from([
            "strata-daemon",
            "--network-id",
            "42",
            "--port",
            "9000",
            "--max-pending",
            "7",
        ]);
        let config = load_config(&cli).unwrap();
        assert_eq!(config.network_id, NetworkId::DEV);
        assert_eq!(config.listen_port, 9000);
        assert_eq!(config.max_pending_connections, 7);
        assert_eq!(config.queues_count, 6);
    }

    #[test]
    fn seed_is_deterministic() {
        let seed = "11".repeat(32);
        let a = identity_from_seed(&seed).unwrap();
        let b = identity_from_seed(&seed).unwrap();
        assert_eq!(a.public, b.public);
    }
}
