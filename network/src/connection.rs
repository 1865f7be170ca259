//! Connection abstraction over a peer byte stream.
//!
//! A connection starts unauthenticated: no remote key, no session. The
//! handshake path fills both in; from then on `send` seals every payload
//! with the session.

use std::fmt;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use strata_crypto::NetworkSession;
use strata_protocol::write_frame;
use strata_types::PublicKey;
use tokio::io::AsyncWrite;
use tokio::sync::{mpsc, watch};
use tracing::Instrument;

use crate::NetworkError;

/// Process-unique connection identifier (diagnostics only).
pub type ConnectionId = u64;

static NEXT_CONNECTION_ID: AtomicU64 = AtomicU64::new(1);

pub(crate) fn next_connection_id() -> ConnectionId {
    NEXT_CONNECTION_ID.fetch_add(1, Ordering::Relaxed)
}

/// A peer connection as seen by the handshake path and the router.
///
/// Implementations synchronise internally; every method takes `&self`.
pub trait Connection: Send + Sync {
    fn id(&self) -> ConnectionId;

    fn remote_addr(&self) -> SocketAddr;

    /// The authenticated remote identity, once known.
    fn remote_public_key(&self) -> Option<PublicKey>;

    fn set_remote_public_key(&self, key: PublicKey);

    /// The established session, once the handshake completed.
    fn session(&self) -> Option<Arc<NetworkSession>>;

    fn set_session(&self, session: Arc<NetworkSession>);

    /// Queue a payload for the peer, sealed if a session exists.
    fn send(&self, payload: &[u8]) -> Result<(), NetworkError>;

    /// Number of payloads accepted by `send`.
    fn send_count(&self) -> u64;

    fn close(&self);

    fn is_closed(&self) -> bool;
}

impl fmt::Debug for dyn Connection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Connection")
            .field("id", &self.id())
            .field("remote_addr", &self.remote_addr())
            .field("remote_public_key", &self.remote_public_key())
            .field("authenticated", &self.session().is_some())
            .finish()
    }
}

/// Remote identity and session slots shared by connection implementations.
#[derive(Default)]
pub(crate) struct PeerAuth {
    remote_public_key: RwLock<Option<PublicKey>>,
    session: RwLock<Option<Arc<NetworkSession>>>,
}

impl PeerAuth {
    pub(crate) fn with_key(key: PublicKey) -> Self {
        Self {
            remote_public_key: RwLock::new(Some(key)),
            session: RwLock::new(None),
        }
    }

    pub(crate) fn remote_public_key(&self) -> Option<PublicKey> {
        *self.remote_public_key.read()
    }

    pub(crate) fn set_remote_public_key(&self, key: PublicKey) {
        *self.remote_public_key.write() = Some(key);
    }

    pub(crate) fn session(&self) -> Option<Arc<NetworkSession>> {
        self.session.read().clone()
    }

    pub(crate) fn set_session(&self, session: Arc<NetworkSession>) {
        *self.session.write() = Some(session);
    }
}

/// Connection over a live byte stream (TCP, or an in-memory duplex in tests).
///
/// Outbound frames go through an unbounded channel drained by a writer task;
/// the read side is driven by [`crate::Net`].
pub struct StreamConnection {
    id: ConnectionId,
    remote_addr: SocketAddr,
    auth: PeerAuth,
    outbound: mpsc::UnboundedSender<Vec<u8>>,
    /// Keeps seal order equal to queue order so the peer sees rising counters.
    send_lock: Mutex<()>,
    sent: AtomicU64,
    closed: watch::Sender<bool>,
}

impl StreamConnection {
    pub(crate) fn new(remote_addr: SocketAddr) -> (Arc<Self>, mpsc::UnboundedReceiver<Vec<u8>>) {
        let (outbound, outbound_rx) = mpsc::unbounded_channel();
        let (closed, _) = watch::channel(false);
        let conn = Arc::new(Self {
            id: next_connection_id(),
            remote_addr,
            auth: PeerAuth::default(),
            outbound,
            send_lock: Mutex::new(()),
            sent: AtomicU64::new(0),
            closed,
        });
        (conn, outbound_rx)
    }

    /// Resolves once [`Connection::close`] has been called.
    pub async fn closed(&self) {
        let mut rx = self.closed.subscribe();
        loop {
            if *rx.borrow_and_update() {
                return;
            }
            if rx.changed().await.is_err() {
                return;
            }
        }
    }
}

impl Connection for StreamConnection {
    fn id(&self) -> ConnectionId {
        self.id
    }

    fn remote_addr(&self) -> SocketAddr {
        self.remote_addr
    }

    fn remote_public_key(&self) -> Option<PublicKey> {
        self.auth.remote_public_key()
    }

    fn set_remote_public_key(&self, key: PublicKey) {
        self.auth.set_remote_public_key(key);
    }

    fn session(&self) -> Option<Arc<NetworkSession>> {
        self.auth.session()
    }

    fn set_session(&self, session: Arc<NetworkSession>) {
        self.auth.set_session(session);
    }

    fn send(&self, payload: &[u8]) -> Result<(), NetworkError> {
        if self.is_closed() {
            return Err(NetworkError::ConnectionClosed);
        }
        let _ordered = self.send_lock.lock();
        let frame = match self.session() {
            Some(session) => session.seal(payload)?,
            None => payload.to_vec(),
        };
        self.outbound
            .send(frame)
            .map_err(|_| NetworkError::ConnectionClosed)?;
        self.sent.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    fn send_count(&self) -> u64 {
        self.sent.load(Ordering::Relaxed)
    }

    fn close(&self) {
        self.closed.send_replace(true);
    }

    fn is_closed(&self) -> bool {
        *self.closed.borrow()
    }
}

/// Drain `outbound` into `writer` until the connection closes.
pub(crate) fn spawn_writer<W>(
    conn: Arc<StreamConnection>,
    mut writer: W,
    mut outbound: mpsc::UnboundedReceiver<Vec<u8>>,
) -> tokio::task::JoinHandle<()>
where
    W: AsyncWrite + Unpin + Send + 'static,
{
    let span = tracing::debug_span!("conn_writer", conn = conn.id, addr = %conn.remote_addr);
    tokio::spawn(
        async move {
            loop {
                let frame = tokio::select! {
                    _ = conn.closed() => break,
                    frame = outbound.recv() => match frame {
                        Some(frame) => frame,
                        None => break,
                    },
                };
                if let Err(e) = write_frame(&mut writer, &frame).await {
                    tracing::debug!(error = %e, "write failed, closing connection");
                    conn.close();
                    break;
                }
            }
        }
        .instrument(span),
    )
}
