//! Test doubles for the connection and listener capabilities.
//!
//! Compiled unconditionally so integration tests and downstream crates can
//! drive a [`crate::Net`] without sockets.

use std::io;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::sync::atomic::{AtomicBool, AtomicU16, AtomicUsize, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use strata_crypto::NetworkSession;
use strata_types::PublicKey;
use tokio::io::DuplexStream;
use tokio::sync::{mpsc, oneshot};

use crate::connection::{next_connection_id, Connection, ConnectionId, PeerAuth};
use crate::listener::{AcceptError, Listener};
use crate::NetworkError;

const MOCK_STREAM_BUFFER: usize = 64 * 1024;

static NEXT_MOCK_PORT: AtomicU16 = AtomicU16::new(40_000);

fn next_mock_addr() -> SocketAddr {
    SocketAddr::new(
        IpAddr::V4(Ipv4Addr::LOCALHOST),
        NEXT_MOCK_PORT.fetch_add(1, Ordering::Relaxed),
    )
}

// ── ConnectionMock ─────────────────────────────────────────────────────

/// In-memory connection that records what is sent on it.
///
/// Payloads are recorded as given, without sealing.
pub struct ConnectionMock {
    id: ConnectionId,
    remote_addr: SocketAddr,
    auth: PeerAuth,
    sent: Mutex<Vec<Vec<u8>>>,
    closed: AtomicBool,
}

impl ConnectionMock {
    /// A connection whose remote key is already known.
    pub fn new(remote: PublicKey) -> Self {
        Self::with_auth(PeerAuth::with_key(remote))
    }

    /// A connection that has not been through a handshake.
    pub fn unauthenticated() -> Self {
        Self::with_auth(PeerAuth::default())
    }

    fn with_auth(auth: PeerAuth) -> Self {
        Self {
            id: next_connection_id(),
            remote_addr: next_mock_addr(),
            auth,
            sent: Mutex::new(Vec::new()),
            closed: AtomicBool::new(false),
        }
    }

    pub fn with_remote_addr(mut self, addr: SocketAddr) -> Self {
        self.remote_addr = addr;
        self
    }

    pub fn sent_messages(&self) -> Vec<Vec<u8>> {
        self.sent.lock().clone()
    }
}

impl Connection for ConnectionMock {
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
        self.sent.lock().push(payload.to_vec());
        Ok(())
    }

    fn send_count(&self) -> u64 {
        self.sent.lock().len() as u64
    }

    fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

// ── MockListener ───────────────────────────────────────────────────────

/// What the next accept call produces.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum MockAcceptOutcome {
    /// A fresh in-memory stream.
    #[default]
    Stream,
    TemporaryError,
    FatalError,
}

type AcceptRequest = oneshot::Sender<Option<DuplexStream>>;

struct MockShared {
    outcome: Mutex<MockAcceptOutcome>,
    accept_calls: AtomicUsize,
    closed: AtomicBool,
}

/// Listener whose accept calls complete only when the test releases them.
///
/// Build with [`MockListener::new`]; the listener goes to the code under
/// test and the [`MockListenerHandle`] stays with the test. Dropping every
/// handle makes further accepts fail fatally.
pub struct MockListener {
    requests: mpsc::UnboundedReceiver<AcceptRequest>,
    shared: Arc<MockShared>,
}

/// Test-side control of a [`MockListener`].
#[derive(Clone)]
pub struct MockListenerHandle {
    requests: mpsc::UnboundedSender<AcceptRequest>,
    shared: Arc<MockShared>,
}

impl MockListener {
    #[allow(clippy::new_ret_no_self)]
    pub fn new() -> (MockListener, MockListenerHandle) {
        let (tx, rx) = mpsc::unbounded_channel();
        let shared = Arc::new(MockShared {
            outcome: Mutex::new(MockAcceptOutcome::default()),
            accept_calls: AtomicUsize::new(0),
            closed: AtomicBool::new(false),
        });
        (
            MockListener {
                requests: rx,
                shared: Arc::clone(&shared),
            },
            MockListenerHandle {
                requests: tx,
                shared,
            },
        )
    }
}

impl MockListenerHandle {
    pub fn set_outcome(&self, outcome: MockAcceptOutcome) {
        *self.shared.outcome.lock() = outcome;
    }

    /// Let one pending accept call complete, waiting until one is made.
    ///
    /// Returns the client end of the accepted stream, or `None` when the
    /// accept produced an error or the listener is gone.
    pub async fn release_conn(&self) -> Option<DuplexStream> {
        let (reply, response) = oneshot::channel();
        self.requests.send(reply).ok()?;
        response.await.ok().flatten()
    }

    /// Accept calls that consumed a release.
    pub fn accept_calls(&self) -> usize {
        self.shared.accept_calls.load(Ordering::SeqCst)
    }

    pub fn is_closed(&self) -> bool {
        self.shared.closed.load(Ordering::SeqCst)
    }
}

impl Listener for MockListener {
    type Stream = DuplexStream;

    async fn accept(&mut self) -> Result<(DuplexStream, SocketAddr), AcceptError> {
        let Some(reply) = self.requests.recv().await else {
            return Err(AcceptError::Fatal(io::Error::new(
                io::ErrorKind::NotConnected,
                "mock listener handle dropped",
            )));
        };
        self.shared.accept_calls.fetch_add(1, Ordering::SeqCst);

        let outcome = *self.shared.outcome.lock();
        match outcome {
            MockAcceptOutcome::Stream => {
                let (client, server) = tokio::io::duplex(MOCK_STREAM_BUFFER);
                let _ = reply.send(Some(client));
                Ok((server, next_mock_addr()))
            }
            MockAcceptOutcome::TemporaryError => {
                let _ = reply.send(None);
                Err(AcceptError::Temporary(io::Error::from(
                    io::ErrorKind::ConnectionAborted,
                )))
            }
            MockAcceptOutcome::FatalError => {
                let _ = reply.send(None);
                Err(AcceptError::Fatal(io::Error::other("mock listener failure")))
            }
        }
    }

    fn local_addr(&self) -> io::Result<SocketAddr> {
        Ok(SocketAddr::new(IpAddr::V4(Ipv4Addr::LOCALHOST), 0))
    }

    fn close(&mut self) {
        self.shared.closed.store(true, Ordering::SeqCst);
        self.requests.close();
    }
}
