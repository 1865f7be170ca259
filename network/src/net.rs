//! The [`Net`] façade: admission, handshake, routing and subscribers wired
//! together behind one handle.

use std::net::SocketAddr;
use std::sync::Arc;

use strata_crypto::create_session;
use strata_protocol::{
    generate_handshake_message, process_handshake, read_frame, MAX_HANDSHAKE_SIZE,
};
use strata_types::{KeyPair, PublicKey};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpStream;
use tokio::sync::{broadcast, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, info, trace, warn, Instrument};

use crate::admission::{AdmissionController, PendingSlot};
use crate::config::NetConfig;
use crate::connection::{spawn_writer, Connection, StreamConnection};
use crate::events::{ConnectionSubscribers, Direction, IncomingMessageEvent, NewConnectionEvent};
use crate::listener::Listener;
use crate::metrics::NetMetrics;
use crate::router::{IncomingQueue, MessageRouter};
use crate::spans::{connection_span, handshake_span};
use crate::NetworkError;

/// Network core of one node.
///
/// Created with [`Net::new`] and shared as `Arc<Net>`; every method takes
/// `&self` and may be called from any task.
pub struct Net {
    config: NetConfig,
    identity: KeyPair,
    admission: AdmissionController,
    router: MessageRouter,
    subscribers: ConnectionSubscribers,
    metrics: Arc<NetMetrics>,
    shutdown: broadcast::Sender<()>,
}

impl Net {
    pub fn new(config: NetConfig, identity: KeyPair) -> Result<Arc<Self>, NetworkError> {
        config.validate()?;
        let metrics = Arc::new(NetMetrics::new()?);
        let router = MessageRouter::new(config.queues_count, config.msg_queue_size)?;
        let admission = AdmissionController::new(
            config.max_pending_connections,
            config.session_timeout(),
            Arc::clone(&metrics),
        );
        let (shutdown, _) = broadcast::channel(1);

        info!(
            node = %identity.public,
            network = %config.network_id,
            queues = config.queues_count,
            max_pending = config.max_pending_connections,
            "network core initialised"
        );

        Ok(Arc::new(Self {
            config,
            identity,
            admission,
            router,
            subscribers: ConnectionSubscribers::new(),
            metrics,
            shutdown,
        }))
    }

    /// Spawn the accept loop on `listener`.
    ///
    /// The handle resolves with `Ok(())` after [`Net::shutdown`], or with
    /// [`NetworkError::Admission`] if the listener fails fatally.
    pub fn start<L: Listener>(self: &Arc<Self>, listener: L) -> JoinHandle<Result<(), NetworkError>> {
        let net = Arc::clone(self);
        let shutdown = self.shutdown.subscribe();
        tokio::spawn(async move {
            let inbound = Arc::clone(&net);
            net.admission
                .run(listener, shutdown, move |stream, addr, slot| {
                    inbound.spawn_inbound(stream, addr, slot)
                })
                .await
        })
    }

    /// Route an authenticated message to its sender's shard.
    ///
    /// Waits while that shard is full. Returns the shard index.
    pub async fn enqueue_message(&self, event: IncomingMessageEvent) -> Result<usize, NetworkError> {
        let shard = self.router.enqueue(event).await?;
        self.metrics.messages_enqueued.inc();
        trace!(shard, "message enqueued");
        Ok(shard)
    }

    /// The shard queues, in shard order. Fixed for the lifetime of the `Net`.
    pub fn incoming_messages(&self) -> &[IncomingQueue] {
        self.router.queues()
    }

    pub fn queues_count(&self) -> usize {
        self.router.queues_count()
    }

    /// Register a callback for every connection that gains a session.
    ///
    /// Callbacks run synchronously, in registration order, on the task that
    /// completed the handshake.
    pub fn subscribe_on_new_remote_connections<F>(&self, callback: F)
    where
        F: Fn(&NewConnectionEvent) + Send + Sync + 'static,
    {
        self.subscribers.subscribe(callback);
    }

    /// Authenticate `conn` from a raw handshake message.
    ///
    /// On success the connection gets its remote key and session and every
    /// subscriber is notified. Nothing is sent back. On failure `conn` is
    /// left as it was; tearing it down is up to the caller. A handshake that
    /// arrives after `conn` was closed is refused with
    /// [`NetworkError::ConnectionClosed`] and publishes nothing.
    pub fn handle_pre_session_incoming_message(
        &self,
        conn: &Arc<dyn Connection>,
        raw: &[u8],
    ) -> Result<(), NetworkError> {
        let span = handshake_span(conn.id());
        let _entered = span.enter();

        let processed = process_handshake(&self.identity.private, raw, self.config.network_id)
            .and_then(|(session, data)| {
                data.ensure_fresh(self.config.handshake_max_age())?;
                Ok((session, data))
            });
        let (session, data) = match processed {
            Ok(established) => established,
            Err(e) => {
                self.metrics.handshakes_failed.inc();
                debug!(addr = %conn.remote_addr(), error = %e, "handshake rejected");
                return Err(e.into());
            }
        };

        if conn.is_closed() {
            debug!(addr = %conn.remote_addr(), "handshake arrived on a closed connection");
            return Err(NetworkError::ConnectionClosed);
        }

        let remote = *session.id();
        conn.set_remote_public_key(remote);
        conn.set_session(Arc::new(session));
        self.metrics.handshakes_completed.inc();
        info!(
            peer = %remote,
            addr = %conn.remote_addr(),
            client = %data.client_version,
            port = data.port,
            "handshake completed"
        );

        self.subscribers.publish(&NewConnectionEvent {
            conn: Arc::clone(conn),
            direction: Direction::Inbound,
            handshake: Some(data),
        });
        Ok(())
    }

    /// Open an outbound connection to `remote` at `addr`.
    pub async fn dial(
        self: &Arc<Self>,
        addr: SocketAddr,
        remote: PublicKey,
    ) -> Result<Arc<dyn Connection>, NetworkError> {
        let stream = tokio::time::timeout(self.config.dial_timeout(), TcpStream::connect(addr))
            .await
            .map_err(|_| NetworkError::DialFailed {
                addr,
                reason: "timed out".into(),
            })?
            .map_err(|e| NetworkError::DialFailed {
                addr,
                reason: e.to_string(),
            })?;
        if let Err(e) = stream.set_nodelay(true) {
            debug!(%addr, error = %e, "failed to set TCP_NODELAY");
        }
        self.establish_outbound(stream, addr, remote)
    }

    /// Run the initiator side of the handshake over an already open stream.
    ///
    /// The handshake message is queued first; the returned connection is
    /// authenticated and seals everything sent after it.
    pub fn establish_outbound<S>(
        self: &Arc<Self>,
        stream: S,
        addr: SocketAddr,
        remote: PublicKey,
    ) -> Result<Arc<dyn Connection>, NetworkError>
    where
        S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
    {
        let session = create_session(&self.identity.private, &remote)?;
        let hello = generate_handshake_message(
            &session,
            &self.config.client_version,
            self.config.network_id,
            self.config.listen_port,
            &self.identity.public,
        )?;

        let (conn, outbound) = StreamConnection::new(addr);
        conn.send(&hello)?;
        conn.set_remote_public_key(remote);
        conn.set_session(Arc::new(session));

        let (reader, writer) = tokio::io::split(stream);
        spawn_writer(Arc::clone(&conn), writer, outbound);
        let span = connection_span(conn.id(), addr, Direction::Outbound);
        tokio::spawn(
            Arc::clone(self)
                .read_loop(Arc::clone(&conn), reader, None)
                .instrument(span),
        );

        info!(peer = %remote, %addr, "outbound connection established");
        let conn: Arc<dyn Connection> = conn;
        self.subscribers.publish(&NewConnectionEvent {
            conn: Arc::clone(&conn),
            direction: Direction::Outbound,
            handshake: None,
        });
        Ok(conn)
    }

    /// Stop the accept loop. Established connections are left running.
    pub fn shutdown(&self) {
        let _ = self.shutdown.send(());
        self.admission.close();
        info!("network core shutting down");
    }

    /// Accept calls completed so far, including temporary failures.
    pub fn accept_count(&self) -> u64 {
        self.admission.accept_count()
    }

    /// Pending slots currently free.
    pub fn available_slots(&self) -> usize {
        self.admission.available_slots()
    }

    pub fn local_public_key(&self) -> &PublicKey {
        &self.identity.public
    }

    pub fn config(&self) -> &NetConfig {
        &self.config
    }

    pub fn metrics(&self) -> &NetMetrics {
        &self.metrics
    }

    fn spawn_inbound<S>(self: &Arc<Self>, stream: S, addr: SocketAddr, slot: PendingSlot)
    where
        S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
    {
        let (conn, outbound) = StreamConnection::new(addr);
        let (reader, writer) = tokio::io::split(stream);
        spawn_writer(Arc::clone(&conn), writer, outbound);

        let (established_tx, established_rx) = oneshot::channel();
        slot.guard(conn.clone(), established_rx, self.config.session_timeout());

        let span = connection_span(conn.id(), addr, Direction::Inbound);
        tokio::spawn(
            Arc::clone(self)
                .read_loop(conn, reader, Some(established_tx))
                .instrument(span),
        );
    }

    /// Read frames until the peer goes away or the connection is closed.
    ///
    /// Unauthenticated frames are handshake attempts, capped at
    /// [`MAX_HANDSHAKE_SIZE`]; a failed attempt drops the connection. Authenticated frames are opened with the session and
    /// routed. `established` fires on the first successful handshake and is
    /// dropped when the loop ends, which frees a still-held slot.
    async fn read_loop<R>(
        self: Arc<Self>,
        conn: Arc<StreamConnection>,
        mut reader: R,
        mut established: Option<oneshot::Sender<()>>,
    ) where
        R: AsyncRead + Unpin + Send,
    {
        let as_dyn: Arc<dyn Connection> = conn.clone();
        loop {
            let max_size = if conn.session().is_some() {
                self.config.max_message_size
            } else {
                MAX_HANDSHAKE_SIZE.min(self.config.max_message_size)
            };
            let frame = tokio::select! {
                _ = conn.closed() => break,
                frame = read_frame(&mut reader, max_size) => frame,
            };
            let frame = match frame {
                Ok(Some(frame)) => frame,
                Ok(None) => {
                    debug!("peer closed the stream");
                    break;
                }
                Err(e) => {
                    debug!(error = %e, "read failed");
                    break;
                }
            };

            let Some(session) = conn.session() else {
                if self
                    .handle_pre_session_incoming_message(&as_dyn, &frame)
                    .is_err()
                {
                    break;
                }
                if let Some(tx) = established.take() {
                    if tx.send(()).is_err() {
                        debug!("handshake completed after the slot was reclaimed");
                    }
                }
                continue;
            };

            let message = match session.open(&frame) {
                Ok(message) => message,
                Err(e) => {
                    warn!(error = %e, "cannot open frame, closing connection");
                    break;
                }
            };
            let event = IncomingMessageEvent {
                conn: Arc::clone(&as_dyn),
                message,
            };
            if let Err(e) = self.enqueue_message(event).await {
                warn!(error = %e, "cannot route message, closing connection");
                break;
            }
        }
        conn.close();
    }
}
