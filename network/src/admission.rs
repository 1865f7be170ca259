//! Connection admission control.
//!
//! At most `max_pending` inbound connections may be accepted but not yet
//! authenticated. The accept loop takes a slot before every accept attempt,
//! so once the pool is exhausted the node stops accepting until a handshake
//! completes, a stream closes, or a slot times out.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{broadcast, oneshot, OwnedSemaphorePermit, Semaphore};
use tokio::task::JoinHandle;
use tracing::{debug, error, warn, Instrument};

use crate::connection::Connection;
use crate::listener::{AcceptError, Listener};
use crate::metrics::NetMetrics;
use crate::spans::accept_loop_span;
use crate::NetworkError;

/// Why a pending slot was given back.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SlotRelease {
    /// The handshake completed.
    Established,
    /// The connection ended before authenticating.
    Closed,
    /// Nothing authenticated within the session timeout.
    TimedOut,
}

/// One held admission slot. Dropping it frees the slot.
pub struct PendingSlot {
    _permit: OwnedSemaphorePermit,
    metrics: Arc<NetMetrics>,
}

impl PendingSlot {
    fn new(permit: OwnedSemaphorePermit, metrics: Arc<NetMetrics>) -> Self {
        metrics.pending_connections.inc();
        Self {
            _permit: permit,
            metrics,
        }
    }

    /// Hold the slot for `conn` until `established` fires or `timeout` runs out.
    ///
    /// Dropping the sender of `established` counts as the connection
    /// closing. On timeout the connection is closed. Whichever happens first
    /// releases the slot; the other outcome is then ignored.
    pub fn guard(
        self,
        conn: Arc<dyn Connection>,
        established: oneshot::Receiver<()>,
        timeout: Duration,
    ) -> JoinHandle<SlotRelease> {
        tokio::spawn(async move {
            let release = tokio::select! {
                biased;
                outcome = established => match outcome {
                    Ok(()) => SlotRelease::Established,
                    Err(_) => SlotRelease::Closed,
                },
                _ = tokio::time::sleep(timeout) => {
                    debug!(conn = conn.id(), addr = %conn.remote_addr(), "no handshake before session timeout, closing");
                    self.metrics.slot_timeouts.inc();
                    conn.close();
                    SlotRelease::TimedOut
                }
            };
            drop(self);
            release
        })
    }

    /// Give the slot back once `timeout` has elapsed.
    pub fn release_after(self, timeout: Duration) {
        tokio::spawn(async move {
            tokio::time::sleep(timeout).await;
            drop(self);
        });
    }
}

impl Drop for PendingSlot {
    fn drop(&mut self) {
        self.metrics.pending_connections.dec();
    }
}

/// Owns the slot pool and drives the accept loop.
pub struct AdmissionController {
    slots: Arc<Semaphore>,
    max_pending: usize,
    session_timeout: Duration,
    accept_count: AtomicU64,
    metrics: Arc<NetMetrics>,
}

impl AdmissionController {
    pub fn new(max_pending: usize, session_timeout: Duration, metrics: Arc<NetMetrics>) -> Self {
        Self {
            slots: Arc::new(Semaphore::new(max_pending)),
            max_pending,
            session_timeout,
            accept_count: AtomicU64::new(0),
            metrics,
        }
    }

    pub fn max_pending(&self) -> usize {
        self.max_pending
    }

    pub fn session_timeout(&self) -> Duration {
        self.session_timeout
    }

    /// Slots currently free.
    pub fn available_slots(&self) -> usize {
        self.slots.available_permits()
    }

    /// Accept calls that completed, successfully or with a temporary error.
    pub fn accept_count(&self) -> u64 {
        self.accept_count.load(Ordering::Relaxed)
    }

    /// Refuse further slots; a running accept loop ends.
    pub fn close(&self) {
        self.slots.close();
    }

    /// Accept from `listener` until shutdown or a fatal error.
    ///
    /// Each accepted stream is handed to `on_accept` along with the slot it
    /// holds. A temporary accept error keeps its slot for the session
    /// timeout. The listener is closed before returning.
    pub async fn run<L, F>(
        &self,
        mut listener: L,
        mut shutdown: broadcast::Receiver<()>,
        mut on_accept: F,
    ) -> Result<(), NetworkError>
    where
        L: Listener,
        F: FnMut(L::Stream, SocketAddr, PendingSlot) + Send,
    {
        let span = accept_loop_span(listener.local_addr().ok());
        let result: Result<(), NetworkError> = async {
            loop {
                let permit = tokio::select! {
                    _ = shutdown.recv() => return Ok(()),
                    permit = Arc::clone(&self.slots).acquire_owned() => match permit {
                        Ok(permit) => permit,
                        Err(_) => return Ok(()),
                    },
                };
                let slot = PendingSlot::new(permit, Arc::clone(&self.metrics));

                let accepted = tokio::select! {
                    _ = shutdown.recv() => return Ok(()),
                    accepted = listener.accept() => accepted,
                };

                match accepted {
                    Ok((stream, addr)) => {
                        self.accept_count.fetch_add(1, Ordering::Relaxed);
                        self.metrics.accepted.inc();
                        debug!(%addr, "accepted inbound connection");
                        on_accept(stream, addr, slot);
                    }
                    Err(AcceptError::Temporary(e)) => {
                        self.accept_count.fetch_add(1, Ordering::Relaxed);
                        self.metrics.temporary_accept_errors.inc();
                        warn!(error = %e, "temporary accept error");
                        slot.release_after(self.session_timeout);
                    }
                    Err(fatal) => {
                        error!(error = %fatal, "listener failed, stopping accept loop");
                        return Err(NetworkError::Admission(fatal));
                    }
                }
            }
        }
        .instrument(span)
        .await;

        listener.close();
        result
    }
}
