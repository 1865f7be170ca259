//! Sharded inbound message routing.
//!
//! Every authenticated message is placed on one of a fixed number of bounded
//! queues, chosen from the sender's public key. All messages from one peer
//! land on the same queue, so per-peer order survives while different peers
//! are drained in parallel.

use strata_types::PublicKey;
use tokio::sync::{mpsc, Mutex};

use crate::events::IncomingMessageEvent;
use crate::NetworkError;

/// Sum of the byte values, widened to `u64`.
pub fn sum_byte_array(bytes: &[u8]) -> u64 {
    bytes.iter().map(|&b| u64::from(b)).sum()
}

/// Shard index for messages from `key`.
///
/// # Panics
///
/// Panics if `queues_count` is zero.
pub fn shard_for_key(key: &PublicKey, queues_count: usize) -> usize {
    (sum_byte_array(key.as_bytes()) % queues_count as u64) as usize
}

/// Consumer side of one shard.
///
/// The receiver sits behind an async mutex so several consumers may share a
/// shard; each message is still delivered to exactly one of them.
#[derive(Debug)]
pub struct IncomingQueue {
    shard: usize,
    rx: Mutex<mpsc::Receiver<IncomingMessageEvent>>,
}

impl IncomingQueue {
    pub fn shard(&self) -> usize {
        self.shard
    }

    /// Wait for the next message. `None` once every producer is gone.
    pub async fn recv(&self) -> Option<IncomingMessageEvent> {
        self.rx.lock().await.recv().await
    }

    /// Take a message if one is ready and no other consumer holds the shard.
    pub fn try_recv(&self) -> Option<IncomingMessageEvent> {
        self.rx.try_lock().ok()?.try_recv().ok()
    }
}

/// Fixed set of bounded shard queues.
#[derive(Debug)]
pub struct MessageRouter {
    senders: Vec<mpsc::Sender<IncomingMessageEvent>>,
    queues: Vec<IncomingQueue>,
}

impl MessageRouter {
    /// Create `queues_count` queues holding up to `capacity` messages each.
    pub fn new(queues_count: usize, capacity: usize) -> Result<Self, NetworkError> {
        if queues_count == 0 || capacity == 0 {
            return Err(NetworkError::Config(
                "router needs at least one queue of non-zero capacity".into(),
            ));
        }
        let (senders, queues): (Vec<_>, Vec<_>) = (0..queues_count)
            .map(|shard| {
                let (tx, rx) = mpsc::channel(capacity);
                (
                    tx,
                    IncomingQueue {
                        shard,
                        rx: Mutex::new(rx),
                    },
                )
            })
            .unzip();
        Ok(Self { senders, queues })
    }

    pub fn queues_count(&self) -> usize {
        self.senders.len()
    }

    pub fn queues(&self) -> &[IncomingQueue] {
        &self.queues
    }

    /// Place `event` on its sender's shard, waiting while the shard is full.
    ///
    /// Returns the shard index.
    pub async fn enqueue(&self, event: IncomingMessageEvent) -> Result<usize, NetworkError> {
        let key = event
            .conn
            .remote_public_key()
            .ok_or_else(|| NetworkError::Unauthenticated(event.conn.id()))?;
        let shard = shard_for_key(&key, self.senders.len());
        self.senders[shard]
            .send(event)
            .await
            .map_err(|_| NetworkError::QueueClosed { shard })?;
        Ok(shard)
    }
}
