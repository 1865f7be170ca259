//! Events emitted by the network core and the subscriber registry.

use std::fmt;
use std::sync::Arc;

use parking_lot::RwLock;
use strata_protocol::HandshakeData;

use crate::connection::Connection;

/// An authenticated inbound message, tagged with the connection it came from.
#[derive(Clone)]
pub struct IncomingMessageEvent {
    pub conn: Arc<dyn Connection>,
    pub message: Vec<u8>,
}

impl fmt::Debug for IncomingMessageEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IncomingMessageEvent")
            .field("conn", &self.conn)
            .field("len", &self.message.len())
            .finish()
    }
}

/// Which side opened the connection.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Direction {
    Inbound,
    Outbound,
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Direction::Inbound => f.write_str("inbound"),
            Direction::Outbound => f.write_str("outbound"),
        }
    }
}

/// A connection that just gained a session.
#[derive(Clone, Debug)]
pub struct NewConnectionEvent {
    pub conn: Arc<dyn Connection>,
    pub direction: Direction,
    /// What the peer announced; `None` for connections we dialed.
    pub handshake: Option<HandshakeData>,
}

type Subscriber = Arc<dyn Fn(&NewConnectionEvent) + Send + Sync>;

/// Synchronous fan-out of [`NewConnectionEvent`]s.
///
/// Subscribers run inline on the publishing task in registration order;
/// keep them fast, the handshake path waits for all of them.
#[derive(Default)]
pub struct ConnectionSubscribers {
    subscribers: RwLock<Vec<Subscriber>>,
}

impl ConnectionSubscribers {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe<F>(&self, callback: F)
    where
        F: Fn(&NewConnectionEvent) + Send + Sync + 'static,
    {
        self.subscribers.write().push(Arc::new(callback));
    }

    pub fn publish(&self, event: &NewConnectionEvent) {
        // Snapshot so a subscriber may register another without deadlocking.
        let snapshot: Vec<Subscriber> = self.subscribers.read().clone();
        for subscriber in snapshot {
            subscriber(event);
        }
    }

    pub fn len(&self) -> usize {
        self.subscribers.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
