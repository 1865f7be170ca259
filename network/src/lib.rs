//! P2P network core for a Strata node.
//!
//! Accepts inbound streams under a bounded pool of pending slots, authenticates
//! peers with a one-message handshake, and fans authenticated traffic out to a
//! fixed set of per-peer ordered queues. [`Net`] is the façade tying the pieces
//! together for the hosting process.

pub mod admission;
pub mod config;
pub mod connection;
pub mod error;
pub mod events;
pub mod listener;
pub mod metrics;
pub mod net;
pub mod router;
pub mod spans;
pub mod testing;

pub use admission::{AdmissionController, PendingSlot, SlotRelease};
pub use config::NetConfig;
pub use connection::{Connection, ConnectionId, StreamConnection};
pub use error::NetworkError;
pub use events::{ConnectionSubscribers, Direction, IncomingMessageEvent, NewConnectionEvent};
pub use listener::{AcceptError, Listener};
pub use metrics::NetMetrics;
pub use net::Net;
pub use router::{shard_for_key, sum_byte_array, IncomingQueue, MessageRouter};
