//! Fundamental types for the Strata peer-to-peer layer.
//!
//! Identity keys and the network identifier shared by the crypto, protocol
//! and network crates.

pub mod error;
pub mod keys;
pub mod network;

pub use error::StrataError;
pub use keys::{KeyPair, PrivateKey, PublicKey};
pub use network::NetworkId;
