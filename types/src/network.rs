//! Network identifier.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Identifies which network a node participates in.
///
/// Carried inside every handshake; peers announcing a different network are
/// refused before a session is attached to their connection.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NetworkId(pub u32);

impl NetworkId {
    /// The production network.
    pub const MAIN: Self = Self(1);
    /// Local development network.
    pub const DEV: Self = Self(42);

    pub fn as_u32(&self) -> u32 {
        self.0
    }
}

impl Default for NetworkId {
    fn default() -> Self {
        Self::MAIN
    }
}

impl fmt::Display for NetworkId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u32> for NetworkId {
    fn from(id: u32) -> Self {
        Self(id)
    }
}
