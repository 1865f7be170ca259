//! Cryptographic key types for node identity.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::StrataError;

/// Length in bytes of public and private keys.
pub const KEY_LENGTH: usize = 32;

/// A 32-byte Ed25519 public key identifying a node.
///
/// Ordered and hashable so it can key session maps and pick router shards.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct PublicKey(pub [u8; KEY_LENGTH]);

/// A 32-byte Ed25519 private key (seed).
///
/// This type intentionally does not implement `Debug`, `Serialize`, or `Clone`
/// to prevent accidental exposure. Key bytes are zeroized on drop.
#[derive(Zeroize, ZeroizeOnDrop)]
pub struct PrivateKey(pub [u8; KEY_LENGTH]);

/// The local node identity (public + private).
///
/// Use `strata_crypto::generate_keypair()` or `strata_crypto::keypair_from_seed()`
/// to construct key pairs. This struct is intentionally just data.
pub struct KeyPair {
    pub public: PublicKey,
    pub private: PrivateKey,
}

impl PublicKey {
    pub fn as_bytes(&self) -> &[u8; KEY_LENGTH] {
        &self.0
    }

    /// Build a key from a byte slice of exactly [`KEY_LENGTH`] bytes.
    pub fn from_slice(bytes: &[u8]) -> Result<Self, StrataError> {
        let arr: [u8; KEY_LENGTH] =
            bytes
                .try_into()
                .map_err(|_| StrataError::InvalidKeyLength {
                    expected: KEY_LENGTH,
                    actual: bytes.len(),
                })?;
        Ok(Self(arr))
    }

    /// Lowercase hex rendering, also used by `Display`.
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }
}

impl fmt::Display for PublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl FromStr for PublicKey {
    type Err = StrataError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let bytes = hex::decode(s).map_err(|e| StrataError::InvalidHex(e.to_string()))?;
        Self::from_slice(&bytes)
    }
}
