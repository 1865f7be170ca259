//! Ed25519 identity keys and their X25519 counterparts.

use ed25519_dalek::{SigningKey, VerifyingKey};
use strata_types::{KeyPair, PrivateKey, PublicKey};

use crate::CryptoError;

/// Generate a new Ed25519 key pair from the operating system's random source.
pub fn generate_keypair() -> Result<KeyPair, CryptoError> {
    let mut seed = [0u8; 32];
    getrandom::getrandom(&mut seed).map_err(|e| CryptoError::Random(e.to_string()))?;
    let keypair = keypair_from_seed(&seed);
    zeroize::Zeroize::zeroize(&mut seed);
    Ok(keypair)
}

/// Derive a key pair from a 32-byte seed (deterministic).
pub fn keypair_from_seed(seed: &[u8; 32]) -> KeyPair {
    let signing_key = SigningKey::from_bytes(seed);
    KeyPair {
        public: PublicKey(signing_key.verifying_key().to_bytes()),
        private: PrivateKey(signing_key.to_bytes()),
    }
}

/// Derive the public key from a private key.
pub fn public_from_private(private: &PrivateKey) -> PublicKey {
    let signing_key = SigningKey::from_bytes(&private.0);
    PublicKey(signing_key.verifying_key().to_bytes())
}

/// Convert an Ed25519 private key (seed) to X25519 scalar bytes.
///
/// The result is suitable for `x25519_dalek::StaticSecret`; its public half
/// equals `ed25519_public_to_x25519` of the matching Ed25519 public key.
pub fn ed25519_private_to_x25519(ed25519_private: &[u8; 32]) -> [u8; 32] {
    SigningKey::from_bytes(ed25519_private).to_scalar_bytes()
}

/// Convert an Ed25519 public key to its X25519 (Montgomery) equivalent.
///
/// Returns `None` if the bytes do not decode to a curve point.
pub fn ed25519_public_to_x25519(ed25519_public: &[u8; 32]) -> Option<[u8; 32]> {
    let verifying_key = VerifyingKey::from_bytes(ed25519_public).ok()?;
    Some(verifying_key.to_montgomery().to_bytes())
}
