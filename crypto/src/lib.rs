//! Cryptographic primitives for the Strata peer-to-peer layer.
//!
//! - **Ed25519** long-term node identity keys
//! - **X25519** static Diffie-Hellman between identities (keys converted from Ed25519)
//! - **Blake2b** for session key derivation
//! - **ChaCha20-Poly1305** AEAD for handshake payloads and post-handshake frames

pub mod error;
pub mod hash;
pub mod keys;
pub mod session;

pub use error::CryptoError;
pub use hash::blake2b_256_multi;
pub use keys::{
    ed25519_private_to_x25519, ed25519_public_to_x25519, generate_keypair, keypair_from_seed,
    public_from_private,
};
pub use session::{create_session, NetworkSession, SEAL_OVERHEAD};
