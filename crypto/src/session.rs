//! Authenticated session between two node identities.
//!
//! Both sides run static X25519 Diffie-Hellman over their Ed25519 identity
//! keys and hash the result into a ChaCha20-Poly1305 key. Only the holders of
//! the two private keys can derive it, so a frame that opens correctly is
//! authenticated to the peer whose public key the session was built with.
//!
//! Frames are `nonce (12 bytes) || ciphertext || tag (16 bytes)`. The nonce is
//! `direction byte || 3 zero bytes || big-endian counter`; the direction byte
//! is fixed by ordering the two public keys, so the peers never reuse a nonce
//! under the shared key.

use std::sync::atomic::{AtomicU64, Ordering};

use chacha20poly1305::{
    aead::{Aead, KeyInit},
    ChaCha20Poly1305, Key, Nonce,
};
use strata_types::{PrivateKey, PublicKey};
use x25519_dalek::{PublicKey as X25519Public, StaticSecret};
use zeroize::Zeroizing;

use crate::hash::blake2b_256_multi;
use crate::keys::{ed25519_private_to_x25519, ed25519_public_to_x25519, public_from_private};
use crate::CryptoError;

const NONCE_LEN: usize = 12;
const TAG_LEN: usize = 16;
const SESSION_CONTEXT: &[u8] = b"strata-session-v1";

/// Bytes added to every sealed payload.
pub const SEAL_OVERHEAD: usize = NONCE_LEN + TAG_LEN;

/// Symmetric context shared with one remote identity.
///
/// Immutable after creation except for the send and receive counters.
pub struct NetworkSession {
    id: PublicKey,
    key: Zeroizing<[u8; 32]>,
    local_direction: u8,
    remote_direction: u8,
    next_send: AtomicU64,
    /// Highest received counter plus one; zero until the first frame opens.
    recv_high: AtomicU64,
}

/// Derive the session between `local_private` and `remote`.
///
/// Deterministic: the same pair of identities always yields the same key,
/// from either side.
pub fn create_session(
    local_private: &PrivateKey,
    remote: &PublicKey,
) -> Result<NetworkSession, CryptoError> {
    let local_public = public_from_private(local_private);
    let remote_x25519 = ed25519_public_to_x25519(remote.as_bytes()).ok_or(CryptoError::InvalidKey)?;

    let secret = StaticSecret::from(ed25519_private_to_x25519(&local_private.0));
    let shared = secret.diffie_hellman(&X25519Public::from(remote_x25519));
    if !shared.was_contributory() {
        return Err(CryptoError::WeakSharedSecret);
    }

    let (low, high) = if local_public <= *remote {
        (local_public, *remote)
    } else {
        (*remote, local_public)
    };
    let key = blake2b_256_multi(&[
        shared.as_bytes(),
        SESSION_CONTEXT,
        low.as_bytes(),
        high.as_bytes(),
    ]);

    let (local_direction, remote_direction) = if local_public <= *remote {
        (0, 1)
    } else {
        (1, 0)
    };

    Ok(NetworkSession {
        id: *remote,
        key: Zeroizing::new(key),
        local_direction,
        remote_direction,
        next_send: AtomicU64::new(0),
        recv_high: AtomicU64::new(0),
    })
}

impl NetworkSession {
    /// The remote identity this session authenticates.
    pub fn id(&self) -> &PublicKey {
        &self.id
    }

    /// Number of frames sealed so far.
    pub fn sent_count(&self) -> u64 {
        self.next_send.load(Ordering::Relaxed)
    }

    /// Encrypt a payload for the remote side.
    pub fn seal(&self, plaintext: &[u8]) -> Result<Vec<u8>, CryptoError> {
        let counter = self.next_send.fetch_add(1, Ordering::Relaxed);
        let nonce = nonce_bytes(self.local_direction, counter);

        let ciphertext = self
            .cipher()
            .encrypt(Nonce::from_slice(&nonce), plaintext)
            .map_err(|_| CryptoError::Encryption)?;

        let mut frame = Vec::with_capacity(NONCE_LEN + ciphertext.len());
        frame.extend_from_slice(&nonce);
        frame.extend_from_slice(&ciphertext);
        Ok(frame)
    }

    /// Decrypt a frame sealed by the remote side.
    ///
    /// Rejects frames sealed in our own direction (reflection) and frames
    /// whose counter is not above every counter accepted before (replay).
    /// The counter only advances after the tag verifies.
    pub fn open(&self, frame: &[u8]) -> Result<Vec<u8>, CryptoError> {
        if frame.len() < SEAL_OVERHEAD {
            return Err(CryptoError::Decryption("frame shorter than seal overhead"));
        }
        let (nonce, ciphertext) = frame.split_at(NONCE_LEN);
        if nonce[0] != self.remote_direction {
            return Err(CryptoError::WrongDirection);
        }
        let mut counter_bytes = [0u8; 8];
        counter_bytes.copy_from_slice(&nonce[4..]);
        let counter = u64::from_be_bytes(counter_bytes);

        let plaintext = self
            .cipher()
            .decrypt(Nonce::from_slice(nonce), ciphertext)
            .map_err(|_| CryptoError::Decryption("authentication check failed"))?;

        self.recv_high
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |high| {
                (counter >= high).then(|| counter + 1)
            })
            .map_err(|_| CryptoError::Replay { counter })?;

        Ok(plaintext)
    }

    fn cipher(&self) -> ChaCha20Poly1305 {
        ChaCha20Poly1305::new(Key::from_slice(self.key.as_ref()))
    }
}

impl std::fmt::Debug for NetworkSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NetworkSession")
            .field("id", &self.id)
            .field("sent", &self.sent_count())
            .finish_non_exhaustive()
    }
}

fn nonce_bytes(direction: u8, counter: u64) -> [u8; NONCE_LEN] {
    let mut nonce = [0u8; NONCE_LEN];
    nonce[0] = direction;
    nonce[4..].copy_from_slice(&counter.to_be_bytes());
    nonce
}
