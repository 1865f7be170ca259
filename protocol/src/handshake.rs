//! Pre-session handshake.
//!
//! The initiator derives a session from its private key and the responder's
//! public key, seals a [`HandshakeData`] with it and sends a
//! [`HandshakeMessage`] carrying its own public key in the clear. The
//! responder derives the same session from its private key and the embedded
//! public key; if the sealed data opens, the sender proved ownership of that
//! key and the session is ready for use.

use serde::{Deserialize, Serialize};
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use strata_crypto::{create_session, NetworkSession};
use strata_types::{NetworkId, PrivateKey, PublicKey};

use crate::version::{is_compatible, PROTOCOL_VERSION};
use crate::ProtocolError;

/// Outer handshake envelope, sent as a single frame.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct HandshakeMessage {
    pub version: u16,
    /// The initiator's identity.
    pub sender: PublicKey,
    /// [`HandshakeData`] sealed with the initiator's session.
    pub sealed: Vec<u8>,
}

/// Handshake payload, only readable by the addressed responder.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct HandshakeData {
    pub client_version: String,
    pub network_id: NetworkId,
    /// Port the initiator accepts connections on.
    pub port: u16,
    /// Unix seconds at which the initiator built the message.
    pub timestamp: u64,
}

impl HandshakeData {
    /// Reject data whose timestamp is further than `max_age` from the local clock,
    /// in either direction.
    pub fn ensure_fresh(&self, max_age: Duration) -> Result<(), ProtocolError> {
        let now = unix_now_secs();
        let skew = Duration::from_secs(now.abs_diff(self.timestamp));
        if skew > max_age {
            return Err(ProtocolError::StaleHandshake {
                timestamp: self.timestamp,
                now,
            });
        }
        Ok(())
    }
}

/// Build the handshake message an initiator sends to open `session`.
pub fn generate_handshake_message(
    session: &NetworkSession,
    client_version: &str,
    network_id: NetworkId,
    port: u16,
    local_public: &PublicKey,
) -> Result<Vec<u8>, ProtocolError> {
    let data = HandshakeData {
        client_version: client_version.to_string(),
        network_id,
        port,
        timestamp: unix_now_secs(),
    };
    seal_handshake_data(session, &data, local_public)
}

/// Seal already built handshake data into a wire message.
pub fn seal_handshake_data(
    session: &NetworkSession,
    data: &HandshakeData,
    local_public: &PublicKey,
) -> Result<Vec<u8>, ProtocolError> {
    let plaintext =
        bincode::serialize(data).map_err(|e| ProtocolError::Malformed(e.to_string()))?;

    let message = HandshakeMessage {
        version: PROTOCOL_VERSION,
        sender: *local_public,
        sealed: session.seal(&plaintext)?,
    };
    bincode::serialize(&message).map_err(|e| ProtocolError::Malformed(e.to_string()))
}

/// Responder side: authenticate a raw handshake and derive its session.
///
/// Pure with respect to its inputs apart from the fresh session counters:
/// processing the same bytes twice yields two equivalent sessions.
pub fn process_handshake(
    local_private: &PrivateKey,
    raw: &[u8],
    expected_network: NetworkId,
) -> Result<(NetworkSession, HandshakeData), ProtocolError> {
    let message: HandshakeMessage = bincode::deserialize(raw)
        .map_err(|e| ProtocolError::Malformed(format!("cannot parse handshake payload: {e}")))?;

    if !is_compatible(message.version) {
        return Err(ProtocolError::UnsupportedVersion(message.version));
    }

    let session = create_session(local_private, &message.sender)
        .map_err(|e| ProtocolError::HandshakeFailed(format!("key agreement: {e}")))?;

    let plaintext = session
        .open(&message.sealed)
        .map_err(|e| ProtocolError::HandshakeFailed(format!("cannot open handshake data: {e}")))?;

    let data: HandshakeData = bincode::deserialize(&plaintext)
        .map_err(|e| ProtocolError::Malformed(format!("cannot parse handshake data: {e}")))?;

    if data.network_id != expected_network {
        return Err(ProtocolError::UnsupportedNetwork {
            expected: expected_network,
            actual: data.network_id,
        });
    }

    Ok((session, data))
}

pub(crate) fn unix_now_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::CLIENT_VERSION;
    use strata_crypto::keypair_from_seed;
    use strata_types::KeyPair;

    fn identities() -> (KeyPair, KeyPair) {
        (keypair_from_seed(&[11u8; 32]), keypair_from_seed(&[22u8; 32]))
    }

    fn alice_to_bob(alice: &KeyPair, bob: &KeyPair, network: NetworkId) -> Vec<u8> {
        let session = create_session(&alice.private, &bob.public).unwrap();
        generate_handshake_message(&session, CLIENT_VERSION, network, 123, &alice.public).unwrap()
    }

    #[test]
    fn responder_derives_session_for_initiator() {
        let (alice, bob) = identities();
        let raw = alice_to_bob(&alice, &bob, NetworkId::MAIN);

        let (session, data) = process_handshake(&bob.private, &raw, NetworkId::MAIN).unwrap();
        assert_eq!(*session.id(), alice.public);
        assert_eq!(data.port, 123);
        assert_eq!(data.network_id, NetworkId::MAIN);
        assert_eq!(data.client_version, CLIENT_VERSION);
    }

    #[test]
    fn same_message_processes_twice() {
        let (alice, bob) = identities();
        let raw = alice_to_bob(&alice, &bob, NetworkId::MAIN);
        let (first, _) = process_handshake(&bob.private, &raw, NetworkId::MAIN).unwrap();
        let (second, _) = process_handshake(&bob.private, &raw, NetworkId::MAIN).unwrap();
        assert_eq!(first.id(), second.id());
    }

    #[test]
    fn garbage_is_malformed() {
        let (_, bob) = identities();
        let err = process_handshake(&bob.private, b"\x01\x02", NetworkId::MAIN).unwrap_err();
        assert!(matches!(err, ProtocolError::Malformed(_)));
    }

    #[test]
    fn wrong_network_rejected() {
        let (alice, bob) = identities();
        let raw = alice_to_bob(&alice, &bob, NetworkId::DEV);
        let err = process_handshake(&bob.private, &raw, NetworkId::MAIN).unwrap_err();
        assert!(matches!(
            err,
            ProtocolError::UnsupportedNetwork {
                expected: NetworkId::MAIN,
                actual: NetworkId::DEV
            }
        ));
    }

    #[test]
    fn message_for_someone_else_fails() {
        let (alice, bob) = identities();
        let carol = keypair_from_seed(&[33u8; 32]);
        let raw = alice_to_bob(&alice, &bob, NetworkId::MAIN);
        let err = process_handshake(&carol.private, &raw, NetworkId::MAIN).unwrap_err();
        assert!(matches!(err, ProtocolError::HandshakeFailed(_)));
    }

    #[test]
    fn future_version_rejected() {
        let (alice, bob) = identities();
        let session = create_session(&alice.private, &bob.public).unwrap();
        let message = HandshakeMessage {
            version: PROTOCOL_VERSION + 1,
            sender: alice.public,
            sealed: session.seal(b"irrelevant").unwrap(),
        };
        let raw = bincode::serialize(&message).unwrap();
        let err = process_handshake(&bob.private, &raw, NetworkId::MAIN).unwrap_err();
        assert!(matches!(err, ProtocolError::UnsupportedVersion(v) if v == PROTOCOL_VERSION + 1));
    }

    #[test]
    fn spoofed_sender_key_fails() {
        let (alice, bob) = identities();
        let mallory = keypair_from_seed(&[44u8; 32]);
        let session = create_session(&mallory.private, &bob.public).unwrap();
        // Mallory claims to be Alice but can only seal under her own session.
        let raw =
            generate_handshake_message(&session, CLIENT_VERSION, NetworkId::MAIN, 1, &alice.public)
                .unwrap();
        let err = process_handshake(&bob.private, &raw, NetworkId::MAIN).unwrap_err();
        assert!(matches!(err, ProtocolError::HandshakeFailed(_)));
    }

    #[test]
    fn announced_client_version_reaches_responder() {
        let (alice, bob) = identities();
        let session = create_session(&alice.private, &bob.public).unwrap();
        let raw =
            generate_handshake_message(&session, "other-client/2.0", NetworkId::MAIN, 9, &alice.public)
                .unwrap();
        let (_, data) = process_handshake(&bob.private, &raw, NetworkId::MAIN).unwrap();
        assert_eq!(data.client_version, "other-client/2.0");
    }

    #[test]
    fn freshness_window() {
        let (alice, bob) = identities();
        let raw = alice_to_bob(&alice, &bob, NetworkId::MAIN);
        let (_, data) = process_handshake(&bob.private, &raw, NetworkId::MAIN).unwrap();
        assert!(data.ensure_fresh(Duration::from_secs(30)).is_ok());

        let old = HandshakeData {
            timestamp: data.timestamp - 600,
            ..data.clone()
        };
        assert!(matches!(
            old.ensure_fresh(Duration::from_secs(30)),
            Err(ProtocolError::StaleHandshake { .. })
        ));

        let ahead = HandshakeData {
            timestamp: data.timestamp + 600,
            ..data
        };
        assert!(ahead.ensure_fresh(Duration::from_secs(30)).is_err());
    }

    #[test]
    fn sealed_data_opens_unchanged() {
        let (alice, bob) = identities();
        let session = create_session(&alice.private, &bob.public).unwrap();
        let data = HandshakeData {
            client_version: CLIENT_VERSION.into(),
            network_id: NetworkId::DEV,
            port: 4000,
            timestamp: 1,
        };
        let raw = seal_handshake_data(&session, &data, &alice.public).unwrap();
        let (_, opened) = process_handshake(&bob.private, &raw, NetworkId::DEV).unwrap();
        assert_eq!(opened, data);
    }
}
