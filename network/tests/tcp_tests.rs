use std::time::Duration;

use strata_crypto::keypair_from_seed;
use strata_network::{shard_for_key, Net, NetConfig, NetworkError};
use strata_types::PublicKey;
use tokio::net::TcpListener;

#[tokio::test]
async fn dial_handshake_and_route_over_tcp() {
    let bob = Net::new(NetConfig::default(), keypair_from_seed(&[2u8; 32])).unwrap();
    let alice = Net::new(NetConfig::default(), keypair_from_seed(&[1u8; 32])).unwrap();

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let accept_loop = bob.start(listener);

    let to_bob = alice.dial(addr, *bob.local_public_key()).await.unwrap();
    to_bob.send(b"over tcp").unwrap();

    let alice_key = *alice.local_public_key();
    let queue = &bob.incoming_messages()[shard_for_key(&alice_key, bob.queues_count())];
    let event = tokio::time::timeout(Duration::from_secs(5), queue.recv())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(event.message, b"over tcp");
    assert_eq!(event.conn.remote_public_key(), Some(alice_key));
    assert_eq!(bob.metrics().accepted.get(), 1);

    bob.shutdown();
    accept_loop.await.unwrap().unwrap();
}

#[tokio::test]
async fn dial_to_closed_port_fails() {
    let alice = Net::new(NetConfig::default(), keypair_from_seed(&[1u8; 32])).unwrap();

    // Bind then drop to find a port nobody listens on.
    let addr = {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        listener.local_addr().unwrap()
    };
    let err = alice.dial(addr, PublicKey([5u8; 32])).await.unwrap_err();
    assert!(matches!(err, NetworkError::DialFailed { .. }));
}

#[tokio::test]
async fn wrong_identity_never_authenticates() {
    let bob = Net::new(NetConfig::default(), keypair_from_seed(&[2u8; 32])).unwrap();
    let alice = Net::new(NetConfig::default(), keypair_from_seed(&[1u8; 32])).unwrap();
    let carol = keypair_from_seed(&[3u8; 32]);

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let _accept_loop = bob.start(listener);

    // Alice believes she is talking to Carol; Bob cannot open her handshake.
    let conn = alice.dial(addr, carol.public).await.unwrap();
    tokio::time::timeout(Duration::from_secs(2), async {
        while !conn.is_closed() {
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
    })
    .await
    .expect("bob drops the connection after the failed handshake");
    assert_eq!(bob.metrics().handshakes_completed.get(), 0);
    assert_eq!(bob.metrics().handshakes_failed.get(), 1);
    assert_eq!(bob.metrics().slot_timeouts.get(), 0);
}
