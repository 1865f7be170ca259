use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use strata_crypto::{create_session, keypair_from_seed};
use strata_network::testing::{MockAcceptOutcome, MockListener};
use strata_network::{AcceptError, Net, NetConfig, NetworkError};
use strata_protocol::{
    generate_handshake_message, read_frame, write_frame, CLIENT_VERSION, MAX_MESSAGE_SIZE,
};
use tokio::io::AsyncWriteExt;
use strata_types::NetworkId;

fn config(max_pending: usize, session_timeout_ms: u64) -> NetConfig {
    NetConfig {
        max_pending_connections: max_pending,
        session_timeout_ms,
        ..Default::default()
    }
}

fn bob(config: NetConfig) -> Arc<Net> {
    Net::new(config, keypair_from_seed(&[2u8; 32])).unwrap()
}

#[tokio::test]
async fn pending_connections_are_bounded() {
    let net = bob(config(3, 300));
    let (listener, handle) = MockListener::new();
    handle.set_outcome(MockAcceptOutcome::TemporaryError);
    let _accept_loop = net.start(listener);

    for _ in 0..3 {
        tokio::time::timeout(Duration::from_millis(100), handle.release_conn())
            .await
            .expect("free slot accepts without waiting");
    }
    assert_eq!(net.available_slots(), 0);

    let started = Instant::now();
    handle.release_conn().await;
    assert!(
        started.elapsed() >= Duration::from_millis(150),
        "fourth accept must wait for a slot to be reclaimed"
    );
    assert_eq!(net.accept_count(), 4);
}

#[tokio::test]
async fn silent_connection_is_reclaimed_after_timeout() {
    let net = bob(config(1, 200));
    let (listener, handle) = MockListener::new();
    let _accept_loop = net.start(listener);

    let mut client = handle.release_conn().await.unwrap();

    let started = Instant::now();
    handle.release_conn().await.unwrap();
    assert!(started.elapsed() >= Duration::from_millis(100));
    assert_eq!(net.metrics().slot_timeouts.get(), 1);

    // The reclaimed connection was closed on the server side.
    let eof = tokio::time::timeout(Duration::from_secs(1), read_frame(&mut client, 1024))
        .await
        .unwrap()
        .unwrap();
    assert!(eof.is_none());
}

#[tokio::test]
async fn completed_handshake_frees_slot_immediately() {
    let net = bob(config(1, 10_000));
    let established = Arc::new(AtomicUsize::new(0));
    {
        let established = Arc::clone(&established);
        net.subscribe_on_new_remote_connections(move |_| {
            established.fetch_add(1, Ordering::SeqCst);
        });
    }
    let (listener, handle) = MockListener::new();
    let _accept_loop = net.start(listener);

    let alice = keypair_from_seed(&[1u8; 32]);
    let session = create_session(&alice.private, net.local_public_key()).unwrap();
    let hello =
        generate_handshake_message(&session, CLIENT_VERSION, NetworkId::MAIN, 123, &alice.public)
            .unwrap();

    let mut client = handle.release_conn().await.unwrap();
    write_frame(&mut client, &hello).await.unwrap();

    let next = tokio::time::timeout(Duration::from_secs(2), handle.release_conn()).await;
    assert!(next.is_ok(), "slot should be free once the handshake completes");
    assert_eq!(established.load(Ordering::SeqCst), 1);
    assert_eq!(net.metrics().handshakes_completed.get(), 1);
}

#[tokio::test]
async fn failed_handshake_drops_connection_and_frees_slot() {
    let net = bob(config(1, 10_000));
    let (listener, handle) = MockListener::new();
    let _accept_loop = net.start(listener);

    let mut client = handle.release_conn().await.unwrap();
    write_frame(&mut client, b"garbage").await.unwrap();

    tokio::time::timeout(Duration::from_secs(2), handle.release_conn())
        .await
        .expect("slot freed without waiting for the session timeout");
    let eof = tokio::time::timeout(Duration::from_secs(1), read_frame(&mut client, 1024))
        .await
        .unwrap()
        .unwrap();
    assert!(eof.is_none());
    assert_eq!(net.metrics().handshakes_failed.get(), 1);
    assert_eq!(net.metrics().slot_timeouts.get(), 0);
}

#[tokio::test]
async fn oversized_pre_session_frame_is_refused_at_the_header() {
    let net = bob(config(1, 10_000));
    let (listener, handle) = MockListener::new();
    let _accept_loop = net.start(listener);

    // Only the length prefix is sent; the server must not wait for the body.
    let mut client = handle.release_conn().await.unwrap();
    client
        .write_all(&(MAX_MESSAGE_SIZE as u32).to_be_bytes())
        .await
        .unwrap();
    client.flush().await.unwrap();

    tokio::time::timeout(Duration::from_secs(2), handle.release_conn())
        .await
        .expect("slot freed as soon as the oversized header is seen");
    let eof = tokio::time::timeout(Duration::from_secs(1), read_frame(&mut client, 1024))
        .await
        .unwrap()
        .unwrap();
    assert!(eof.is_none());
    assert_eq!(net.metrics().handshakes_failed.get(), 0);
    assert_eq!(net.metrics().slot_timeouts.get(), 0);
}

#[tokio::test]
async fn fatal_listener_error_surfaces() {
    let net = bob(config(2, 1_000));
    let (listener, handle) = MockListener::new();
    handle.set_outcome(MockAcceptOutcome::FatalError);
    let accept_loop = net.start(listener);

    handle.release_conn().await;
    let result = accept_loop.await.unwrap();
    assert!(matches!(
        result,
        Err(NetworkError::Admission(AcceptError::Fatal(_)))
    ));
    assert!(handle.is_closed());
}

#[tokio::test]
async fn shutdown_ends_accept_loop() {
    let net = bob(config(2, 1_000));
    let (listener, handle) = MockListener::new();
    let accept_loop = net.start(listener);

    handle.release_conn().await.unwrap();
    net.shutdown();
    tokio::time::timeout(Duration::from_secs(1), accept_loop)
        .await
        .unwrap()
        .unwrap()
        .unwrap();
    assert!(handle.is_closed());
}
