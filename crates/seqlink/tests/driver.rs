//! Integration tests for the channel driver over in-memory and UDP links.

use std::time::Duration;

use seqlink::ChannelError;
use seqlink::prelude::*;

// =========================================================================
// Helpers
// =========================================================================

fn channel() -> ReliableChannel<KeyedCrc> {
    ReliableChannel::new(ChannelConfig::default(), KeyedCrc)
}

fn memory_pair() -> (DriverHandle, DriverHandle) {
    let (a, b) = MemoryConnection::pair();
    (
        ChannelDriver::spawn(a, channel()),
        ChannelDriver::spawn(b, channel()),
    )
}

/// Polls until `handle`'s session reaches `state`.
async fn wait_for_state(handle: &DriverHandle, state: SessionState) {
    tokio::time::timeout(Duration::from_secs(2), async {
        loop {
            if handle.status().await.unwrap().state == state {
                return;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("session state not reached");
}

async fn handshake(client: &DriverHandle, server: &DriverHandle) {
    client.connect().await.unwrap();
    wait_for_state(client, SessionState::Established).await;
    wait_for_state(server, SessionState::Established).await;
}

async fn recv(handle: &mut DriverHandle) -> Vec<u8> {
    tokio::time::timeout(Duration::from_secs(2), handle.recv())
        .await
        .expect("recv timed out")
        .expect("driver stopped")
}

// =========================================================================
// In-memory link
// =========================================================================

#[tokio::test]
async fn test_driver_exchanges_messages() {
    let (mut client, mut server) = memory_pair();
    handshake(&client, &server).await;

    client.send(b"hello".to_vec()).await.unwrap();
    assert_eq!(recv(&mut server).await, b"hello");

    server.send(b"world".to_vec()).await.unwrap();
    assert_eq!(recv(&mut client).await, b"world");
}

#[tokio::test]
async fn test_driver_delivers_large_messages_in_order() {
    let (client, mut server) = memory_pair();
    handshake(&client, &server).await;

    let messages: Vec<Vec<u8>> = (0..10u32)
        .map(|i| (0..(i * 3000 + 1)).map(|b| (b % 241) as u8).collect())
        .collect();
    for message in &messages {
        client.send(message.clone()).await.unwrap();
    }

    for message in &messages {
        assert_eq!(&recv(&mut server).await, message);
    }

    // Acks flow back and release everything the client retained.
    tokio::time::timeout(Duration::from_secs(2), async {
        while client.status().await.unwrap().outstanding > 0 {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("client never saw all acks");
}

#[tokio::test]
async fn test_driver_rejects_oversized_message() {
    let (client, _server) = memory_pair();

    let err = client.send(vec![0u8; 2_000_000]).await.unwrap_err();

    assert!(matches!(
        err,
        SeqlinkError::Channel(ChannelError::MessageTooLarge { .. })
    ));
}

#[tokio::test]
async fn test_driver_disconnect_stops_both_sides() {
    let (mut client, mut server) = memory_pair();
    handshake(&client, &server).await;

    client.send(b"last words".to_vec()).await.unwrap();
    client.disconnect().await.unwrap();

    assert_eq!(recv(&mut server).await, b"last words");
    assert!(server.recv().await.is_none());

    let err = client.send(b"too late".to_vec()).await.unwrap_err();
    assert!(matches!(err, SeqlinkError::DriverStopped));

    client.join().await.unwrap();
    server.join().await.unwrap();
}

#[tokio::test]
async fn test_driver_disconnect_before_connect_fails() {
    let (client, _server) = memory_pair();

    let err = client.disconnect().await.unwrap_err();

    assert!(matches!(err, SeqlinkError::Channel(ChannelError::NoSession)));
}

#[tokio::test]
async fn test_driver_stops_when_peer_goes_away() {
    let (mut client, server) = memory_pair();

    server.join().await.unwrap();

    assert!(client.recv().await.is_none());
    client.join().await.unwrap();
}

#[tokio::test]
async fn test_driver_sends_keep_alive_acks() {
    let config = ChannelConfig {
        keepalive_interval: Duration::from_millis(20),
        ..ChannelConfig::default()
    };
    let (a, b) = MemoryConnection::pair();
    let client = ChannelDriver::spawn(a, ReliableChannel::new(config, KeyedCrc));
    let server = ChannelDriver::spawn(b, channel());

    tokio::time::sleep(Duration::from_millis(150)).await;

    let stats = client.status().await.unwrap().stats;
    assert!(stats.acks_sent >= 2, "acks_sent = {}", stats.acks_sent);
    let server_stats = server.status().await.unwrap().stats;
    assert_eq!(server_stats.checksum_failures, 0);
    assert_eq!(server_stats.malformed, 0);
}

#[tokio::test]
async fn test_driver_request_max_timeout_reaches_peer() {
    let (client, server) = memory_pair();
    handshake(&client, &server).await;

    client.request_max_timeout().await.unwrap();
    client.send(b"after".to_vec()).await.unwrap();

    // Same link, in order: once "after" is counted the request was
    // processed too.
    tokio::time::timeout(Duration::from_secs(2), async {
        while server.status().await.unwrap().stats.delivered == 0 {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .unwrap();
    let stats = server.status().await.unwrap().stats;
    assert_eq!(stats.malformed, 0);
    assert_eq!(stats.checksum_failures, 0);
}

#[tokio::test]
async fn test_driver_stats_serialize_to_json() {
    let (client, server) = memory_pair();
    handshake(&client, &server).await;

    let status = client.status().await.unwrap();
    let json = serde_json::to_value(status.stats).unwrap();

    assert_eq!(json["delivered"], 0);
    assert!(json["datagrams_sent"].as_u64().unwrap() >= 1);
}

// =========================================================================
// UDP
// =========================================================================

#[tokio::test]
async fn test_driver_over_udp_loopback() {
    let a = UdpConnection::bind("127.0.0.1:0").await.unwrap();
    let b = UdpConnection::bind("127.0.0.1:0").await.unwrap();
    a.connect_to(b.local_addr().unwrap()).await.unwrap();
    b.connect_to(a.local_addr().unwrap()).await.unwrap();

    let mut client = ChannelDriver::spawn(a, channel());
    let mut server = ChannelDriver::spawn(b, channel());
    handshake(&client, &server).await;

    let big: Vec<u8> = (0..20_000u32).map(|i| (i % 199) as u8).collect();
    client.send(b"small".to_vec()).await.unwrap();
    client.send(big.clone()).await.unwrap();
    server.send(b"reply".to_vec()).await.unwrap();

    assert_eq!(recv(&mut server).await, b"small");
    assert_eq!(recv(&mut server).await, big);
    assert_eq!(recv(&mut client).await, b"reply");

    client.disconnect().await.unwrap();
    assert!(server.recv().await.is_none());
    client.join().await.unwrap();
    server.join().await.unwrap();
}
