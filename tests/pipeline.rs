//! End-to-end pipeline tests over real localhost sockets.
//!
//! Each test plays capture server: it owns the sending side of a TCP or
//! UDP socket, streams encoded frames at the library, and drives the
//! registry the way a host render loop would.

use std::sync::Arc;
use std::time::Duration;

use tokio::io::AsyncWriteExt;
use tokio::net::TcpListener;

use mocaplink::protocol::encode;
use mocaplink::{
    ActorEvent, Bone, FrameHeader, Registry, RegistryConfig, SourceKey, TokioTransport,
};

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

fn frame(actor_index: u32, frame_index: u32, hip_x_cm: f32) -> Vec<u8> {
    let mut header = FrameHeader::default();
    header.actor_index = actor_index;
    header.frame_index = frame_index;
    header.with_displacement = true;
    header.actor_name = "Performer".into();
    let mut values = vec![0.0f32; 354];
    values[0] = hip_x_cm;
    encode(&header, &values).unwrap()
}

/// Tick the registry until a predicate holds or the deadline passes,
/// collecting every event seen along the way.
async fn tick_until(
    registry: &Registry,
    mut done: impl FnMut(&[mocaplink::SourceEvent]) -> bool,
) -> Vec<mocaplink::SourceEvent> {
    let mut seen = Vec::new();
    for _ in 0..200 {
        seen.extend(registry.tick());
        if done(&seen) {
            return seen;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("deadline passed; events so far: {seen:?}");
}

#[tokio::test(flavor = "multi_thread")]
async fn tcp_frames_flow_through_to_actor_poses() {
    init_tracing();
    let server = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = server.local_addr().unwrap().port();

    let registry = Registry::new(Arc::new(TokioTransport::new()), RegistryConfig::default());
    let key = SourceKey::Tcp { address: "127.0.0.1".into(), port };
    let source = registry.connect(key.clone()).await.unwrap();

    let (mut peer, _) = server.accept().await.unwrap();

    // First frame whole, second split mid-header to exercise reassembly.
    let first = frame(0, 1, 100.0);
    let second = frame(0, 2, 150.0);
    peer.write_all(&first).await.unwrap();
    peer.write_all(&second[..40]).await.unwrap();
    peer.flush().await.unwrap();
    tokio::time::sleep(Duration::from_millis(20)).await;
    peer.write_all(&second[40..]).await.unwrap();
    peer.flush().await.unwrap();

    let events = tick_until(&registry, |events| {
        events.iter().any(|e| e.event == ActorEvent::Resumed { actor_index: 0 })
    })
    .await;
    assert!(events.iter().all(|e| e.key == key));

    tick_until(&registry, |_| {
        source
            .actor(0)
            .is_some_and(|a| a.header().frame_index == 2)
    })
    .await;

    let actor = source.actor(0).unwrap();
    assert_eq!(actor.name(), "Performer");
    assert_eq!(actor.position(Bone::Hips).x, -1.5);
    assert_eq!(source.active_indices(), vec![0]);

    let events = registry.disconnect(&source).await;
    assert_eq!(events, vec![ActorEvent::Suspended { actor_index: 0 }]);
    assert!(registry.is_empty());
}

#[tokio::test(flavor = "multi_thread")]
async fn udp_datagrams_reach_multiple_actors() {
    init_tracing();
    // Reserve a free port, then hand it to the library.
    let probe = std::net::UdpSocket::bind("127.0.0.1:0").unwrap();
    let port = probe.local_addr().unwrap().port();
    drop(probe);

    let registry = Registry::new(Arc::new(TokioTransport::new()), RegistryConfig::default());
    let source = registry.connect(SourceKey::Udp { port }).await.unwrap();

    let sender = tokio::net::UdpSocket::bind("127.0.0.1:0").await.unwrap();
    let target = format!("127.0.0.1:{port}");
    for actor_index in 0..2u32 {
        sender
            .send_to(&frame(actor_index, 1, 10.0 * actor_index as f32), &target)
            .await
            .unwrap();
    }

    tick_until(&registry, |_| source.active_indices() == vec![0, 1]).await;
    let hip_x = source.actor(1).unwrap().position(Bone::Hips).x;
    assert!((hip_x - -0.1).abs() < 1e-6, "hip x was {hip_x}");

    registry.disconnect(&source).await;
}

#[tokio::test(flavor = "multi_thread")]
async fn garbage_on_the_wire_does_not_poison_the_stream() {
    init_tracing();
    let server = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = server.local_addr().unwrap().port();

    let registry = Registry::new(Arc::new(TokioTransport::new()), RegistryConfig::default());
    let source = registry
        .connect(SourceKey::Tcp { address: "127.0.0.1".into(), port })
        .await
        .unwrap();

    let (mut peer, _) = server.accept().await.unwrap();
    // Leading junk, then a valid frame.
    peer.write_all(&[0x00, 0x13, 0x37, 0xFF]).await.unwrap();
    peer.write_all(&frame(3, 1, 50.0)).await.unwrap();
    peer.flush().await.unwrap();

    tick_until(&registry, |_| source.active_indices() == vec![3]).await;
    assert_eq!(source.actor(3).unwrap().position(Bone::Hips).x, -0.5);

    registry.disconnect(&source).await;
}

#[tokio::test(flavor = "multi_thread")]
async fn reconnecting_the_same_key_reuses_the_listener() {
    init_tracing();
    let probe = std::net::UdpSocket::bind("127.0.0.1:0").unwrap();
    let port = probe.local_addr().unwrap().port();
    drop(probe);

    let registry = Registry::new(Arc::new(TokioTransport::new()), RegistryConfig::default());
    let a = registry.connect(SourceKey::Udp { port }).await.unwrap();
    let b = registry.connect(SourceKey::Udp { port }).await.unwrap();
    assert!(Arc::ptr_eq(&a, &b));
    assert_eq!(a.reference_count(), 2);

    registry.disconnect(&a).await;
    assert_eq!(registry.len(), 1);
    registry.disconnect(&b).await;
    assert!(registry.is_empty());

    // The port is free again: binding it directly succeeds.
    tokio::time::sleep(Duration::from_millis(50)).await;
    let rebound = tokio::net::UdpSocket::bind(("127.0.0.1", port)).await;
    assert!(rebound.is_ok());
}

#[tokio::test(flavor = "multi_thread")]
async fn connect_to_a_dead_address_fails_retryably() {
    init_tracing();
    // Bind-then-drop leaves a port nobody listens on.
    let probe = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let port = probe.local_addr().unwrap().port();
    drop(probe);

    let registry = Registry::new(Arc::new(TokioTransport::new()), RegistryConfig::default());
    let result = registry
        .connect(SourceKey::Tcp { address: "127.0.0.1".into(), port })
        .await;
    let error = result.expect_err("nothing is listening");
    assert!(error.is_retryable());
    assert!(registry.is_empty());
}
