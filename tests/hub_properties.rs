//! Integration tests for the hub and session contract
//!
//! These tests run real sessions against a running hub over the in-memory
//! connection adapter, so every loop, channel and timer is exercised without
//! a network.

use relay_hub::core::connection::memory::{self, MemoryPeer};
use relay_hub::core::queue::outbound_queue;
use relay_hub::prelude::*;
use std::time::Duration;
use tokio::time::timeout;

/// Helper: a running hub with a recording sink
fn start_hub() -> (HubHandle, MemorySink, Arc<dyn DiagnosticSink>) {
    let recorder = MemorySink::new();
    let sink: Arc<dyn DiagnosticSink> = Arc::new(recorder.clone());
    (Hub::spawn(sink.clone()), recorder, sink)
}

/// Helper: connect one in-memory client
async fn connect(
    hub: &HubHandle,
    sink: &Arc<dyn DiagnosticSink>,
    config: SessionConfig,
) -> (SessionHandle, MemoryPeer) {
    let (reader, writer, peer) = memory::pair(16);
    let handle = ClientSession::new(reader, writer, config, sink.clone())
        .start(hub)
        .await
        .expect("hub should admit the session");
    (handle, peer)
}

/// Helper: next envelope with a timeout
async fn recv(peer: &mut MemoryPeer) -> Envelope {
    timeout(Duration::from_secs(2), peer.recv_envelope())
        .await
        .expect("Timeout waiting for envelope")
        .expect("Connection closed")
}

/// Helper: assert nothing arrives for a short while
async fn assert_silent(peer: &mut MemoryPeer) {
    let result = timeout(Duration::from_millis(100), peer.recv_envelope()).await;
    assert!(result.is_err(), "Expected no envelope, got {:?}", result);
}

// === Tests ===

#[tokio::test]
async fn test_message_reaches_every_client_including_sender() {
    let (hub, _recorder, sink) = start_hub();
    let (_a, mut peer_a) = connect(&hub, &sink, SessionConfig::default()).await;
    let (_b, mut peer_b) = connect(&hub, &sink, SessionConfig::default()).await;

    peer_a
        .send_envelope(&Envelope::new("hello", "A"))
        .await
        .unwrap();

    for peer in [&mut peer_a, &mut peer_b] {
        let env = recv(peer).await;
        assert_eq!(env.data(), "hello");
        assert_eq!(env.name(), "A");
    }
}

#[tokio::test]
async fn test_leave_is_applied_once_when_both_loops_fail() {
    let (hub, recorder, sink) = start_hub();
    let (handle, mut peer) = connect(&hub, &sink, SessionConfig::default()).await;
    let id = handle.id();

    // Dropping the peer fails the read and the next write at the same time.
    peer.hang_up();
    drop(peer);

    timeout(Duration::from_secs(2), handle.wait())
        .await
        .expect("session should end")
        .unwrap();

    // A late duplicate leave must be a no-op.
    hub.leave(id).await.unwrap();

    let stats = hub.stats().await.unwrap();
    assert_eq!(stats.live, 0);
    assert_eq!(stats.left + stats.evicted, 1);

    let removals: Vec<_> = recorder
        .records()
        .into_iter()
        .filter(|d| {
            d.session == Some(id)
                && matches!(
                    d.event,
                    DiagnosticEvent::SessionLeft | DiagnosticEvent::SessionEvicted
                )
        })
        .collect();
    assert_eq!(removals.len(), 1);
}

#[tokio::test]
async fn test_slow_consumer_is_evicted_and_others_still_receive() {
    let (hub, recorder, sink) = start_hub();
    let (_a, mut peer_a) = connect(&hub, &sink, SessionConfig::default()).await;
    let (_c, mut peer_c) = connect(&hub, &sink, SessionConfig::default()).await;

    // A raw member whose queue nobody drains
    let slow = SessionId::new();
    let (queue, mut slow_rx) = outbound_queue(1);
    hub.join(slow, queue).await.unwrap();

    peer_a.send_envelope(&Envelope::new("one", "A")).await.unwrap();
    assert_eq!(recv(&mut peer_c).await.data(), "one");
    assert_eq!(recv(&mut peer_a).await.data(), "one");

    peer_a.send_envelope(&Envelope::new("two", "A")).await.unwrap();
    assert_eq!(recv(&mut peer_c).await.data(), "two");
    assert_eq!(recv(&mut peer_a).await.data(), "two");

    let stats = hub.stats().await.unwrap();
    assert_eq!(stats.live, 2);
    assert_eq!(stats.evicted, 1);
    assert!(recorder.contains(DiagnosticEvent::SessionEvicted));

    // The slow member keeps its buffered prefix, then sees the closure.
    assert_eq!(slow_rx.recv().await.unwrap().data(), "one");
    assert!(slow_rx.recv().await.is_none());
}

#[tokio::test]
async fn test_order_is_preserved_per_receiver() {
    let config = SessionConfig {
        queue_capacity: 16,
        ..Default::default()
    };
    let (hub, _recorder, sink) = start_hub();
    let (_a, peer_a) = connect(&hub, &sink, config.clone()).await;
    let (_b, mut peer_b) = connect(&hub, &sink, config.clone()).await;
    let (_c, mut peer_c) = connect(&hub, &sink, config).await;

    for data in ["e1", "e2", "e3"] {
        peer_a.send_envelope(&Envelope::new(data, "A")).await.unwrap();
    }

    for peer in [&mut peer_b, &mut peer_c] {
        let received = [recv(peer).await, recv(peer).await, recv(peer).await];
        let data: Vec<_> = received.iter().map(|e| e.data().to_string()).collect();
        assert_eq!(data, ["e1", "e2", "e3"]);
    }
}

#[tokio::test(start_paused = true)]
async fn test_answered_heartbeats_keep_connection_alive() {
    let (hub, recorder, sink) = start_hub();
    let config = SessionConfig::default();
    let (handle, mut peer) = connect(&hub, &sink, config.clone()).await;

    // Answer every ping like a browser would.
    let responder = tokio::spawn(async move {
        while let Some(frame) = peer.recv().await {
            if let Frame::Ping(payload) = frame {
                if peer.send(Frame::Pong(payload)).await.is_err() {
                    break;
                }
            }
        }
    });

    tokio::time::sleep(config.pong_wait() * 6).await;

    assert!(!handle.is_finished());
    assert_eq!(hub.stats().await.unwrap().live, 1);
    assert!(!recorder.contains(DiagnosticEvent::HeartbeatTimeout));
    responder.abort();
}

#[tokio::test]
async fn test_malformed_frame_does_not_end_session() {
    let (hub, recorder, sink) = start_hub();
    let (handle, mut peer_a) = connect(&hub, &sink, SessionConfig::default()).await;
    let (_b, mut peer_b) = connect(&hub, &sink, SessionConfig::default()).await;

    peer_a.send(Frame::Text("{not json".into())).await.unwrap();
    peer_a
        .send(Frame::Binary(b"\x00\x01\x02".to_vec()))
        .await
        .unwrap();
    peer_a
        .send_envelope(&Envelope::new("still here", "A"))
        .await
        .unwrap();

    assert_eq!(recv(&mut peer_b).await.data(), "still here");
    assert_eq!(recv(&mut peer_a).await.data(), "still here");
    assert!(!handle.is_finished());
    assert_eq!(recorder.count(DiagnosticEvent::MalformedEnvelope), 2);
}

#[tokio::test]
async fn test_join_evict_and_late_join_scenario() {
    let (hub, _recorder, sink) = start_hub();
    let (_a, mut peer_a) = connect(&hub, &sink, SessionConfig::default()).await;
    let (_c, mut peer_c) = connect(&hub, &sink, SessionConfig::default()).await;

    // B never drains its queue.
    let b = SessionId::new();
    let (queue, mut b_rx) = outbound_queue(1);
    hub.join(b, queue).await.unwrap();

    peer_a.send_envelope(&Envelope::new("hi", "A")).await.unwrap();
    let env = recv(&mut peer_c).await;
    assert_eq!((env.data(), env.name()), ("hi", "A"));
    assert!(env.timestamp().is_none());
    recv(&mut peer_a).await;

    peer_a
        .send_envelope(&Envelope::new("second", "A"))
        .await
        .unwrap();
    assert_eq!(recv(&mut peer_c).await.data(), "second");
    recv(&mut peer_a).await;

    // B got exactly the first message, then was removed.
    assert_eq!(b_rx.recv().await.unwrap().data(), "hi");
    assert!(b_rx.recv().await.is_none());
    assert_eq!(hub.stats().await.unwrap().live, 2);

    // D joins late and only sees what comes after.
    let (_d, mut peer_d) = connect(&hub, &sink, SessionConfig::default()).await;
    assert_eq!(hub.stats().await.unwrap().live, 3);
    assert_silent(&mut peer_d).await;

    peer_a
        .send_envelope(&Envelope::new("third", "A"))
        .await
        .unwrap();
    assert_eq!(recv(&mut peer_d).await.data(), "third");
    assert_eq!(recv(&mut peer_c).await.data(), "third");
}

#[tokio::test]
async fn test_arrival_stamping() {
    let config = SessionConfig {
        stamp_arrival: true,
        ..Default::default()
    };
    let (hub, _recorder, sink) = start_hub();
    let (_a, mut peer_a) = connect(&hub, &sink, config).await;

    peer_a
        .send_envelope(&Envelope::new("no clock", "A"))
        .await
        .unwrap();
    assert!(recv(&mut peer_a).await.timestamp().is_some());
}

#[tokio::test]
async fn test_hub_stops_when_last_handle_drops() {
    let recorder = MemorySink::new();
    let sink: Arc<dyn DiagnosticSink> = Arc::new(recorder.clone());
    let (hub, handle) = Hub::new(sink.clone());
    let hub_task = tokio::spawn(hub.run());

    let (session, mut peer) = connect(&handle, &sink, SessionConfig::default()).await;
    drop(handle);

    // The session still holds a handle through its inbound loop, so the hub
    // keeps running until the peer goes away.
    peer.hang_up();
    timeout(Duration::from_secs(2), session.wait())
        .await
        .expect("session should end")
        .unwrap();
    timeout(Duration::from_secs(2), hub_task)
        .await
        .expect("hub should stop once no handle is left")
        .unwrap();

    assert!(recorder.contains(DiagnosticEvent::HubStopped));
}
