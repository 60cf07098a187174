// In-memory Transport Tests

use lamport_ledger::clock::Timestamp;
use lamport_ledger::sync::Message;
use lamport_ledger::transport::{MemoryNetwork, PeerLink, TransportError, TransportEvent};
use tokio::sync::mpsc;

fn drain(rx: &mut mpsc::Receiver<TransportEvent>) -> Vec<TransportEvent> {
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    events
}

fn connected(events: &[TransportEvent]) -> Vec<String> {
    events
        .iter()
        .filter_map(|e| match e {
            TransportEvent::PeerConnected { peer } => Some(peer.clone()),
            _ => None,
        })
        .collect()
}

fn received(events: &[TransportEvent]) -> Vec<Message> {
    events
        .iter()
        .filter_map(|e| match e {
            TransportEvent::MessageReceived { message } => Some(message.clone()),
            _ => None,
        })
        .collect()
}

#[tokio::test]
async fn test_join_announces_both_directions() {
    let network = MemoryNetwork::new();
    let (_a, mut rx_a) = network.join("A");
    let (_b, mut rx_b) = network.join("B");

    assert_eq!(connected(&drain(&mut rx_a)), vec!["B"]);
    assert_eq!(connected(&drain(&mut rx_b)), vec!["A"]);
    assert_eq!(network.members(), vec!["A", "B"]);
}

#[tokio::test]
async fn test_send_preserves_order() {
    let network = MemoryNetwork::new();
    let (a, _rx_a) = network.join("A");
    let (_b, mut rx_b) = network.join("B");

    for i in 1..=5 {
        a.send("B", &Message::mutex_request(Timestamp::new(i, 1), "A"))
            .await
            .unwrap();
    }

    let counters: Vec<u64> = received(&drain(&mut rx_b))
        .iter()
        .filter_map(|m| m.lamport_time())
        .map(|t| t.counter())
        .collect();
    assert_eq!(counters, vec![1, 2, 3, 4, 5]);
}

#[tokio::test]
async fn test_broadcast_reports_unknown_peer() {
    let network = MemoryNetwork::new();
    let (a, _rx_a) = network.join("A");
    let (_b, mut rx_b) = network.join("B");

    let peers = vec!["B".to_string(), "Ghost".to_string()];
    let report = a
        .broadcast(&peers, &Message::mutex_release(Timestamp::new(1, 1), "A"))
        .await;

    assert_eq!(report.delivered, vec!["B"]);
    assert_eq!(report.failed.len(), 1);
    assert!(matches!(report.failed[0].1, TransportError::PeerUnreachable(_)));
    assert!(!report.is_complete());
    assert_eq!(received(&drain(&mut rx_b)).len(), 1);
}

#[tokio::test]
async fn test_isolated_member_silently_drops_traffic() {
    let network = MemoryNetwork::new();
    let (a, mut rx_a) = network.join("A");
    let (b, mut rx_b) = network.join("B");
    drain(&mut rx_a);
    drain(&mut rx_b);

    network.isolate("B");
    a.send("B", &Message::balance_request("A", None)).await.unwrap();
    b.send("A", &Message::balance_request("B", None)).await.unwrap();

    assert!(drain(&mut rx_a).is_empty());
    assert!(drain(&mut rx_b).is_empty());

    network.heal("B");
    a.send("B", &Message::balance_request("A", None)).await.unwrap();
    assert_eq!(received(&drain(&mut rx_b)).len(), 1);
}

#[tokio::test]
async fn test_muted_member_still_receives() {
    let network = MemoryNetwork::new();
    let (a, mut rx_a) = network.join("A");
    let (b, mut rx_b) = network.join("B");
    drain(&mut rx_a);
    drain(&mut rx_b);

    network.mute("B");
    a.send("B", &Message::balance_request("A", None)).await.unwrap();
    b.send("A", &Message::balance_request("B", None)).await.unwrap();

    assert_eq!(received(&drain(&mut rx_b)).len(), 1);
    assert!(drain(&mut rx_a).is_empty());

    network.heal("B");
    b.send("A", &Message::balance_request("B", None)).await.unwrap();
    assert_eq!(received(&drain(&mut rx_a)).len(), 1);
}

#[tokio::test]
async fn test_disconnect_notifies_remaining_members() {
    let network = MemoryNetwork::new();
    let (a, mut rx_a) = network.join("A");
    let (_b, _rx_b) = network.join("B");
    drain(&mut rx_a);

    network.disconnect("B");

    let events = drain(&mut rx_a);
    assert!(matches!(
        &events[..],
        [TransportEvent::PeerDisconnected { peer, .. }] if peer == "B"
    ));
    assert!(matches!(
        a.send("B", &Message::balance_request("A", None)).await,
        Err(TransportError::PeerUnreachable(_))
    ));
    assert!(a.connected_peers().is_empty());
}

#[tokio::test]
async fn test_full_inbox_fails_send() {
    let network = MemoryNetwork::with_capacity(2);
    let (a, _rx_a) = network.join("A");
    let (_b, _rx_b) = network.join("B");

    // The join announcement already occupies one slot
    a.send("B", &Message::balance_request("A", None)).await.unwrap();
    let overflow = a.send("B", &Message::balance_request("A", None)).await;

    assert!(matches!(overflow, Err(TransportError::SendFailed(_))));
}
