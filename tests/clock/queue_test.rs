// Pending Request Queue Tests

use lamport_ledger::clock::{PendingRequestQueue, Timestamp};

#[test]
fn test_empty_queue() {
    let mut queue = PendingRequestQueue::new();

    assert!(queue.is_empty());
    assert!(queue.peek_next().is_none());
    assert!(queue.pop_next().is_none());
}

#[test]
fn test_peek_returns_earliest_request() {
    let mut queue = PendingRequestQueue::new();
    queue.add_request(Timestamp::new(7, 2), "B");
    queue.add_request(Timestamp::new(3, 3), "C");
    queue.add_request(Timestamp::new(5, 1), "A");

    let head = queue.peek_next().unwrap();
    assert_eq!(head.node(), "C");
    assert_eq!(head.timestamp(), Timestamp::new(3, 3));
    assert_eq!(queue.len(), 3);
}

#[test]
fn test_tie_broken_by_node_id() {
    let mut queue = PendingRequestQueue::new();
    queue.add_request(Timestamp::new(5, 3), "C");
    queue.add_request(Timestamp::new(5, 1), "A");

    assert!(queue.is_head("A"));
}

#[test]
fn test_pop_drains_in_order() {
    let mut queue = PendingRequestQueue::new();
    queue.add_request(Timestamp::new(4, 2), "B");
    queue.add_request(Timestamp::new(1, 3), "C");
    queue.add_request(Timestamp::new(4, 1), "A");

    let order: Vec<String> = std::iter::from_fn(|| queue.pop_next())
        .map(|e| e.node().to_string())
        .collect();

    assert_eq!(order, vec!["C", "A", "B"]);
}

#[test]
fn test_newer_request_replaces_older_one() {
    let mut queue = PendingRequestQueue::new();
    queue.add_request(Timestamp::new(2, 1), "A");
    queue.add_request(Timestamp::new(3, 2), "B");
    queue.add_request(Timestamp::new(9, 1), "A");

    assert_eq!(queue.len(), 2);
    assert!(queue.is_head("B"));
    assert_eq!(queue.entry_for("A").unwrap().timestamp(), Timestamp::new(9, 1));
}

#[test]
fn test_remove_node_from_middle() {
    let mut queue = PendingRequestQueue::new();
    queue.add_request(Timestamp::new(1, 1), "A");
    queue.add_request(Timestamp::new(2, 2), "B");
    queue.add_request(Timestamp::new(3, 3), "C");

    let removed = queue.remove_node("B").unwrap();

    assert_eq!(removed.timestamp(), Timestamp::new(2, 2));
    assert!(queue.entry_for("B").is_none());
    assert_eq!(queue.len(), 2);
    assert!(queue.remove_node("B").is_none());
}

#[test]
fn test_sorted_view() {
    let mut queue = PendingRequestQueue::new();
    queue.add_request(Timestamp::new(8, 1), "A");
    queue.add_request(Timestamp::new(2, 2), "B");

    let nodes: Vec<String> = queue
        .to_sorted_vec()
        .iter()
        .map(|e| e.node().to_string())
        .collect();
    assert_eq!(nodes, vec!["B", "A"]);
}

#[test]
fn test_request_before_ignores_excepted_node() {
    let mut queue = PendingRequestQueue::new();
    queue.add_request(Timestamp::new(1, 3), "C");
    queue.add_request(Timestamp::new(4, 2), "B");

    assert!(queue.has_request_before(Timestamp::new(4, 2), "A"));
    assert!(!queue.has_request_before(Timestamp::new(4, 2), "C"));
    assert!(!queue.has_request_before(Timestamp::new(1, 3), "A"));
}
