// Pending Request Queue - Locally perceived order of mutex requests
//
// A min-heap keyed by Lamport timestamp. Holds at most one entry per
// requesting node; a newer request from the same node replaces the older one.

use crate::clock::lamport::Timestamp;
use serde::{Deserialize, Serialize};
use std::cmp::Reverse;
use std::collections::BinaryHeap;

/// One outstanding mutex request
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct QueueEntry {
    timestamp: Timestamp,
    node: String,
}

impl QueueEntry {
    pub fn new(timestamp: Timestamp, node: impl Into<String>) -> Self {
        Self {
            timestamp,
            node: node.into(),
        }
    }

    pub fn timestamp(&self) -> Timestamp {
        self.timestamp
    }

    /// Name of the node that issued the request
    pub fn node(&self) -> &str {
        &self.node
    }
}

/// Min-heap of outstanding requests ordered by timestamp
#[derive(Clone, Debug, Default)]
pub struct PendingRequestQueue {
    heap: BinaryHeap<Reverse<QueueEntry>>,
}

impl PendingRequestQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a request, retiring any earlier request from the same node
    pub fn add_request(&mut self, timestamp: Timestamp, node: &str) {
        self.remove_node(node);
        self.heap.push(Reverse(QueueEntry::new(timestamp, node)));
    }

    /// Minimum entry without removing it
    pub fn peek_next(&self) -> Option<&QueueEntry> {
        self.heap.peek().map(|Reverse(entry)| entry)
    }

    /// Remove and return the minimum entry
    pub fn pop_next(&mut self) -> Option<QueueEntry> {
        self.heap.pop().map(|Reverse(entry)| entry)
    }

    /// Drop the entry belonging to `node`, wherever it sits in the heap
    pub fn remove_node(&mut self, node: &str) -> Option<QueueEntry> {
        let existing = self.entry_for(node).cloned()?;
        self.heap.retain(|Reverse(entry)| entry.node != node);
        Some(existing)
    }

    /// Entry currently held for `node`, if any
    pub fn entry_for(&self, node: &str) -> Option<&QueueEntry> {
        self.heap
            .iter()
            .map(|Reverse(entry)| entry)
            .find(|entry| entry.node == node)
    }

    /// Whether `node` is at the head of the queue
    pub fn is_head(&self, node: &str) -> bool {
        self.peek_next().is_some_and(|entry| entry.node == node)
    }

    /// Whether a node other than `except` has a request ordered before `timestamp`
    pub fn has_request_before(&self, timestamp: Timestamp, except: &str) -> bool {
        self.heap
            .iter()
            .any(|Reverse(entry)| entry.node != except && entry.timestamp < timestamp)
    }

    pub fn len(&self) -> usize {
        self.heap.len()
    }

    pub fn is_empty(&self) -> bool {
        self.heap.is_empty()
    }

    /// Entries in timestamp order
    pub fn to_sorted_vec(&self) -> Vec<QueueEntry> {
        let mut entries: Vec<QueueEntry> =
            self.heap.iter().map(|Reverse(entry)| entry.clone()).collect();
        entries.sort();
        entries
    }
}
