// Lamport Clock - Totally ordered logical time
//
// Each node ticks its own counter on local events and fast-forwards it when a
// message carrying a later timestamp arrives. Ties between equal counters are
// broken by the node id, which turns the partial happened-before order into a
// strict total order shared by every participant.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Stable numeric identifier of a participant, unique across the cluster
pub type NodeId = u32;

/// A `(counter, node_id)` pair
///
/// Ordering compares the counter first and the node id second, so two
/// timestamps produced by different nodes are never equal.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(from = "(u64, NodeId)", into = "(u64, NodeId)")]
pub struct Timestamp {
    counter: u64,
    node_id: NodeId,
}

impl Timestamp {
    pub fn new(counter: u64, node_id: NodeId) -> Self {
        Self { counter, node_id }
    }

    /// Logical counter component
    pub fn counter(&self) -> u64 {
        self.counter
    }

    /// Node id component (tie breaker)
    pub fn node_id(&self) -> NodeId {
        self.node_id
    }
}

impl From<(u64, NodeId)> for Timestamp {
    fn from((counter, node_id): (u64, NodeId)) -> Self {
        Self { counter, node_id }
    }
}

impl From<Timestamp> for (u64, NodeId) {
    fn from(ts: Timestamp) -> Self {
        (ts.counter, ts.node_id)
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {})", self.counter, self.node_id)
    }
}

/// Scalar Lamport clock bound to one node
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LogicalClock {
    counter: u64,
    node_id: NodeId,
}

impl LogicalClock {
    /// Create a clock starting at zero
    pub fn new(node_id: NodeId) -> Self {
        Self { counter: 0, node_id }
    }

    /// Tick for a local event
    pub fn increment(&mut self) {
        self.counter = self.counter.saturating_add(1);
    }

    /// Merge a timestamp carried by an inbound message.
    ///
    /// The counter only moves forward when the received pair sorts after the
    /// local one, and is then bumped unconditionally, so the local time ends
    /// up strictly greater than both.
    pub fn sync(&mut self, received_counter: u64, received_node_id: NodeId) {
        if (received_counter, received_node_id) > (self.counter, self.node_id) {
            self.counter = received_counter;
        }
        self.increment();
    }

    /// Merge a received [`Timestamp`]
    pub fn observe(&mut self, ts: Timestamp) {
        self.sync(ts.counter, ts.node_id);
    }

    /// Current `(counter, node_id)`
    pub fn get_time(&self) -> Timestamp {
        Timestamp::new(self.counter, self.node_id)
    }

    /// Increment and return the new time
    pub fn tick(&mut self) -> Timestamp {
        self.increment();
        self.get_time()
    }

    pub fn counter(&self) -> u64 {
        self.counter
    }

    pub fn node_id(&self) -> NodeId {
        self.node_id
    }
}
