// Mutex Coordinator - Lamport distributed mutual exclusion
//
// Sans-IO state machine: every method consumes an input (a local call or an
// inbound protocol message) and returns the messages to put on the wire. The
// owner is responsible for delivering them and for serializing calls.
//
// Acks double as permission: a node acknowledges a request only while it is
// the head of the local queue and never while holding the mutex itself.
// Requests that are not at the head are answered later, when the entries
// ahead of them are released or dropped.

use crate::clock::{LogicalClock, NodeId, PendingRequestQueue, Timestamp};
use crate::sync::Message;
use std::collections::{BTreeSet, HashSet};
use thiserror::Error;

/// Mutex-related errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum MutexError {
    #[error("A mutex request is already outstanding")]
    AlreadyRequesting,

    #[error("Mutex is not held")]
    NotHeld,
}

/// Where this node stands in the request/ack/release cycle
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MutexPhase {
    Idle,
    Requesting,
    Held,
}

/// A message the coordinator wants delivered
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Outbound {
    /// Deliver to one peer
    Send { to: String, message: Message },
    /// Deliver to every live peer
    Broadcast(Message),
}

impl Outbound {
    pub fn message(&self) -> &Message {
        match self {
            Outbound::Send { message, .. } => message,
            Outbound::Broadcast(message) => message,
        }
    }
}

/// Per-node mutual exclusion state
#[derive(Clone, Debug)]
pub struct MutexCoordinator {
    name: String,
    clock: LogicalClock,
    queue: PendingRequestQueue,
    phase: MutexPhase,
    /// Timestamp of our outstanding request
    own_request: Option<Timestamp>,
    /// Peers whose ack we still wait for
    awaiting: BTreeSet<String>,
    pending_acks: usize,
    expected_acks: usize,
    /// Requesters whose current request we already acknowledged
    acked: HashSet<String>,
}

impl MutexCoordinator {
    pub fn new(name: impl Into<String>, node_id: NodeId) -> Self {
        Self {
            name: name.into(),
            clock: LogicalClock::new(node_id),
            queue: PendingRequestQueue::new(),
            phase: MutexPhase::Idle,
            own_request: None,
            awaiting: BTreeSet::new(),
            pending_acks: 0,
            expected_acks: 0,
            acked: HashSet::new(),
        }
    }

    // ========================================================================
    // LOCAL TRANSITIONS
    // ========================================================================

    /// IDLE -> REQUESTING.
    ///
    /// Queues our own request and broadcasts it. `live_peers` fixes how many
    /// acks are expected; with no live peers the mutex is taken immediately.
    pub fn request_mutex<I>(&mut self, live_peers: I) -> Result<Vec<Outbound>, MutexError>
    where
        I: IntoIterator<Item = String>,
    {
        if self.phase != MutexPhase::Idle {
            return Err(MutexError::AlreadyRequesting);
        }

        let ts = self.clock.tick();
        self.queue.add_request(ts, &self.name);
        self.own_request = Some(ts);
        self.awaiting = live_peers.into_iter().filter(|p| *p != self.name).collect();
        self.pending_acks = 0;
        self.expected_acks = self.awaiting.len();
        self.phase = MutexPhase::Requesting;

        if self.awaiting.is_empty() {
            self.phase = MutexPhase::Held;
        }

        Ok(vec![Outbound::Broadcast(Message::mutex_request(ts, &self.name))])
    }

    /// HELD -> RELEASING -> IDLE.
    ///
    /// Retires our request, broadcasts the release and answers whichever
    /// request is now at the head of the queue.
    pub fn release_mutex(&mut self) -> Result<Vec<Outbound>, MutexError> {
        if self.phase != MutexPhase::Held {
            return Err(MutexError::NotHeld);
        }

        self.phase = MutexPhase::Idle;
        let ts = self.clock.tick();
        self.queue.remove_node(&self.name);
        self.own_request = None;
        self.awaiting.clear();

        let mut out = vec![Outbound::Broadcast(Message::mutex_release(ts, &self.name))];
        out.extend(self.grant_head());
        Ok(out)
    }

    /// Withdraw an outstanding request, or leave the mutex if held.
    ///
    /// Used on shutdown so peers stop deferring behind an entry that will
    /// never be released.
    pub fn abandon_request(&mut self) -> Vec<Outbound> {
        match self.phase {
            MutexPhase::Idle => Vec::new(),
            MutexPhase::Held => self.release_mutex().unwrap_or_default(),
            MutexPhase::Requesting => {
                self.phase = MutexPhase::Held;
                self.release_mutex().unwrap_or_default()
            }
        }
    }

    /// Tick the clock for a local send and return the timestamp to stamp it with
    pub fn stamp(&mut self) -> Timestamp {
        self.clock.tick()
    }

    /// Merge the timestamp of a message that is not part of the mutex protocol
    pub fn observe(&mut self, ts: Timestamp) {
        self.clock.observe(ts);
    }

    // ========================================================================
    // INBOUND PROTOCOL MESSAGES
    // ========================================================================

    /// A peer asks for the mutex
    pub fn on_request(&mut self, ts: Timestamp, sender: &str) -> Vec<Outbound> {
        if sender == self.name {
            return Vec::new();
        }

        self.queue.add_request(ts, sender);
        self.acked.remove(sender);
        self.clock.observe(ts);
        self.grant_head()
    }

    /// A peer acknowledged our request. Returns true when this ack completes
    /// the set and the mutex is now held.
    pub fn on_ack(&mut self, ts: Timestamp, sender: &str) -> bool {
        self.clock.observe(ts);

        if self.phase != MutexPhase::Requesting || !self.awaiting.remove(sender) {
            return false;
        }

        self.pending_acks += 1;
        self.try_acquire()
    }

    /// A peer left the critical section
    pub fn on_release(&mut self, ts: Timestamp, sender: &str) -> Vec<Outbound> {
        self.clock.observe(ts);
        self.queue.remove_node(sender);
        self.acked.remove(sender);
        self.grant_head()
    }

    /// Forget a peer that left the live set.
    ///
    /// Its queued request is discarded and it no longer counts toward
    /// `expected_acks`; this may complete our own request.
    pub fn drop_peer(&mut self, peer: &str) -> Vec<Outbound> {
        self.queue.remove_node(peer);
        self.acked.remove(peer);

        if self.phase == MutexPhase::Requesting && self.awaiting.remove(peer) {
            self.expected_acks = self.expected_acks.saturating_sub(1);
            self.try_acquire();
        }

        self.grant_head()
    }

    /// The outbound link to `peer` came up.
    ///
    /// An ack granted to it while the link was down never left this node, so
    /// the head is answered again if it is `peer`. `on_ack` ignores duplicates.
    pub fn on_peer_connected(&mut self, peer: &str) -> Vec<Outbound> {
        self.acked.remove(peer);
        self.grant_head()
    }

    fn try_acquire(&mut self) -> bool {
        if self.phase == MutexPhase::Requesting && self.awaiting.is_empty() {
            self.phase = MutexPhase::Held;
            return true;
        }
        false
    }

    /// Ack the head of the queue if it belongs to a peer we have not answered
    fn grant_head(&mut self) -> Vec<Outbound> {
        if self.phase == MutexPhase::Held {
            return Vec::new();
        }

        let head = match self.queue.peek_next() {
            Some(entry) if entry.node() != self.name && !self.acked.contains(entry.node()) => {
                entry.node().to_string()
            }
            _ => return Vec::new(),
        };

        let ts = self.clock.tick();
        self.acked.insert(head.clone());
        vec![Outbound::Send {
            to: head,
            message: Message::mutex_ack(ts, &self.name),
        }]
    }

    // ========================================================================
    // ACCESSORS
    // ========================================================================

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn phase(&self) -> MutexPhase {
        self.phase
    }

    pub fn is_held(&self) -> bool {
        self.phase == MutexPhase::Held
    }

    pub fn is_requesting(&self) -> bool {
        self.phase == MutexPhase::Requesting
    }

    pub fn pending_acks(&self) -> usize {
        self.pending_acks
    }

    pub fn expected_acks(&self) -> usize {
        self.expected_acks
    }

    /// Peers that have not acknowledged the outstanding request
    pub fn awaiting(&self) -> impl Iterator<Item = &str> {
        self.awaiting.iter().map(String::as_str)
    }

    pub fn own_request(&self) -> Option<Timestamp> {
        self.own_request
    }

    pub fn clock(&self) -> &LogicalClock {
        &self.clock
    }

    pub fn queue(&self) -> &PendingRequestQueue {
        &self.queue
    }

    /// Whether our ack for `peer`'s current request has been sent
    pub fn has_acked(&self, peer: &str) -> bool {
        self.acked.contains(peer)
    }
}
