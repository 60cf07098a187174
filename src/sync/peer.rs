// Peer Management - Track configured peers and which of them are live
//
// The live set decides how many acknowledgements a mutex request waits for.
// A peer leaves it when its link drops, a send to it fails, or it misses too
// many ack deadlines; it comes back when the link is re-established or, for
// an unresponsive peer, as soon as it is heard from again.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::{SystemTime, UNIX_EPOCH};
use thiserror::Error;

/// Peer-related errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PeerError {
    #[error("Cannot add self as a peer")]
    CannotAddSelf,

    #[error("Peer not found: {0}")]
    PeerNotFound(String),
}

/// State of a peer link
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum PeerState {
    /// Configured, never connected
    Unknown,
    /// Outbound link is up and the peer answers
    Connected,
    /// Outbound link is down
    Disconnected,
    /// Link is up but the peer stopped answering mutex requests
    Unresponsive,
}

impl PeerState {
    /// Whether the peer counts toward expected acknowledgements
    pub fn is_live(&self) -> bool {
        matches!(self, PeerState::Connected)
    }

    /// Whether the outbound link is up, counted or not
    pub fn is_reachable(&self) -> bool {
        matches!(self, PeerState::Connected | PeerState::Unresponsive)
    }
}

/// Statistics about a peer registry
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PeerStats {
    pub total_peers: usize,
    pub connected_peers: usize,
    pub disconnected_peers: usize,
    pub unresponsive_peers: usize,
}

fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

/// Information about a configured peer
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PeerInfo {
    name: String,
    /// `host:port` of the peer's listener
    address: Option<String>,
    state: PeerState,
    /// Last time we heard from this peer (unix timestamp ms)
    last_seen: Option<u64>,
    /// Consecutive ack deadlines missed
    missed_deadlines: u32,
}

impl PeerInfo {
    pub fn new(name: impl Into<String>, address: Option<String>) -> Self {
        Self {
            name: name.into(),
            address,
            state: PeerState::Unknown,
            last_seen: None,
            missed_deadlines: 0,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn address(&self) -> Option<&str> {
        self.address.as_deref()
    }

    pub fn state(&self) -> PeerState {
        self.state
    }

    pub fn set_state(&mut self, state: PeerState) {
        self.state = state;
        if state == PeerState::Connected {
            self.missed_deadlines = 0;
        }
    }

    pub fn last_seen(&self) -> Option<u64> {
        self.last_seen
    }

    pub fn touch(&mut self) {
        self.last_seen = Some(now_millis());
    }

    pub fn missed_deadlines(&self) -> u32 {
        self.missed_deadlines
    }
}

/// Registry of configured peers
#[derive(Clone, Debug)]
pub struct PeerRegistry {
    my_name: String,
    peers: BTreeMap<String, PeerInfo>,
}

impl PeerRegistry {
    pub fn new(my_name: impl Into<String>) -> Self {
        Self {
            my_name: my_name.into(),
            peers: BTreeMap::new(),
        }
    }

    /// Register a peer (idempotent)
    pub fn add_peer(&mut self, name: &str, address: Option<String>) -> Result<(), PeerError> {
        if name == self.my_name {
            return Err(PeerError::CannotAddSelf);
        }
        self.peers
            .entry(name.to_string())
            .or_insert_with(|| PeerInfo::new(name, address));
        Ok(())
    }

    pub fn get_peer(&self, name: &str) -> Option<&PeerInfo> {
        self.peers.get(name)
    }

    pub fn has_peer(&self, name: &str) -> bool {
        self.peers.contains_key(name)
    }

    pub fn peer_count(&self) -> usize {
        self.peers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.peers.is_empty()
    }

    pub fn peers(&self) -> impl Iterator<Item = &PeerInfo> {
        self.peers.values()
    }

    /// The link to `name` came up. Returns whether the peer was not live before.
    pub fn mark_connected(&mut self, name: &str) -> bool {
        if name == self.my_name {
            return false;
        }
        let peer = self
            .peers
            .entry(name.to_string())
            .or_insert_with(|| PeerInfo::new(name, None));
        let was_live = peer.state.is_live();
        peer.set_state(PeerState::Connected);
        peer.touch();
        !was_live
    }

    /// The link to `name` went down. Returns whether the peer was live before.
    pub fn mark_disconnected(&mut self, name: &str) -> bool {
        self.set_not_live(name, PeerState::Disconnected)
    }

    /// Stop counting `name` toward expected acks. Returns whether it was live.
    pub fn demote(&mut self, name: &str) -> bool {
        self.set_not_live(name, PeerState::Unresponsive)
    }

    fn set_not_live(&mut self, name: &str, state: PeerState) -> bool {
        match self.peers.get_mut(name) {
            Some(peer) => {
                let was_live = peer.state.is_live();
                peer.set_state(state);
                was_live
            }
            None => false,
        }
    }

    /// Count one missed ack deadline, returning the running total
    pub fn record_missed(&mut self, name: &str) -> Result<u32, PeerError> {
        let peer = self
            .peers
            .get_mut(name)
            .ok_or_else(|| PeerError::PeerNotFound(name.to_string()))?;
        peer.missed_deadlines = peer.missed_deadlines.saturating_add(1);
        Ok(peer.missed_deadlines)
    }

    /// Note a message from `name`.
    ///
    /// Clears missed deadlines and re-admits an unresponsive peer. Returns
    /// whether the peer was re-admitted to the live set.
    pub fn record_activity(&mut self, name: &str) -> bool {
        let Some(peer) = self.peers.get_mut(name) else {
            return false;
        };
        peer.touch();
        peer.missed_deadlines = 0;
        if peer.state == PeerState::Unresponsive {
            peer.set_state(PeerState::Connected);
            return true;
        }
        false
    }

    pub fn is_live(&self, name: &str) -> bool {
        self.peers.get(name).is_some_and(|p| p.state.is_live())
    }

    /// Names of every live peer, sorted
    pub fn live_peers(&self) -> Vec<String> {
        self.peers
            .values()
            .filter(|p| p.state.is_live())
            .map(|p| p.name.clone())
            .collect()
    }

    /// Names of every peer with an open link, demoted ones included, sorted
    pub fn reachable_peers(&self) -> Vec<String> {
        self.peers
            .values()
            .filter(|p| p.state.is_reachable())
            .map(|p| p.name.clone())
            .collect()
    }

    pub fn stats(&self) -> PeerStats {
        let mut stats = PeerStats {
            total_peers: self.peers.len(),
            ..PeerStats::default()
        };
        for peer in self.peers.values() {
            match peer.state {
                PeerState::Connected => stats.connected_peers += 1,
                PeerState::Disconnected => stats.disconnected_peers += 1,
                PeerState::Unresponsive => stats.unresponsive_peers += 1,
                PeerState::Unknown => {}
            }
        }
        stats
    }
}
