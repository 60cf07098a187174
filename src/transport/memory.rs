// In-memory Transport
// Connects nodes living in the same process through channels. Used by the
// simulator and the test-suite; supports dropping or silencing a member to
// exercise failure handling.

use crate::sync::Message;
use crate::transport::{PeerLink, TransportError, TransportEvent};
use async_trait::async_trait;
use std::collections::{BTreeMap, HashSet};
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;
use tracing::debug;

/// Default event queue depth per member
pub const DEFAULT_MEMORY_CAPACITY: usize = 4096;

#[derive(Default)]
struct Members {
    inboxes: BTreeMap<String, mpsc::Sender<TransportEvent>>,
    /// Members whose traffic is silently dropped in both directions
    isolated: HashSet<String>,
    /// Members whose outgoing traffic is silently dropped
    muted: HashSet<String>,
}

/// Shared hub all in-process links attach to
#[derive(Clone)]
pub struct MemoryNetwork {
    members: Arc<Mutex<Members>>,
    capacity: usize,
}

impl Default for MemoryNetwork {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryNetwork {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_MEMORY_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            members: Arc::new(Mutex::new(Members::default())),
            capacity: capacity.max(1),
        }
    }

    /// Attach `name` to the network.
    ///
    /// Every existing member is told about the newcomer and vice versa.
    pub fn join(&self, name: &str) -> (MemoryLink, mpsc::Receiver<TransportEvent>) {
        let (tx, rx) = mpsc::channel(self.capacity);

        if let Ok(mut members) = self.members.lock() {
            for (existing, inbox) in members.inboxes.iter() {
                let _ = inbox.try_send(TransportEvent::PeerConnected {
                    peer: name.to_string(),
                });
                let _ = tx.try_send(TransportEvent::PeerConnected {
                    peer: existing.clone(),
                });
            }
            members.inboxes.insert(name.to_string(), tx);
        }

        let link = MemoryLink {
            name: name.to_string(),
            network: self.clone(),
        };
        (link, rx)
    }

    /// Detach `name`, as if its process died. Remaining members see the link drop.
    pub fn disconnect(&self, name: &str) {
        if let Ok(mut members) = self.members.lock() {
            members.inboxes.remove(name);
            members.isolated.remove(name);
            members.muted.remove(name);
            for inbox in members.inboxes.values() {
                let _ = inbox.try_send(TransportEvent::PeerDisconnected {
                    peer: name.to_string(),
                    reason: "left the network".to_string(),
                });
            }
        }
    }

    /// Keep `name` attached but drop everything sent to or by it
    pub fn isolate(&self, name: &str) {
        if let Ok(mut members) = self.members.lock() {
            members.isolated.insert(name.to_string());
        }
    }

    /// Keep delivering to `name` but drop everything it sends
    pub fn mute(&self, name: &str) {
        if let Ok(mut members) = self.members.lock() {
            members.muted.insert(name.to_string());
        }
    }

    /// Undo [`MemoryNetwork::isolate`] and [`MemoryNetwork::mute`]
    pub fn heal(&self, name: &str) {
        if let Ok(mut members) = self.members.lock() {
            members.isolated.remove(name);
            members.muted.remove(name);
        }
    }

    /// Names of every attached member
    pub fn members(&self) -> Vec<String> {
        self.members
            .lock()
            .map(|m| m.inboxes.keys().cloned().collect())
            .unwrap_or_default()
    }

    fn deliver(&self, from: &str, to: &str, message: &Message) -> Result<(), TransportError> {
        let members = self
            .members
            .lock()
            .map_err(|_| TransportError::SendFailed("network poisoned".to_string()))?;

        let inbox = members
            .inboxes
            .get(to)
            .ok_or_else(|| TransportError::PeerUnreachable(to.to_string()))?;

        if members.isolated.contains(from) || members.isolated.contains(to) || members.muted.contains(from) {
            debug!(from = %from, to = %to, kind = %message.message_type(), "dropped by isolation");
            return Ok(());
        }

        inbox
            .try_send(TransportEvent::MessageReceived {
                message: message.clone(),
            })
            .map_err(|e| TransportError::SendFailed(format!("{}: {}", to, e)))
    }
}

/// One member's handle on a [`MemoryNetwork`]
#[derive(Clone)]
pub struct MemoryLink {
    name: String,
    network: MemoryNetwork,
}

impl MemoryLink {
    pub fn name(&self) -> &str {
        &self.name
    }
}

#[async_trait]
impl PeerLink for MemoryLink {
    async fn send(&self, peer: &str, message: &Message) -> Result<(), TransportError> {
        self.network.deliver(&self.name, peer, message)
    }

    fn connected_peers(&self) -> Vec<String> {
        self.network
            .members()
            .into_iter()
            .filter(|m| *m != self.name)
            .collect()
    }
}
