// Shared helpers for node tests

use async_trait::async_trait;
use lamport_ledger::node::{spawn_memory_node, Node, NodeConfig, NodeHandle, NodeSnapshot, PeerDescriptor};
use lamport_ledger::sync::{Message, MessageType};
use lamport_ledger::transport::{MemoryNetwork, PeerLink, TransportError, TransportEvent};
use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{sleep, Instant};

pub const WAIT: Duration = Duration::from_secs(10);

/// Config for `name` in a cluster of `members`, ids by position
pub fn config_for(name: &str, members: &[&str]) -> NodeConfig {
    let id = members.iter().position(|m| *m == name).unwrap() as u32 + 1;
    let peers = members
        .iter()
        .filter(|m| **m != name)
        .map(|m| PeerDescriptor::new(m, "127.0.0.1", 0))
        .collect();
    NodeConfig::new(name, id)
        .with_peers(peers)
        .with_ack_timeout_ms(500)
        .with_query_timeout_ms(500)
}

/// Poll `handle` until `pred` holds for its snapshot
pub async fn wait_for(
    handle: &NodeHandle,
    what: &str,
    pred: impl Fn(&NodeSnapshot) -> bool,
) -> NodeSnapshot {
    let deadline = Instant::now() + WAIT;
    loop {
        let snapshot = handle.snapshot().await.expect("node stopped");
        if pred(&snapshot) {
            return snapshot;
        }
        assert!(
            Instant::now() < deadline,
            "{}: timed out waiting for {} (last: {:?})",
            handle.name(),
            what,
            snapshot
        );
        sleep(Duration::from_millis(20)).await;
    }
}

pub struct MemoryCluster {
    pub network: MemoryNetwork,
    pub handles: Vec<NodeHandle>,
    pub tasks: Vec<JoinHandle<()>>,
}

impl MemoryCluster {
    /// Start one node per name and wait until every link is up
    pub async fn start(members: &[&str]) -> Self {
        Self::start_with(members, |config| config).await
    }

    pub async fn start_with(members: &[&str], tweak: impl Fn(NodeConfig) -> NodeConfig) -> Self {
        let network = MemoryNetwork::new();
        let mut handles = Vec::new();
        let mut tasks = Vec::new();

        for name in members {
            let config = tweak(config_for(name, members));
            let (handle, task) = spawn_memory_node(&network, config).unwrap();
            handles.push(handle);
            tasks.push(task);
        }

        let cluster = Self {
            network,
            handles,
            tasks,
        };
        let expected = members.len() - 1;
        for handle in &cluster.handles {
            wait_for(handle, "all links", |s| s.live_peers.len() == expected).await;
        }
        cluster
    }

    pub fn node(&self, name: &str) -> &NodeHandle {
        self.handles
            .iter()
            .find(|h| h.name() == name)
            .unwrap_or_else(|| panic!("no node {}", name))
    }

    /// Wait until every node holds `blocks` blocks, then return each chain
    pub async fn settled_chains(&self, blocks: usize) -> Vec<Vec<lamport_ledger::ledger::Block>> {
        let mut chains = Vec::new();
        for handle in &self.handles {
            wait_for(handle, "replays", |s| s.chain_len == blocks).await;
            chains.push(handle.chain().await.unwrap());
        }
        chains
    }

    pub async fn shutdown(self) {
        for handle in &self.handles {
            let _ = handle.shutdown().await;
        }
        for task in self.tasks {
            let _ = task.await;
        }
    }
}

/// Poll a plain condition until it holds
pub async fn wait_until(what: &str, check: impl Fn() -> bool) {
    let deadline = Instant::now() + WAIT;
    while !check() {
        assert!(Instant::now() < deadline, "timed out waiting for {}", what);
        sleep(Duration::from_millis(10)).await;
    }
}

// ============================================================================
// SCRIPTED NODE
// ============================================================================

/// Link that records outgoing messages. Sends fail until a peer is brought up.
#[derive(Default)]
pub struct RecordingLink {
    up: Mutex<HashSet<String>>,
    sent: Mutex<Vec<(String, Message)>>,
}

impl RecordingLink {
    pub fn bring_up(&self, peer: &str) {
        self.up.lock().unwrap().insert(peer.to_string());
    }

    /// How many messages of `kind` went to `peer`
    pub fn sent_to(&self, peer: &str, kind: MessageType) -> usize {
        self.sent
            .lock()
            .unwrap()
            .iter()
            .filter(|(to, message)| to == peer && message.message_type() == kind)
            .count()
    }
}

#[async_trait]
impl PeerLink for RecordingLink {
    async fn send(&self, peer: &str, message: &Message) -> Result<(), TransportError> {
        if !self.up.lock().unwrap().contains(peer) {
            return Err(TransportError::PeerUnreachable(peer.to_string()));
        }
        self.sent.lock().unwrap().push((peer.to_string(), message.clone()));
        Ok(())
    }

    fn connected_peers(&self) -> Vec<String> {
        self.up.lock().unwrap().iter().cloned().collect()
    }
}

/// A single node whose transport events are fed in by the test
pub struct ScriptedNode {
    pub handle: NodeHandle,
    pub link: Arc<RecordingLink>,
    events: mpsc::Sender<TransportEvent>,
    task: JoinHandle<()>,
}

impl ScriptedNode {
    pub fn start(name: &str, members: &[&str]) -> Self {
        let link = Arc::new(RecordingLink::default());
        let (events, rx) = mpsc::channel(64);
        let (node, handle) = Node::new(config_for(name, members), link.clone(), rx).unwrap();
        Self {
            handle,
            link,
            events,
            task: tokio::spawn(node.run()),
        }
    }

    /// Bring the link to `peer` up and tell the node
    pub async fn connect(&self, peer: &str) {
        self.link.bring_up(peer);
        self.events
            .send(TransportEvent::PeerConnected {
                peer: peer.to_string(),
            })
            .await
            .unwrap();
    }

    pub async fn deliver(&self, message: Message) {
        self.events
            .send(TransportEvent::MessageReceived { message })
            .await
            .unwrap();
    }

    pub async fn stop(self) {
        self.handle.shutdown().await.unwrap();
        self.task.await.unwrap();
    }
}
