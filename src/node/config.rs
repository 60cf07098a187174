// Node Configuration
// Static cluster membership loaded at startup, and per-node tuning knobs

use crate::clock::NodeId;
use crate::transport::TcpTransportConfig;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

/// Configuration errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Failed to read config: {0}")]
    Io(String),

    #[error("Failed to parse config: {0}")]
    Parse(String),

    #[error("Cluster has no members")]
    Empty,

    #[error("Duplicate member name: {0}")]
    DuplicateName(String),

    #[error("Duplicate node id: {0}")]
    DuplicateId(NodeId),

    #[error("Unknown member: {0}")]
    UnknownMember(String),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

// ============================================================================
// PEER DESCRIPTOR
// ============================================================================

/// One participant as listed in the cluster file
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PeerDescriptor {
    pub name: String,
    #[serde(alias = "ip")]
    pub host: String,
    pub port: u16,
    /// Tie-breaking id; defaults to the 1-based position in the cluster file
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<NodeId>,
}

impl PeerDescriptor {
    pub fn new(name: &str, host: &str, port: u16) -> Self {
        Self {
            name: name.to_string(),
            host: host.to_string(),
            port,
            id: None,
        }
    }

    pub fn with_id(mut self, id: NodeId) -> Self {
        self.id = Some(id);
        self
    }

    /// `host:port`
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

// ============================================================================
// CLUSTER CONFIG
// ============================================================================

/// The fixed set of participants
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ClusterConfig {
    members: Vec<PeerDescriptor>,
}

impl ClusterConfig {
    /// Build from descriptors, resolving default ids and checking uniqueness
    pub fn from_members(mut members: Vec<PeerDescriptor>) -> Result<Self, ConfigError> {
        if members.is_empty() {
            return Err(ConfigError::Empty);
        }

        let mut names = HashSet::new();
        let mut ids = HashSet::new();
        for (index, member) in members.iter_mut().enumerate() {
            if member.name.is_empty() {
                return Err(ConfigError::Invalid("member name cannot be empty".to_string()));
            }
            if !names.insert(member.name.clone()) {
                return Err(ConfigError::DuplicateName(member.name.clone()));
            }
            let id = *member.id.get_or_insert(index as NodeId + 1);
            if !ids.insert(id) {
                return Err(ConfigError::DuplicateId(id));
            }
        }

        Ok(Self { members })
    }

    /// Parse a JSON array of `{name, host|ip, port, id?}`
    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        let members: Vec<PeerDescriptor> =
            serde_json::from_str(json).map_err(|e| ConfigError::Parse(e.to_string()))?;
        Self::from_members(members)
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::Io(format!("{}: {}", path.display(), e)))?;
        Self::from_json_str(&json)
    }

    pub fn members(&self) -> &[PeerDescriptor] {
        &self.members
    }

    pub fn member(&self, name: &str) -> Option<&PeerDescriptor> {
        self.members.iter().find(|m| m.name == name)
    }

    /// Configuration for `name`, with every other member as a peer
    pub fn node_config(&self, name: &str) -> Result<NodeConfig, ConfigError> {
        let me = self
            .member(name)
            .ok_or_else(|| ConfigError::UnknownMember(name.to_string()))?;
        let id = me.id.ok_or_else(|| ConfigError::Invalid(format!("{} has no id", name)))?;

        let peers = self
            .members
            .iter()
            .filter(|m| m.name != name)
            .cloned()
            .collect();

        Ok(NodeConfig::new(name, id)
            .with_listen(&me.host, me.port)
            .with_peers(peers))
    }
}

// ============================================================================
// NODE CONFIG
// ============================================================================

/// Configuration for a single node
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeConfig {
    /// Account and peer name of this node
    pub name: String,
    /// Lamport tie-breaker, unique in the cluster
    pub id: NodeId,
    /// Listen host
    pub host: String,
    /// Listen port (0 for random)
    pub port: u16,
    /// Every other participant
    pub peers: Vec<PeerDescriptor>,
    /// Opening balance of every known account
    pub initial_balance: u64,
    /// How long a mutex request waits before silent peers get a strike
    pub ack_timeout_ms: u64,
    /// Strikes before a silent peer is dropped from the live set
    pub max_missed_acks: u32,
    /// Dial timeout
    pub connect_timeout_ms: u64,
    /// Pause between redials
    pub reconnect_delay_ms: u64,
    /// Depth of the command and event queues
    pub channel_capacity: usize,
    /// How long a remote balance query may take
    pub query_timeout_ms: u64,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            name: String::new(),
            id: 0,
            host: "127.0.0.1".to_string(),
            port: 0,
            peers: Vec::new(),
            initial_balance: 10,
            ack_timeout_ms: 2000,
            max_missed_acks: 3,
            connect_timeout_ms: 1000,
            reconnect_delay_ms: 500,
            channel_capacity: 1024,
            query_timeout_ms: 2000,
        }
    }
}

impl NodeConfig {
    pub fn new(name: &str, id: NodeId) -> Self {
        Self {
            name: name.to_string(),
            id,
            ..Self::default()
        }
    }

    pub fn with_listen(mut self, host: &str, port: u16) -> Self {
        self.host = host.to_string();
        self.port = port;
        self
    }

    pub fn with_peers(mut self, peers: Vec<PeerDescriptor>) -> Self {
        self.peers = peers;
        self
    }

    pub fn with_peer(mut self, peer: PeerDescriptor) -> Self {
        self.peers.push(peer);
        self
    }

    pub fn with_initial_balance(mut self, amount: u64) -> Self {
        self.initial_balance = amount;
        self
    }

    pub fn with_ack_timeout_ms(mut self, ms: u64) -> Self {
        self.ack_timeout_ms = ms;
        self
    }

    pub fn with_max_missed_acks(mut self, strikes: u32) -> Self {
        self.max_missed_acks = strikes;
        self
    }

    pub fn with_connect_timeout_ms(mut self, ms: u64) -> Self {
        self.connect_timeout_ms = ms;
        self
    }

    pub fn with_reconnect_delay_ms(mut self, ms: u64) -> Self {
        self.reconnect_delay_ms = ms;
        self
    }

    pub fn with_channel_capacity(mut self, capacity: usize) -> Self {
        self.channel_capacity = capacity;
        self
    }

    pub fn with_query_timeout_ms(mut self, ms: u64) -> Self {
        self.query_timeout_ms = ms;
        self
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.name.is_empty() {
            return Err(ConfigError::Invalid("name cannot be empty".to_string()));
        }
        if self.ack_timeout_ms == 0 || self.connect_timeout_ms == 0 || self.query_timeout_ms == 0 {
            return Err(ConfigError::Invalid("timeouts must be positive".to_string()));
        }
        if self.max_missed_acks == 0 {
            return Err(ConfigError::Invalid("max_missed_acks cannot be 0".to_string()));
        }
        if self.channel_capacity == 0 {
            return Err(ConfigError::Invalid("channel_capacity cannot be 0".to_string()));
        }

        let mut names = HashSet::new();
        for peer in &self.peers {
            if peer.name == self.name {
                return Err(ConfigError::Invalid("peer list contains this node".to_string()));
            }
            if !names.insert(peer.name.as_str()) {
                return Err(ConfigError::DuplicateName(peer.name.clone()));
            }
        }
        Ok(())
    }

    /// Names of every account seeded at startup: this node and its peers
    pub fn account_names(&self) -> Vec<String> {
        std::iter::once(self.name.clone())
            .chain(self.peers.iter().map(|p| p.name.clone()))
            .collect()
    }

    pub fn ack_timeout(&self) -> Duration {
        Duration::from_millis(self.ack_timeout_ms)
    }

    pub fn query_timeout(&self) -> Duration {
        Duration::from_millis(self.query_timeout_ms)
    }

    /// Transport settings derived from this node's listen address and timeouts
    pub fn tcp_config(&self) -> TcpTransportConfig {
        TcpTransportConfig::new()
            .with_bind_address(&self.host)
            .with_bind_port(self.port)
            .with_connect_timeout_ms(self.connect_timeout_ms)
            .with_reconnect_delay_ms(self.reconnect_delay_ms)
            .with_send_queue_capacity(self.channel_capacity)
    }
}
