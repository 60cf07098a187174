// Node module - THE PARTICIPANT
// Actor that owns one node's protocol and ledger state, its handle, and configuration

mod actor;
mod config;
mod error;
mod handle;
mod runtime;

pub use actor::{Node, NodeSnapshot, NodeStats};

pub use config::{ClusterConfig, ConfigError, NodeConfig, PeerDescriptor};

pub use error::NodeError;

pub use handle::NodeHandle;

pub use runtime::{spawn_memory_node, spawn_tcp_node, TcpNode};
