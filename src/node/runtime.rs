// Runtime helpers - wire a Node to a transport and spawn it

use crate::node::actor::Node;
use crate::node::config::NodeConfig;
use crate::node::error::NodeError;
use crate::node::handle::NodeHandle;
use crate::transport::{MemoryNetwork, TcpTransport};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::warn;

/// A node served over TCP
pub struct TcpNode {
    handle: NodeHandle,
    transport: Arc<TcpTransport>,
    task: JoinHandle<()>,
}

impl TcpNode {
    pub fn handle(&self) -> &NodeHandle {
        &self.handle
    }

    /// Address the listener actually bound to
    pub fn local_addr(&self) -> SocketAddr {
        self.transport.local_addr()
    }

    /// Stop the node, wait for it to drain, then close every connection
    pub async fn stop(self) {
        let _ = self.handle.shutdown().await;
        if let Err(e) = self.task.await {
            warn!(node = %self.handle.name(), error = %e, "node task ended abnormally");
        }
        self.transport.shutdown();
    }
}

/// Bind the listener, dial every configured peer and start the node.
///
/// Failing to bind is the only startup error.
pub async fn spawn_tcp_node(config: NodeConfig) -> Result<TcpNode, NodeError> {
    config.validate()?;

    let (events_tx, events_rx) = mpsc::channel(config.channel_capacity);
    let transport = Arc::new(TcpTransport::bind(&config.name, config.tcp_config(), events_tx).await?);
    for peer in &config.peers {
        transport.connect_to(&peer.name, &peer.address());
    }

    let (node, handle) = Node::new(config, transport.clone(), events_rx)?;
    let task = tokio::spawn(node.run());

    Ok(TcpNode {
        handle,
        transport,
        task,
    })
}

/// Attach a node to an in-process network and start it
pub fn spawn_memory_node(
    network: &MemoryNetwork,
    config: NodeConfig,
) -> Result<(NodeHandle, JoinHandle<()>), NodeError> {
    config.validate()?;

    let (link, events) = network.join(&config.name);
    let (node, handle) = Node::new(config, Arc::new(link), events)?;
    Ok((handle, tokio::spawn(node.run())))
}
