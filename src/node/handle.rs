// Node Handle - the client side of a running node

use crate::ledger::{Block, Ledger, Operation};
use crate::node::actor::{NodeSnapshot, NodeStats};
use crate::node::error::NodeError;
use std::collections::BTreeMap;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tokio::time::timeout;

/// Requests a handle sends to its node
pub(crate) enum Command {
    Transfer {
        operation: Operation,
        reply: oneshot::Sender<Result<Block, NodeError>>,
    },
    Balance {
        account: String,
        reply: oneshot::Sender<u64>,
    },
    Balances {
        reply: oneshot::Sender<BTreeMap<String, u64>>,
    },
    Chain {
        reply: oneshot::Sender<Vec<Block>>,
    },
    RemoteBalance {
        peer: String,
        account: String,
        reply: oneshot::Sender<Result<u64, NodeError>>,
    },
    Snapshot {
        reply: oneshot::Sender<NodeSnapshot>,
    },
    Stats {
        reply: oneshot::Sender<NodeStats>,
    },
    Shutdown,
}

/// Cheap, cloneable handle to a [`crate::node::Node`]
#[derive(Clone, Debug)]
pub struct NodeHandle {
    name: String,
    commands: mpsc::Sender<Command>,
    query_timeout: Duration,
}

impl NodeHandle {
    pub(crate) fn new(name: &str, commands: mpsc::Sender<Command>, query_timeout: Duration) -> Self {
        Self {
            name: name.to_string(),
            commands,
            query_timeout,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Whether the node has stopped
    pub fn is_closed(&self) -> bool {
        self.commands.is_closed()
    }

    async fn call<T>(&self, make: impl FnOnce(oneshot::Sender<T>) -> Command) -> Result<T, NodeError> {
        let (tx, rx) = oneshot::channel();
        self.commands
            .send(make(tx))
            .await
            .map_err(|_| NodeError::Stopped)?;
        rx.await.map_err(|_| NodeError::Stopped)
    }

    /// Run `operation` through the mutex and commit it.
    ///
    /// Resolves once the transfer is committed or rejected.
    pub async fn transfer(&self, operation: Operation) -> Result<Block, NodeError> {
        self.call(|reply| Command::Transfer { operation, reply }).await?
    }

    /// Local view of one account
    pub async fn balance(&self, account: &str) -> Result<u64, NodeError> {
        let account = account.to_string();
        self.call(|reply| Command::Balance { account, reply }).await
    }

    pub async fn balances(&self) -> Result<BTreeMap<String, u64>, NodeError> {
        self.call(|reply| Command::Balances { reply }).await
    }

    /// Copy of the local chain
    pub async fn chain(&self) -> Result<Vec<Block>, NodeError> {
        self.call(|reply| Command::Chain { reply }).await
    }

    pub async fn chain_is_valid(&self) -> Result<bool, NodeError> {
        let chain = self.chain().await?;
        Ok(Ledger::from_blocks(chain).is_valid())
    }

    /// Ask `peer` for its view of `account`
    pub async fn remote_balance(&self, peer: &str, account: &str) -> Result<u64, NodeError> {
        let request = self.call(|reply| Command::RemoteBalance {
            peer: peer.to_string(),
            account: account.to_string(),
            reply,
        });
        match timeout(self.query_timeout, request).await {
            Ok(result) => result?,
            Err(_) => Err(NodeError::ProtocolTimeout(peer.to_string())),
        }
    }

    pub async fn snapshot(&self) -> Result<NodeSnapshot, NodeError> {
        self.call(|reply| Command::Snapshot { reply }).await
    }

    pub async fn stats(&self) -> Result<NodeStats, NodeError> {
        self.call(|reply| Command::Stats { reply }).await
    }

    /// Ask the node to stop. Pending transfers fail with [`NodeError::Stopped`].
    pub async fn shutdown(&self) -> Result<(), NodeError> {
        self.commands
            .send(Command::Shutdown)
            .await
            .map_err(|_| NodeError::Stopped)
    }
}
