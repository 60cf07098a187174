// Node errors - what callers of a node can observe

use crate::node::config::ConfigError;
use crate::transport::TransportError;
use crate::vault::BalanceError;
use thiserror::Error;

/// Errors surfaced through a [`crate::node::NodeHandle`]
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum NodeError {
    #[error("Insufficient funds in {account}: available {available}, required {required}")]
    InsufficientFunds {
        account: String,
        available: u64,
        required: u64,
    },

    #[error("Invalid amount: transfers must move a positive amount")]
    InvalidAmount,

    #[error("Balance of {0} would overflow")]
    BalanceOverflow(String),

    #[error("Peer unreachable: {0}")]
    PeerUnreachable(String),

    #[error("No response from {0} in time")]
    ProtocolTimeout(String),

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Node stopped")]
    Stopped,
}

impl NodeError {
    /// Whether the transfer was rejected by validation rather than by a failure
    pub fn is_rejection(&self) -> bool {
        matches!(
            self,
            Self::InsufficientFunds { .. } | Self::InvalidAmount | Self::BalanceOverflow(_)
        )
    }
}

impl From<BalanceError> for NodeError {
    fn from(e: BalanceError) -> Self {
        match e {
            BalanceError::InsufficientFunds {
                account,
                available,
                required,
            } => Self::InsufficientFunds {
                account,
                available,
                required,
            },
            BalanceError::InvalidAmount => Self::InvalidAmount,
            BalanceError::BalanceOverflow { account } => Self::BalanceOverflow(account),
        }
    }
}

impl From<TransportError> for NodeError {
    fn from(e: TransportError) -> Self {
        match e {
            TransportError::PeerUnreachable(peer) => Self::PeerUnreachable(peer),
            other => Self::Transport(other.to_string()),
        }
    }
}
