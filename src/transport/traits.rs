// Transport Traits and Core Types
// Defines the PeerLink trait and the events every transport feeds to a node

use crate::sync::{Message, ProtocolError};
use async_trait::async_trait;
use thiserror::Error;

// ============================================================================
// TRANSPORT EVENTS
// ============================================================================

/// Events emitted by the transport layer
#[derive(Debug, Clone)]
pub enum TransportEvent {
    /// Outbound link to a peer established
    PeerConnected { peer: String },

    /// Outbound link to a peer lost
    PeerDisconnected { peer: String, reason: String },

    /// One complete, well-formed message arrived
    MessageReceived { message: Message },

    /// A frame arrived but could not be decoded; it was discarded
    MalformedMessage { error: ProtocolError },
}

// ============================================================================
// TRANSPORT ERRORS
// ============================================================================

/// Errors that can occur in the transport layer
#[derive(Debug, Clone, Error)]
pub enum TransportError {
    #[error("Peer unreachable: {0}")]
    PeerUnreachable(String),

    #[error("Send failed: {0}")]
    SendFailed(String),

    #[error("Failed to bind listener: {0}")]
    Bind(String),

    #[error("Protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    #[error("IO error: {0}")]
    Io(String),
}

impl From<std::io::Error> for TransportError {
    fn from(e: std::io::Error) -> Self {
        Self::Io(e.to_string())
    }
}

// ============================================================================
// BROADCAST REPORT
// ============================================================================

/// Outcome of delivering one message to several peers
#[derive(Debug, Default)]
pub struct BroadcastReport {
    pub delivered: Vec<String>,
    pub failed: Vec<(String, TransportError)>,
}

impl BroadcastReport {
    pub fn is_complete(&self) -> bool {
        self.failed.is_empty()
    }
}

// ============================================================================
// PEER LINK TRAIT
// ============================================================================

/// Reliable, ordered message channel to each peer
#[async_trait]
pub trait PeerLink: Send + Sync {
    /// Send a message to one peer
    async fn send(&self, peer: &str, message: &Message) -> Result<(), TransportError>;

    /// Send a message to each of `peers`; failures are collected, not retried
    async fn broadcast(&self, peers: &[String], message: &Message) -> BroadcastReport {
        let mut report = BroadcastReport::default();
        for peer in peers {
            match self.send(peer, message).await {
                Ok(()) => report.delivered.push(peer.clone()),
                Err(e) => report.failed.push((peer.clone(), e)),
            }
        }
        report
    }

    /// Peers this link currently has an open outbound channel to
    fn connected_peers(&self) -> Vec<String>;
}
