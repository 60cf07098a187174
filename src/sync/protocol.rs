// Protocol - Message types exchanged between nodes
//
// Defines the wire format for all messages exchanged between nodes:
// - mutex_request / mutex_ack / mutex_release: distributed mutual exclusion
// - transaction: replay of a transfer committed by the sender
// - balance_request / balance_response: read-only balance queries
//
// Messages are JSON objects tagged by a `type` field.

use crate::clock::Timestamp;
use crate::ledger::Operation;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Types of messages in the protocol
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageType {
    MutexRequest,
    MutexAck,
    MutexRelease,
    Transaction,
    BalanceRequest,
    BalanceResponse,
}

impl fmt::Display for MessageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            MessageType::MutexRequest => "mutex_request",
            MessageType::MutexAck => "mutex_ack",
            MessageType::MutexRelease => "mutex_release",
            MessageType::Transaction => "transaction",
            MessageType::BalanceRequest => "balance_request",
            MessageType::BalanceResponse => "balance_response",
        };
        f.write_str(name)
    }
}

/// Protocol errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    #[error("Malformed message: {0}")]
    MalformedMessage(String),

    #[error("Frame of {len} bytes exceeds the {max} byte limit")]
    MessageTooLarge { len: usize, max: usize },

    #[error("Encoding failed: {0}")]
    EncodeFailed(String),
}

/// Wrapper for all message types
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Message {
    MutexRequest {
        lamport_time: Timestamp,
        sender: String,
    },
    MutexAck {
        lamport_time: Timestamp,
        sender: String,
    },
    MutexRelease {
        lamport_time: Timestamp,
        sender: String,
    },
    Transaction {
        operation: Operation,
        lamport_time: Timestamp,
        sender: String,
    },
    BalanceRequest {
        sender: String,
        /// Account to look up; the sender's own when absent
        #[serde(default, skip_serializing_if = "Option::is_none")]
        account: Option<String>,
    },
    BalanceResponse {
        sender: String,
        account: String,
        balance: u64,
    },
}

impl Message {
    pub fn mutex_request(lamport_time: Timestamp, sender: &str) -> Self {
        Message::MutexRequest {
            lamport_time,
            sender: sender.to_string(),
        }
    }

    pub fn mutex_ack(lamport_time: Timestamp, sender: &str) -> Self {
        Message::MutexAck {
            lamport_time,
            sender: sender.to_string(),
        }
    }

    pub fn mutex_release(lamport_time: Timestamp, sender: &str) -> Self {
        Message::MutexRelease {
            lamport_time,
            sender: sender.to_string(),
        }
    }

    pub fn transaction(operation: Operation, lamport_time: Timestamp, sender: &str) -> Self {
        Message::Transaction {
            operation,
            lamport_time,
            sender: sender.to_string(),
        }
    }

    pub fn balance_request(sender: &str, account: Option<&str>) -> Self {
        Message::BalanceRequest {
            sender: sender.to_string(),
            account: account.map(str::to_string),
        }
    }

    pub fn balance_response(sender: &str, account: &str, balance: u64) -> Self {
        Message::BalanceResponse {
            sender: sender.to_string(),
            account: account.to_string(),
            balance,
        }
    }

    /// Get the message type
    pub fn message_type(&self) -> MessageType {
        match self {
            Message::MutexRequest { .. } => MessageType::MutexRequest,
            Message::MutexAck { .. } => MessageType::MutexAck,
            Message::MutexRelease { .. } => MessageType::MutexRelease,
            Message::Transaction { .. } => MessageType::Transaction,
            Message::BalanceRequest { .. } => MessageType::BalanceRequest,
            Message::BalanceResponse { .. } => MessageType::BalanceResponse,
        }
    }

    /// Name of the node that produced the message
    pub fn sender(&self) -> &str {
        match self {
            Message::MutexRequest { sender, .. }
            | Message::MutexAck { sender, .. }
            | Message::MutexRelease { sender, .. }
            | Message::Transaction { sender, .. }
            | Message::BalanceRequest { sender, .. }
            | Message::BalanceResponse { sender, .. } => sender,
        }
    }

    /// Lamport time carried by the message, if it has one
    pub fn lamport_time(&self) -> Option<Timestamp> {
        match self {
            Message::MutexRequest { lamport_time, .. }
            | Message::MutexAck { lamport_time, .. }
            | Message::MutexRelease { lamport_time, .. }
            | Message::Transaction { lamport_time, .. } => Some(*lamport_time),
            Message::BalanceRequest { .. } | Message::BalanceResponse { .. } => None,
        }
    }

    /// Serialize to a JSON body
    pub fn to_json(&self) -> Result<Vec<u8>, ProtocolError> {
        serde_json::to_vec(self).map_err(|e| ProtocolError::EncodeFailed(e.to_string()))
    }

    /// Deserialize from a JSON body
    pub fn from_json(bytes: &[u8]) -> Result<Self, ProtocolError> {
        serde_json::from_slice(bytes).map_err(|e| ProtocolError::MalformedMessage(e.to_string()))
    }
}
