// Block - One committed transfer and its hash pointer

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;

/// `prev_hash` of the first block in every chain
pub const GENESIS_PREV_HASH: &str = "0";

/// A transfer of `amount` from `sender` to `receiver`
///
/// Encoded on the wire as `[sender, receiver, amount]`.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "(String, String, u64)", into = "(String, String, u64)")]
pub struct Operation {
    sender: String,
    receiver: String,
    amount: u64,
}

impl Operation {
    pub fn new(sender: impl Into<String>, receiver: impl Into<String>, amount: u64) -> Self {
        Self {
            sender: sender.into(),
            receiver: receiver.into(),
            amount,
        }
    }

    pub fn sender(&self) -> &str {
        &self.sender
    }

    pub fn receiver(&self) -> &str {
        &self.receiver
    }

    pub fn amount(&self) -> u64 {
        self.amount
    }
}

impl From<(String, String, u64)> for Operation {
    fn from((sender, receiver, amount): (String, String, u64)) -> Self {
        Self {
            sender,
            receiver,
            amount,
        }
    }
}

impl From<Operation> for (String, String, u64) {
    fn from(op: Operation) -> Self {
        (op.sender, op.receiver, op.amount)
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} -> {}: {}", self.sender, self.receiver, self.amount)
    }
}

/// A ledger entry holding exactly one operation
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Block {
    operation: Operation,
    prev_hash: String,
    hash: String,
}

impl Block {
    /// Build a block and compute its hash
    pub fn new(operation: Operation, prev_hash: impl Into<String>) -> Self {
        let prev_hash = prev_hash.into();
        let hash = Self::compute_hash(&operation, &prev_hash);
        Self {
            operation,
            prev_hash,
            hash,
        }
    }

    /// Reassemble a block from stored parts without recomputing the hash.
    ///
    /// Used when importing a chain received from elsewhere; run
    /// [`crate::ledger::Ledger::verify`] before trusting the result.
    pub fn from_parts(operation: Operation, prev_hash: String, hash: String) -> Self {
        Self {
            operation,
            prev_hash,
            hash,
        }
    }

    /// Hex SHA-256 of `sender || receiver || amount || prev_hash`
    pub fn compute_hash(operation: &Operation, prev_hash: &str) -> String {
        let mut hasher = Sha256::new();
        hasher.update(operation.sender.as_bytes());
        hasher.update(operation.receiver.as_bytes());
        hasher.update(operation.amount.to_string().as_bytes());
        hasher.update(prev_hash.as_bytes());
        hex::encode(hasher.finalize())
    }

    pub fn operation(&self) -> &Operation {
        &self.operation
    }

    pub fn prev_hash(&self) -> &str {
        &self.prev_hash
    }

    pub fn hash(&self) -> &str {
        &self.hash
    }

    /// Whether the stored hash matches the block contents
    pub fn has_valid_hash(&self) -> bool {
        self.hash == Self::compute_hash(&self.operation, &self.prev_hash)
    }
}

impl fmt::Display for Block {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Block(sender={}, receiver={}, amount={}, hash={})",
            self.operation.sender, self.operation.receiver, self.operation.amount, self.hash
        )
    }
}
