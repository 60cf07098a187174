// Ledger - Append-only hash-chained sequence of blocks

use crate::ledger::block::{Block, Operation, GENESIS_PREV_HASH};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Chain verification failures
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LedgerError {
    #[error("Genesis block must point at the \"0\" sentinel")]
    BadGenesis,

    #[error("Block {index} does not link to its predecessor")]
    BrokenLink { index: usize },

    #[error("Block {index} hash does not match its contents")]
    HashMismatch { index: usize },
}

/// Local copy of every committed transfer, oldest first
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct Ledger {
    chain: Vec<Block>,
}

impl Ledger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wrap an existing sequence of blocks as-is
    pub fn from_blocks(chain: Vec<Block>) -> Self {
        Self { chain }
    }

    /// Hash the operation against `prev_hash` and append the resulting block
    pub fn append(&mut self, operation: Operation, prev_hash: &str) -> Block {
        let block = Block::new(operation, prev_hash);
        self.chain.push(block.clone());
        block
    }

    /// Append on top of the current tail (or the genesis sentinel)
    pub fn add_block(&mut self, operation: Operation) -> Block {
        let prev_hash = self.head_hash().to_string();
        self.append(operation, &prev_hash)
    }

    pub fn last_block(&self) -> Option<&Block> {
        self.chain.last()
    }

    /// Hash the next block must point at
    pub fn head_hash(&self) -> &str {
        self.chain
            .last()
            .map(Block::hash)
            .unwrap_or(GENESIS_PREV_HASH)
    }

    /// Whether every block links to its predecessor and hashes to its stored value
    pub fn is_valid(&self) -> bool {
        self.verify().is_ok()
    }

    /// Like [`Ledger::is_valid`] but reports the first offending block
    pub fn verify(&self) -> Result<(), LedgerError> {
        if let Some(first) = self.chain.first() {
            if first.prev_hash() != GENESIS_PREV_HASH {
                return Err(LedgerError::BadGenesis);
            }
        }
        for (index, block) in self.chain.iter().enumerate() {
            if index > 0 && block.prev_hash() != self.chain[index - 1].hash() {
                return Err(LedgerError::BrokenLink { index });
            }
            if !block.has_valid_hash() {
                return Err(LedgerError::HashMismatch { index });
            }
        }
        Ok(())
    }

    pub fn blocks(&self) -> &[Block] {
        &self.chain
    }

    pub fn get(&self, index: usize) -> Option<&Block> {
        self.chain.get(index)
    }

    pub fn len(&self) -> usize {
        self.chain.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chain.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Block> {
        self.chain.iter()
    }
}
