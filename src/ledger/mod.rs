// Ledger module - THE SHARED HISTORY
// Hash-chained record of committed transfers, one block per operation

mod block;
mod chain;

pub use block::{Block, Operation, GENESIS_PREV_HASH};
pub use chain::{Ledger, LedgerError};
