// Mutex module - THE CRITICAL SECTION
// Request/ack/release state machine that serializes ledger mutations network-wide

mod coordinator;

pub use coordinator::{MutexCoordinator, MutexError, MutexPhase, Outbound};
