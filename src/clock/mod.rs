// Clock module - ORDERING
// Lamport timestamps and the per-node queue of outstanding mutex requests

mod lamport;
mod queue;

pub use lamport::{LogicalClock, NodeId, Timestamp};
pub use queue::{PendingRequestQueue, QueueEntry};
