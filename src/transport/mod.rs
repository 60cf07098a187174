// Transport module - THE WIRE (abstract)
// PeerLink abstraction with a TCP implementation and an in-process one

mod memory;
mod tcp;
mod traits;

pub use traits::{BroadcastReport, PeerLink, TransportError, TransportEvent};

pub use tcp::{TcpTransport, TcpTransportConfig};

pub use memory::{MemoryLink, MemoryNetwork, DEFAULT_MEMORY_CAPACITY};
