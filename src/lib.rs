// Lamport Ledger
//
// Peer nodes agree on a single order of money transfers through a
// Lamport-clock distributed mutex, and record committed transfers in a
// hash-chained ledger kept by every node.
//
// Layers, bottom-up:
// - clock: Lamport timestamps and the request priority queue
// - ledger / vault: hash-chained blocks and account balances
// - sync: wire messages, framing, and the live peer set
// - mutex: the request/ack/release state machine
// - transport: TCP and in-process peer links
// - node: the actor tying everything together

pub mod clock;
pub mod ledger;
pub mod logging;
pub mod mutex;
pub mod node;
pub mod sync;
pub mod transport;
pub mod vault;
