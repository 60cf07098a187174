// Sync module - HOW NODES TALK
// Wire messages, frame codec, and the registry of live peers

mod codec;
mod peer;
mod protocol;

pub use codec::{encode_frame, FrameDecoder, MAX_FRAME_LEN};
pub use peer::{PeerError, PeerInfo, PeerRegistry, PeerState, PeerStats};
pub use protocol::{Message, MessageType, ProtocolError};
