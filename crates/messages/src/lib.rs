//! Network messages for the federated coordination protocol.

pub mod frame;
pub mod payload;

// Re-export commonly used types
pub use frame::{
    Frame, FrameError, MsgType, NeighborStructure, PortAbsent, RejectReason, TaggedMessage,
    UntimedMessage,
    MAX_FEDERATION_ID_LEN, MAX_PAYLOAD_LEN,
};
pub use payload::{CodecError, PayloadCodec, Ros2Serializer};
