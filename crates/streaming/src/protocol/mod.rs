//! Wire protocol: frame layout and CBOR payloads.

pub mod framing;
pub mod payload;

pub use framing::{FRAME_HEADER_SIZE, Frame, FrameCodec, FrameType, MAX_FRAME_SIZE};
pub use payload::{RequestPayload, ResponsePayload, StreamPayload, decode, encode};
