//! Message framing for the wire protocol.
//!
//! Every frame is a 9 byte header (payload length, frame type, CRC32 of the
//! payload) followed by the payload. Byte-stream channels carry frames
//! back to back; message-oriented channels carry exactly one frame per message.

use crate::error::ProtocolError;
use bytes::{Buf, BufMut, Bytes, BytesMut};
use std::io;
use tokio_util::codec::{Decoder, Encoder};

/// Maximum frame size (10MB by default).
pub const MAX_FRAME_SIZE: usize = 10 * 1024 * 1024;

/// Frame header size (4 bytes length + 1 byte type + 4 bytes checksum).
pub const FRAME_HEADER_SIZE: usize = 9;

/// Type of frame being sent.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum FrameType {
    /// A new request initiated by the remote side.
    Request = 0x01,
    /// A response to a request this side initiated.
    Response = 0x02,
}

impl TryFrom<u8> for FrameType {
    type Error = ProtocolError;

    fn try_from(value: u8) -> std::result::Result<Self, ProtocolError> {
        match value {
            0x01 => Ok(Self::Request),
            0x02 => Ok(Self::Response),
            _ => Err(ProtocolError::InvalidFrame(format!(
                "Unknown frame type: {value:#x}"
            ))),
        }
    }
}

/// A frame in the wire protocol.
#[derive(Debug, Clone)]
pub struct Frame {
    /// Type of this frame.
    pub frame_type: FrameType,
    /// Frame payload.
    pub payload: Bytes,
    /// Checksum of the payload, absent when the sender skipped it.
    pub checksum: Option<u32>,
}

impl Frame {
    /// Create a new checksummed frame.
    pub fn new(frame_type: FrameType, payload: Bytes) -> Self {
        let checksum = Some(crc32fast::hash(&payload));
        Self {
            frame_type,
            payload,
            checksum,
        }
    }

    /// Verify the checksum if present.
    ///
    /// # Errors
    ///
    /// Returns an error if the checksum is invalid.
    pub fn verify_checksum(&self) -> Result<(), ProtocolError> {
        if let Some(expected) = self.checksum {
            let actual = crc32fast::hash(&self.payload);
            if expected != actual {
                return Err(ProtocolError::ChecksumMismatch { expected, actual });
            }
        }
        Ok(())
    }
}

fn invalid_data(err: ProtocolError) -> io::Error {
    io::Error::new(io::ErrorKind::InvalidData, err)
}

/// Codec for encoding/decoding frames.
#[derive(Debug, Clone, Copy)]
pub struct FrameCodec {
    max_frame_size: usize,
}

impl FrameCodec {
    /// Create a new frame codec.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            max_frame_size: MAX_FRAME_SIZE,
        }
    }

    /// Create a codec with custom max frame size.
    #[must_use]
    pub const fn with_max_frame_size(mut self, size: usize) -> Self {
        self.max_frame_size = size;
        self
    }

    /// Encode a single frame into a standalone buffer.
    ///
    /// Used by message-oriented channels where one message carries one frame.
    ///
    /// # Errors
    ///
    /// Returns an error if the frame exceeds the maximum size.
    pub fn encode_frame(mut self, frame: Frame) -> io::Result<Bytes> {
        let mut buf = BytesMut::with_capacity(FRAME_HEADER_SIZE + frame.payload.len());
        self.encode(frame, &mut buf)?;
        Ok(buf.freeze())
    }

    /// Decode a message that must contain exactly one complete frame.
    ///
    /// # Errors
    ///
    /// Returns an error if the message is truncated, carries trailing bytes,
    /// or fails validation.
    pub fn decode_frame(mut self, message: &[u8]) -> io::Result<Frame> {
        let mut buf = BytesMut::from(message);
        let frame = self.decode(&mut buf)?.ok_or_else(|| {
            invalid_data(ProtocolError::InvalidFrame(format!(
                "Truncated frame of {} bytes",
                message.len()
            )))
        })?;

        if !buf.is_empty() {
            return Err(invalid_data(ProtocolError::InvalidFrame(format!(
                "{} trailing bytes after frame",
                buf.len()
            ))));
        }

        Ok(frame)
    }
}

impl Default for FrameCodec {
    fn default() -> Self {
        Self::new()
    }
}

impl Decoder for FrameCodec {
    type Item = Frame;
    type Error = io::Error;

    fn decode(
        &mut self,
        buf: &mut BytesMut,
    ) -> std::result::Result<Option<Self::Item>, Self::Error> {
        if buf.len() < FRAME_HEADER_SIZE {
            return Ok(None);
        }

        // Parse header without consuming
        let mut header = &buf[..FRAME_HEADER_SIZE];
        let payload_len = header.get_u32() as usize;
        let frame_type_byte = header.get_u8();
        let checksum = header.get_u32();

        if payload_len > self.max_frame_size {
            return Err(invalid_data(ProtocolError::FrameTooLarge {
                size: payload_len,
                max: self.max_frame_size,
            }));
        }

        let frame_len = FRAME_HEADER_SIZE + payload_len;
        if buf.len() < frame_len {
            buf.reserve(frame_len - buf.len());
            return Ok(None);
        }

        let frame_type = FrameType::try_from(frame_type_byte).map_err(invalid_data)?;

        buf.advance(FRAME_HEADER_SIZE);
        let payload = buf.split_to(payload_len).freeze();

        let frame = Frame {
            frame_type,
            payload,
            checksum: if checksum != 0 { Some(checksum) } else { None },
        };
        frame.verify_checksum().map_err(invalid_data)?;

        Ok(Some(frame))
    }
}

impl Encoder<Frame> for FrameCodec {
    type Error = io::Error;

    fn encode(&mut self, frame: Frame, buf: &mut BytesMut) -> std::result::Result<(), Self::Error> {
        let payload_len = frame.payload.len();

        if payload_len > self.max_frame_size {
            return Err(invalid_data(ProtocolError::FrameTooLarge {
                size: payload_len,
                max: self.max_frame_size,
            }));
        }

        buf.reserve(FRAME_HEADER_SIZE + payload_len);

        #[allow(clippy::cast_possible_truncation)]
        buf.put_u32(payload_len as u32);
        buf.put_u8(frame.frame_type as u8);
        buf.put_u32(frame.checksum.unwrap_or(0));
        buf.put(frame.payload);

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_back_to_back_frames() {
        let mut codec = FrameCodec::new();
        let mut buf = BytesMut::new();

        codec
            .encode(Frame::new(FrameType::Request, Bytes::from("first")), &mut buf)
            .unwrap();
        codec
            .encode(Frame::new(FrameType::Response, Bytes::from("second")), &mut buf)
            .unwrap();

        let first = codec.decode(&mut buf).unwrap().unwrap();
        let second = codec.decode(&mut buf).unwrap().unwrap();

        assert_eq!(first.frame_type, FrameType::Request);
        assert_eq!(first.payload, Bytes::from("first"));
        assert_eq!(second.frame_type, FrameType::Response);
        assert_eq!(second.payload, Bytes::from("second"));
        assert!(buf.is_empty());
    }

    #[test]
    fn test_partial_frame() {
        let mut codec = FrameCodec::new();
        let mut buf = BytesMut::new();

        buf.put_u32(100);
        buf.put_u8(FrameType::Request as u8);

        assert!(codec.decode(&mut buf).unwrap().is_none());
    }

    #[test]
    fn test_checksum_verification() {
        let mut codec = FrameCodec::new();
        let mut buf = BytesMut::new();

        let payload = b"Hello, World!";
        #[allow(clippy::cast_possible_truncation)]
        buf.put_u32(payload.len() as u32);
        buf.put_u8(FrameType::Request as u8);
        buf.put_u32(12345);
        buf.put_slice(payload);

        assert!(codec.decode(&mut buf).is_err());
    }

    #[test]
    fn test_unknown_frame_type() {
        let mut codec = FrameCodec::new();
        let mut buf = BytesMut::new();

        buf.put_u32(0);
        buf.put_u8(0x7f);
        buf.put_u32(0);

        let err = codec.decode(&mut buf).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidData);
    }

    #[test]
    fn test_frame_too_large() {
        let codec = FrameCodec::new().with_max_frame_size(4);
        let frame = Frame::new(FrameType::Request, Bytes::from("too large"));

        assert!(codec.encode_frame(frame).is_err());
    }

    #[test]
    fn test_single_frame_message() {
        let codec = FrameCodec::new();
        let encoded = codec
            .encode_frame(Frame::new(FrameType::Response, Bytes::from("pong")))
            .unwrap();

        let frame = codec.decode_frame(&encoded).unwrap();
        assert_eq!(frame.frame_type, FrameType::Response);
        assert_eq!(frame.payload, Bytes::from("pong"));

        assert!(codec.decode_frame(&encoded[..4]).is_err());

        let mut trailing = BytesMut::from(&encoded[..]);
        trailing.put_u8(0);
        assert!(codec.decode_frame(&trailing).is_err());
    }
}
