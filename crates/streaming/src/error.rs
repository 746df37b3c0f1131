//! Error types for the streaming transport.

use std::io;
use std::time::Duration;
use thiserror::Error;

/// Result type alias for streaming operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for streaming operations.
#[derive(Debug, Error)]
pub enum Error {
    /// Connection lifecycle errors.
    #[error("Connection error: {0}")]
    Connection(#[from] ConnectionError),

    /// Wire protocol errors.
    #[error("Protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    /// Payload serialization errors.
    #[error("Codec error: {0}")]
    Codec(#[from] CodecError),

    /// Errors raised while processing an inbound request.
    #[error("Handler error: {0}")]
    Handler(#[from] HandlerError),

    /// The caller abandoned the request before a response arrived.
    #[error("Request cancelled")]
    Cancelled,

    /// No response arrived in time.
    #[error("Operation timed out after {0:?}")]
    Timeout(Duration),

    /// A received content stream was read more than once.
    #[error("Content stream already consumed")]
    StreamAlreadyConsumed,

    /// Generic I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

impl Error {
    /// Whether this error is a cancellation outcome rather than a failure.
    #[must_use]
    pub const fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }
}

/// Connection-specific errors.
#[derive(Debug, Error)]
pub enum ConnectionError {
    /// No live connection is available.
    #[error("Not connected")]
    NotConnected,

    /// Start was called while the server was already starting or connected.
    #[error("Server already started")]
    AlreadyStarted,

    /// The connection closed before the operation completed.
    #[error("Connection closed")]
    Closed,

    /// The underlying channel could not be created.
    #[error("Failed to create channel: {0}")]
    ChannelCreation(String),
}

/// Protocol-level errors.
#[derive(Debug, Error)]
pub enum ProtocolError {
    /// Invalid frame received.
    #[error("Invalid frame: {0}")]
    InvalidFrame(String),

    /// Frame too large.
    #[error("Frame size {size} exceeds maximum {max}")]
    FrameTooLarge {
        /// Size of the frame.
        size: usize,
        /// Maximum allowed size.
        max: usize,
    },

    /// Checksum mismatch.
    #[error("Checksum mismatch: expected {expected:08x}, got {actual:08x}")]
    ChecksumMismatch {
        /// Expected checksum.
        expected: u32,
        /// Actual checksum.
        actual: u32,
    },
}

/// Codec-related errors.
#[derive(Debug, Error)]
pub enum CodecError {
    /// Serialization failed.
    #[error("Failed to serialize: {0}")]
    SerializationFailed(String),

    /// Deserialization failed.
    #[error("Failed to deserialize: {0}")]
    DeserializationFailed(String),
}

/// Errors produced by a request handler.
#[derive(Debug, Error)]
pub enum HandlerError {
    /// Handler returned an error.
    #[error("{0}")]
    Internal(String),

    /// Handler panicked.
    #[error("Handler panicked: {0}")]
    Panicked(String),
}

impl HandlerError {
    /// Build an internal handler error from anything printable.
    pub fn internal(message: impl std::fmt::Display) -> Self {
        Self::Internal(message.to_string())
    }
}

impl From<ciborium::de::Error<io::Error>> for CodecError {
    fn from(err: ciborium::de::Error<io::Error>) -> Self {
        Self::DeserializationFailed(err.to_string())
    }
}

impl From<ciborium::ser::Error<io::Error>> for CodecError {
    fn from(err: ciborium::ser::Error<io::Error>) -> Self {
        Self::SerializationFailed(err.to_string())
    }
}
