//! Error types for the WebSocket transport.

use http::header::InvalidHeaderValue;
use thiserror::Error;

/// Result type alias for WebSocket operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors raised while establishing a WebSocket connection.
#[derive(Debug, Error)]
pub enum Error {
    /// The client handshake failed or was rejected.
    #[error("WebSocket handshake failed: {0}")]
    Handshake(#[source] Box<tokio_tungstenite::tungstenite::Error>),

    /// A credential could not be carried in a header.
    #[error("Invalid header value: {0}")]
    InvalidHeader(#[from] InvalidHeaderValue),
}

impl From<tokio_tungstenite::tungstenite::Error> for Error {
    fn from(err: tokio_tungstenite::tungstenite::Error) -> Self {
        Self::Handshake(Box::new(err))
    }
}

impl From<Error> for proven_streaming::Error {
    fn from(err: Error) -> Self {
        proven_streaming::ConnectionError::ChannelCreation(err.to_string()).into()
    }
}
