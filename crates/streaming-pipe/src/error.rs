//! Error types for the pipe transport.

use std::io;
use std::time::Duration;

use thiserror::Error;

/// Result type alias for pipe operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors raised while establishing a pipe connection.
#[derive(Debug, Error)]
pub enum Error {
    /// The server could not create the pipe endpoint.
    #[error("Failed to bind pipe {path}: {source}")]
    Bind {
        /// Pipe path.
        path: String,
        /// Underlying error.
        #[source]
        source: io::Error,
    },

    /// Waiting for the client to connect failed.
    #[error("Failed to accept on pipe {path}: {source}")]
    Accept {
        /// Pipe path.
        path: String,
        /// Underlying error.
        #[source]
        source: io::Error,
    },

    /// The server did not appear in time.
    #[error("Timed out connecting to pipe {path} after {timeout:?}: {source}")]
    ConnectTimeout {
        /// Pipe path.
        path: String,
        /// How long the client kept trying.
        timeout: Duration,
        /// Error from the last attempt.
        #[source]
        source: io::Error,
    },
}

impl From<Error> for proven_streaming::Error {
    fn from(err: Error) -> Self {
        proven_streaming::ConnectionError::ChannelCreation(err.to_string()).into()
    }
}
