//! Pipe-pair transport for proven-streaming.
//!
//! Connects two local processes with a pair of unidirectional pipes and
//! serves the duplex request/response protocol over them.

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]
#![allow(clippy::module_name_repetitions)]

pub mod channel;
pub mod connector;
pub mod error;

pub use channel::{NamedPipeChannel, PipeRole};
pub use connector::{NamedPipeConnector, NamedPipeServer};
pub use error::{Error, Result};

use std::path::PathBuf;
use std::time::Duration;

use proven_streaming::TransportConfig;

/// Base name shared by both ends when none is configured.
pub const DEFAULT_BASE_NAME: &str = "bfv4.pipes";

/// Suffix of the pipe the server reads and the client writes.
pub const INCOMING_SUFFIX: &str = ".incoming";

/// Suffix of the pipe the server writes and the client reads.
pub const OUTGOING_SUFFIX: &str = ".outgoing";

/// Pipe transport configuration.
#[derive(Debug, Clone)]
pub struct NamedPipeConfig {
    /// Generic transport configuration.
    pub transport: TransportConfig,
    /// Base name of the pipe pair.
    pub base_name: String,
    /// Directory holding the socket files (Unix only).
    pub directory: PathBuf,
    /// How long a client keeps retrying before giving up.
    pub connect_timeout: Duration,
}

impl Default for NamedPipeConfig {
    fn default() -> Self {
        Self {
            transport: TransportConfig::default(),
            base_name: DEFAULT_BASE_NAME.to_string(),
            directory: std::env::temp_dir(),
            connect_timeout: Duration::from_secs(5),
        }
    }
}

impl NamedPipeConfig {
    /// Set the generic transport configuration.
    #[must_use]
    pub fn with_transport(mut self, transport: TransportConfig) -> Self {
        self.transport = transport;
        self
    }

    /// Set the base name of the pipe pair.
    #[must_use]
    pub fn with_base_name(mut self, base_name: impl Into<String>) -> Self {
        self.base_name = base_name.into();
        self
    }

    /// Set the directory holding the socket files.
    #[must_use]
    pub fn with_directory(mut self, directory: impl Into<PathBuf>) -> Self {
        self.directory = directory.into();
        self
    }

    /// Set the client connect timeout.
    #[must_use]
    pub const fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Name of the pipe the server reads.
    #[must_use]
    pub fn incoming_name(&self) -> String {
        format!("{}{INCOMING_SUFFIX}", self.base_name)
    }

    /// Name of the pipe the server writes.
    #[must_use]
    pub fn outgoing_name(&self) -> String {
        format!("{}{OUTGOING_SUFFIX}", self.base_name)
    }
}
