//! Bootstrap for pipe servers.

use crate::NamedPipeConfig;
use crate::channel::NamedPipeChannel;

use std::sync::Arc;

use proven_streaming::{RequestHandler, TransportServer};
use tracing::{Instrument, error, info, instrument};

/// Transport server over a pipe pair.
pub type NamedPipeServer = TransportServer<NamedPipeChannel>;

/// Creates pipe servers and clients from a shared configuration.
///
/// There is no authentication step: access to the pipes is governed by the
/// operating system.
#[derive(Debug, Clone, Default)]
pub struct NamedPipeConnector {
    config: NamedPipeConfig,
}

impl NamedPipeConnector {
    /// Create a connector.
    #[must_use]
    pub const fn new(config: NamedPipeConfig) -> Self {
        Self { config }
    }

    /// Configuration used for new servers.
    #[must_use]
    pub const fn config(&self) -> &NamedPipeConfig {
        &self.config
    }

    /// Create the server end and start it in the background.
    ///
    /// Returns immediately; the server connects once a client appears. Start
    /// failures are only logged.
    #[instrument(skip(self, handler), fields(base_name = %self.config.base_name))]
    pub fn initialize_server(&self, handler: Arc<dyn RequestHandler>) -> NamedPipeServer {
        let server = TransportServer::builder(NamedPipeChannel::server(self.config.clone()), handler)
            .config(self.config.transport.clone())
            .build();

        let starting = server.clone();
        tokio::spawn(
            async move {
                match starting.start().await {
                    Ok(()) => info!("Named pipe server connected"),
                    Err(e) => error!("Failed to start named pipe server: {}", e),
                }
            }
            .in_current_span(),
        );

        server
    }

    /// Create the client end and wait until it is connected.
    ///
    /// # Errors
    ///
    /// Returns an error if no server answers within the connect timeout.
    #[instrument(skip(self, handler), fields(base_name = %self.config.base_name))]
    pub async fn connect_client(
        &self,
        handler: Arc<dyn RequestHandler>,
    ) -> proven_streaming::Result<NamedPipeServer> {
        let client = TransportServer::builder(NamedPipeChannel::client(self.config.clone()), handler)
            .config(self.config.transport.clone())
            .build();

        client.start().await?;
        Ok(client)
    }
}
