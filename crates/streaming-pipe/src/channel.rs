//! Pipe-pair channels.
//!
//! A connection is two unidirectional pipes sharing a base name: the server
//! reads `<base>.incoming` and writes `<base>.outgoing`, the client the
//! reverse. On Unix each pipe is a Unix domain socket under the configured
//! directory; on Windows it is a named pipe.

use crate::NamedPipeConfig;
use crate::error::{Error, Result};

use std::time::Duration;

use async_trait::async_trait;
use proven_streaming::{ChannelFactory, DuplexChannel};
use tracing::{debug, instrument};

/// Delay between client connection attempts.
const RETRY_INTERVAL: Duration = Duration::from_millis(50);

/// Which end of the pipe pair a channel opens.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipeRole {
    /// Creates both pipes and waits for the client.
    Server,
    /// Connects to pipes created by the server.
    Client,
}

/// Channel factory over a pipe pair.
#[derive(Debug, Clone)]
pub struct NamedPipeChannel {
    config: NamedPipeConfig,
    role: PipeRole,
    name: String,
}

impl NamedPipeChannel {
    /// Server end: creates the pipes and waits for a client on each open.
    #[must_use]
    pub fn server(config: NamedPipeConfig) -> Self {
        Self::new(config, PipeRole::Server)
    }

    /// Client end: connects to an existing server on each open.
    #[must_use]
    pub fn client(config: NamedPipeConfig) -> Self {
        Self::new(config, PipeRole::Client)
    }

    fn new(config: NamedPipeConfig, role: PipeRole) -> Self {
        let name = match role {
            PipeRole::Server => format!("{} (server)", config.base_name),
            PipeRole::Client => format!("{} (client)", config.base_name),
        };
        Self { config, role, name }
    }

    /// Which end this channel opens.
    #[must_use]
    pub const fn role(&self) -> PipeRole {
        self.role
    }

    /// Configuration of this channel.
    #[must_use]
    pub const fn config(&self) -> &NamedPipeConfig {
        &self.config
    }
}

#[async_trait]
impl ChannelFactory for NamedPipeChannel {
    fn name(&self) -> &str {
        &self.name
    }

    #[instrument(skip(self), fields(pipe = %self.name))]
    async fn open(&self, max_frame_size: usize) -> proven_streaming::Result<DuplexChannel> {
        let channel = match self.role {
            PipeRole::Server => self.open_server(max_frame_size).await?,
            PipeRole::Client => self.open_client(max_frame_size).await?,
        };

        debug!("Pipe pair connected");
        Ok(channel)
    }
}

#[cfg(unix)]
mod platform {
    use super::{Error, NamedPipeChannel, RETRY_INTERVAL, Result};

    use std::io;
    use std::path::{Path, PathBuf};

    use proven_streaming::DuplexChannel;
    use tokio::net::{UnixListener, UnixStream};
    use tokio::time::Instant;
    use tracing::{debug, warn};

    impl NamedPipeChannel {
        fn socket_path(&self, pipe: &str) -> PathBuf {
            self.config.directory.join(pipe)
        }

        pub(super) async fn open_server(&self, max_frame_size: usize) -> Result<DuplexChannel> {
            let incoming_path = self.socket_path(&self.config.incoming_name());
            let outgoing_path = self.socket_path(&self.config.outgoing_name());

            let incoming = bind(&incoming_path)?;
            let outgoing = match bind(&outgoing_path) {
                Ok(listener) => listener,
                Err(e) => {
                    remove_socket(&incoming_path);
                    return Err(e);
                }
            };

            debug!("Waiting for client on {}", self.config.base_name);
            let accepted = tokio::try_join!(
                accept(&incoming, &incoming_path),
                accept(&outgoing, &outgoing_path)
            );

            // The accepted streams outlive their socket files.
            remove_socket(&incoming_path);
            remove_socket(&outgoing_path);

            let (incoming, outgoing) = accepted?;
            Ok(DuplexChannel::from_io(incoming, outgoing, max_frame_size))
        }

        pub(super) async fn open_client(&self, max_frame_size: usize) -> Result<DuplexChannel> {
            let incoming_path = self.socket_path(&self.config.incoming_name());
            let outgoing_path = self.socket_path(&self.config.outgoing_name());
            let deadline = Instant::now() + self.config.connect_timeout;

            let incoming = connect(&incoming_path, deadline, self).await?;
            let outgoing = connect(&outgoing_path, deadline, self).await?;

            Ok(DuplexChannel::from_io(outgoing, incoming, max_frame_size))
        }
    }

    fn bind(path: &Path) -> Result<UnixListener> {
        remove_socket(path);
        UnixListener::bind(path).map_err(|source| Error::Bind {
            path: path.display().to_string(),
            source,
        })
    }

    async fn accept(listener: &UnixListener, path: &Path) -> Result<UnixStream> {
        listener
            .accept()
            .await
            .map(|(stream, _)| stream)
            .map_err(|source| Error::Accept {
                path: path.display().to_string(),
                source,
            })
    }

    async fn connect(
        path: &Path,
        deadline: Instant,
        channel: &NamedPipeChannel,
    ) -> Result<UnixStream> {
        loop {
            match UnixStream::connect(path).await {
                Ok(stream) => return Ok(stream),
                Err(source) if Instant::now() >= deadline => {
                    return Err(Error::ConnectTimeout {
                        path: path.display().to_string(),
                        timeout: channel.config.connect_timeout,
                        source,
                    });
                }
                Err(_) => tokio::time::sleep(RETRY_INTERVAL).await,
            }
        }
    }

    fn remove_socket(path: &Path) {
        match std::fs::remove_file(path) {
            Ok(()) => {}
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => warn!("Failed to remove socket {}: {}", path.display(), e),
        }
    }
}

#[cfg(windows)]
mod platform {
    use super::{Error, NamedPipeChannel, RETRY_INTERVAL, Result};

    use proven_streaming::DuplexChannel;
    use tokio::net::windows::named_pipe::{ClientOptions, NamedPipeClient, ServerOptions};
    use tokio::time::Instant;
    use tracing::debug;

    fn pipe_path(pipe: &str) -> String {
        format!(r"\\.\pipe\{pipe}")
    }

    impl NamedPipeChannel {
        pub(super) async fn open_server(&self, max_frame_size: usize) -> Result<DuplexChannel> {
            let incoming_path = pipe_path(&self.config.incoming_name());
            let outgoing_path = pipe_path(&self.config.outgoing_name());

            let incoming = ServerOptions::new()
                .first_pipe_instance(true)
                .access_outbound(false)
                .create(&incoming_path)
                .map_err(|source| Error::Bind {
                    path: incoming_path.clone(),
                    source,
                })?;
            let outgoing = ServerOptions::new()
                .first_pipe_instance(true)
                .access_inbound(false)
                .create(&outgoing_path)
                .map_err(|source| Error::Bind {
                    path: outgoing_path.clone(),
                    source,
                })?;

            debug!("Waiting for client on {}", self.config.base_name);
            tokio::try_join!(
                async {
                    incoming.connect().await.map_err(|source| Error::Accept {
                        path: incoming_path.clone(),
                        source,
                    })
                },
                async {
                    outgoing.connect().await.map_err(|source| Error::Accept {
                        path: outgoing_path.clone(),
                        source,
                    })
                }
            )?;

            Ok(DuplexChannel::from_io(incoming, outgoing, max_frame_size))
        }

        pub(super) async fn open_client(&self, max_frame_size: usize) -> Result<DuplexChannel> {
            let incoming_path = pipe_path(&self.config.incoming_name());
            let outgoing_path = pipe_path(&self.config.outgoing_name());
            let deadline = Instant::now() + self.config.connect_timeout;

            let incoming = self
                .open_pipe(&incoming_path, deadline, ClientOptions::new().read(false))
                .await?;
            let outgoing = self
                .open_pipe(&outgoing_path, deadline, ClientOptions::new().write(false))
                .await?;

            Ok(DuplexChannel::from_io(outgoing, incoming, max_frame_size))
        }

        async fn open_pipe(
            &self,
            path: &str,
            deadline: Instant,
            options: &ClientOptions,
        ) -> Result<NamedPipeClient> {
            loop {
                match options.open(path) {
                    Ok(client) => return Ok(client),
                    Err(source) if Instant::now() >= deadline => {
                        return Err(Error::ConnectTimeout {
                            path: path.to_string(),
                            timeout: self.config.connect_timeout,
                            source,
                        });
                    }
                    Err(_) => tokio::time::sleep(RETRY_INTERVAL).await,
                }
            }
        }
    }
}
