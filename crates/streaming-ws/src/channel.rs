//! WebSocket channels.
//!
//! Each frame travels whole in one binary message. Text, ping and pong
//! messages are ignored; a close message ends the inbound stream.

use crate::error::Result;

use std::io;

use async_trait::async_trait;
use axum::extract::ws::{Message as AxumMessage, WebSocket};
use futures::{SinkExt, StreamExt, future};
use parking_lot::Mutex;
use proven_streaming::{ChannelFactory, ConnectionError, DuplexChannel, Frame, FrameCodec};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::Message as TungsteniteMessage;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};
use tracing::debug;

/// Client-side WebSocket stream.
pub type ClientStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

enum PendingSocket {
    Axum(WebSocket),
    Client(Box<ClientStream>),
}

/// Channel factory over a single, already established WebSocket.
///
/// The socket can be opened once; later opens fail, since a WebSocket cannot
/// be re-established from the accepting side.
pub struct WebSocketChannel {
    name: String,
    socket: Mutex<Option<PendingSocket>>,
}

impl WebSocketChannel {
    /// Wrap a socket accepted by axum.
    #[must_use]
    pub fn from_axum(socket: WebSocket) -> Self {
        Self {
            name: "websocket (server)".to_string(),
            socket: Mutex::new(Some(PendingSocket::Axum(socket))),
        }
    }

    /// Wrap a socket connected with tokio-tungstenite.
    #[must_use]
    pub fn from_client(stream: ClientStream) -> Self {
        Self {
            name: "websocket (client)".to_string(),
            socket: Mutex::new(Some(PendingSocket::Client(Box::new(stream)))),
        }
    }

    /// Connect to a WebSocket endpoint.
    ///
    /// # Errors
    ///
    /// Returns an error if the handshake fails or the server rejects it.
    pub async fn connect<R>(request: R) -> Result<Self>
    where
        R: IntoClientRequest + Unpin,
    {
        let (stream, response) = tokio_tungstenite::connect_async(request).await?;
        debug!(status = %response.status(), "WebSocket connected");
        Ok(Self::from_client(stream))
    }

    /// Whether the socket has not been opened yet.
    #[must_use]
    pub fn is_pending(&self) -> bool {
        self.socket.lock().is_some()
    }
}

impl std::fmt::Debug for WebSocketChannel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WebSocketChannel")
            .field("name", &self.name)
            .field("pending", &self.is_pending())
            .finish()
    }
}

#[async_trait]
impl ChannelFactory for WebSocketChannel {
    fn name(&self) -> &str {
        &self.name
    }

    async fn open(&self, max_frame_size: usize) -> proven_streaming::Result<DuplexChannel> {
        let socket = self.socket.lock().take().ok_or_else(|| {
            ConnectionError::ChannelCreation("WebSocket already opened".to_string())
        })?;
        let codec = FrameCodec::new().with_max_frame_size(max_frame_size);

        Ok(match socket {
            PendingSocket::Axum(socket) => axum_channel(socket, codec),
            PendingSocket::Client(stream) => client_channel(*stream, codec),
        })
    }
}

fn axum_channel(socket: WebSocket, codec: FrameCodec) -> DuplexChannel {
    let (sink, stream) = socket.split();

    let sink = sink
        .sink_map_err(io::Error::other)
        .with(move |frame: Frame| {
            future::ready(codec.encode_frame(frame).map(AxumMessage::Binary))
        });

    let stream = stream
        .take_while(|message| future::ready(!matches!(message, Ok(AxumMessage::Close(_)))))
        .filter_map(move |message| {
            future::ready(match message {
                Ok(AxumMessage::Binary(data)) => Some(codec.decode_frame(&data)),
                Ok(_) => None,
                Err(e) => Some(Err(io::Error::other(e))),
            })
        });

    DuplexChannel::new(sink, stream)
}

fn client_channel(stream: ClientStream, codec: FrameCodec) -> DuplexChannel {
    let (sink, stream) = stream.split();

    let sink = sink
        .sink_map_err(io::Error::other)
        .with(move |frame: Frame| {
            future::ready(codec.encode_frame(frame).map(TungsteniteMessage::Binary))
        });

    let stream = stream
        .take_while(|message| {
            future::ready(!matches!(message, Ok(TungsteniteMessage::Close(_))))
        })
        .filter_map(move |message| {
            future::ready(match message {
                Ok(TungsteniteMessage::Binary(data)) => Some(codec.decode_frame(&data)),
                Ok(_) => None,
                Err(e) => Some(Err(io::Error::other(e))),
            })
        });

    DuplexChannel::new(sink, stream)
}
