//! In-memory channels and handlers shared by the integration tests.

#![allow(dead_code)]

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use http::StatusCode;
use parking_lot::Mutex;
use proven_streaming::{
    ChannelFactory, ConnectionError, DuplexChannel, HandlerError, ReceiveRequest, RequestContext,
    RequestHandler, Response, Result, TransportConfig, TransportServer, async_trait,
};
use tokio::io::DuplexStream;
use tokio::sync::mpsc;
use uuid::Uuid;

/// Which end of an in-memory link a factory plays.
enum Role {
    /// Creates a new link on every open and hands the far end to the acceptor.
    Dial {
        links: mpsc::UnboundedSender<DuplexStream>,
        max_opens: Option<usize>,
    },
    /// Waits for the dialer to create a link.
    Accept {
        links: tokio::sync::Mutex<mpsc::UnboundedReceiver<DuplexStream>>,
    },
}

/// Channel factory over `tokio::io::duplex` links.
pub struct MemoryChannel {
    name: &'static str,
    role: Role,
    opens: Arc<AtomicUsize>,
}

impl MemoryChannel {
    /// Shared counter of `open` calls, successful or not.
    pub fn opens(&self) -> Arc<AtomicUsize> {
        self.opens.clone()
    }
}

/// A dialing and an accepting factory joined to each other.
///
/// `max_opens` bounds how many links the dialer creates; later opens fail.
pub fn memory_pair(max_opens: Option<usize>) -> (MemoryChannel, MemoryChannel) {
    let (tx, rx) = mpsc::unbounded_channel();

    let dialer = MemoryChannel {
        name: "memory-dial",
        role: Role::Dial {
            links: tx,
            max_opens,
        },
        opens: Arc::new(AtomicUsize::new(0)),
    };
    let acceptor = MemoryChannel {
        name: "memory-accept",
        role: Role::Accept {
            links: tokio::sync::Mutex::new(rx),
        },
        opens: Arc::new(AtomicUsize::new(0)),
    };

    (dialer, acceptor)
}

fn channel(stream: DuplexStream, max_frame_size: usize) -> DuplexChannel {
    let (reader, writer) = tokio::io::split(stream);
    DuplexChannel::from_io(reader, writer, max_frame_size)
}

#[async_trait]
impl ChannelFactory for MemoryChannel {
    fn name(&self) -> &str {
        self.name
    }

    async fn open(&self, max_frame_size: usize) -> Result<DuplexChannel> {
        let opened = self.opens.fetch_add(1, Ordering::SeqCst);

        match &self.role {
            Role::Dial { links, max_opens } => {
                if max_opens.is_some_and(|max| opened >= max) {
                    return Err(ConnectionError::ChannelCreation("link refused".to_string()).into());
                }

                let (local, remote) = tokio::io::duplex(64 * 1024);
                links
                    .send(remote)
                    .map_err(|_| ConnectionError::ChannelCreation("acceptor gone".to_string()))?;
                Ok(channel(local, max_frame_size))
            }
            Role::Accept { links } => {
                let remote = links
                    .lock()
                    .await
                    .recv()
                    .await
                    .ok_or_else(|| ConnectionError::ChannelCreation("dialer gone".to_string()))?;
                Ok(channel(remote, max_frame_size))
            }
        }
    }
}

/// Echoes every text stream back with status 200 and records request ids.
#[derive(Default)]
pub struct EchoHandler {
    pub seen: Mutex<Vec<(Uuid, String, String)>>,
}

#[async_trait]
impl RequestHandler for EchoHandler {
    async fn process_request(
        &self,
        mut request: ReceiveRequest,
        _context: Option<&RequestContext>,
    ) -> std::result::Result<Response, HandlerError> {
        self.seen
            .lock()
            .push((request.id, request.verb.clone(), request.path.clone()));

        let mut response = Response::new(StatusCode::OK);
        for stream in &mut request.streams {
            let content_type = stream.content_type.clone().unwrap_or_default();
            let text = stream.read_to_string().map_err(HandlerError::internal)?;
            response.set_body_text(content_type, text);
        }
        Ok(response)
    }
}

/// Sleeps for the number of milliseconds given in the path, then answers.
pub struct DelayHandler;

#[async_trait]
impl RequestHandler for DelayHandler {
    async fn process_request(
        &self,
        request: ReceiveRequest,
        _context: Option<&RequestContext>,
    ) -> std::result::Result<Response, HandlerError> {
        let millis: u64 = request
            .path
            .trim_start_matches('/')
            .parse()
            .map_err(HandlerError::internal)?;
        tokio::time::sleep(Duration::from_millis(millis)).await;

        let mut response = Response::new(StatusCode::OK);
        response.set_body_text("text", request.path);
        Ok(response)
    }
}

/// Fails every request, or panics when the path is `/panic`.
pub struct FailingHandler;

#[async_trait]
impl RequestHandler for FailingHandler {
    async fn process_request(
        &self,
        request: ReceiveRequest,
        _context: Option<&RequestContext>,
    ) -> std::result::Result<Response, HandlerError> {
        assert!(request.path != "/panic", "handler panicked on purpose");
        Err(HandlerError::internal("no route"))
    }
}

/// Answers every request with a body of the given number of bytes.
pub struct PaddedHandler(pub usize);

#[async_trait]
impl RequestHandler for PaddedHandler {
    async fn process_request(
        &self,
        _request: ReceiveRequest,
        _context: Option<&RequestContext>,
    ) -> std::result::Result<Response, HandlerError> {
        let mut response = Response::new(StatusCode::OK);
        response.set_body_text("text", "x".repeat(self.0));
        Ok(response)
    }
}

/// Never answers.
pub struct SilentHandler;

#[async_trait]
impl RequestHandler for SilentHandler {
    async fn process_request(
        &self,
        _request: ReceiveRequest,
        _context: Option<&RequestContext>,
    ) -> std::result::Result<Response, HandlerError> {
        std::future::pending().await
    }
}

/// Two servers connected over an in-memory link, both started.
pub async fn connected_pair(
    dial_handler: Arc<dyn RequestHandler>,
    accept_handler: Arc<dyn RequestHandler>,
    dial_config: TransportConfig,
    accept_config: TransportConfig,
    max_dials: Option<usize>,
) -> (
    TransportServer<MemoryChannel>,
    TransportServer<MemoryChannel>,
    Arc<AtomicUsize>,
) {
    let (dialer, acceptor) = memory_pair(max_dials);
    let dial_opens = dialer.opens();

    let dial = TransportServer::builder(dialer, dial_handler)
        .config(dial_config)
        .build();
    let accept = TransportServer::builder(acceptor, accept_handler)
        .config(accept_config)
        .build();

    let (dialed, accepted) = tokio::join!(dial.start(), accept.start());
    dialed.expect("dial side failed to start");
    accepted.expect("accept side failed to start");

    (dial, accept, dial_opens)
}

/// Poll `condition` until it holds or a second has passed.
pub async fn eventually(condition: impl Fn() -> bool) -> bool {
    for _ in 0..100 {
        if condition() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    condition()
}
