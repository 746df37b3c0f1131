//! Transport server: owns one connection at a time and reconnects after loss.

use crate::adapter::ProtocolAdapter;
use crate::channel::{ChannelFactory, DuplexChannel};
use crate::error::{ConnectionError, Result};
use crate::handler::{RequestContext, RequestHandler};
use crate::message::{ReceiveResponse, Request};
use crate::payload::{DisconnectCause, DisconnectObserver, PayloadReceiver, PayloadSender};
use crate::protocol::MAX_FRAME_SIZE;
use crate::request_manager::{RequestManager, UnmatchedResponseHook};

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

use arc_swap::ArcSwapOption;
use parking_lot::RwLock;
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};

/// Capacity of the disconnect event channel.
const EVENT_CAPACITY: usize = 16;

/// Configuration for a transport server.
#[derive(Debug, Clone)]
pub struct TransportConfig {
    /// Make one attempt to reconnect after an unexpected disconnect.
    pub auto_reconnect: bool,
    /// Upper bound on waiting for a response to an outbound request.
    pub request_timeout: Option<Duration>,
    /// Maximum frame payload size.
    pub max_frame_size: usize,
    /// Number of outbound frames that may be queued before senders wait.
    pub send_queue_capacity: usize,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            auto_reconnect: true,
            request_timeout: None,
            max_frame_size: MAX_FRAME_SIZE,
            send_queue_capacity: 1024,
        }
    }
}

impl TransportConfig {
    /// Set whether to reconnect after an unexpected disconnect.
    #[must_use]
    pub const fn with_auto_reconnect(mut self, auto_reconnect: bool) -> Self {
        self.auto_reconnect = auto_reconnect;
        self
    }

    /// Set the outbound request timeout.
    #[must_use]
    pub const fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = Some(timeout);
        self
    }

    /// Set the maximum frame payload size.
    #[must_use]
    pub const fn with_max_frame_size(mut self, size: usize) -> Self {
        self.max_frame_size = size;
        self
    }

    /// Set the outbound queue capacity.
    #[must_use]
    pub const fn with_send_queue_capacity(mut self, capacity: usize) -> Self {
        self.send_queue_capacity = capacity;
        self
    }
}

/// Lifecycle state of a transport server.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// No connection and none being established.
    Idle,
    /// A channel is being opened.
    Starting,
    /// Sender and receiver are live.
    Connected,
    /// A lost connection is being torn down.
    Disconnecting,
}

/// Emitted once per lost connection.
#[derive(Debug, Clone)]
pub struct DisconnectEvent {
    /// Name of the server's channel factory.
    pub server: String,
    /// Connection generation that was lost.
    pub generation: u64,
    /// What ended the connection.
    pub cause: DisconnectCause,
}

struct Connection {
    generation: u64,
    sender: Arc<PayloadSender>,
    receiver: PayloadReceiver,
    adapter: Arc<ProtocolAdapter>,
}

struct ServerInner<C: ChannelFactory> {
    factory: C,
    handler: Arc<dyn RequestHandler>,
    context: Option<RequestContext>,
    config: TransportConfig,
    request_manager: RequestManager,
    connection: ArcSwapOption<Connection>,
    state: RwLock<ConnectionState>,
    disconnecting: AtomicBool,
    stopped: AtomicBool,
    generation: AtomicU64,
    events: broadcast::Sender<DisconnectEvent>,
}

/// A duplex request/response server over channels produced by `C`.
///
/// Cloning yields another handle to the same server.
pub struct TransportServer<C: ChannelFactory> {
    inner: Arc<ServerInner<C>>,
}

impl<C: ChannelFactory> Clone for TransportServer<C> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

/// Builder for [`TransportServer`].
pub struct TransportServerBuilder<C: ChannelFactory> {
    factory: C,
    handler: Arc<dyn RequestHandler>,
    context: Option<RequestContext>,
    config: TransportConfig,
    unmatched_hook: Option<UnmatchedResponseHook>,
}

impl<C: ChannelFactory> TransportServerBuilder<C> {
    /// Set the server configuration.
    #[must_use]
    pub fn config(mut self, config: TransportConfig) -> Self {
        self.config = config;
        self
    }

    /// Set the context passed to every handler invocation.
    #[must_use]
    pub fn context(mut self, context: RequestContext) -> Self {
        self.context = Some(context);
        self
    }

    /// Observe responses that arrive for no pending request.
    #[must_use]
    pub fn unmatched_response_hook(mut self, hook: UnmatchedResponseHook) -> Self {
        self.unmatched_hook = Some(hook);
        self
    }

    /// Build the server. Nothing is opened until [`TransportServer::start`].
    #[must_use]
    pub fn build(self) -> TransportServer<C> {
        let request_manager = match self.unmatched_hook {
            Some(hook) => RequestManager::new().with_unmatched_hook(hook),
            None => RequestManager::new(),
        };
        let (events, _) = broadcast::channel(EVENT_CAPACITY);

        TransportServer {
            inner: Arc::new(ServerInner {
                factory: self.factory,
                handler: self.handler,
                context: self.context,
                config: self.config,
                request_manager,
                connection: ArcSwapOption::empty(),
                state: RwLock::new(ConnectionState::Idle),
                disconnecting: AtomicBool::new(false),
                stopped: AtomicBool::new(false),
                generation: AtomicU64::new(0),
                events,
            }),
        }
    }
}

impl<C: ChannelFactory> TransportServer<C> {
    /// Create a builder for a server over `factory` answering with `handler`.
    pub fn builder(factory: C, handler: Arc<dyn RequestHandler>) -> TransportServerBuilder<C> {
        TransportServerBuilder {
            factory,
            handler,
            context: None,
            config: TransportConfig::default(),
            unmatched_hook: None,
        }
    }

    /// Open a channel and start serving it.
    ///
    /// # Errors
    ///
    /// Returns `AlreadyStarted` if the server is starting or connected, or the
    /// channel error if no channel could be opened. On failure the server is
    /// left idle.
    #[instrument(skip(self), fields(server = %self.name()))]
    pub async fn start(&self) -> Result<()> {
        {
            let mut state = self.inner.state.write();
            if *state != ConnectionState::Idle {
                return Err(ConnectionError::AlreadyStarted.into());
            }
            *state = ConnectionState::Starting;
        }

        self.inner.stopped.store(false, Ordering::Release);
        ServerInner::connect(&self.inner).await
    }

    /// Send `request` to the peer and wait for its correlated response.
    ///
    /// # Errors
    ///
    /// Returns `NotConnected` without a live connection, `Cancelled` if
    /// `cancellation` fires first, or `Timeout` if a configured request
    /// timeout expires.
    pub async fn send(
        &self,
        request: Request,
        cancellation: Option<CancellationToken>,
    ) -> Result<ReceiveResponse> {
        let connection = self
            .inner
            .connection
            .load_full()
            .ok_or(ConnectionError::NotConnected)?;

        connection.adapter.send_request(request, cancellation).await
    }

    /// Tear down the current connection without reconnecting.
    ///
    /// Safe to call any number of times; only the first call on a live
    /// connection produces a disconnect event.
    #[instrument(skip(self), fields(server = %self.name()))]
    pub fn disconnect(&self) {
        self.inner.stopped.store(true, Ordering::Release);

        if let Some(connection) = self.inner.connection.load_full() {
            info!("Disconnecting");
            connection.sender.disconnect();
            connection.receiver.disconnect();
        }
    }

    /// Subscribe to disconnect events.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<DisconnectEvent> {
        self.inner.events.subscribe()
    }

    /// Resolves once the current connection, if any, has been lost.
    pub async fn wait_disconnected(&self) {
        let mut events = self.subscribe();

        let Some(generation) = self.inner.current_generation() else {
            return;
        };

        loop {
            match events.recv().await {
                Ok(event) if event.generation == generation => return,
                Ok(_) => {}
                Err(broadcast::error::RecvError::Lagged(_)) => {
                    if self.inner.current_generation() != Some(generation) {
                        return;
                    }
                }
                Err(broadcast::error::RecvError::Closed) => return,
            }
        }
    }

    /// Current lifecycle state.
    #[must_use]
    pub fn state(&self) -> ConnectionState {
        *self.inner.state.read()
    }

    /// Whether a connection is live.
    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.state() == ConnectionState::Connected
    }

    /// Name of the underlying channel factory.
    #[must_use]
    pub fn name(&self) -> &str {
        self.inner.factory.name()
    }

    /// Number of outbound requests awaiting a response.
    #[must_use]
    pub fn pending_requests(&self) -> usize {
        self.inner.request_manager.pending_count()
    }
}

impl<C: ChannelFactory> std::fmt::Debug for TransportServer<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransportServer")
            .field("name", &self.name())
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}

impl<C: ChannelFactory> ServerInner<C> {
    fn current_generation(&self) -> Option<u64> {
        self.connection
            .load_full()
            .map(|connection| connection.generation)
    }

    /// Open a channel and wire a fresh sender, receiver and adapter to it.
    /// The caller has already moved the state to `Starting`.
    async fn connect(self: &Arc<Self>) -> Result<()> {
        let channel = match self.factory.open(self.config.max_frame_size).await {
            Ok(channel) => channel,
            Err(e) => {
                *self.state.write() = ConnectionState::Idle;
                warn!("Failed to open channel: {}", e);
                return Err(e);
            }
        };

        if self.stopped.load(Ordering::Acquire) {
            *self.state.write() = ConnectionState::Idle;
            debug!("Server stopped while opening channel");
            return Err(ConnectionError::Closed.into());
        }

        let generation = self.generation.fetch_add(1, Ordering::AcqRel) + 1;
        let connection = self.new_connection(generation);

        // Published before binding so an early loss is attributed to this
        // generation.
        self.connection.store(Some(connection.clone()));
        self.establish(&connection, channel)?;

        info!(generation, "Connected");
        Ok(())
    }

    fn new_connection(self: &Arc<Self>, generation: u64) -> Arc<Connection> {
        let observer = self.observer(generation);

        let sender = Arc::new(PayloadSender::new(
            self.config.send_queue_capacity,
            Some(observer.clone()),
        ));
        let receiver = PayloadReceiver::new(Some(observer));
        let adapter = Arc::new(ProtocolAdapter::new(
            self.handler.clone(),
            self.request_manager.clone(),
            sender.clone(),
            self.context.clone(),
            self.config.request_timeout,
            self.config.max_frame_size,
        ));

        Arc::new(Connection {
            generation,
            sender,
            receiver,
            adapter,
        })
    }

    /// Bind both halves to `channel`. The server only reports `Connected`
    /// once both are live and the connection is still current.
    fn establish(&self, connection: &Arc<Connection>, channel: DuplexChannel) -> Result<()> {
        let generation = connection.generation;
        let (sink, stream) = channel.into_parts();

        let bound = connection.sender.connect(sink).and_then(|()| {
            connection
                .receiver
                .connect(stream, connection.adapter.clone())
        });

        if let Err(e) = bound {
            warn!(generation, "Failed to bind channel: {}", e);
            connection.sender.disconnect();
            connection.receiver.disconnect();
            if self.current_generation() == Some(generation) {
                self.connection.store(None);
            }
            *self.state.write() = ConnectionState::Idle;
            return Err(e);
        }

        let mut state = self.state.write();
        if self.current_generation() != Some(generation) {
            debug!(generation, "Connection lost before it was established");
            return Err(ConnectionError::Closed.into());
        }
        *state = ConnectionState::Connected;
        Ok(())
    }

    fn observer(self: &Arc<Self>, generation: u64) -> DisconnectObserver {
        let inner: Weak<Self> = Arc::downgrade(self);
        Arc::new(move |cause: DisconnectCause| {
            if let Some(inner) = inner.upgrade() {
                inner.on_connection_disconnected(generation, cause);
            }
        })
    }

    fn on_connection_disconnected(self: &Arc<Self>, generation: u64, cause: DisconnectCause) {
        if self
            .disconnecting
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            debug!(generation, "Disconnect already being handled");
            return;
        }

        {
            let _reset = scopeguard::guard((), |()| {
                self.disconnecting.store(false, Ordering::Release);
            });

            if self.current_generation() != Some(generation) {
                debug!(generation, "Ignoring disconnect of stale connection");
                return;
            }

            let Some(connection) = self.connection.swap(None) else {
                return;
            };
            *self.state.write() = ConnectionState::Disconnecting;

            connection.sender.disconnect();
            connection.receiver.disconnect();

            *self.state.write() = ConnectionState::Idle;
            info!(generation, %cause, "Disconnected");

            let _ = self.events.send(DisconnectEvent {
                server: self.factory.name().to_string(),
                generation,
                cause,
            });
        }

        if self.config.auto_reconnect && !self.stopped.load(Ordering::Acquire) {
            self.reconnect();
        }
    }

    fn reconnect(self: &Arc<Self>) {
        {
            let mut state = self.state.write();
            if *state != ConnectionState::Idle {
                return;
            }
            *state = ConnectionState::Starting;
        }

        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                let inner = self.clone();
                handle.spawn(async move {
                    info!("Reconnecting");
                    if let Err(e) = inner.connect().await {
                        error!("Reconnect failed: {}", e);
                    }
                });
            }
            Err(e) => {
                *self.state.write() = ConnectionState::Idle;
                error!("Cannot reconnect outside a runtime: {}", e);
            }
        }
    }
}

impl<C: ChannelFactory> Drop for ServerInner<C> {
    fn drop(&mut self) {
        if let Some(connection) = self.connection.swap(None) {
            connection.sender.disconnect();
            connection.receiver.disconnect();
        }
    }
}
