use super::{DisconnectCause, DisconnectObserver, DisconnectSignal};
use crate::channel::FrameStream;
use crate::error::Result;
use crate::protocol::Frame;

use std::sync::Arc;

use futures::StreamExt;
use tracing::{debug, warn};

/// Consumer of inbound frames.
///
/// Called from the reader task in arrival order, so implementations must not
/// block; long running work belongs in a spawned task.
pub trait FrameHandler: Send + Sync {
    /// Handle one decoded frame.
    fn handle_frame(&self, frame: Frame);
}

/// Reads frames from the inbound half of a channel.
pub struct PayloadReceiver {
    signal: Arc<DisconnectSignal>,
}

impl PayloadReceiver {
    /// Create an unbound receiver.
    #[must_use]
    pub fn new(observer: Option<DisconnectObserver>) -> Self {
        Self {
            signal: Arc::new(DisconnectSignal::new(observer)),
        }
    }

    /// Bind to a stream and start the reader task.
    ///
    /// # Errors
    ///
    /// Fails if this receiver was already bound.
    pub fn connect(&self, stream: FrameStream, handler: Arc<dyn FrameHandler>) -> Result<()> {
        self.signal.bind()?;

        tokio::spawn(read_loop(stream, handler, self.signal.clone()));
        debug!("Payload receiver connected");
        Ok(())
    }

    /// Stop reading. Safe to call any number of times.
    pub fn disconnect(&self) {
        if self.signal.fire(DisconnectCause::Requested) {
            debug!("Payload receiver disconnected");
        }
    }

    /// Whether the receiver is bound and live.
    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.signal.is_connected()
    }

    /// Resolves once the receiver has stopped.
    pub async fn disconnected(&self) {
        self.signal.token().cancelled().await;
    }
}

impl std::fmt::Debug for PayloadReceiver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PayloadReceiver")
            .field("connected", &self.is_connected())
            .finish()
    }
}

async fn read_loop(
    mut stream: FrameStream,
    handler: Arc<dyn FrameHandler>,
    signal: Arc<DisconnectSignal>,
) {
    let token = signal.token();

    let cause = loop {
        tokio::select! {
            biased;
            () = token.cancelled() => break None,
            item = stream.next() => match item {
                Some(Ok(frame)) => handler.handle_frame(frame),
                Some(Err(e)) => {
                    warn!("Failed to read frame: {}", e);
                    break Some(DisconnectCause::Error(e.to_string()));
                }
                None => {
                    debug!("Channel closed by peer");
                    break Some(DisconnectCause::ChannelClosed);
                }
            }
        }
    };

    drop(stream);

    if let Some(cause) = cause {
        signal.fire(cause);
    }
}
