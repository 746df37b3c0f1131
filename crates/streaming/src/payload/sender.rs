use super::{DisconnectCause, DisconnectObserver, DisconnectSignal};
use crate::channel::FrameSink;
use crate::error::{ConnectionError, Result};
use crate::protocol::Frame;

use std::sync::Arc;
use std::time::Duration;

use futures::SinkExt;
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tracing::{debug, warn};

/// Upper bound on flushing and closing the sink during teardown.
const CLOSE_TIMEOUT: Duration = Duration::from_secs(1);

/// Writes frames to the outbound half of a channel.
///
/// Frames are queued and written by a background task, so callers never wait
/// on each other for the channel.
pub struct PayloadSender {
    capacity: usize,
    signal: Arc<DisconnectSignal>,
    queue: Mutex<Option<mpsc::Sender<Frame>>>,
}

impl PayloadSender {
    /// Create an unbound sender with the given queue capacity.
    #[must_use]
    pub fn new(capacity: usize, observer: Option<DisconnectObserver>) -> Self {
        Self {
            capacity: capacity.max(1),
            signal: Arc::new(DisconnectSignal::new(observer)),
            queue: Mutex::new(None),
        }
    }

    /// Bind to a sink and start the writer task.
    ///
    /// # Errors
    ///
    /// Fails if this sender was already bound.
    pub fn connect(&self, sink: FrameSink) -> Result<()> {
        self.signal.bind()?;

        let (tx, rx) = mpsc::channel(self.capacity);
        *self.queue.lock() = Some(tx);

        tokio::spawn(write_loop(sink, rx, self.signal.clone()));
        debug!("Payload sender connected");
        Ok(())
    }

    /// Queue a frame for writing.
    ///
    /// # Errors
    ///
    /// Returns `NotConnected` if the sender is not bound or has stopped.
    pub async fn send_frame(&self, frame: Frame) -> Result<()> {
        let tx = self
            .queue
            .lock()
            .clone()
            .filter(|_| self.signal.is_connected())
            .ok_or(ConnectionError::NotConnected)?;

        tx.send(frame)
            .await
            .map_err(|_| ConnectionError::NotConnected.into())
    }

    /// Stop the writer. Safe to call any number of times.
    pub fn disconnect(&self) {
        self.queue.lock().take();
        if self.signal.fire(DisconnectCause::Requested) {
            debug!("Payload sender disconnected");
        }
    }

    /// Whether the sender is bound and live.
    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.signal.is_connected()
    }

    /// Resolves once the sender has stopped.
    pub async fn disconnected(&self) {
        self.signal.token().cancelled().await;
    }
}

impl std::fmt::Debug for PayloadSender {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PayloadSender")
            .field("connected", &self.is_connected())
            .finish_non_exhaustive()
    }
}

async fn write_loop(mut sink: FrameSink, mut rx: mpsc::Receiver<Frame>, signal: Arc<DisconnectSignal>) {
    let token = signal.token();

    let cause = loop {
        tokio::select! {
            biased;
            () = token.cancelled() => break None,
            frame = rx.recv() => {
                let Some(frame) = frame else {
                    break None;
                };

                tokio::select! {
                    biased;
                    () = token.cancelled() => break None,
                    result = sink.send(frame) => {
                        if let Err(e) = result {
                            warn!("Failed to write frame: {}", e);
                            break Some(DisconnectCause::Error(e.to_string()));
                        }
                    }
                }
            }
        }
    };

    if tokio::time::timeout(CLOSE_TIMEOUT, sink.close()).await.is_err() {
        debug!("Timed out closing channel sink");
    }

    if let Some(cause) = cause {
        signal.fire(cause);
    }
}
