//! Payload sender and receiver bound to the two halves of a channel.
//!
//! Both halves are single use: once bound to a channel they stay live until
//! the first disconnect, which fires their observer exactly once. A new
//! connection needs fresh instances.

mod receiver;
mod sender;

pub use receiver::{FrameHandler, PayloadReceiver};
pub use sender::PayloadSender;

use crate::error::{ConnectionError, Result};

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU8, Ordering};

use tokio_util::sync::CancellationToken;

/// Why a sender or receiver stopped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DisconnectCause {
    /// `disconnect` was called locally.
    Requested,
    /// The peer closed the channel.
    ChannelClosed,
    /// The channel failed.
    Error(String),
}

impl fmt::Display for DisconnectCause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Requested => write!(f, "disconnect requested"),
            Self::ChannelClosed => write!(f, "channel closed by peer"),
            Self::Error(err) => write!(f, "channel error: {err}"),
        }
    }
}

/// Callback invoked once when a connected sender or receiver stops.
pub type DisconnectObserver = Arc<dyn Fn(DisconnectCause) + Send + Sync>;

const UNBOUND: u8 = 0;
const CONNECTED: u8 = 1;
const SPENT: u8 = 2;

/// One-shot lifecycle shared by a half and its background task.
struct DisconnectSignal {
    state: AtomicU8,
    token: CancellationToken,
    observer: Option<DisconnectObserver>,
}

impl DisconnectSignal {
    fn new(observer: Option<DisconnectObserver>) -> Self {
        Self {
            state: AtomicU8::new(UNBOUND),
            token: CancellationToken::new(),
            observer,
        }
    }

    fn bind(&self) -> Result<()> {
        match self
            .state
            .compare_exchange(UNBOUND, CONNECTED, Ordering::AcqRel, Ordering::Acquire)
        {
            Ok(_) => Ok(()),
            Err(CONNECTED) => Err(ConnectionError::AlreadyStarted.into()),
            Err(_) => Err(ConnectionError::Closed.into()),
        }
    }

    fn is_connected(&self) -> bool {
        self.state.load(Ordering::Acquire) == CONNECTED
    }

    /// Mark the half as spent. Returns true only for the call that observed
    /// a live connection, which is also the only one to notify the observer.
    fn fire(&self, cause: DisconnectCause) -> bool {
        let previous = self.state.swap(SPENT, Ordering::AcqRel);
        if previous == SPENT {
            return false;
        }

        let notified = previous == CONNECTED;
        if notified {
            if let Some(observer) = &self.observer {
                observer(cause);
            }
        }

        // Waiters wake only after the observer has run.
        self.token.cancel();
        notified
    }

    fn token(&self) -> CancellationToken {
        self.token.clone()
    }
}
