//! Correlation of responses to outstanding requests.

use crate::error::{ConnectionError, Error, Result};
use crate::message::ReceiveResponse;

use std::future::Future;
use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;
use tracing::debug;
use uuid::Uuid;

/// Hook invoked with the id of a response that matched no pending request.
pub type UnmatchedResponseHook = Arc<dyn Fn(Uuid) + Send + Sync>;

type PendingMap = DashMap<Uuid, oneshot::Sender<ReceiveResponse>>;

/// Tracks requests awaiting a response, keyed by correlation id.
#[derive(Clone, Default)]
pub struct RequestManager {
    pending: Arc<PendingMap>,
    unmatched_hook: Option<UnmatchedResponseHook>,
}

impl RequestManager {
    /// Create an empty manager.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Observe responses that match no pending request.
    #[must_use]
    pub fn with_unmatched_hook(mut self, hook: UnmatchedResponseHook) -> Self {
        self.unmatched_hook = Some(hook);
        self
    }

    /// Complete the pending request `id` with `response`.
    ///
    /// Returns false, discarding the response, if nothing is waiting on `id`.
    pub fn signal_response(&self, id: Uuid, response: ReceiveResponse) -> bool {
        let delivered = self
            .pending
            .remove(&id)
            .is_some_and(|(_, slot)| slot.send(response).is_ok());

        if !delivered {
            debug!(%id, "Discarding unmatched response");
            if let Some(hook) = &self.unmatched_hook {
                hook(id);
            }
        }

        delivered
    }

    /// Register `id` and return a future resolving to its response.
    ///
    /// The entry exists as soon as this returns, before the future is first
    /// polled. Dropping the future, or cancelling `cancellation`, removes it.
    pub fn get_response(
        &self,
        id: Uuid,
        cancellation: Option<CancellationToken>,
    ) -> impl Future<Output = Result<ReceiveResponse>> + Send + 'static {
        let (tx, rx) = oneshot::channel();
        self.pending.insert(id, tx);

        let guard = PendingGuard {
            id,
            pending: self.pending.clone(),
        };
        let cancellation = cancellation.unwrap_or_default();

        async move {
            let _guard = guard;

            tokio::select! {
                biased;
                response = rx => response.map_err(|_| Error::from(ConnectionError::Closed)),
                () = cancellation.cancelled() => {
                    debug!(%id, "Request cancelled");
                    Err(Error::Cancelled)
                }
            }
        }
    }

    /// Number of requests currently awaiting a response.
    #[must_use]
    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    /// Whether `id` is awaiting a response.
    #[must_use]
    pub fn is_pending(&self, id: &Uuid) -> bool {
        self.pending.contains_key(id)
    }
}

impl std::fmt::Debug for RequestManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RequestManager")
            .field("pending", &self.pending.len())
            .finish_non_exhaustive()
    }
}

struct PendingGuard {
    id: Uuid,
    pending: Arc<PendingMap>,
}

impl Drop for PendingGuard {
    fn drop(&mut self) {
        self.pending.remove(&self.id);
    }
}
