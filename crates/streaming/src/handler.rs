//! Contract for answering requests initiated by the remote peer.

use crate::error::HandlerError;
use crate::message::{ReceiveRequest, Response};

use std::any::Any;
use std::sync::Arc;

use async_trait::async_trait;

/// Opaque value passed through to every handler invocation.
pub type RequestContext = Arc<dyn Any + Send + Sync>;

/// Answers requests initiated by the remote peer.
///
/// Invocations run concurrently, one spawned task per request, inside a
/// `request` tracing span carrying the correlation id.
#[async_trait]
pub trait RequestHandler: Send + Sync + 'static {
    /// Produce the response for `request`.
    ///
    /// An error is answered with a 500 response carrying the same id.
    async fn process_request(
        &self,
        request: ReceiveRequest,
        context: Option<&RequestContext>,
    ) -> Result<Response, HandlerError>;
}

/// Builds a handler for each accepted connection.
pub type HandlerFactory = Arc<dyn Fn() -> Arc<dyn RequestHandler> + Send + Sync>;
