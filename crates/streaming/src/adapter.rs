//! Routes inbound frames to the local handler or to waiting callers, and
//! drives outbound requests.

use crate::error::{Error, HandlerError, ProtocolError, Result};
use crate::handler::{RequestContext, RequestHandler};
use crate::message::{ReceiveRequest, ReceiveResponse, Request, Response};
use crate::payload::{FrameHandler, PayloadSender};
use crate::protocol::{self, Frame, FrameType, RequestPayload, ResponsePayload};
use crate::request_manager::RequestManager;

use std::sync::Arc;
use std::time::Duration;

use http::StatusCode;
use bytes::Bytes;
use tokio_util::sync::CancellationToken;
use tracing::{Instrument, debug, error, info_span, instrument, warn};
use uuid::Uuid;

/// Protocol adapter for a single connection.
pub struct ProtocolAdapter {
    handler: Arc<dyn RequestHandler>,
    request_manager: RequestManager,
    sender: Arc<PayloadSender>,
    context: Option<RequestContext>,
    request_timeout: Option<Duration>,
    max_frame_size: usize,
}

impl ProtocolAdapter {
    /// Create an adapter writing through `sender`.
    #[must_use]
    pub fn new(
        handler: Arc<dyn RequestHandler>,
        request_manager: RequestManager,
        sender: Arc<PayloadSender>,
        context: Option<RequestContext>,
        request_timeout: Option<Duration>,
        max_frame_size: usize,
    ) -> Self {
        Self {
            handler,
            request_manager,
            sender,
            context,
            request_timeout,
            max_frame_size,
        }
    }

    /// Send `request` to the peer and wait for its correlated response.
    ///
    /// Cancellation and the request timeout also cover waiting for room in
    /// the outbound queue.
    ///
    /// # Errors
    ///
    /// Returns `FrameTooLarge` if the encoded request exceeds the maximum
    /// frame size, `Cancelled` if `cancellation` fires first, `Timeout` if the
    /// configured request timeout expires, or a connection error if the frame
    /// cannot be queued.
    #[instrument(skip(self, request, cancellation), fields(verb = %request.verb, path = %request.path))]
    pub async fn send_request(
        &self,
        request: Request,
        cancellation: Option<CancellationToken>,
    ) -> Result<ReceiveResponse> {
        let id = Uuid::new_v4();
        let payload = protocol::encode(&RequestPayload::from_request(id, request))?;
        check_frame_size(&payload, self.max_frame_size)?;

        let cancellation = cancellation.unwrap_or_default();

        // Registered before the frame leaves so the response cannot race ahead.
        let response = self
            .request_manager
            .get_response(id, Some(cancellation.clone()));

        let exchange = async {
            tokio::select! {
                biased;
                () = cancellation.cancelled() => {
                    debug!(%id, "Request cancelled before it was sent");
                    return Err(Error::Cancelled);
                }
                sent = self.sender.send_frame(Frame::new(FrameType::Request, payload)) => sent?,
            }
            debug!(%id, "Request sent");

            response.await
        };

        match self.request_timeout {
            Some(timeout) => tokio::time::timeout(timeout, exchange)
                .await
                .map_err(|_| Error::Timeout(timeout))?,
            None => exchange.await,
        }
    }

    fn dispatch_request(&self, request: ReceiveRequest) {
        let id = request.id;
        let handler = self.handler.clone();
        let context = self.context.clone();
        let sender = self.sender.clone();
        let max_frame_size = self.max_frame_size;

        tokio::spawn(
            async move {
                let outcome =
                    tokio::spawn(
                        async move { handler.process_request(request, context.as_ref()).await },
                    )
                    .await
                    .unwrap_or_else(|e| Err(HandlerError::Panicked(e.to_string())));

                let response = outcome.unwrap_or_else(|e| {
                    error!("Handler failed: {}", e);
                    Response::new(StatusCode::INTERNAL_SERVER_ERROR)
                });

                if let Err(e) = send_response(&sender, id, response, max_frame_size).await {
                    warn!("Failed to send response: {}", e);
                }
            }
            .instrument(info_span!("request", %id)),
        );
    }

    fn dispatch_response(&self, response: ReceiveResponse) {
        let id = response.id;
        if self.request_manager.signal_response(id, response) {
            debug!(%id, "Response delivered");
        }
    }
}

fn check_frame_size(payload: &Bytes, max_frame_size: usize) -> Result<()> {
    if payload.len() > max_frame_size {
        return Err(ProtocolError::FrameTooLarge {
            size: payload.len(),
            max: max_frame_size,
        }
        .into());
    }
    Ok(())
}

async fn send_response(
    sender: &PayloadSender,
    id: Uuid,
    response: Response,
    max_frame_size: usize,
) -> Result<()> {
    let mut payload = protocol::encode(&ResponsePayload::from_response(id, response))?;

    if let Err(e) = check_frame_size(&payload, max_frame_size) {
        error!("Response too large to send: {}", e);
        let fallback = Response::new(StatusCode::INTERNAL_SERVER_ERROR);
        payload = protocol::encode(&ResponsePayload::from_response(id, fallback))?;
    }

    sender
        .send_frame(Frame::new(FrameType::Response, payload))
        .await
}

impl FrameHandler for ProtocolAdapter {
    fn handle_frame(&self, frame: Frame) {
        match frame.frame_type {
            FrameType::Request => match protocol::decode::<RequestPayload>(&frame.payload) {
                Ok(payload) => self.dispatch_request(payload.into()),
                Err(e) => warn!("Dropping undecodable request: {}", e),
            },
            FrameType::Response => match protocol::decode::<ResponsePayload>(&frame.payload) {
                Ok(payload) => self.dispatch_response(payload.into()),
                Err(e) => warn!("Dropping undecodable response: {}", e),
            },
        }
    }
}

impl std::fmt::Debug for ProtocolAdapter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProtocolAdapter")
            .field("request_manager", &self.request_manager)
            .field("request_timeout", &self.request_timeout)
            .finish_non_exhaustive()
    }
}
