//! Duplex multiplexed request/response transport.
//!
//! Either peer of a long-lived connection may send requests while others are
//! in flight; responses are matched to their requests by correlation id
//! rather than arrival order.
//!
//! # Components
//!
//! - **Framing**: length-prefixed, checksummed frames carrying CBOR payloads
//! - **Payload sender/receiver**: single-use halves bound to a channel, each
//!   signalling its disconnect exactly once
//! - **Request manager**: pending-response slots keyed by correlation id
//! - **Protocol adapter**: dispatches inbound requests to a
//!   [`RequestHandler`] and inbound responses to waiting callers
//! - **Transport server**: connection lifecycle over any [`ChannelFactory`],
//!   with a single reconnect attempt after an unexpected disconnect
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use async_trait::async_trait;
//! use http::StatusCode;
//! use proven_streaming::{
//!     ChannelFactory, HandlerError, ReceiveRequest, Request, RequestContext, RequestHandler,
//!     Response, TransportServer,
//! };
//!
//! struct Echo;
//!
//! #[async_trait]
//! impl RequestHandler for Echo {
//!     async fn process_request(
//!         &self,
//!         mut request: ReceiveRequest,
//!         _context: Option<&RequestContext>,
//!     ) -> Result<Response, HandlerError> {
//!         let mut response = Response::new(StatusCode::OK);
//!         for stream in &mut request.streams {
//!             let text = stream.read_to_string().map_err(HandlerError::internal)?;
//!             response.set_body_text("text", text);
//!         }
//!         Ok(response)
//!     }
//! }
//!
//! async fn run<C: ChannelFactory>(factory: C) -> proven_streaming::Result<()> {
//!     let server = TransportServer::builder(factory, Arc::new(Echo)).build();
//!     server.start().await?;
//!
//!     let mut request = Request::post("/echo");
//!     request.set_body_text("text", "ping");
//!     let response = server.send(request, None).await?;
//!     assert_eq!(response.status(), Some(StatusCode::OK));
//!
//!     server.disconnect();
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]
#![allow(clippy::module_name_repetitions)]

pub mod adapter;
pub mod channel;
pub mod error;
pub mod handler;
pub mod message;
pub mod payload;
pub mod protocol;
pub mod request_manager;
pub mod server;

pub use adapter::ProtocolAdapter;
pub use channel::{ChannelFactory, DuplexChannel, FrameSink, FrameStream};
pub use error::{CodecError, ConnectionError, Error, HandlerError, ProtocolError, Result};
pub use handler::{HandlerFactory, RequestContext, RequestHandler};
pub use message::{ContentStream, ReceiveRequest, ReceiveResponse, ReceiveStream, Request, Response};
pub use payload::{DisconnectCause, DisconnectObserver, FrameHandler, PayloadReceiver, PayloadSender};
pub use protocol::{Frame, FrameCodec, FrameType, MAX_FRAME_SIZE};
pub use request_manager::{RequestManager, UnmatchedResponseHook};
pub use server::{
    ConnectionState, DisconnectEvent, TransportConfig, TransportServer, TransportServerBuilder,
};

// Re-exported for implementors of the public async traits.
pub use async_trait::async_trait;
pub use tokio_util::sync::CancellationToken;
