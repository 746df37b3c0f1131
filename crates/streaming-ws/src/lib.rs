//! WebSocket transport for proven-streaming.
//!
//! Accepting side: an axum endpoint gates each upgrade behind an
//! authentication check, then serves the socket with a dedicated transport
//! server. Connecting side: a tokio-tungstenite client wrapped as a channel.

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]
#![allow(clippy::module_name_repetitions)]

pub mod auth;
pub mod channel;
pub mod connector;
pub mod error;

pub use auth::{AuthError, AuthenticationValidator, ClaimsIdentity, NoAuthentication};
pub use channel::{ClientStream, WebSocketChannel};
pub use connector::{
    AUTH_HEADER_NAME, CHANNEL_ID_HEADER_NAME, ConnectionRejection, ServerHook,
    WebSocketConnector, WebSocketConnectorConfig, WebSocketServer, client_request,
};
pub use error::{Error, Result};
