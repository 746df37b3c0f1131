//! Axum endpoint that authenticates WebSocket upgrades and serves each
//! accepted socket with its own transport server.

use crate::auth::{AuthError, AuthenticationValidator};
use crate::channel::WebSocketChannel;
use crate::error::Result;

use std::sync::Arc;

use axum::Router;
use axum::extract::State;
use axum::extract::ws::rejection::WebSocketUpgradeRejection;
use axum::extract::ws::{WebSocket, WebSocketUpgrade};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use http::{HeaderMap, HeaderValue, StatusCode};
use proven_streaming::{HandlerFactory, TransportConfig, TransportServer};
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tracing::{debug, error, info, instrument, warn};

/// Header carrying the credential.
pub const AUTH_HEADER_NAME: &str = "authorization";

/// Header naming the channel the credential is presented for.
pub const CHANNEL_ID_HEADER_NAME: &str = "channelid";

/// Transport server over an accepted WebSocket.
pub type WebSocketServer = TransportServer<WebSocketChannel>;

/// Callback receiving each server once it has started.
pub type ServerHook = Arc<dyn Fn(WebSocketServer) + Send + Sync>;

/// Configuration for a WebSocket connector.
#[derive(Debug, Clone)]
pub struct WebSocketConnectorConfig {
    /// Transport configuration for each accepted socket.
    pub transport: TransportConfig,
}

impl Default for WebSocketConnectorConfig {
    fn default() -> Self {
        Self {
            // An accepted socket cannot be reopened from this side.
            transport: TransportConfig::default().with_auto_reconnect(false),
        }
    }
}

impl WebSocketConnectorConfig {
    /// Set the transport configuration.
    #[must_use]
    pub fn with_transport(mut self, transport: TransportConfig) -> Self {
        self.transport = transport;
        self
    }
}

/// Why an upgrade attempt was refused.
#[derive(Debug)]
pub enum ConnectionRejection {
    /// The request did not ask for a WebSocket upgrade.
    UpgradeRequired,
    /// A credential header was missing or blank.
    MissingHeader(&'static str),
    /// The validator did not accept the credentials.
    Unauthenticated,
    /// The validator failed.
    AuthorizationFailed(AuthError),
}

impl IntoResponse for ConnectionRejection {
    fn into_response(self) -> Response {
        match self {
            Self::UpgradeRequired => (
                StatusCode::BAD_REQUEST,
                "Upgrade to WebSocket is required.",
            )
                .into_response(),
            Self::MissingHeader(name) => (
                StatusCode::UNAUTHORIZED,
                format!("Unable to authenticate. Missing header: {name}"),
            )
                .into_response(),
            Self::Unauthenticated => (
                StatusCode::UNAUTHORIZED,
                "Unauthorized connection attempt.",
            )
                .into_response(),
            Self::AuthorizationFailed(_) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "Error while attempting to authorize connection.",
            )
                .into_response(),
        }
    }
}

/// Accepts authenticated WebSocket connections.
#[derive(Clone)]
pub struct WebSocketConnector {
    validator: Arc<dyn AuthenticationValidator>,
    handler_factory: HandlerFactory,
    config: WebSocketConnectorConfig,
    server_hook: Option<ServerHook>,
}

impl WebSocketConnector {
    /// Create a connector building one handler per accepted socket.
    pub fn new(validator: Arc<dyn AuthenticationValidator>, handler_factory: HandlerFactory) -> Self {
        Self {
            validator,
            handler_factory,
            config: WebSocketConnectorConfig::default(),
            server_hook: None,
        }
    }

    /// Set the connector configuration.
    #[must_use]
    pub fn with_config(mut self, config: WebSocketConnectorConfig) -> Self {
        self.config = config;
        self
    }

    /// Receive each server once its socket is being served.
    #[must_use]
    pub fn with_server_hook(mut self, hook: ServerHook) -> Self {
        self.server_hook = Some(hook);
        self
    }

    /// Mount the connector at `path`.
    pub fn router(self, path: &str) -> Router {
        Router::new().route(path, get(process)).with_state(self)
    }

    /// Check the credential headers of an upgrade request.
    ///
    /// # Errors
    ///
    /// Returns the rejection to send back when the request is refused.
    pub async fn authorize(&self, headers: &HeaderMap) -> std::result::Result<(), ConnectionRejection> {
        if self.validator.is_authentication_disabled().await {
            return Ok(());
        }

        let token = required_header(headers, AUTH_HEADER_NAME)?;
        let channel_id = required_header(headers, CHANNEL_ID_HEADER_NAME)?;

        match self.validator.validate_auth_header(token, channel_id).await {
            Ok(identity) if identity.is_authenticated => Ok(()),
            Ok(_) => Err(ConnectionRejection::Unauthenticated),
            Err(e) => {
                error!("Error while authorizing connection: {}", e);
                Err(ConnectionRejection::AuthorizationFailed(e))
            }
        }
    }

    #[instrument(skip(self, socket))]
    async fn serve(self, socket: WebSocket) {
        let handler = (self.handler_factory)();
        let server = TransportServer::builder(WebSocketChannel::from_axum(socket), handler)
            .config(self.config.transport.clone())
            .build();

        if let Err(e) = server.start().await {
            error!("Failed to start WebSocket server: {}", e);
            return;
        }
        info!("WebSocket connection accepted");

        if let Some(hook) = &self.server_hook {
            hook(server.clone());
        }

        server.wait_disconnected().await;
        debug!("WebSocket connection ended");
    }
}

impl std::fmt::Debug for WebSocketConnector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WebSocketConnector")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

fn required_header<'a>(
    headers: &'a HeaderMap,
    name: &'static str,
) -> std::result::Result<&'a str, ConnectionRejection> {
    headers
        .get(name)
        .and_then(|value| value.to_str().ok())
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .ok_or(ConnectionRejection::MissingHeader(name))
}

async fn process(
    State(connector): State<WebSocketConnector>,
    headers: HeaderMap,
    upgrade: std::result::Result<WebSocketUpgrade, WebSocketUpgradeRejection>,
) -> Response {
    let upgrade = match upgrade {
        Ok(upgrade) => upgrade,
        Err(rejection) => {
            debug!("Rejecting non-upgrade request: {}", rejection);
            return ConnectionRejection::UpgradeRequired.into_response();
        }
    };

    if let Err(rejection) = connector.authorize(&headers).await {
        warn!("Rejecting WebSocket connection: {:?}", rejection);
        return rejection.into_response();
    }

    upgrade.on_upgrade(move |socket| connector.serve(socket))
}

/// Build a client handshake request carrying credentials.
///
/// # Errors
///
/// Returns an error if `url` is not a valid WebSocket URL or a credential is
/// not a valid header value.
pub fn client_request(
    url: &str,
    token: &str,
    channel_id: &str,
) -> Result<http::Request<()>> {
    let mut request = url.into_client_request()?;
    let headers = request.headers_mut();
    headers.insert(AUTH_HEADER_NAME, HeaderValue::from_str(token)?);
    headers.insert(CHANNEL_ID_HEADER_NAME, HeaderValue::from_str(channel_id)?);
    Ok(request)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::{ClaimsIdentity, NoAuthentication};
    use async_trait::async_trait;
    use proven_streaming::{
        HandlerError, ReceiveRequest, RequestContext, RequestHandler, Response as StreamResponse,
    };

    enum Outcome {
        Accept,
        Reject,
        Fail,
    }

    struct Validator(Outcome);

    #[async_trait]
    impl AuthenticationValidator for Validator {
        async fn is_authentication_disabled(&self) -> bool {
            false
        }

        async fn validate_auth_header(
            &self,
            token: &str,
            channel_id: &str,
        ) -> std::result::Result<ClaimsIdentity, AuthError> {
            assert_eq!(token, "Bearer abc");
            assert_eq!(channel_id, "channel-1");
            match self.0 {
                Outcome::Accept => Ok(ClaimsIdentity::authenticated(Default::default())),
                Outcome::Reject => Ok(ClaimsIdentity::anonymous()),
                Outcome::Fail => Err(AuthError::Unavailable("down".to_string())),
            }
        }
    }

    struct Unused;

    #[async_trait]
    impl RequestHandler for Unused {
        async fn process_request(
            &self,
            _request: ReceiveRequest,
            _context: Option<&RequestContext>,
        ) -> std::result::Result<StreamResponse, HandlerError> {
            Err(HandlerError::internal("unused"))
        }
    }

    fn connector(validator: impl AuthenticationValidator) -> WebSocketConnector {
        WebSocketConnector::new(Arc::new(validator), Arc::new(|| Arc::new(Unused) as Arc<dyn RequestHandler>))
    }

    async fn body_text(rejection: ConnectionRejection) -> (StatusCode, String) {
        let response = rejection.into_response();
        let status = response.status();
        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        (status, String::from_utf8(body.to_vec()).unwrap())
    }

    fn headers(pairs: &[(&'static str, &'static str)]) -> HeaderMap {
        let mut headers = HeaderMap::new();
        for (name, value) in pairs {
            headers.insert(*name, HeaderValue::from_static(*value));
        }
        headers
    }

    #[tokio::test]
    async fn test_missing_authorization_header() {
        let rejection = connector(Validator(Outcome::Accept))
            .authorize(&headers(&[("channelid", "channel-1")]))
            .await
            .unwrap_err();

        assert!(matches!(rejection, ConnectionRejection::MissingHeader("authorization")));
        assert_eq!(
            body_text(rejection).await,
            (
                StatusCode::UNAUTHORIZED,
                "Unable to authenticate. Missing header: authorization".to_string()
            )
        );
    }

    #[tokio::test]
    async fn test_missing_or_blank_channel_id_header() {
        let connector = connector(Validator(Outcome::Accept));

        let rejection = connector
            .authorize(&headers(&[("authorization", "Bearer abc")]))
            .await
            .unwrap_err();
        assert!(matches!(rejection, ConnectionRejection::MissingHeader("channelid")));
        assert_eq!(
            body_text(rejection).await,
            (
                StatusCode::UNAUTHORIZED,
                "Unable to authenticate. Missing header: channelid".to_string()
            )
        );

        let rejection = connector
            .authorize(&headers(&[("authorization", "Bearer abc"), ("channelid", "  ")]))
            .await
            .unwrap_err();
        assert!(matches!(rejection, ConnectionRejection::MissingHeader("channelid")));
    }

    #[tokio::test]
    async fn test_headers_match_case_insensitively() {
        let mut headers = HeaderMap::new();
        headers.insert("Authorization", HeaderValue::from_static("Bearer abc"));
        headers.insert("ChannelId", HeaderValue::from_static("channel-1"));

        assert!(
            connector(Validator(Outcome::Accept))
                .authorize(&headers)
                .await
                .is_ok()
        );
    }

    #[tokio::test]
    async fn test_unauthenticated_identity() {
        let rejection = connector(Validator(Outcome::Reject))
            .authorize(&headers(&[
                ("authorization", "Bearer abc"),
                ("channelid", "channel-1"),
            ]))
            .await
            .unwrap_err();

        assert!(matches!(rejection, ConnectionRejection::Unauthenticated));
        assert_eq!(
            body_text(rejection).await,
            (
                StatusCode::UNAUTHORIZED,
                "Unauthorized connection attempt.".to_string()
            )
        );
    }

    #[tokio::test]
    async fn test_validator_failure() {
        let rejection = connector(Validator(Outcome::Fail))
            .authorize(&headers(&[
                ("authorization", "Bearer abc"),
                ("channelid", "channel-1"),
            ]))
            .await
            .unwrap_err();

        assert_eq!(
            body_text(rejection).await,
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                "Error while attempting to authorize connection.".to_string()
            )
        );
    }

    #[tokio::test]
    async fn test_disabled_authentication_needs_no_headers() {
        assert!(
            connector(NoAuthentication)
                .authorize(&HeaderMap::new())
                .await
                .is_ok()
        );
    }

    #[test]
    fn test_client_request_carries_credentials() {
        let request = client_request("ws://localhost:1/ws", "Bearer abc", "channel-1").unwrap();

        assert_eq!(request.headers()[AUTH_HEADER_NAME], "Bearer abc");
        assert_eq!(request.headers()[CHANNEL_ID_HEADER_NAME], "channel-1");
    }
}
