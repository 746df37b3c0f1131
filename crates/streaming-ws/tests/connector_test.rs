//! Integration tests for the WebSocket connector.
//!
//! Tests include:
//! - Non-upgrade requests through the router
//! - Handshakes rejected for missing credentials
//! - Authenticated round trips in both directions

use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use axum::body::Body;
use http::{Request as HttpRequest, StatusCode};
use parking_lot::Mutex;
use proven_streaming::{
    HandlerError, HandlerFactory, ReceiveRequest, Request, RequestContext, RequestHandler,
    Response, TransportServer, async_trait,
};
use proven_streaming_ws::{
    AuthError, AuthenticationValidator, ClaimsIdentity, WebSocketChannel, WebSocketConnector,
    WebSocketServer, client_request,
};
use tokio::net::TcpListener;
use tokio_tungstenite::tungstenite;
use tower::ServiceExt;

struct Echo;

#[async_trait]
impl RequestHandler for Echo {
    async fn process_request(
        &self,
        mut request: ReceiveRequest,
        _context: Option<&RequestContext>,
    ) -> Result<Response, HandlerError> {
        let mut response = Response::new(StatusCode::OK);
        for stream in &mut request.streams {
            let text = stream.read_to_string().map_err(HandlerError::internal)?;
            response.set_body_text("text", text);
        }
        Ok(response)
    }
}

struct TokenValidator;

#[async_trait]
impl AuthenticationValidator for TokenValidator {
    async fn is_authentication_disabled(&self) -> bool {
        false
    }

    async fn validate_auth_header(
        &self,
        token: &str,
        channel_id: &str,
    ) -> Result<ClaimsIdentity, AuthError> {
        if token == "Bearer good" {
            let claims = [("channel".to_string(), channel_id.to_string())].into();
            Ok(ClaimsIdentity::authenticated(claims))
        } else {
            Ok(ClaimsIdentity::anonymous())
        }
    }
}

struct Harness {
    addr: SocketAddr,
    handlers_built: Arc<AtomicUsize>,
    servers: Arc<Mutex<Vec<WebSocketServer>>>,
}

fn connector(handlers_built: Arc<AtomicUsize>, servers: Arc<Mutex<Vec<WebSocketServer>>>) -> WebSocketConnector {
    let factory: HandlerFactory = Arc::new(move || {
        handlers_built.fetch_add(1, Ordering::SeqCst);
        Arc::new(Echo) as Arc<dyn RequestHandler>
    });

    WebSocketConnector::new(Arc::new(TokenValidator), factory).with_server_hook(Arc::new(
        move |server: WebSocketServer| servers.lock().push(server),
    ))
}

async fn serve() -> Harness {
    let handlers_built = Arc::new(AtomicUsize::new(0));
    let servers = Arc::new(Mutex::new(Vec::new()));
    let router = connector(handlers_built.clone(), servers.clone()).router("/ws");

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });

    Harness {
        addr,
        handlers_built,
        servers,
    }
}

fn rejected_status(result: proven_streaming_ws::Result<WebSocketChannel>) -> StatusCode {
    match result {
        Err(proven_streaming_ws::Error::Handshake(err)) => match *err {
            tungstenite::Error::Http(response) => response.status(),
            other => panic!("unexpected handshake error: {other}"),
        },
        Err(other) => panic!("unexpected error: {other}"),
        Ok(_) => panic!("handshake unexpectedly succeeded"),
    }
}

#[tracing_test::traced_test]
#[tokio::test]
async fn test_non_upgrade_request_is_rejected() {
    let router = connector(Arc::new(AtomicUsize::new(0)), Arc::default()).router("/ws");

    let response = router
        .oneshot(HttpRequest::get("/ws").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    assert_eq!(&body[..], b"Upgrade to WebSocket is required.");
}

#[tracing_test::traced_test]
#[tokio::test]
async fn test_missing_credentials_reject_handshake() {
    let harness = serve().await;
    let url = format!("ws://{}/ws", harness.addr);

    let status = rejected_status(WebSocketChannel::connect(url.as_str()).await);
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let mut request = client_request(&url, "Bearer good", "channel-1").unwrap();
    request.headers_mut().remove("channelid");
    let status = rejected_status(WebSocketChannel::connect(request).await);
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let request = client_request(&url, "Bearer bad", "channel-1").unwrap();
    let status = rejected_status(WebSocketChannel::connect(request).await);
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    assert_eq!(harness.handlers_built.load(Ordering::SeqCst), 0);
    assert!(harness.servers.lock().is_empty());
}

#[tracing_test::traced_test]
#[tokio::test]
async fn test_authenticated_round_trip() {
    let harness = serve().await;
    let url = format!("ws://{}/ws", harness.addr);

    let channel = WebSocketChannel::connect(client_request(&url, "Bearer good", "channel-1").unwrap())
        .await
        .unwrap();
    let client = TransportServer::builder(channel, Arc::new(Echo))
        .config(proven_streaming::TransportConfig::default().with_auto_reconnect(false))
        .build();
    client.start().await.unwrap();

    let mut request = Request::post("/messages");
    request.set_body_text("text", "ping");
    let mut response = client.send(request, None).await.unwrap();
    assert_eq!(response.status(), Some(StatusCode::OK));
    assert_eq!(response.streams[0].read_to_string().unwrap(), "ping");
    assert_eq!(harness.handlers_built.load(Ordering::SeqCst), 1);

    // The accepting side can initiate requests too.
    let server = loop {
        if let Some(server) = harness.servers.lock().first().cloned() {
            break server;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    };
    let mut request = Request::get("/from-server");
    request.set_body_text("text", "pong");
    let mut response = server.send(request, None).await.unwrap();
    assert_eq!(response.streams[0].read_to_string().unwrap(), "pong");

    // Closing the client ends the server's connection without reconnecting.
    let mut events = server.subscribe();
    client.disconnect();
    tokio::time::timeout(Duration::from_secs(2), events.recv())
        .await
        .unwrap()
        .unwrap();
    assert!(!server.is_connected());
}
