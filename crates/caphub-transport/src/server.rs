//! HTTP transport server using Axum.
//!
//! Resolves the session id and identity headers, parses JSON-RPC envelopes,
//! and streams push events for listen connections.

use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use axum::{
    Router,
    body::Body,
    extract::State,
    http::{HeaderMap, HeaderValue, StatusCode, header},
    response::{IntoResponse, Json, Response},
    routing::get,
};
use bytes::Bytes;
use caphub_protocol::{
    CapError, HandlerResult, Identity, Methods, RequestContext, RequestId, RpcRequest,
    RpcResponse,
};
use serde_json::{json, Value};
use tokio::sync::mpsc;
use tower_http::cors::CorsLayer;
use tracing::{debug, info, warn};

use crate::channel::PushReceiver;

/// Header carrying the opaque session id.
pub const SESSION_HEADER: &str = "mcp-session-id";

/// Identity headers forwarded by the upstream credential check.
pub const USER_ID_HEADER: &str = "x-user-id";
pub const USERNAME_HEADER: &str = "x-username";
pub const USER_ROLE_HEADER: &str = "x-user-role";

/// Trait implemented by the session server to handle transport operations.
pub trait RequestHandler: Send + Sync + 'static {
    /// Handle a JSON-RPC request on the send operation.
    fn handle_request(
        &self,
        ctx: RequestContext,
        method: &str,
        params: Option<Value>,
    ) -> impl std::future::Future<Output = HandlerResult> + Send;

    /// Bind a new push connection to `ctx.session_id`.
    fn open_listener(&self, ctx: RequestContext) -> Result<PushReceiver, CapError>;

    /// End the session. Unknown ids are a no-op.
    fn terminate(&self, session_id: &str);

    /// Number of live sessions (for the health check).
    fn session_count(&self) -> usize;
}

/// Transport server configuration.
#[derive(Debug, Clone)]
pub struct TransportConfig {
    /// Port to listen on (0 for OS-assigned)
    pub port: u16,
    /// Hostname to bind to
    pub hostname: String,
    /// Enable permissive CORS
    pub enable_cors: bool,
    /// Maximum concurrent listen connections
    pub max_connections: Option<usize>,
    /// Reject requests that carry no identity headers
    pub require_identity: bool,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            port: 7070,
            hostname: "127.0.0.1".into(),
            enable_cors: false,
            max_connections: Some(64),
            require_identity: false,
        }
    }
}

/// Shared state for the transport server.
struct AppState<H: RequestHandler> {
    handler: Arc<H>,
    config: TransportConfig,
    /// Open listen connections
    listener_count: Arc<AtomicUsize>,
}

/// The transport server — owns the listening socket and the serve task.
pub struct TransportServer {
    /// Shutdown signal
    shutdown_tx: Option<mpsc::Sender<()>>,
    /// Server task handle
    handle: Option<tokio::task::JoinHandle<()>>,
    /// Actual bound port
    port: u16,
}

impl TransportServer {
    /// Start the transport server with the given request handler.
    pub async fn start<H: RequestHandler>(
        config: TransportConfig,
        handler: Arc<H>,
    ) -> Result<Self, Box<dyn std::error::Error + Send + Sync>> {
        let (shutdown_tx, mut shutdown_rx) = mpsc::channel(1);

        let app = router(config.clone(), handler);

        let addr: SocketAddr = format!("{}:{}", config.hostname, config.port).parse()?;
        let listener = tokio::net::TcpListener::bind(addr).await?;
        let actual_port = listener.local_addr()?.port();

        info!("caphub transport listening on http://{}:{}/mcp", config.hostname, actual_port);

        let handle = tokio::spawn(async move {
            axum::serve(listener, app)
                .with_graceful_shutdown(async move {
                    let _ = shutdown_rx.recv().await;
                })
                .await
                .ok();
        });

        Ok(Self {
            shutdown_tx: Some(shutdown_tx),
            handle: Some(handle),
            port: actual_port,
        })
    }

    /// Get the actual bound port.
    pub fn port(&self) -> u16 {
        self.port
    }

    /// Gracefully stop the server.
    pub async fn stop(&mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(()).await;
        }
        if let Some(handle) = self.handle.take() {
            let _ = handle.await;
        }
        info!("caphub transport server stopped");
    }
}

/// Build the axum router. Exposed separately so it can be driven without a socket.
pub fn router<H: RequestHandler>(config: TransportConfig, handler: Arc<H>) -> Router {
    let enable_cors = config.enable_cors;
    let state = Arc::new(AppState {
        handler,
        config,
        listener_count: Arc::new(AtomicUsize::new(0)),
    });

    let app = Router::new()
        .route(
            "/mcp",
            get(listen_handler::<H>)
                .post(send_handler::<H>)
                .delete(terminate_handler::<H>),
        )
        .route("/health", get(health_handler::<H>))
        .with_state(state);

    if enable_cors {
        app.layer(CorsLayer::permissive())
    } else {
        app
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// HTTP Handlers
// ─────────────────────────────────────────────────────────────────────────────

async fn send_handler<H: RequestHandler>(
    State(state): State<Arc<AppState<H>>>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let identity = identity_from_headers(&headers);
    if state.config.require_identity && identity.is_none() {
        return error_response(StatusCode::UNAUTHORIZED, None, CapError::authentication_required());
    }

    let parsed: Value = match serde_json::from_slice(&body) {
        Ok(v) => v,
        Err(_) => {
            return error_response(
                StatusCode::BAD_REQUEST,
                None,
                CapError::parse_error("Failed to parse JSON"),
            );
        }
    };

    let id: Option<RequestId> = parsed.get("id").cloned().and_then(|v| serde_json::from_value(v).ok());
    let request = match serde_json::from_value::<RpcRequest>(parsed) {
        Ok(r) if r.is_valid() => r,
        _ => {
            return error_response(
                StatusCode::BAD_REQUEST,
                id,
                CapError::invalid_request("Invalid JSON-RPC 2.0 request"),
            );
        }
    };

    // Only initialize may open a session without naming one.
    let (session_id, new_session) = match session_id_from_headers(&headers) {
        Some(id) => (id, false),
        None if request.method == Methods::INITIALIZE => (uuid::Uuid::new_v4().to_string(), true),
        None => {
            return error_response(
                StatusCode::BAD_REQUEST,
                request.response_id(),
                CapError::missing_session(),
            );
        }
    };
    let ctx = RequestContext {
        session_id: session_id.clone(),
        new_session,
        identity,
    };

    debug!("{session_id} → {}", request.method);
    let is_notification = request.is_notification();
    let response_id = request.response_id();
    let result = state
        .handler
        .handle_request(ctx, &request.method, request.params)
        .await;

    let mut response = if is_notification {
        if let Err(e) = result {
            debug!("Notification {} failed: {e}", request.method);
        }
        StatusCode::ACCEPTED.into_response()
    } else {
        Json(RpcResponse::from_result(response_id, result)).into_response()
    };
    if let Ok(value) = HeaderValue::from_str(&session_id) {
        response.headers_mut().insert(SESSION_HEADER, value);
    }
    response
}

async fn listen_handler<H: RequestHandler>(
    State(state): State<Arc<AppState<H>>>,
    headers: HeaderMap,
) -> Response {
    let identity = identity_from_headers(&headers);
    if state.config.require_identity && identity.is_none() {
        return error_response(StatusCode::UNAUTHORIZED, None, CapError::authentication_required());
    }
    let Some(session_id) = session_id_from_headers(&headers) else {
        return error_response(StatusCode::BAD_REQUEST, None, CapError::missing_session());
    };

    if let Some(max) = state.config.max_connections {
        let current = state.listener_count.load(Ordering::Relaxed);
        if current >= max {
            warn!("Listen rejected: max connections reached ({max})");
            return error_response(
                StatusCode::SERVICE_UNAVAILABLE,
                None,
                CapError::server_error("Too many open connections"),
            );
        }
    }

    let ctx = RequestContext::new(session_id.clone()).with_identity(identity);
    let receiver = match state.handler.open_listener(ctx) {
        Ok(r) => r,
        Err(e) => return error_response(StatusCode::BAD_REQUEST, None, e),
    };

    let guard = ListenerGuard::new(state.listener_count.clone());
    info!("Listen connection opened: {session_id} (total: {})", guard.current());
    let stream = futures_util::stream::unfold((receiver, guard), |(mut rx, guard)| async move {
        rx.recv()
            .await
            .map(|line| (Ok::<_, Infallible>(Bytes::from(line)), (rx, guard)))
    });

    let mut response = Body::from_stream(stream).into_response();
    let headers = response.headers_mut();
    headers.insert(header::CONTENT_TYPE, HeaderValue::from_static("application/x-ndjson"));
    headers.insert(header::CACHE_CONTROL, HeaderValue::from_static("no-cache"));
    if let Ok(value) = HeaderValue::from_str(&session_id) {
        headers.insert(SESSION_HEADER, value);
    }
    response
}

async fn terminate_handler<H: RequestHandler>(
    State(state): State<Arc<AppState<H>>>,
    headers: HeaderMap,
) -> Response {
    let Some(session_id) = session_id_from_headers(&headers) else {
        return error_response(StatusCode::BAD_REQUEST, None, CapError::missing_session());
    };
    state.handler.terminate(&session_id);
    StatusCode::NO_CONTENT.into_response()
}

async fn health_handler<H: RequestHandler>(
    State(state): State<Arc<AppState<H>>>,
) -> impl IntoResponse {
    Json(json!({
        "status": "ok",
        "sessions": state.handler.session_count(),
        "listeners": state.listener_count.load(Ordering::Relaxed),
    }))
}

// ─────────────────────────────────────────────────────────────────────────────
// Helpers
// ─────────────────────────────────────────────────────────────────────────────

/// Decrements the listener count when the response body is dropped.
struct ListenerGuard(Arc<AtomicUsize>);

impl ListenerGuard {
    fn new(count: Arc<AtomicUsize>) -> Self {
        count.fetch_add(1, Ordering::Relaxed);
        Self(count)
    }

    fn current(&self) -> usize {
        self.0.load(Ordering::Relaxed)
    }
}

impl Drop for ListenerGuard {
    fn drop(&mut self) {
        let remaining = self.0.fetch_sub(1, Ordering::Relaxed).saturating_sub(1);
        debug!("Listen connection closed (remaining: {remaining})");
    }
}

fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
}

fn session_id_from_headers(headers: &HeaderMap) -> Option<String> {
    header_str(headers, SESSION_HEADER).map(str::to_string)
}

fn identity_from_headers(headers: &HeaderMap) -> Option<Identity> {
    let user_id = header_str(headers, USER_ID_HEADER)?;
    Some(Identity {
        user_id: user_id.to_string(),
        username: header_str(headers, USERNAME_HEADER).map(str::to_string),
        role: header_str(headers, USER_ROLE_HEADER).map(str::to_string),
    })
}

fn error_response(status: StatusCode, id: Option<RequestId>, error: CapError) -> Response {
    (status, Json(RpcResponse::error(id, error))).into_response()
}
