//! HTTP transport for the JSON-RPC tool server: request dispatch,
//! SSE/health endpoints, and graceful shutdown.

use super::envelope::{RpcError, RpcRequest, RpcResponse, INTERNAL_ERROR, INVALID_PARAMS, METHOD_NOT_FOUND};
use super::registry::ToolRegistry;
use super::sse::SseMultiplexer;
use crate::auth::{AuthPipeline, AuthRequest};
use crate::metrics::Metrics;
use futures::StreamExt;
use axum::body::Bytes;
use axum::extract::{ConnectInfo, Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Json, Response};
use axum::routing::{get, post};
use axum::Router as AxumRouter;
use serde_json::Value;
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ServerState {
    Created = 0,
    Listening = 1,
    Accepting = 2,
    ShuttingDown = 3,
    Stopped = 4,
}

pub struct ToolServer {
    pub registry: Arc<ToolRegistry>,
    pub sse: Arc<SseMultiplexer>,
    pub auth: Arc<AuthPipeline>,
    pub call_timeout: Duration,
    pub heartbeat_interval: Duration,
    pub started_at: Instant,
    pub metrics: Arc<Metrics>,
    state: AtomicU8,
}

#[derive(Clone)]
struct AppState {
    server: Arc<ToolServer>,
}

impl ToolServer {
    pub fn new(
        registry: Arc<ToolRegistry>,
        sse: Arc<SseMultiplexer>,
        auth: Arc<AuthPipeline>,
        call_timeout: Duration,
        heartbeat_interval: Duration,
        metrics: Arc<Metrics>,
    ) -> Self {
        Self {
            registry,
            sse,
            auth,
            call_timeout,
            heartbeat_interval,
            started_at: Instant::now(),
            metrics,
            state: AtomicU8::new(ServerState::Created as u8),
        }
    }

    pub fn state(&self) -> ServerState {
        match self.state.load(Ordering::SeqCst) {
            0 => ServerState::Created,
            1 => ServerState::Listening,
            2 => ServerState::Accepting,
            3 => ServerState::ShuttingDown,
            _ => ServerState::Stopped,
        }
    }

    fn set_state(&self, s: ServerState) {
        self.state.store(s as u8, Ordering::SeqCst);
    }

    pub fn router(self: Arc<Self>) -> AxumRouter {
        let cors = CorsLayer::new().allow_origin(Any).allow_methods(Any).allow_headers(Any);
        let state = AppState { server: self };
        AxumRouter::new()
            .route("/", post(handle_rpc))
            .route("/health", get(handle_health))
            .route("/metrics", get(handle_metrics))
            .route("/sse", get(handle_sse))
            .route("/events", get(handle_sse))
            .route("/sse/info", get(handle_sse_info))
            .route("/login", get(handle_oauth_stub))
            .route("/callback", get(handle_oauth_stub))
            .layer(cors)
            .layer(TraceLayer::new_for_http())
            .with_state(state)
    }

    pub async fn start(self: Arc<Self>, addr: std::net::SocketAddr) -> anyhow::Result<()> {
        self.set_state(ServerState::Listening);
        let listener = tokio::net::TcpListener::bind(addr).await?;
        tracing::info!(%addr, "tool server listening");
        self.set_state(ServerState::Accepting);
        let router = self.clone().router();
        let shutdown_signal = {
            let server = self.clone();
            async move {
                let _ = tokio::signal::ctrl_c().await;
                server.set_state(ServerState::ShuttingDown);
                tracing::info!("tool server received shutdown signal");
            }
        };

        let heartbeat = {
            let sse = self.sse.clone();
            let interval = self.heartbeat_interval;
            tokio::spawn(async move {
                let mut ticker = tokio::time::interval(interval);
                loop {
                    ticker.tick().await;
                    sse.broadcast_heartbeat();
                }
            })
        };

        axum::serve(listener, router.into_make_service_with_connect_info::<SocketAddr>())
            .with_graceful_shutdown(shutdown_signal)
            .await?;
        heartbeat.abort();
        self.set_state(ServerState::Stopped);
        Ok(())
    }
}

fn headers_to_whitelisted_map(headers: &HeaderMap) -> HashMap<String, String> {
    headers
        .iter()
        .filter_map(|(k, v)| v.to_str().ok().map(|v| (k.to_string(), v.to_string())))
        .collect()
}

async fn handle_rpc(
    State(state): State<AppState>,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    state.server.metrics.inc_requests_total();
    state.server.metrics.inc_requests_in_flight();

    let raw = String::from_utf8_lossy(&body);
    let request = match RpcRequest::parse(&raw) {
        Ok(req) => req,
        Err(err) => {
            state.server.metrics.dec_requests_in_flight();
            state.server.metrics.inc_errors();
            return Json(RpcResponse::failure(Value::Null, err)).into_response();
        }
    };

    let remote_addr = peer.to_string();
    let req = AuthRequest {
        remote_addr: &remote_addr,
        forwarded_for: headers.get("x-forwarded-for").and_then(|v| v.to_str().ok()),
        real_ip: headers.get("x-real-ip").and_then(|v| v.to_str().ok()),
        authorization: headers.get("authorization").and_then(|v| v.to_str().ok()),
        path: "/",
        user_agent: headers.get("user-agent").and_then(|v| v.to_str().ok()),
        headers: headers_to_whitelisted_map(&headers),
    };
    let decision = state.server.auth.evaluate(&req);
    if !decision.allowed {
        let status = if req.authorization.is_some() {
            StatusCode::UNAUTHORIZED
        } else {
            StatusCode::FORBIDDEN
        };
        state.server.metrics.dec_requests_in_flight();
        state.server.metrics.inc_errors();
        return (status, Json(serde_json::json!({"error": "access denied"}))).into_response();
    }

    let response = dispatch(&state.server, request).await;
    state.server.metrics.dec_requests_in_flight();
    if response.error.is_some() {
        state.server.metrics.inc_errors();
    }
    // All well-formed JSON-RPC calls return HTTP 200 with an
    // envelope-level error, never an HTTP error status.
    (StatusCode::OK, Json(response)).into_response()
}

async fn dispatch(server: &Arc<ToolServer>, request: RpcRequest) -> RpcResponse {
    match request.method.as_str() {
        "tools/list" => {
            let tools = server.registry.list_tools();
            RpcResponse::success(request.id, serde_json::json!({"tools": tools}))
        }
        "tools/call" => {
            let name = request.params.get("name").and_then(Value::as_str);
            let arguments = request.params.get("arguments").cloned().unwrap_or(Value::Null);
            let Some(name) = name else {
                return RpcResponse::failure(request.id, RpcError::new(INVALID_PARAMS, "missing 'name' parameter"));
            };

            server.sse.broadcast(super::sse::SseEvent::new(
                "tool_execution_start",
                serde_json::json!({"tool": name, "id": request.id}),
            ));
            let started = Instant::now();

            let outcome = server.registry.execute_tool(name, arguments, server.call_timeout).await;

            let (response, succeeded) = match outcome {
                Some(result) => match serde_json::to_value(&result) {
                    Ok(value) => (RpcResponse::success(request.id.clone(), value), !result.is_error),
                    Err(e) => (RpcResponse::failure(request.id.clone(), RpcError::new(INTERNAL_ERROR, e.to_string())), false),
                },
                None => (
                    RpcResponse::failure(request.id.clone(), RpcError::new(METHOD_NOT_FOUND, format!("unknown tool: {name}"))),
                    false,
                ),
            };

            server.sse.broadcast(super::sse::SseEvent::new(
                "tool_execution",
                serde_json::json!({
                    "tool": name,
                    "id": request.id,
                    "succeeded": succeeded,
                    "duration_ms": started.elapsed().as_millis() as u64,
                }),
            ));

            response
        }
        other => RpcResponse::failure(request.id, RpcError::new(METHOD_NOT_FOUND, format!("unknown method: {other}"))),
    }
}

async fn handle_health(State(state): State<AppState>) -> Json<Value> {
    Json(serde_json::json!({
        "status": "ok",
        "timestamp": chrono::Utc::now().to_rfc3339(),
        "version": env!("CARGO_PKG_VERSION"),
        "tools": state.server.registry.list_tools().len(),
        "uptime_seconds": state.server.started_at.elapsed().as_secs(),
    }))
}

async fn handle_metrics(State(state): State<AppState>) -> Response {
    (
        StatusCode::OK,
        [(axum::http::header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        state.server.metrics.render(),
    )
        .into_response()
}

async fn handle_sse_info(State(state): State<AppState>) -> Json<Value> {
    Json(serde_json::json!({"client_count": state.server.sse.client_count()}))
}

async fn handle_sse(State(state): State<AppState>, Query(params): Query<HashMap<String, String>>) -> Response {
    let filter = params.get("filter").map(|f| f.split(',').map(|s| s.to_string()).collect());
    let Some((client_id, mut rx)) = state.server.sse.register(filter) else {
        return (StatusCode::SERVICE_UNAVAILABLE, "max clients reached").into_response();
    };

    // Unregisters the client from the multiplexer when the stream (and
    // therefore the connection) is dropped, not just on graceful close.
    struct ClientGuard {
        sse: Arc<SseMultiplexer>,
        client_id: u64,
        rx: tokio::sync::mpsc::Receiver<super::sse::SseEvent>,
    }
    impl Drop for ClientGuard {
        fn drop(&mut self) {
            self.sse.unregister(self.client_id);
        }
    }

    let mut guard = ClientGuard {
        sse: state.server.sse.clone(),
        client_id,
        rx,
    };
    let connected = futures::stream::once(async move {
        axum::response::sse::Event::default()
            .event("connected")
            .data(serde_json::json!({"client_id": client_id}).to_string())
    });
    let forwarded = futures::stream::poll_fn(move |cx| guard.rx.poll_recv(cx)).map(|event| {
        let mut sse_event = axum::response::sse::Event::default().data(event.data.to_string());
        if let Some(t) = event.event_type {
            sse_event = sse_event.event(t);
        }
        sse_event
    });
    let stream = connected.chain(forwarded).map(Ok::<_, std::convert::Infallible>);

    axum::response::sse::Sse::new(stream).into_response()
}

async fn handle_oauth_stub() -> &'static str {
    "OAuth flow is an external collaborator; this endpoint is exempted from auth enforcement."
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::ip_classifier::IpClassifier;
    use crate::config::AuthMethodConfig;
    use crate::rpc::registry::ToolHandler;
    use async_trait::async_trait;
    use std::time::Duration;

    struct EchoHandler;

    #[async_trait]
    impl ToolHandler for EchoHandler {
        async fn call(&self, arguments: Value) -> crate::model::ToolCallResult {
            crate::model::ToolCallResult::structured(arguments)
        }
    }

    fn test_server() -> Arc<ToolServer> {
        let registry = Arc::new(ToolRegistry::new(""));
        registry.register_tool(
            "echo",
            crate::model::ToolDefinition {
                name: "echo".to_string(),
                description: "echoes input".to_string(),
                input_schema: serde_json::json!({}),
            },
            Arc::new(EchoHandler),
            None,
        );
        let metrics = Arc::new(crate::metrics::Metrics::new());
        let sse = Arc::new(SseMultiplexer::new(1000, 50, 100, metrics.clone()));
        let allowlist = IpClassifier::new(1000, Duration::from_secs(300));
        allowlist.add("0.0.0.0/0").unwrap();
        let auth = Arc::new(AuthPipeline {
            method: AuthMethodConfig::Ip,
            allowlist,
            trusted_proxies: IpClassifier::new(1000, Duration::from_secs(300)),
            bypass: None,
            oidc: None,
            audit_log: false,
            metrics: metrics.clone(),
        });
        Arc::new(ToolServer::new(registry, sse, auth, Duration::from_secs(5), Duration::from_secs(30), metrics))
    }

    #[tokio::test]
    async fn dispatch_tools_list_returns_registered_tools() {
        let server = test_server();
        let request = RpcRequest {
            version: "2.0".to_string(),
            id: Value::from(1),
            method: "tools/list".to_string(),
            params: Value::Null,
        };
        let response = dispatch(&server, request).await;
        assert!(response.error.is_none());
        assert_eq!(response.result.unwrap()["tools"].as_array().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn dispatch_unknown_method_yields_method_not_found() {
        let server = test_server();
        let request = RpcRequest {
            version: "2.0".to_string(),
            id: Value::from(2),
            method: "unknown".to_string(),
            params: Value::Null,
        };
        let response = dispatch(&server, request).await;
        assert_eq!(response.error.unwrap().code, METHOD_NOT_FOUND);
    }

    #[tokio::test]
    async fn dispatch_tools_call_missing_name_is_invalid_params() {
        let server = test_server();
        let request = RpcRequest {
            version: "2.0".to_string(),
            id: Value::from(3),
            method: "tools/call".to_string(),
            params: serde_json::json!({}),
        };
        let response = dispatch(&server, request).await;
        assert_eq!(response.error.unwrap().code, INVALID_PARAMS);
    }

    #[test]
    fn fresh_server_state_is_created() {
        let server = test_server();
        assert_eq!(server.state(), ServerState::Created);
    }
}
