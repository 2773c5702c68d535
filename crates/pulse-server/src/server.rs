//! `PulseServer`: Axum HTTP + WebSocket server.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;

use axum::Router;
use axum::extract::ws::WebSocketUpgrade;
use axum::extract::{Query, State};
use axum::http::{HeaderValue, Method, StatusCode};
use axum::response::{IntoResponse, Json, Response};
use axum::routing::{get, post};
use metrics::counter;
use metrics_exporter_prometheus::PrometheusHandle;
use pulse_core::ids::Identity;
use pulse_signaling::SignalingHub;
use serde::Deserialize;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use crate::config::ServerConfig;
use crate::delivery::deliver_handler;
use crate::health::{self, HealthResponse};
use crate::metrics::WS_REJECTED_TOTAL;
use crate::shutdown::ShutdownCoordinator;
use crate::websocket::run_ws_session;

/// Shared state accessible from Axum handlers.
#[derive(Clone)]
pub struct AppState {
    /// Signaling hub (registry, calls, relay, fanout).
    pub hub: Arc<SignalingHub>,
    /// Server configuration.
    pub config: Arc<ServerConfig>,
    /// Shutdown coordinator.
    pub shutdown: Arc<ShutdownCoordinator>,
    /// When the server started.
    pub start_time: Instant,
    /// Prometheus handle, if a recorder was installed.
    pub metrics: Option<PrometheusHandle>,
}

/// Query string of `GET /ws`.
#[derive(Debug, Default, Deserialize)]
pub struct ConnectParams {
    /// Identity the client connects as.
    #[serde(rename = "userId")]
    pub user_id: Option<String>,
}

/// The Pulse gateway server.
pub struct PulseServer {
    config: Arc<ServerConfig>,
    hub: Arc<SignalingHub>,
    shutdown: Arc<ShutdownCoordinator>,
    start_time: Instant,
    metrics: Option<PrometheusHandle>,
}

impl PulseServer {
    /// Create a server around `hub`.
    pub fn new(config: ServerConfig, hub: Arc<SignalingHub>) -> Self {
        Self {
            config: Arc::new(config),
            hub,
            shutdown: Arc::new(ShutdownCoordinator::new()),
            start_time: Instant::now(),
            metrics: None,
        }
    }

    /// Serve `/metrics` from `handle`.
    #[must_use]
    pub fn with_metrics(mut self, handle: PrometheusHandle) -> Self {
        self.metrics = Some(handle);
        self
    }

    /// Build the Axum router with all routes.
    pub fn router(&self) -> Router {
        let state = AppState {
            hub: Arc::clone(&self.hub),
            config: Arc::clone(&self.config),
            shutdown: Arc::clone(&self.shutdown),
            start_time: self.start_time,
            metrics: self.metrics.clone(),
        };

        Router::new()
            .route("/health", get(health_handler))
            .route("/metrics", get(metrics_handler))
            .route("/ws", get(ws_handler))
            .route("/api/messages/deliver", post(deliver_handler))
            .layer(cors_layer(&self.config.cors_origins))
            .layer(TraceLayer::new_for_http())
            .with_state(state)
    }

    /// Bind, start the ring-timeout sweeper and serve until shutdown.
    ///
    /// Returns the bound address and the serving task.
    pub async fn listen(&self) -> std::io::Result<(SocketAddr, JoinHandle<()>)> {
        let listener = TcpListener::bind((self.config.host.as_str(), self.config.port)).await?;
        let addr = listener.local_addr()?;
        let router = self.router();
        let token = self.shutdown.token();
        let sweeper = self
            .hub
            .calls()
            .spawn_sweeper(self.config.sweep_interval, token.clone());

        info!(%addr, "pulse gateway listening");
        let handle = tokio::spawn(async move {
            let serve = axum::serve(listener, router).with_graceful_shutdown(token.cancelled_owned());
            if let Err(e) = serve.await {
                warn!(error = %e, "server stopped with error");
            }
            if let Some(sweeper) = sweeper {
                let _ = sweeper.await;
            }
            info!("pulse gateway stopped");
        });
        Ok((addr, handle))
    }

    /// The signaling hub.
    pub fn hub(&self) -> &Arc<SignalingHub> {
        &self.hub
    }

    /// The shutdown coordinator.
    pub fn shutdown(&self) -> &Arc<ShutdownCoordinator> {
        &self.shutdown
    }

    /// The server configuration.
    pub fn config(&self) -> &ServerConfig {
        &self.config
    }
}

fn cors_layer(origins: &[String]) -> CorsLayer {
    if origins.is_empty() {
        return CorsLayer::permissive();
    }
    let allowed: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|origin| match HeaderValue::from_str(origin) {
            Ok(value) => Some(value),
            Err(_) => {
                warn!(origin, "ignoring invalid CORS origin");
                None
            }
        })
        .collect();
    CorsLayer::new()
        .allow_origin(AllowOrigin::list(allowed))
        .allow_methods([Method::GET, Method::POST])
        .allow_headers(Any)
}

/// GET /health
async fn health_handler(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(health::health_check(state.start_time, &state.hub, state.config.max_connections))
}

/// GET /metrics
async fn metrics_handler(State(state): State<AppState>) -> Response {
    match &state.metrics {
        Some(handle) => crate::metrics::render(handle).into_response(),
        None => StatusCode::NOT_FOUND.into_response(),
    }
}

/// GET /ws?userId=<identity>
async fn ws_handler(
    ws: WebSocketUpgrade,
    Query(params): Query<ConnectParams>,
    State(state): State<AppState>,
) -> Response {
    let identity = params.user_id.as_deref().and_then(Identity::parse);

    if let Some(identity) = &identity {
        let registry = state.hub.registry();
        if registry.len() >= state.config.max_connections && registry.resolve(identity).is_none() {
            counter!(WS_REJECTED_TOTAL, "reason" => "capacity").increment(1);
            warn!(%identity, limit = state.config.max_connections, "connection limit reached");
            return (StatusCode::SERVICE_UNAVAILABLE, "connection limit reached").into_response();
        }
    }

    let max_message_size = state.config.max_message_size;
    ws.max_message_size(max_message_size)
        .on_upgrade(move |socket| run_ws_session(socket, identity, state))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::Request;
    use pulse_signaling::{CallCoordinator, ConnectionRegistry, CoordinatorConfig, StaticProfileDirectory};
    use serde_json::{Value, json};
    use tower::ServiceExt;

    fn make_server() -> PulseServer {
        let registry = Arc::new(ConnectionRegistry::new());
        let calls = Arc::new(CallCoordinator::new(
            Arc::clone(&registry),
            Arc::new(StaticProfileDirectory::new().with_identity_fallback()),
            CoordinatorConfig::default(),
        ));
        PulseServer::new(ServerConfig::default(), Arc::new(SignalingHub::new(registry, calls)))
    }

    async fn body_json(resp: Response) -> Value {
        let body = axum::body::to_bytes(resp.into_body(), 10_000).await.unwrap();
        serde_json::from_slice(&body).unwrap()
    }

    fn deliver(body: &str) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri("/api/messages/deliver")
            .header("content-type", "application/json")
            .body(Body::from(body.to_owned()))
            .unwrap()
    }

    #[test]
    fn default_config() {
        let server = make_server();
        assert_eq!(server.config().host, "127.0.0.1");
        assert_eq!(server.config().port, 0);
        assert!(!server.shutdown().is_shutting_down());
        assert!(server.hub().registry().is_empty());
    }

    #[tokio::test]
    async fn health_endpoint_returns_ok() {
        let app = make_server().router();
        let req = Request::builder().uri("/health").body(Body::empty()).unwrap();
        let resp = app.oneshot(req).await.unwrap();
        assert_eq!(resp.status(), StatusCode::OK);

        let json = body_json(resp).await;
        assert_eq!(json["status"], "ok");
        assert_eq!(json["connections"], 0);
        assert_eq!(json["active_calls"], 0);
        assert_eq!(json["max_connections"], 1000);
        assert_eq!(json["strict_transitions"], false);
    }

    #[tokio::test]
    async fn metrics_without_recorder_is_not_found() {
        let app = make_server().router();
        let req = Request::builder().uri("/metrics").body(Body::empty()).unwrap();
        let resp = app.oneshot(req).await.unwrap();
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn metrics_with_recorder_renders_text() {
        let handle = metrics_exporter_prometheus::PrometheusBuilder::new()
            .build_recorder()
            .handle();
        let app = make_server().with_metrics(handle).router();
        let req = Request::builder().uri("/metrics").body(Body::empty()).unwrap();
        let resp = app.oneshot(req).await.unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn ws_without_upgrade_headers_is_rejected() {
        let app = make_server().router();
        let req = Request::builder().uri("/ws?userId=a").body(Body::empty()).unwrap();
        let resp = app.oneshot(req).await.unwrap();
        assert!(resp.status().is_client_error());
    }

    #[tokio::test]
    async fn unknown_route_returns_404() {
        let app = make_server().router();
        let req = Request::builder().uri("/nope").body(Body::empty()).unwrap();
        let resp = app.oneshot(req).await.unwrap();
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn deliver_to_offline_recipient() {
        let app = make_server().router();
        let resp = app
            .oneshot(deliver(r#"{"receiverId":"bob","text":"hi"}"#))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(body_json(resp).await, json!({"delivered": false}));
    }

    #[tokio::test]
    async fn deliver_to_online_recipient() {
        let server = make_server();
        let (tx, mut rx) = tokio::sync::mpsc::channel(8);
        let bob = Arc::new(pulse_signaling::ClientConnection::new(Identity::from("bob"), tx));
        let _ = server.hub().connect(bob).unwrap();
        let _ = rx.try_recv();

        let resp = server
            .router()
            .oneshot(deliver(r#"{"receiverId":"bob","text":"hi"}"#))
            .await
            .unwrap();
        assert_eq!(body_json(resp).await, json!({"delivered": true}));

        let frame: Value = serde_json::from_str(&rx.try_recv().unwrap()).unwrap();
        assert_eq!(
            frame,
            json!({"event": "newMessage", "data": {"receiverId": "bob", "text": "hi"}})
        );
    }

    #[tokio::test]
    async fn deliver_without_receiver_is_bad_request() {
        let app = make_server().router();
        let resp = app.oneshot(deliver(r#"{"text":"hi"}"#)).await.unwrap();
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
        assert!(body_json(resp).await["error"].is_string());
    }

    #[tokio::test]
    async fn cors_preflight_is_answered() {
        let app = make_server().router();
        let req = Request::builder()
            .method("OPTIONS")
            .uri("/api/messages/deliver")
            .header("origin", "https://chat.example")
            .header("access-control-request-method", "POST")
            .body(Body::empty())
            .unwrap();
        let resp = app.oneshot(req).await.unwrap();
        assert!(resp.headers().contains_key("access-control-allow-origin"));
    }

    #[test]
    fn invalid_cors_origins_are_skipped() {
        let _ = cors_layer(&["https://ok.example".into(), "bad\norigin".into()]);
    }

    #[tokio::test]
    async fn listen_binds_and_stops_on_shutdown() {
        let server = make_server();
        let (addr, handle) = server.listen().await.unwrap();
        assert_ne!(addr.port(), 0);
        server.shutdown().shutdown();
        tokio::time::timeout(std::time::Duration::from_secs(5), handle)
            .await
            .unwrap()
            .unwrap();
    }
}
