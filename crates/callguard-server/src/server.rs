//! `AlertServer`: Axum HTTP + WebSocket server.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::Router;
use axum::body::Bytes;
use axum::extract::State;
use axum::extract::ws::WebSocketUpgrade;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use axum::routing::{get, post};
use callguard_core::CallDedupTracker;
use callguard_settings::CallguardSettings;
use metrics::counter;
use metrics_exporter_prometheus::PrometheusHandle;
use serde_json::{Value, json};
use tokio::net::TcpListener;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{debug, error, info};

use crate::agent::{AgentDispatch, VapiAgentClient};
use crate::config::ServerConfig;
use crate::dispatcher::EventDispatcher;
use crate::errors::ServerError;
use crate::health::{self, HealthResponse};
use crate::metrics::WEBHOOK_EVENTS_TOTAL;
use crate::processor::{WebhookProcessor, WebhookReply};
use crate::pruner::run_dedup_pruner;
use crate::shutdown::{DEFAULT_SHUTDOWN_TIMEOUT, ShutdownCoordinator, ShutdownReport};
use crate::websocket::handler::handle_socket;
use crate::websocket::heartbeat::run_liveness_sweep;
use crate::websocket::registry::ListenerRegistry;

/// Shared state accessible from Axum handlers.
#[derive(Clone)]
pub struct AppState {
    /// Webhook processor.
    pub processor: Arc<WebhookProcessor>,
    /// Event dispatcher, for the operator test alert.
    pub dispatcher: EventDispatcher,
    /// Registered listeners.
    pub registry: Arc<ListenerRegistry>,
    /// Alerted-call tracker.
    pub dedup: Arc<CallDedupTracker>,
    /// Prometheus handle, when a recorder is installed.
    pub metrics: Option<PrometheusHandle>,
    /// When the server started.
    pub start_time: Instant,
    /// Per-listener outbound queue capacity.
    pub send_queue_capacity: usize,
}

/// The alert relay server.
pub struct AlertServer {
    config: ServerConfig,
    registry: Arc<ListenerRegistry>,
    dedup: Arc<CallDedupTracker>,
    dispatcher: EventDispatcher,
    processor: Arc<WebhookProcessor>,
    shutdown: Arc<ShutdownCoordinator>,
    metrics: Option<PrometheusHandle>,
    start_time: Instant,
}

impl AlertServer {
    /// Create a server. `agent` receives dispatch requests for alerted calls.
    pub fn new(config: ServerConfig, agent: Option<Arc<dyn AgentDispatch>>) -> Self {
        let registry = Arc::new(ListenerRegistry::new());
        let dedup = Arc::new(CallDedupTracker::new());
        let dispatcher = EventDispatcher::new(Arc::clone(&registry));
        let processor = Arc::new(WebhookProcessor::new(
            config.processor_rules(),
            Arc::clone(&dedup),
            dispatcher.clone(),
            agent,
        ));
        Self {
            config,
            registry,
            dedup,
            dispatcher,
            processor,
            shutdown: Arc::new(ShutdownCoordinator::new()),
            metrics: None,
            start_time: Instant::now(),
        }
    }

    /// Create a server from loaded settings, wiring the agent client when
    /// credentials are configured.
    pub fn from_settings(settings: &CallguardSettings) -> Result<Self, ServerError> {
        let agent = VapiAgentClient::from_settings(&settings.agent)?
            .map(|client| Arc::new(client) as Arc<dyn AgentDispatch>);
        Ok(Self::new(ServerConfig::from(settings), agent))
    }

    /// Serve `/metrics` from this handle.
    #[must_use]
    pub fn with_metrics(mut self, handle: PrometheusHandle) -> Self {
        self.metrics = Some(handle);
        self
    }

    /// Build the Axum router with all routes.
    pub fn router(&self) -> Router {
        let state = AppState {
            processor: Arc::clone(&self.processor),
            dispatcher: self.dispatcher.clone(),
            registry: Arc::clone(&self.registry),
            dedup: Arc::clone(&self.dedup),
            metrics: self.metrics.clone(),
            start_time: self.start_time,
            send_queue_capacity: self.config.send_queue_capacity,
        };

        Router::new()
            .route("/", get(ws_handler))
            .route("/ws", get(ws_handler))
            .route("/vapi-webhook", post(webhook_handler))
            .route("/test-alert", post(test_alert_handler))
            .route("/health", get(health_handler))
            .route("/metrics", get(metrics_handler))
            .with_state(state)
            .layer(TraceLayer::new_for_http())
            .layer(CorsLayer::permissive())
    }

    /// Bind, serve, and start the background sweep and prune tasks.
    pub async fn listen(&self) -> Result<ServerHandle, ServerError> {
        let addr = format!("{}:{}", self.config.host, self.config.port);
        let listener = TcpListener::bind(&addr)
            .await
            .map_err(|source| ServerError::Bind {
                addr: addr.clone(),
                source,
            })?;
        let local_addr = listener.local_addr()?;

        let router = self.router();
        let token = self.shutdown.token();
        self.shutdown.track("http", tokio::spawn(async move {
            let shutdown = async move { token.cancelled().await };
            if let Err(e) = axum::serve(listener, router)
                .with_graceful_shutdown(shutdown)
                .await
            {
                error!(error = %e, "http server terminated");
            }
        }));

        self.shutdown.track("liveness-sweep", tokio::spawn({
            let registry = Arc::clone(&self.registry);
            let interval = self.config.sweep_interval();
            let token = self.shutdown.token();
            async move {
                let exit = run_liveness_sweep(registry, interval, token).await;
                debug!(?exit, "liveness sweep stopped");
            }
        }));

        self.shutdown.track(
            "dedup-prune",
            tokio::spawn(run_dedup_pruner(
                Arc::clone(&self.dedup),
                self.config.dedup_ttl(),
                self.config.dedup_prune_interval(),
                self.shutdown.token(),
            )),
        );

        let base = self.config.display_base_url(local_addr.port());
        info!(addr = %local_addr, "callguard server listening");
        info!("webhook endpoint: {base}/vapi-webhook");
        info!("listener channel: {}/ws", base.replacen("http", "ws", 1));
        info!("health check:     {base}/health");
        info!(
            keywords = self.config.keywords.len(),
            agent_dispatch = self.processor.agent_enabled(),
            "detection configured"
        );

        Ok(ServerHandle {
            local_addr,
            shutdown: Arc::clone(&self.shutdown),
            registry: Arc::clone(&self.registry),
        })
    }

    /// Listener registry.
    pub fn registry(&self) -> &Arc<ListenerRegistry> {
        &self.registry
    }

    /// Alerted-call tracker.
    pub fn dedup(&self) -> &Arc<CallDedupTracker> {
        &self.dedup
    }

    /// Event dispatcher.
    pub fn dispatcher(&self) -> &EventDispatcher {
        &self.dispatcher
    }

    /// Shutdown coordinator.
    pub fn shutdown(&self) -> &Arc<ShutdownCoordinator> {
        &self.shutdown
    }

    /// Server configuration.
    pub fn config(&self) -> &ServerConfig {
        &self.config
    }
}

/// Handle returned by [`AlertServer::listen`].
pub struct ServerHandle {
    local_addr: SocketAddr,
    shutdown: Arc<ShutdownCoordinator>,
    registry: Arc<ListenerRegistry>,
}

impl ServerHandle {
    /// Address actually bound.
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Port actually bound.
    pub fn port(&self) -> u16 {
        self.local_addr.port()
    }

    /// Close every listener, then stop the HTTP server and background
    /// tasks within `timeout` (default [`DEFAULT_SHUTDOWN_TIMEOUT`]).
    pub async fn shutdown(self, timeout: Option<Duration>) -> ShutdownReport {
        self.shutdown
            .drain(&self.registry, timeout.unwrap_or(DEFAULT_SHUTDOWN_TIMEOUT))
            .await
    }
}

/// GET / and GET /ws
async fn ws_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> Response {
    let registry = Arc::clone(&state.registry);
    let capacity = state.send_queue_capacity;
    ws.on_upgrade(move |socket| handle_socket(socket, registry, capacity))
}

/// POST /vapi-webhook
async fn webhook_handler(State(state): State<AppState>, body: Bytes) -> Json<WebhookReply> {
    match serde_json::from_slice::<Value>(&body) {
        Ok(value) => Json(state.processor.process(&value).await),
        Err(e) => {
            counter!(WEBHOOK_EVENTS_TOTAL, "kind" => "invalid").increment(1);
            debug!(error = %e, len = body.len(), "unparseable webhook body ignored");
            Json(WebhookReply::ignored())
        }
    }
}

/// POST /test-alert
async fn test_alert_handler(State(state): State<AppState>) -> Json<Value> {
    let delivered = state.dispatcher.test_alert().await;
    info!(delivered, "test alert sent");
    Json(json!({ "sent": true }))
}

/// GET /health
async fn health_handler(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(health::health_check(
        state.start_time,
        state.registry.len(),
        state.dedup.len(),
    ))
}

/// GET /metrics
async fn metrics_handler(State(state): State<AppState>) -> Response {
    match &state.metrics {
        Some(handle) => crate::metrics::render(handle).into_response(),
        None => StatusCode::NOT_FOUND.into_response(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::websocket::connection::{Listener, Outbound};
    use axum::body::Body;
    use axum::http::{Request, header};
    use callguard_core::CallId;
    use metrics_exporter_prometheus::PrometheusBuilder;
    use tokio::sync::mpsc;
    use tower::ServiceExt;

    fn make_server() -> AlertServer {
        AlertServer::new(ServerConfig::default(), None)
    }

    async fn attach_listener(server: &AlertServer) -> mpsc::Receiver<Outbound> {
        let (tx, rx) = mpsc::channel(16);
        let _ = server
            .registry()
            .register(Arc::new(Listener::new("l1", tx)))
            .await;
        rx
    }

    fn post_json(uri: &str, body: &str) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri(uri)
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_owned()))
            .unwrap()
    }

    async fn body_json(resp: Response) -> Value {
        let bytes = axum::body::to_bytes(resp.into_body(), 64 * 1024)
            .await
            .unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn health_endpoint() {
        let server = make_server();
        let _rx = attach_listener(&server).await;
        server.dedup().mark_alerted(&CallId::from_raw("c1"));

        let req = Request::builder().uri("/health").body(Body::empty()).unwrap();
        let resp = server.router().oneshot(req).await.unwrap();
        assert_eq!(resp.status(), StatusCode::OK);

        let parsed = body_json(resp).await;
        assert_eq!(parsed["status"], "ok");
        assert_eq!(parsed["activeConnections"], 1);
        assert_eq!(parsed["alertedCalls"], 1);
        assert!(parsed["timestamp"].as_i64().is_some_and(|ts| ts > 0));
    }

    #[tokio::test]
    async fn webhook_transcript_alerts_listener() {
        let server = make_server();
        let mut rx = attach_listener(&server).await;

        let body = r#"{"message":{"type":"transcript","transcript":"your account is blocked, share the OTP","call":{"id":"c7"}}}"#;
        let resp = server
            .router()
            .oneshot(post_json("/vapi-webhook", body))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(body_json(resp).await, json!({"success": true}));

        match rx.try_recv().unwrap() {
            Outbound::Event(json) => {
                let v: Value = serde_json::from_str(&json).unwrap();
                assert_eq!(v["type"], "FRAUD_ALERT");
                assert_eq!(v["callId"], "c7");
            }
            other => panic!("unexpected frame: {other:?}"),
        }
    }

    #[tokio::test]
    async fn webhook_untyped_ignored() {
        let server = make_server();
        let resp = server
            .router()
            .oneshot(post_json("/vapi-webhook", r#"{"hello":"world"}"#))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(body_json(resp).await, json!({"ignored": true}));
    }

    #[tokio::test]
    async fn webhook_non_json_ignored() {
        let server = make_server();
        let req = Request::builder()
            .method("POST")
            .uri("/vapi-webhook")
            .header(header::CONTENT_TYPE, "text/plain")
            .body(Body::from("not json"))
            .unwrap();
        let resp = server.router().oneshot(req).await.unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(body_json(resp).await, json!({"ignored": true}));
    }

    #[tokio::test]
    async fn webhook_honeypot_tool_call_acknowledged() {
        let server = make_server();
        let body = r#"{"message":{"type":"tool-calls","call":{"id":"c1"},"toolCallList":[{"id":"tc_9","function":{"name":"log_scam_data","arguments":{"bank":"x"}}}]}}"#;
        let resp = server
            .router()
            .oneshot(post_json("/vapi-webhook", body))
            .await
            .unwrap();
        assert_eq!(
            body_json(resp).await,
            json!({"results": [{"toolCallId": "tc_9", "result": "Logged"}]})
        );
    }

    #[tokio::test]
    async fn test_alert_endpoint() {
        let server = make_server();
        let mut rx = attach_listener(&server).await;

        let req = Request::builder()
            .method("POST")
            .uri("/test-alert")
            .body(Body::empty())
            .unwrap();
        let resp = server.router().oneshot(req).await.unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(body_json(resp).await, json!({"sent": true}));
        assert!(matches!(rx.try_recv().unwrap(), Outbound::Event(_)));
    }

    #[tokio::test]
    async fn test_alert_with_no_listeners_still_sent() {
        let server = make_server();
        let req = Request::builder()
            .method("POST")
            .uri("/test-alert")
            .body(Body::empty())
            .unwrap();
        let resp = server.router().oneshot(req).await.unwrap();
        assert_eq!(body_json(resp).await, json!({"sent": true}));
    }

    #[tokio::test]
    async fn ws_routes_reject_plain_get() {
        let server = make_server();
        for uri in ["/", "/ws"] {
            let req = Request::builder().uri(uri).body(Body::empty()).unwrap();
            let resp = server.router().oneshot(req).await.unwrap();
            assert!(resp.status().is_client_error(), "{uri}: {}", resp.status());
        }
    }

    #[tokio::test]
    async fn metrics_not_found_without_recorder() {
        let server = make_server();
        let req = Request::builder().uri("/metrics").body(Body::empty()).unwrap();
        let resp = server.router().oneshot(req).await.unwrap();
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn metrics_served_with_recorder() {
        let handle = PrometheusBuilder::new().build_recorder().handle();
        let server = make_server().with_metrics(handle);
        let req = Request::builder().uri("/metrics").body(Body::empty()).unwrap();
        let resp = server.router().oneshot(req).await.unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn unknown_route_returns_404() {
        let server = make_server();
        let req = Request::builder()
            .uri("/nonexistent")
            .body(Body::empty())
            .unwrap();
        let resp = server.router().oneshot(req).await.unwrap();
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn webhook_requires_post() {
        let server = make_server();
        let req = Request::builder()
            .uri("/vapi-webhook")
            .body(Body::empty())
            .unwrap();
        let resp = server.router().oneshot(req).await.unwrap();
        assert_eq!(resp.status(), StatusCode::METHOD_NOT_ALLOWED);
    }

    #[test]
    fn from_settings_without_agent() {
        let server = AlertServer::from_settings(&CallguardSettings::default()).unwrap();
        assert_eq!(server.config().port, 3000);
        assert!(!server.shutdown().is_shutting_down());
        assert!(server.registry().is_empty());
    }

    #[tokio::test]
    async fn listen_on_ephemeral_port_and_shutdown() {
        let server = make_server();
        let handle = server.listen().await.unwrap();
        assert_ne!(handle.port(), 0);
        assert_eq!(server.shutdown().tracked_count(), 3);

        let report = handle.shutdown(Some(Duration::from_secs(5))).await;
        assert!(server.shutdown().is_shutting_down());
        assert_eq!(
            report.tasks_finished,
            vec!["http", "liveness-sweep", "dedup-prune"]
        );
        assert!(report.tasks_aborted.is_empty());
    }
}
