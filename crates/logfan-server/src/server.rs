//! `LogfanServer`: Axum HTTP + `WebSocket` server.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;

use axum::Router;
use axum::extract::State;
use axum::extract::ws::rejection::WebSocketUpgradeRejection;
use axum::extract::ws::{WebSocket, WebSocketUpgrade};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use axum::routing::get;
use bytes::Bytes;
use futures::StreamExt;
use logfan_core::SubscriberId;
use metrics::counter;
use metrics_exporter_prometheus::PrometheusHandle;
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{debug, error, info, warn};

use crate::config::ServerConfig;
use crate::health::{self, HealthResponse};
use crate::metrics::WS_UPGRADE_REJECTIONS_TOTAL;
use crate::shutdown::ShutdownCoordinator;
use crate::websocket::broadcast::SubscriberHub;
use crate::websocket::session::{Session, SessionConfig};

/// Shared state accessible from Axum handlers.
#[derive(Clone)]
pub struct AppState {
    /// Fan-out hub feeding every session.
    pub hub: Arc<SubscriberHub>,
    /// Timing applied to each new session.
    pub session: SessionConfig,
    /// Upgrades beyond this many subscribers get 503.
    pub max_subscribers: usize,
    /// When the server started.
    pub start_time: Instant,
    /// Prometheus handle backing `/metrics`, when a recorder is installed.
    pub metrics: Option<PrometheusHandle>,
}

/// The logfan server.
pub struct LogfanServer {
    config: ServerConfig,
    hub: Arc<SubscriberHub>,
    shutdown: Arc<ShutdownCoordinator>,
    start_time: Instant,
    metrics: Option<PrometheusHandle>,
}

impl LogfanServer {
    /// Create a server with a fresh hub sized from `config`.
    pub fn new(config: ServerConfig) -> Self {
        let hub = Arc::new(SubscriberHub::new(config.subscriber_queue_capacity));
        Self::with_hub(config, hub)
    }

    /// Create a server around an existing hub.
    pub fn with_hub(config: ServerConfig, hub: Arc<SubscriberHub>) -> Self {
        Self {
            config,
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
            hub: self.hub.clone(),
            session: self.config.session(),
            max_subscribers: self.config.max_subscribers,
            start_time: self.start_time,
            metrics: self.metrics.clone(),
        };

        Router::new()
            .route("/ws", get(ws_handler))
            .route("/health", get(health_handler))
            .route("/metrics", get(metrics_handler))
            .layer(TraceLayer::new_for_http())
            .layer(CorsLayer::permissive())
            .with_state(state)
    }

    /// Bind the configured address and serve until the shutdown token fires.
    ///
    /// Returns the bound address (useful with port `0`) and the serve task.
    pub async fn listen(&self) -> std::io::Result<(SocketAddr, JoinHandle<()>)> {
        let addr = format!("{}:{}", self.config.host, self.config.port);
        let listener = TcpListener::bind(&addr).await?;
        let local_addr = listener.local_addr()?;
        info!(%local_addr, "logfan server listening");

        let router = self.router();
        let token = self.shutdown.token();
        let handle = tokio::spawn(async move {
            if let Err(e) = axum::serve(listener, router)
                .with_graceful_shutdown(token.cancelled_owned())
                .await
            {
                error!(error = %e, "server stopped with error");
            }
            info!("logfan server stopped");
        });
        Ok((local_addr, handle))
    }

    /// The hub payloads are published into.
    pub fn hub(&self) -> &Arc<SubscriberHub> {
        &self.hub
    }

    /// Get the shutdown coordinator.
    pub fn shutdown(&self) -> &Arc<ShutdownCoordinator> {
        &self.shutdown
    }

    /// Get the server configuration.
    pub fn config(&self) -> &ServerConfig {
        &self.config
    }
}

/// GET /ws
async fn ws_handler(
    State(state): State<AppState>,
    upgrade: Result<WebSocketUpgrade, WebSocketUpgradeRejection>,
) -> Response {
    let upgrade = match upgrade {
        Ok(upgrade) => upgrade,
        Err(rejection) => {
            warn!(error = %rejection, "websocket upgrade failed");
            counter!(WS_UPGRADE_REJECTIONS_TOTAL, "status" => "400").increment(1);
            return (StatusCode::BAD_REQUEST, rejection.body_text()).into_response();
        }
    };

    let Some((id, queue)) = state.hub.try_register(state.max_subscribers) else {
        warn!(max = state.max_subscribers, "subscriber limit reached");
        counter!(WS_UPGRADE_REJECTIONS_TOTAL, "status" => "503").increment(1);
        return (StatusCode::SERVICE_UNAVAILABLE, "subscriber limit reached").into_response();
    };
    let slot = SubscriberSlot {
        hub: Arc::clone(&state.hub),
        id,
    };

    // A failed or abandoned upgrade drops the callback, and the slot with it.
    upgrade
        .on_failed_upgrade(|e| warn!(error = %e, "websocket upgrade did not complete"))
        .on_upgrade(move |socket| serve_subscriber(socket, slot, queue, state.session))
}

/// A registered subscriber; dropping it deregisters from the hub.
struct SubscriberSlot {
    hub: Arc<SubscriberHub>,
    id: SubscriberId,
}

impl Drop for SubscriberSlot {
    fn drop(&mut self) {
        self.hub.remove(&self.id);
    }
}

async fn serve_subscriber(
    socket: WebSocket,
    slot: SubscriberSlot,
    queue: mpsc::Receiver<Bytes>,
    session: SessionConfig,
) {
    let (writer, reader) = socket.split();
    let outcome = Session::new(slot.id.clone(), writer, reader, queue, session)
        .run()
        .await;
    debug!(subscriber_id = %slot.id, reason = %outcome.reason, "subscriber released");
}

/// GET /health
async fn health_handler(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(health::health_check(
        state.start_time,
        state.hub.subscriber_count(),
        state.hub.drop_count(),
        state.hub.is_closed(),
    ))
}

/// GET /metrics
async fn metrics_handler(State(state): State<AppState>) -> Response {
    match &state.metrics {
        Some(handle) => crate::metrics::render(handle).into_response(),
        None => (StatusCode::NOT_FOUND, "metrics recorder not installed").into_response(),
    }
}
