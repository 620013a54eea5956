//! `CarelinkServer`: the axum router and listener.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;

use axum::Router;
use axum::extract::State;
use axum::http::StatusCode;
use axum::http::header::CONTENT_TYPE;
use axum::response::{IntoResponse, Json};
use axum::routing::get;
use carelink_chat::ChatService;
use metrics_exporter_prometheus::PrometheusHandle;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{error, info};

use crate::config::ServerConfig;
use crate::health::{self, HealthResponse};
use crate::metrics;
use crate::rest;
use crate::rpc::handlers::register_all;
use crate::rpc::registry::MethodRegistry;
use crate::shutdown::ShutdownCoordinator;
use crate::websocket::upgrade::{ws_chat_handler, ws_handler};

/// Shared state accessible from axum handlers.
#[derive(Clone)]
pub struct AppState {
    /// The messaging core.
    pub chat: Arc<ChatService>,
    /// RPC method registry.
    pub rpc: Arc<MethodRegistry>,
    /// Transport configuration.
    pub config: Arc<ServerConfig>,
    /// Shutdown coordinator.
    pub shutdown: Arc<ShutdownCoordinator>,
    /// When the server started.
    pub start_time: Instant,
    /// Prometheus handle for `/metrics`.
    pub metrics: PrometheusHandle,
}

/// The Carelink HTTP and `WebSocket` server.
pub struct CarelinkServer {
    state: AppState,
}

impl CarelinkServer {
    /// Create a server over a wired chat core. Every chat RPC method is
    /// registered with the configured handler timeout.
    pub fn new(config: ServerConfig, chat: Arc<ChatService>, metrics: PrometheusHandle) -> Self {
        let mut rpc = MethodRegistry::with_timeout(config.rpc_timeout);
        register_all(&mut rpc);
        Self {
            state: AppState {
                chat,
                rpc: Arc::new(rpc),
                config: Arc::new(config),
                shutdown: Arc::new(ShutdownCoordinator::new()),
                start_time: Instant::now(),
                metrics,
            },
        }
    }

    /// Build the axum router with all routes.
    pub fn router(&self) -> Router {
        Router::new()
            .route("/health", get(health_handler))
            .route("/metrics", get(metrics_handler))
            .route("/ws", get(ws_handler))
            .route("/ws/chat/{patient_id}", get(ws_chat_handler))
            .merge(rest::routes(self.state.config.max_upload_bytes))
            .with_state(self.state.clone())
            .layer(TraceLayer::new_for_http())
            .layer(CorsLayer::permissive())
    }

    /// Bind and serve in a background task until shutdown.
    ///
    /// Returns the bound address (useful with port 0) and the server task.
    pub async fn listen(&self) -> std::io::Result<(SocketAddr, JoinHandle<()>)> {
        let config = &self.state.config;
        let listener = TcpListener::bind((config.host.as_str(), config.port)).await?;
        let addr = listener.local_addr()?;
        let app = self.router();
        let token = self.state.shutdown.token();

        let handle = tokio::spawn(async move {
            let serve = axum::serve(listener, app)
                .with_graceful_shutdown(async move { token.cancelled().await });
            if let Err(e) = serve.await {
                error!(error = %e, "server error");
            }
            info!("server stopped");
        });
        info!(%addr, "listening");
        Ok((addr, handle))
    }

    /// The messaging core.
    pub fn chat(&self) -> &Arc<ChatService> {
        &self.state.chat
    }

    /// Get the shutdown coordinator.
    pub fn shutdown(&self) -> &Arc<ShutdownCoordinator> {
        &self.state.shutdown
    }

    /// Get the server configuration.
    pub fn config(&self) -> &ServerConfig {
        &self.state.config
    }

    /// Get the method registry.
    pub fn rpc(&self) -> &Arc<MethodRegistry> {
        &self.state.rpc
    }
}

/// GET /health
async fn health_handler(State(state): State<AppState>) -> Json<HealthResponse> {
    let connections = state.chat.registry().connection_count();
    Json(health::health_check(state.start_time, connections))
}

/// GET /metrics
async fn metrics_handler(State(state): State<AppState>) -> impl IntoResponse {
    (
        StatusCode::OK,
        [(CONTENT_TYPE, "text/plain; version=0.0.4")],
        metrics::render(&state.metrics),
    )
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
