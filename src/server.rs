//! HTTP/WebSocket server assembly: shared state, router, startup.

use std::sync::Arc;

use anyhow::{Context, Result};
use axum::{
    Json, Router,
    extract::State,
    routing::{get, post},
};
use serde::Serialize;
use tower_http::cors::CorsLayer;
use tracing::info;

use crate::callback;
use crate::config::RelayConfig;
use crate::dispatch::OutboundDispatcher;
use crate::jobs::{PendingCounts, PendingJobs};
use crate::registry::ConnectionRegistry;
use crate::sweeper;
use crate::ws;

// ── Shared application state ──────────────────────────────────────────

pub struct AppState {
    pub config: RelayConfig,
    pub registry: ConnectionRegistry,
    pub jobs: PendingJobs,
    pub dispatcher: OutboundDispatcher,
}

impl AppState {
    pub fn new(config: RelayConfig) -> Self {
        Self {
            config,
            registry: ConnectionRegistry::new(),
            jobs: PendingJobs::new(),
            dispatcher: OutboundDispatcher::new(),
        }
    }
}

pub type SharedState = Arc<AppState>;

// ── Router ────────────────────────────────────────────────────────────

/// Build the full application router: WebSocket endpoint, one callback
/// route per job kind, and the health probe.
///
/// The WebSocket handler is mounted at both `/` and `/ws` — the browser
/// clients connect to the server root.
pub fn build_router(state: SharedState) -> Router {
    Router::new()
        .route("/", get(ws::ws_handler))
        .route("/ws", get(ws::ws_handler))
        .route("/api/callbacks/product", post(callback::product_callback))
        .route(
            "/api/callbacks/brand-research",
            post(callback::brand_research_callback),
        )
        .route(
            "/api/callbacks/competitor-research",
            post(callback::competitor_research_callback),
        )
        .route(
            "/api/callbacks/prompt-generation",
            post(callback::prompt_generation_callback),
        )
        .route("/health", get(health))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

// ── Health ────────────────────────────────────────────────────────────

#[derive(Debug, Serialize)]
struct HealthResponse {
    status: &'static str,
    /// Distinct users with at least one live connection.
    connections: usize,
    pending: PendingCounts,
}

async fn health(State(state): State<SharedState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        connections: state.registry.user_count().await,
        pending: state.jobs.counts().await,
    })
}

// ── Startup ───────────────────────────────────────────────────────────

/// Bind the listener, start the expiry sweeper, and serve until ctrl-c.
pub async fn start_server(config: RelayConfig) -> Result<()> {
    let port = config.port;
    let product_webhook = config.product_webhook_url.clone();
    let state = Arc::new(AppState::new(config));

    sweeper::spawn(state.clone());

    let app = build_router(state);

    let addr = format!("0.0.0.0:{port}");
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind to {addr}"))?;

    info!("relay listening on port {port}");
    info!("product webhook URL: {product_webhook}");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    info!("relay shut down gracefully");
    Ok(())
}

async fn shutdown_signal() {
    tokio::signal::ctrl_c()
        .await
        .expect("Failed to install Ctrl+C handler");
    info!("shutting down");
}

// ── Tests ────────────────────────────────────────────────────────────
