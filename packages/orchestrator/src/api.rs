//! HTTP server for health, status and metrics endpoints

use std::net::SocketAddr;

use axum::{
    extract::State,
    http::{header, StatusCode},
    response::{IntoResponse, Json, Response},
    routing::get,
    Router,
};
use eyre::eyre;
use serde::Serialize;
use tracing::info;

use crate::metrics;
use crate::orchestrator::{OrchestratorStats, SharedStats};

/// Shared state for the HTTP server
#[derive(Clone)]
pub struct AppState {
    pub stats: Vec<SharedStats>,
}

/// Health check response
#[derive(Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub orchestrators: usize,
    pub last_eth_block: u64,
    pub adapter_errors: u64,
}

async fn snapshot(state: &AppState) -> Vec<OrchestratorStats> {
    let mut all = Vec::with_capacity(state.stats.len());
    for stats in &state.stats {
        all.push(stats.read().await.clone());
    }
    all
}

/// Health check endpoint handler
async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    let all = snapshot(&state).await;
    Json(HealthResponse {
        status: "healthy".to_string(),
        orchestrators: all.len(),
        last_eth_block: all.iter().map(|s| s.last_eth_block).max().unwrap_or(0),
        adapter_errors: all.iter().map(|s| s.adapter_errors).sum(),
    })
}

/// Per-orchestrator statistics
async fn status(State(state): State<AppState>) -> Json<Vec<OrchestratorStats>> {
    Json(snapshot(&state).await)
}

/// Prometheus metrics endpoint
async fn prometheus_metrics() -> Response {
    match Response::builder()
        .header(header::CONTENT_TYPE, "text/plain; version=0.0.4")
        .body(axum::body::Body::from(metrics::gather_text()))
    {
        Ok(resp) => resp,
        Err(_) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            "Failed to build metrics response",
        )
            .into_response(),
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/status", get(status))
        .route("/metrics", get(prometheus_metrics))
        .with_state(state)
}

/// Start the HTTP server
pub async fn start_server(bind_address: &str, port: u16, stats: Vec<SharedStats>) -> eyre::Result<()> {
    let app = router(AppState { stats });

    let addr: SocketAddr = format!("{}:{}", bind_address, port)
        .parse()
        .map_err(|e| eyre!("Invalid bind address {}:{}: {}", bind_address, port, e))?;
    info!("API server listening on {}", addr);
    info!("  /health  - Health summary (JSON)");
    info!("  /status  - Per-orchestrator statistics (JSON)");
    info!("  /metrics - Prometheus metrics");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
