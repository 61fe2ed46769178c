//! HTTP surface of the bridge: health checks, bus status and Prometheus metrics

use axum::{
    extract::State,
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use bridge_lib::{
    health::HealthRegistry,
    messaging::{ConnectionState, ConnectionStats, MessagingClient},
};
use prometheus::{Encoder, TextEncoder};
use serde::Serialize;
use std::net::SocketAddr;
use std::sync::Arc;
use tracing::{info, warn};

/// State shared by every route
#[derive(Clone)]
pub struct AppState {
    pub health_registry: HealthRegistry,
    pub client: MessagingClient,
}

impl AppState {
    pub fn new(health_registry: HealthRegistry, client: MessagingClient) -> Self {
        Self {
            health_registry,
            client,
        }
    }
}

/// Body of `/status`
#[derive(Debug, Serialize)]
pub struct BusStatus {
    pub state: ConnectionState,
    pub endpoint: Option<String>,
    pub pending_requests: usize,
    pub stats: ConnectionStats,
}

fn status_code(ok: bool) -> StatusCode {
    if ok {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    }
}

/// 200 while every component is at least degraded
async fn healthz(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let health = state.health_registry.health().await;
    (status_code(health.status.is_operational()), Json(health))
}

async fn readyz(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let readiness = state.health_registry.readiness().await;
    (status_code(readiness.ready), Json(readiness))
}

async fn status(State(state): State<Arc<AppState>>) -> Json<BusStatus> {
    let client = &state.client;
    Json(BusStatus {
        state: client.state(),
        endpoint: client.endpoint(),
        pending_requests: client.pending_requests(),
        stats: client.connection_stats(),
    })
}

async fn metrics() -> Response {
    let encoder = TextEncoder::new();
    let mut body = String::new();
    match encoder.encode_utf8(&prometheus::gather(), &mut body) {
        Ok(()) => {
            let content_type = encoder.format_type().to_string();
            ([(header::CONTENT_TYPE, content_type)], body).into_response()
        }
        Err(e) => {
            warn!(error = %e, "Failed to encode metrics");
            (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response()
        }
    }
}

pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/readyz", get(readyz))
        .route("/status", get(status))
        .route("/metrics", get(metrics))
        .with_state(state)
}

/// Serve the router until the task is aborted
pub async fn serve(port: u16, state: Arc<AppState>) -> anyhow::Result<()> {
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(addr = %addr, "Serving health and metrics");

    axum::serve(listener, create_router(state)).await?;
    Ok(())
}
