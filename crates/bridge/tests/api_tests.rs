//! Integration tests for the bridge API endpoints

use app_bridge::api::{create_router, AppState};
use axum::{
    body::Body,
    http::{Request, StatusCode},
    Router,
};
use bridge_lib::{
    health::{Component, ComponentHealth, HealthRegistry},
    messaging::{ConnectionState, MemoryBroker, MessagingClient},
    observability::BridgeMetrics,
};
use std::sync::Arc;
use std::time::Duration;
use tower::ServiceExt;

async fn setup_test_app(client: MessagingClient) -> (Router, Arc<AppState>) {
    let health_registry = HealthRegistry::new();
    health_registry.record_store(Ok(0)).await;
    health_registry.record_connection_state(client.state()).await;

    let state = Arc::new(AppState::new(health_registry, client));
    let router = create_router(state.clone());

    (router, state)
}

async fn disabled_app() -> (Router, Arc<AppState>) {
    setup_test_app(MessagingClient::builder().build().unwrap()).await
}

async fn get_json(app: Router, uri: &str) -> (StatusCode, serde_json::Value) {
    let response = app
        .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
        .await
        .unwrap();
    let status = response.status();
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    (status, serde_json::from_slice(&body).unwrap())
}

#[tokio::test]
async fn test_healthz_returns_ok_when_messaging_disabled() {
    let (app, _state) = disabled_app().await;

    let (status, health) = get_json(app, "/healthz").await;

    // Degraded still returns 200 (operational)
    assert_eq!(status, StatusCode::OK);
    assert_eq!(health["status"], "degraded");
    assert_eq!(health["components"]["messaging"]["message"], "messaging disabled");
}

#[tokio::test]
async fn test_healthz_returns_ok_when_connected() {
    let broker = MemoryBroker::new();
    let client = MessagingClient::builder()
        .connector(Arc::new(broker))
        .build()
        .unwrap();
    client.start();
    assert!(client.wait_until_open(Duration::from_secs(5)).await);

    let (app, _state) = setup_test_app(client.clone()).await;
    let (status, health) = get_json(app, "/healthz").await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(health["status"], "healthy");
    assert!(health["components"]["document_store"].is_object());
    client.shutdown().await;
}

#[tokio::test]
async fn test_healthz_returns_503_when_disconnected() {
    let (app, state) = disabled_app().await;
    state
        .health_registry
        .record_connection_state(ConnectionState::Disconnected)
        .await;

    let (status, health) = get_json(app, "/healthz").await;

    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(health["status"], "unhealthy");
}

#[tokio::test]
async fn test_readyz_returns_503_when_not_ready() {
    let (app, _state) = disabled_app().await;

    let (status, readiness) = get_json(app, "/readyz").await;

    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(readiness["ready"], false);
}

#[tokio::test]
async fn test_readyz_returns_ok_when_ready() {
    let (app, state) = disabled_app().await;
    state.health_registry.set_ready(true).await;

    let (status, readiness) = get_json(app, "/readyz").await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(readiness["ready"], true);
}

#[tokio::test]
async fn test_readyz_returns_503_when_store_unhealthy() {
    let (app, state) = disabled_app().await;
    state.health_registry.set_ready(true).await;
    state
        .health_registry
        .update(Component::DocumentStore, ComponentHealth::unhealthy("store offline"))
        .await;

    let (status, readiness) = get_json(app, "/readyz").await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(readiness["reason"], "document_store unhealthy: store offline");
}

#[tokio::test]
async fn test_status_reports_bus_state() {
    let (app, _state) = disabled_app().await;

    let (status, body) = get_json(app, "/status").await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["state"], "disabled");
    assert!(body["endpoint"].is_null());
    assert_eq!(body["pending_requests"], 0);
    assert_eq!(body["stats"]["connects"], 0);
}

#[tokio::test]
async fn test_metrics_endpoint_returns_prometheus_format() {
    let (app, _state) = disabled_app().await;

    let metrics = BridgeMetrics::new();
    metrics.inc_sent("ui.app.get.reply");
    metrics.observe_reply_latency(0.002);
    metrics.observe_reply_latency(0.2);

    let response = app
        .oneshot(Request::builder().uri("/metrics").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);

    let content_type = response.headers().get("content-type").unwrap();
    assert!(content_type.to_str().unwrap().contains("text/plain"));

    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let metrics_text = String::from_utf8(body.to_vec()).unwrap();

    assert!(metrics_text.contains("app_bridge_messages_sent_total"));
    assert!(metrics_text.contains("app_bridge_connection_state"));
    assert!(metrics_text.contains("app_bridge_reply_latency_seconds_bucket"));
    assert!(metrics_text.contains("app_bridge_reply_latency_seconds_count"));
}
