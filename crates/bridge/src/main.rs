//! Application bridge - connects application documents to the platform bus
//!
//! Answers descriptor and user requests, persists lifecycle states pushed by
//! the orchestrator, and serves health and metrics over HTTP.

use anyhow::Result;
use app_bridge::{api, config::BridgeConfig};
use bridge_lib::{
    handlers::bridge_handlers,
    health::HealthRegistry,
    messaging::{MessagingClient, StompConnector},
    observability::{BridgeMetrics, StructuredLogger},
    store::{load_seed, ApplicationStore, InMemoryApplicationStore, InMemoryUserStore, UserStore},
};
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

const BRIDGE_VERSION: &str = env!("CARGO_PKG_VERSION");

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing with JSON output and env filter
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(fmt::layer().json())
        .init();

    info!("Starting app-bridge");

    let config = BridgeConfig::load()?;
    info!(instance = %config.instance_name, "Bridge configured");

    let health_registry = HealthRegistry::new();

    // Registers the global metrics before the first scrape
    let _metrics = BridgeMetrics::new();
    let logger = StructuredLogger::new(&config.instance_name);

    let (applications, users) = match &config.documents_path {
        Some(path) => match load_seed(path).await {
            Ok(stores) => {
                health_registry.record_store(Ok(stores.0.len().await)).await;
                stores
            }
            Err(e) => {
                warn!(error = %format!("{:#}", e), "Starting with empty document stores");
                health_registry.record_store(Err(&e)).await;
                (InMemoryApplicationStore::new(), InMemoryUserStore::new())
            }
        },
        None => {
            health_registry.record_store(Ok(0)).await;
            (InMemoryApplicationStore::new(), InMemoryUserStore::new())
        }
    };
    let applications: Arc<dyn ApplicationStore> = Arc::new(applications);
    let users: Arc<dyn UserStore> = Arc::new(users);

    let mut builder = MessagingClient::builder()
        .instance(config.instance_name.clone())
        .best_effort_timeout(config.best_effort_timeout());
    builder = match config.stomp() {
        Some(stomp) => builder.connector(Arc::new(StompConnector::new(stomp))),
        None => builder.disabled(),
    };
    for handler in bridge_handlers(applications, users) {
        builder = builder.handler(handler);
    }
    let client = builder.build()?;

    let endpoint = client.endpoint().unwrap_or_else(|| "disabled".to_string());
    logger.log_startup(BRIDGE_VERSION, &endpoint);

    // Mirror the bus connection into the health registry
    let mut states = client.subscribe_state();
    let health = health_registry.clone();
    let health_handle = tokio::spawn(async move {
        loop {
            let state = *states.borrow_and_update();
            health.record_connection_state(state).await;
            if states.changed().await.is_err() {
                break;
            }
        }
    });

    client.start();

    let app_state = Arc::new(api::AppState::new(health_registry.clone(), client.clone()));

    // Mark bridge as ready after initialization
    health_registry.set_ready(true).await;

    // Start health and metrics server
    let api_handle = tokio::spawn(api::serve(config.api_port, app_state));

    // Wait for shutdown signal
    tokio::signal::ctrl_c().await?;
    logger.log_shutdown("SIGINT received");

    health_registry.set_ready(false).await;
    client.shutdown().await;
    health_handle.abort();
    api_handle.abort();
    info!("Shut down");

    Ok(())
}
