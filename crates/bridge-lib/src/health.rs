//! Health tracking for the application bridge
//!
//! The bridge has two moving parts worth probing: the bus connection and the
//! document store behind the inbound handlers. Each reports a
//! [`ComponentHealth`]; the overall status is the worst of them.

use crate::messaging::ConnectionState;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use tokio::sync::RwLock;

/// Health status, ordered from best to worst
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ComponentStatus {
    Healthy,
    /// Serving, with reduced capability
    Degraded,
    Unhealthy,
}

impl ComponentStatus {
    pub fn is_operational(&self) -> bool {
        *self != ComponentStatus::Unhealthy
    }
}

/// Tracked parts of the bridge
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Component {
    Messaging,
    DocumentStore,
}

impl Component {
    pub fn as_str(&self) -> &'static str {
        match self {
            Component::Messaging => "messaging",
            Component::DocumentStore => "document_store",
        }
    }
}

impl fmt::Display for Component {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComponentHealth {
    pub status: ComponentStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    /// When this status was recorded
    pub since: DateTime<Utc>,
}

impl ComponentHealth {
    fn with(status: ComponentStatus, message: Option<String>) -> Self {
        Self {
            status,
            message,
            since: Utc::now(),
        }
    }

    pub fn healthy() -> Self {
        Self::with(ComponentStatus::Healthy, None)
    }

    pub fn degraded(message: impl Into<String>) -> Self {
        Self::with(ComponentStatus::Degraded, Some(message.into()))
    }

    pub fn unhealthy(message: impl Into<String>) -> Self {
        Self::with(ComponentStatus::Unhealthy, Some(message.into()))
    }
}

impl From<ConnectionState> for ComponentHealth {
    /// A disabled bus is degraded, not unhealthy: translations are still
    /// served, only asynchronous messaging is off.
    fn from(state: ConnectionState) -> Self {
        match state {
            ConnectionState::Open => ComponentHealth::healthy(),
            ConnectionState::Disabled => ComponentHealth::degraded("messaging disabled"),
            ConnectionState::Connecting => ComponentHealth::degraded("connecting to message bus"),
            ConnectionState::Disconnected => {
                ComponentHealth::unhealthy("disconnected from message bus")
            }
        }
    }
}

/// Body of `/healthz`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: ComponentStatus,
    pub components: BTreeMap<String, ComponentHealth>,
}

impl HealthResponse {
    /// Worst status across components; healthy when nothing is tracked
    pub fn overall(components: &BTreeMap<String, ComponentHealth>) -> ComponentStatus {
        components
            .values()
            .map(|health| health.status)
            .max()
            .unwrap_or(ComponentStatus::Healthy)
    }
}

/// Body of `/readyz`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReadinessResponse {
    pub ready: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

impl ReadinessResponse {
    fn not_ready(reason: impl Into<String>) -> Self {
        Self {
            ready: false,
            reason: Some(reason.into()),
        }
    }
}

#[derive(Debug, Default)]
struct HealthState {
    components: BTreeMap<Component, ComponentHealth>,
    started: bool,
}

/// Shared health state, cloned into the API and the state watcher
#[derive(Debug, Clone, Default)]
pub struct HealthRegistry {
    state: Arc<RwLock<HealthState>>,
}

impl HealthRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn update(&self, component: Component, health: ComponentHealth) {
        self.state.write().await.components.insert(component, health);
    }

    pub async fn record_connection_state(&self, state: ConnectionState) {
        self.update(Component::Messaging, state.into()).await;
    }

    /// Record the outcome of loading the document store
    pub async fn record_store(&self, outcome: Result<usize, &anyhow::Error>) {
        let health = match outcome {
            Ok(_) => ComponentHealth::healthy(),
            Err(e) => ComponentHealth::degraded(format!("document store empty: {:#}", e)),
        };
        self.update(Component::DocumentStore, health).await;
    }

    pub async fn set_ready(&self, ready: bool) {
        self.state.write().await.started = ready;
    }

    pub async fn health(&self) -> HealthResponse {
        let components: BTreeMap<String, ComponentHealth> = self
            .state
            .read()
            .await
            .components
            .iter()
            .map(|(component, health)| (component.to_string(), health.clone()))
            .collect();
        HealthResponse {
            status: HealthResponse::overall(&components),
            components,
        }
    }

    /// Ready once started, as long as no component is unhealthy
    pub async fn readiness(&self) -> ReadinessResponse {
        let state = self.state.read().await;
        if !state.started {
            return ReadinessResponse::not_ready("Bridge not yet initialized");
        }

        let failing = state
            .components
            .iter()
            .find(|(_, health)| !health.status.is_operational());
        match failing {
            Some((component, health)) => ReadinessResponse::not_ready(format!(
                "{} unhealthy: {}",
                component,
                health.message.as_deref().unwrap_or("no detail")
            )),
            None => ReadinessResponse {
                ready: true,
                reason: None,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_empty_registry_is_healthy() {
        let registry = HealthRegistry::new();
        let health = registry.health().await;

        assert_eq!(health.status, ComponentStatus::Healthy);
        assert!(health.components.is_empty());
    }

    #[tokio::test]
    async fn test_disabled_messaging_is_degraded() {
        let registry = HealthRegistry::new();
        registry.record_store(Ok(3)).await;
        registry.record_connection_state(ConnectionState::Disabled).await;

        let health = registry.health().await;
        assert_eq!(health.status, ComponentStatus::Degraded);
        assert_eq!(
            health.components["messaging"].message.as_deref(),
            Some("messaging disabled")
        );
        assert_eq!(
            health.components["document_store"].status,
            ComponentStatus::Healthy
        );
    }

    #[tokio::test]
    async fn test_worst_status_wins() {
        let registry = HealthRegistry::new();
        registry.record_connection_state(ConnectionState::Disconnected).await;
        registry
            .update(Component::DocumentStore, ComponentHealth::degraded("slow"))
            .await;
        assert_eq!(registry.health().await.status, ComponentStatus::Unhealthy);

        registry.record_connection_state(ConnectionState::Open).await;
        assert_eq!(registry.health().await.status, ComponentStatus::Degraded);
    }

    #[tokio::test]
    async fn test_store_failure_is_degraded() {
        let registry = HealthRegistry::new();
        let err = anyhow::anyhow!("no such file");
        registry.record_store(Err(&err)).await;

        let health = registry.health().await;
        let store = &health.components["document_store"];
        assert_eq!(store.status, ComponentStatus::Degraded);
        assert!(store.message.as_deref().unwrap().contains("no such file"));
    }

    #[tokio::test]
    async fn test_readiness_not_ready_initially() {
        let registry = HealthRegistry::new();
        let readiness = registry.readiness().await;

        assert!(!readiness.ready);
        assert_eq!(readiness.reason.as_deref(), Some("Bridge not yet initialized"));
    }

    #[tokio::test]
    async fn test_readiness_names_failing_component() {
        let registry = HealthRegistry::new();
        registry.set_ready(true).await;
        registry.record_connection_state(ConnectionState::Connecting).await;
        assert!(registry.readiness().await.ready);

        registry.record_connection_state(ConnectionState::Disconnected).await;
        let readiness = registry.readiness().await;
        assert!(!readiness.ready);
        assert_eq!(
            readiness.reason.as_deref(),
            Some("messaging unhealthy: disconnected from message bus")
        );
    }
}
