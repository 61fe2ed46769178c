//! Application bridge library
//!
//! This crate provides the core functionality for:
//! - Parsing metric formulas and extracting their variables
//! - Translating application documents into the component descriptor and
//!   the metric model
//! - Correlated request/reply messaging over the platform bus
//! - Inbound request handlers and their document store collaborators
//! - Health checks and observability

pub mod expression;
pub mod handlers;
pub mod health;
pub mod messaging;
pub mod models;
pub mod observability;
pub mod store;
pub mod translate;

pub use health::{
    Component, ComponentHealth, ComponentStatus, HealthRegistry, HealthResponse, ReadinessResponse,
};
pub use messaging::{MessagingClient, MessagingError};
pub use models::*;
pub use observability::{BridgeMetrics, StructuredLogger};
pub use translate::{component_descriptor, metric_model, TranslateError};
