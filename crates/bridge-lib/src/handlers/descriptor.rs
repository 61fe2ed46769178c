use super::InboundHandler;
use crate::messaging::{error_body, topics, Annotations, Envelope, MessagingClient};
use crate::observability::BridgeMetrics;
use crate::store::ApplicationStore;
use crate::translate::component_descriptor;
use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, warn};

/// Answers `ui.app.get` with the application's component descriptor
pub struct DescriptorHandler {
    store: Arc<dyn ApplicationStore>,
    metrics: BridgeMetrics,
}

impl DescriptorHandler {
    pub fn new(store: Arc<dyn ApplicationStore>) -> Self {
        Self {
            store,
            metrics: BridgeMetrics::new(),
        }
    }

    /// Reply body: the descriptor, or an error body the caller rejects on
    async fn describe(&self, app_id: Option<&str>) -> Value {
        let Some(app_id) = app_id else {
            return error_body(400, "request has no appId");
        };

        let record = match self.store.find_by_uuid(app_id).await {
            Ok(Some(record)) => record,
            Ok(None) => return error_body(404, format!("application {} not found", app_id)),
            Err(e) => {
                warn!(application = %app_id, error = %e, "Document store lookup failed");
                return error_body(500, format!("document store unavailable: {}", e));
            }
        };

        match component_descriptor(&record) {
            Ok(descriptor) => match serde_json::to_value(&descriptor) {
                Ok(document) => document,
                Err(e) => error_body(500, e.to_string()),
            },
            Err(e) => {
                self.metrics.inc_translation_errors(e.kind());
                warn!(application = %app_id, error = %e, "Application failed to translate");
                error_body(422, e.to_string())
            }
        }
    }
}

#[async_trait]
impl InboundHandler for DescriptorHandler {
    fn topic(&self) -> &str {
        topics::APP_GET
    }

    async fn handle(&self, client: &MessagingClient, envelope: Envelope) -> anyhow::Result<()> {
        let app_id = envelope.body.get("appId").and_then(Value::as_str);
        let body = self.describe(app_id).await;

        let mut reply = Envelope::new(topics::APP_GET_REPLY, body);
        reply.correlation_id = envelope.correlation_id.clone();
        if let Some(app_id) = app_id {
            reply = reply.with_application(&Annotations::application(app_id));
        }
        client.publish(reply)?;

        debug!(application = ?app_id, correlation_id = ?envelope.correlation_id, "Replied with descriptor");
        Ok(())
    }
}
