use super::InboundHandler;
use crate::messaging::{topics, Envelope, MessagingClient};
use crate::models::ApplicationStatus;
use crate::store::ApplicationStore;
use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;
use tracing::{info, warn};

/// Persists lifecycle states pushed by the orchestrator
///
/// The orchestrator is authoritative: unknown states and transitions
/// outside the lifecycle table are logged and still applied.
pub struct LifecycleHandler {
    store: Arc<dyn ApplicationStore>,
}

impl LifecycleHandler {
    pub fn new(store: Arc<dyn ApplicationStore>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl InboundHandler for LifecycleHandler {
    fn topic(&self) -> &str {
        topics::APP_STATE
    }

    async fn handle(&self, _client: &MessagingClient, envelope: Envelope) -> anyhow::Result<()> {
        let Some(app_id) = envelope.application() else {
            anyhow::bail!("state push without application id");
        };
        let Some(raw) = envelope.body.get("state").and_then(Value::as_str) else {
            anyhow::bail!("state push for {} without state", app_id);
        };

        let state = ApplicationStatus::from(raw);
        if !state.is_known() {
            warn!(application = %app_id, state = %state, "Storing state outside the lifecycle");
        }

        if let Some(current) = self.store.find_by_uuid(app_id).await? {
            if current.status != state && !current.status.can_transition_to(&state) {
                warn!(
                    application = %app_id,
                    from = %current.status,
                    to = %state,
                    "Application state change outside the lifecycle"
                );
            }
        }

        if self.store.update_status(app_id, state.clone()).await? {
            info!(application = %app_id, state = %state, "Application state updated");
        } else {
            warn!(application = %app_id, state = %state, "State push for unknown application");
        }
        Ok(())
    }
}
