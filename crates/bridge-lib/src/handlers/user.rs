use super::InboundHandler;
use crate::messaging::{error_body, topics, Envelope, MessagingClient};
use crate::models::UserRecord;
use crate::store::UserStore;
use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, warn};

/// Public subset of a user document
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UserInfo {
    pub uuid: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub firstname: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub lastname: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub organization: Option<String>,
}

impl From<UserRecord> for UserInfo {
    fn from(user: UserRecord) -> Self {
        Self {
            uuid: user.uuid,
            username: user.username,
            title: user.title,
            firstname: user.firstname,
            lastname: user.lastname,
            role: user.role,
            organization: user.organization,
        }
    }
}

/// Answers `ui.user.get`; the request token is the user's uuid
pub struct UserInfoHandler {
    users: Arc<dyn UserStore>,
}

impl UserInfoHandler {
    pub fn new(users: Arc<dyn UserStore>) -> Self {
        Self { users }
    }

    async fn lookup(&self, token: Option<&str>) -> Value {
        let Some(token) = token else {
            return error_body(400, "request has no token");
        };

        match self.users.find_by_uuid(token).await {
            Ok(Some(user)) => match serde_json::to_value(UserInfo::from(user)) {
                Ok(info) => info,
                Err(e) => error_body(500, e.to_string()),
            },
            Ok(None) => error_body(404, "user not found"),
            Err(e) => {
                warn!(error = %e, "User lookup failed");
                error_body(500, format!("document store unavailable: {}", e))
            }
        }
    }
}

#[async_trait]
impl InboundHandler for UserInfoHandler {
    fn topic(&self) -> &str {
        topics::USER_GET
    }

    async fn handle(&self, client: &MessagingClient, envelope: Envelope) -> anyhow::Result<()> {
        let token = envelope.body.get("token").and_then(Value::as_str);
        let body = self.lookup(token).await;

        let mut reply = Envelope::new(topics::USER_GET_REPLY, body);
        reply.correlation_id = envelope.correlation_id.clone();
        client.publish(reply)?;

        debug!(correlation_id = ?envelope.correlation_id, "Replied with user info");
        Ok(())
    }
}
