//! Message envelope exchanged on the bus

use super::MessagingError;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

/// Per-message application routing info
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Annotations {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub application: Option<String>,
}

impl Annotations {
    pub fn none() -> Self {
        Self::default()
    }

    pub fn application(uuid: impl Into<String>) -> Self {
        Self {
            application: Some(uuid.into()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Envelope {
    pub to: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub correlation_id: Option<String>,
    #[serde(default)]
    pub message_annotations: Annotations,
    #[serde(default)]
    pub application_properties: Annotations,
    #[serde(default)]
    pub body: Value,
}

impl Envelope {
    pub fn new(to: impl Into<String>, body: Value) -> Self {
        Self {
            to: to.into(),
            body,
            ..Default::default()
        }
    }

    pub fn with_correlation_id(mut self, id: impl Into<String>) -> Self {
        self.correlation_id = Some(id.into());
        self
    }

    /// Set the same application on annotations and properties
    pub fn with_application(mut self, annotations: &Annotations) -> Self {
        self.message_annotations = annotations.clone();
        self.application_properties = annotations.clone();
        self
    }

    /// Application id, preferring the application properties
    pub fn application(&self) -> Option<&str> {
        self.application_properties
            .application
            .as_deref()
            .or(self.message_annotations.application.as_deref())
    }
}

/// Embedded `metaData.status`, accepting numbers and numeric strings
pub fn reply_status(body: &Value) -> Option<u16> {
    let status = body.get("metaData")?.get("status")?;
    match status {
        Value::Number(n) => n.as_u64().and_then(|s| u16::try_from(s).ok()),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

/// Classify a reply body: `status >= 400` is an error carrying `message`
pub fn reply_outcome(body: Value) -> Result<Value, MessagingError> {
    match reply_status(&body) {
        Some(status) if status >= 400 => {
            let message = match body.get("message") {
                Some(Value::String(s)) => s.clone(),
                Some(Value::Null) | None => format!("request failed with status {}", status),
                Some(other) => other.to_string(),
            };
            Err(MessagingError::Remote { status, message })
        }
        _ => Ok(body),
    }
}

/// Error reply body understood by [`reply_outcome`]
pub fn error_body(status: u16, message: impl Into<String>) -> Value {
    json!({
        "metaData": {"status": status},
        "message": message.into(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_envelope_wire_shape() {
        let envelope = Envelope::new("topic://x", json!({"uuid": "a"}))
            .with_correlation_id("c-1")
            .with_application(&Annotations::application("a"));
        let value = serde_json::to_value(&envelope).unwrap();
        assert_eq!(value["to"], "topic://x");
        assert_eq!(value["correlation_id"], "c-1");
        assert_eq!(value["message_annotations"]["application"], "a");
        assert_eq!(value["application_properties"]["application"], "a");
        assert_eq!(value["body"]["uuid"], "a");
    }

    #[test]
    fn test_status_400_rejects_with_message() {
        let outcome = reply_outcome(json!({"metaData": {"status": 404}, "message": "no such cloud"}));
        assert_eq!(
            outcome,
            Err(MessagingError::Remote {
                status: 404,
                message: "no such cloud".to_string()
            })
        );
    }

    #[test]
    fn test_success_and_missing_metadata_resolve() {
        let ok = json!({"metaData": {"status": 200}, "body": []});
        assert_eq!(reply_outcome(ok.clone()), Ok(ok));
        assert_eq!(reply_outcome(json!("plain")), Ok(json!("plain")));
        assert!(reply_outcome(json!({"metaData": {"status": "500"}})).is_err());
    }

    #[test]
    fn test_application_lookup() {
        let mut envelope = Envelope::new("t", Value::Null);
        assert_eq!(envelope.application(), None);
        envelope.message_annotations = Annotations::application("from-annotation");
        assert_eq!(envelope.application(), Some("from-annotation"));
        envelope.application_properties = Annotations::application("from-properties");
        assert_eq!(envelope.application(), Some("from-properties"));
    }
}
