//! Application, cloud and policy operations on top of the client
//!
//! Correlated operations return the [`PendingReply`] so the caller decides
//! whether to await it; best-effort operations await internally and fall
//! back after the configured timeout.

use super::registry::PendingReply;
use super::topics;
use super::{Annotations, Envelope, MessagingClient, MessagingError};
use crate::translate::{ComponentDescriptor, MetricModel};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::info;
use uuid::Uuid;

/// User id stamped on SAL requests
pub const ADMIN_USER: &str = "admin";

/// Cloud registration as stored by the CMS
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CloudDefinition {
    pub uuid: String,
    pub provider_name: String,
    #[serde(default)]
    pub valid_instance_types: Vec<String>,
    #[serde(default)]
    pub security_group: Option<String>,
    #[serde(default)]
    pub subnet: Option<String>,
    pub ssh_credentials: SshCredentials,
    #[serde(default)]
    pub endpoint: Option<String>,
    #[serde(default)]
    pub scope: Option<String>,
    #[serde(default)]
    pub project: Option<String>,
    #[serde(default)]
    pub identity_version: Option<String>,
    #[serde(default)]
    pub default_network: Option<String>,
    pub credentials: CloudCredentials,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SshCredentials {
    pub username: String,
    pub key_pair_name: String,
    pub private_key: String,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct CloudCredentials {
    pub user: String,
    pub secret: String,
    #[serde(default)]
    pub domain: Option<String>,
}

/// One entry of a policy bundle
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PolicyEntry {
    pub name: String,
    pub policy_item: Value,
    pub model: String,
}

/// Result of an undeploy request
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UndeployReceipt {
    /// Fresh uuid for the redeployable copy of the application
    pub new_uuid: String,
    pub message: Envelope,
}

/// Normalize line endings and escaped newlines in a PEM key
pub fn format_private_key(key: &str) -> String {
    key.replace("\r\n", "\n")
        .replace('\r', "\n")
        .replace("\\r\\n", "\n")
        .replace("\\n", "\n")
}

fn sal_cloud_payload(cloud: &CloudDefinition) -> Value {
    json!({
        "cloudId": cloud.uuid,
        "cloudProviderName": cloud.provider_name,
        "cloudType": "PUBLIC",
        "valid_instance_types": cloud.valid_instance_types,
        "securityGroup": cloud.security_group.clone().unwrap_or_default(),
        "subnet": cloud.subnet,
        "sshCredentials": {
            "username": cloud.ssh_credentials.username,
            "keyPairName": cloud.ssh_credentials.key_pair_name,
            "privateKey": format_private_key(&cloud.ssh_credentials.private_key),
        },
        "endpoint": cloud.endpoint,
        "scope": {
            "prefix": cloud.scope,
            "value": cloud.project,
        },
        "identityVersion": cloud.identity_version,
        "defaultNetwork": cloud.default_network,
        "credentials": {
            "user": cloud.credentials.user,
            "secret": cloud.credentials.secret,
            "domain": cloud.credentials.domain,
        },
        "blacklist": Value::Null,
    })
}

impl MessagingClient {
    pub fn application_new(&self, uuid: &str) -> Result<PendingReply, MessagingError> {
        self.send_correlated(
            topics::APPLICATION_NEW,
            json!({ "uuid": uuid }),
            &Annotations::application(uuid),
        )
    }

    pub fn application_updated(&self, uuid: &str) -> Result<PendingReply, MessagingError> {
        self.send_correlated(
            topics::APPLICATION_UPDATED,
            json!({ "uuid": uuid }),
            &Annotations::application(uuid),
        )
    }

    /// Publish both translated documents under one correlation id
    pub fn publish_application_dsl(
        &self,
        uuid: &str,
        descriptor: &ComponentDescriptor,
        metric_model: &MetricModel,
    ) -> Result<Uuid, MessagingError> {
        let correlation_id = Uuid::new_v4();
        let annotations = Annotations::application(uuid);
        let model = serde_json::to_value(metric_model)?;

        self.publish(
            Envelope::new(topics::DSL_GENERIC, serde_json::to_value(descriptor)?)
                .with_correlation_id(correlation_id.to_string())
                .with_application(&annotations),
        )?;
        self.publish(
            Envelope::new(
                topics::DSL_METRIC_MODEL,
                json!({ "application": uuid, "yaml": model }),
            )
            .with_correlation_id(correlation_id.to_string())
            .with_application(&annotations),
        )?;

        info!(application = %uuid, correlation_id = %correlation_id, "Published application DSL");
        Ok(correlation_id)
    }

    pub fn application_deploy(
        &self,
        uuid: &str,
        descriptor: &ComponentDescriptor,
    ) -> Result<(), MessagingError> {
        self.publish(
            Envelope::new(topics::APPLICATION_DEPLOY, serde_json::to_value(descriptor)?)
                .with_correlation_id(Uuid::new_v4().to_string())
                .with_application(&Annotations::application(uuid)),
        )
    }

    /// Ask the orchestrator to undeploy; does not wait for a reply
    pub fn application_undeploy(&self, uuid: &str) -> Result<UndeployReceipt, MessagingError> {
        let mut message = Envelope::new(
            topics::APPLICATION_UNDEPLOY,
            json!({
                "metaData": { "userId": ADMIN_USER },
                "applicationId": uuid,
            }),
        )
        .with_correlation_id(Uuid::new_v4().to_string());
        message.message_annotations = Annotations::application(uuid);

        self.publish(message.clone())?;
        Ok(UndeployReceipt {
            new_uuid: Uuid::new_v4().to_string(),
            message,
        })
    }

    pub fn register_cloud(&self, cloud: &CloudDefinition) -> Result<PendingReply, MessagingError> {
        let definition = serde_json::to_string(&[sal_cloud_payload(cloud)])?;
        self.send_correlated(
            topics::SAL_CLOUD_CREATE,
            json!({
                "metaData": { "userId": ADMIN_USER },
                "body": definition,
            }),
            &Annotations::none(),
        )
    }

    pub fn get_cloud(&self, cloud_id: &str) -> Result<PendingReply, MessagingError> {
        self.send_correlated(
            topics::SAL_CLOUD_GET,
            json!({
                "metaData": { "userId": ADMIN_USER },
                "body": serde_json::to_string(&[cloud_id])?,
            }),
            &Annotations::none(),
        )
    }

    pub fn delete_cloud(&self, cloud_id: &str) -> Result<PendingReply, MessagingError> {
        self.send_correlated(
            topics::SAL_CLOUD_DELETE,
            json!({
                "metaData": { "userId": ADMIN_USER },
                "body": serde_json::to_string(&[cloud_id])?,
            }),
            &Annotations::none(),
        )
    }

    /// Node candidates matching `requirements` (all candidates when empty)
    pub fn get_node_candidates(&self, requirements: Vec<Value>) -> Result<PendingReply, MessagingError> {
        self.send_correlated(
            topics::SAL_NODE_CANDIDATE_GET,
            json!({ "body": requirements }),
            &Annotations::none(),
        )
    }

    pub fn create_nodes(&self, uuid: &str, nodes: Value) -> Result<PendingReply, MessagingError> {
        self.send_correlated(
            topics::SAL_NODE_CREATE,
            json!({
                "metaData": { "userId": ADMIN_USER },
                "body": nodes,
            }),
            &Annotations::application(uuid),
        )
    }

    /// Upsert every model and rule of a policy bundle; returns the entry count
    pub fn publish_policies(&self, policies: &str) -> Result<usize, MessagingError> {
        let entries: Vec<PolicyEntry> = serde_json::from_str(policies)?;

        for entry in &entries {
            let correlation_id = Uuid::new_v4().to_string();
            self.publish(
                Envelope::new(
                    topics::POLICIES_MODEL_UPSERT,
                    json!([{ "name": entry.name, "enabled": true, "modelText": entry.model }]),
                )
                .with_correlation_id(correlation_id.clone()),
            )?;
            self.publish(
                Envelope::new(
                    topics::POLICIES_RULE_UPSERT,
                    json!([{ "name": entry.name, "policyItem": entry.policy_item }]),
                )
                .with_correlation_id(correlation_id),
            )?;
        }
        Ok(entries.len())
    }

    /// Validate SLOs with the ontology service; times out to valid
    pub async fn validate_slos(
        &self,
        uuid: &str,
        descriptor: &ComponentDescriptor,
    ) -> Result<Value, MessagingError> {
        self.request_best_effort(
            topics::BQA_VALIDATE,
            serde_json::to_value(descriptor)?,
            &Annotations::application(uuid),
            json!({ "valid": true }),
        )
        .await
    }

    /// Time-series credentials for an application; times out to `false`
    pub async fn metrics_credentials(&self, uuid: &str) -> Result<Value, MessagingError> {
        self.request_best_effort(
            topics::INFLUXDB_GET,
            json!(""),
            &Annotations::application(uuid),
            json!(false),
        )
        .await
    }
}
