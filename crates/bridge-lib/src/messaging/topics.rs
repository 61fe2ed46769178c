//! Bus topic names

pub const PREFIX: &str = "topic://eu.nebulouscloud.";

pub const SAL_CLOUD_GET: &str = "topic://eu.nebulouscloud.exn.sal.cloud.get";
pub const SAL_CLOUD_CREATE: &str = "topic://eu.nebulouscloud.exn.sal.cloud.create";
pub const SAL_CLOUD_DELETE: &str = "topic://eu.nebulouscloud.exn.sal.cloud.delete";
pub const SAL_NODE_CANDIDATE_GET: &str = "topic://eu.nebulouscloud.exn.sal.nodecandidate.get";
pub const SAL_NODE_CREATE: &str = "topic://eu.nebulouscloud.exn.sal.node.create";

pub const SAL_CLOUD_GET_REPLY: &str = "topic://eu.nebulouscloud.exn.sal.cloud.get.reply";
pub const SAL_CLOUD_CREATE_REPLY: &str = "topic://eu.nebulouscloud.exn.sal.cloud.create.reply";
pub const SAL_CLOUD_DELETE_REPLY: &str = "topic://eu.nebulouscloud.exn.sal.cloud.delete.reply";
pub const SAL_NODE_CANDIDATE_GET_REPLY: &str =
    "topic://eu.nebulouscloud.exn.sal.nodecandidate.get.reply";
pub const SAL_NODE_CREATE_REPLY: &str = "topic://eu.nebulouscloud.exn.sal.node.create.reply";

pub const APPLICATION_NEW: &str = "topic://eu.nebulouscloud.ui.application.new";
pub const APPLICATION_UPDATED: &str = "topic://eu.nebulouscloud.ui.application.updated";
pub const APPLICATION_DEPLOY: &str = "topic://eu.nebulouscloud.ui.application.deploy";
pub const APPLICATION_UNDEPLOY: &str = "topic://eu.nebulouscloud.ui.application.undeploy";
pub const DSL_GENERIC: &str = "topic://eu.nebulouscloud.ui.dsl.generic";
pub const DSL_METRIC_MODEL: &str = "topic://eu.nebulouscloud.ui.dsl.metric_model";
pub const POLICIES_RULE_UPSERT: &str = "topic://eu.nebulouscloud.ui.policies.rule.upsert";
pub const POLICIES_MODEL_UPSERT: &str = "topic://eu.nebulouscloud.ui.policies.model.upsert";

pub const APP_GET: &str = "topic://eu.nebulouscloud.ui.app.get";
pub const APP_GET_REPLY: &str = "topic://eu.nebulouscloud.ui.app.get.reply";
pub const USER_GET: &str = "topic://eu.nebulouscloud.ui.user.get";
pub const USER_GET_REPLY: &str = "topic://eu.nebulouscloud.ui.user.get.reply";
pub const APP_STATE: &str = "topic://eu.nebulouscloud.optimiser.controller.app_state";

pub const BQA_VALIDATE: &str = "topic://eu.nebulouscloud.ontology.bqa";
pub const BQA_VALIDATE_REPLY: &str = "topic://eu.nebulouscloud.ontology.bqa.reply";
pub const INFLUXDB_GET: &str = "topic://eu.nebulouscloud.app_cluster.influxdb.get";
pub const INFLUXDB_GET_REPLY: &str = "topic://eu.nebulouscloud.app_cluster.influxdb.get.reply";

/// Reply topics subscribed on every connection
pub const REPLIES: &[&str] = &[
    SAL_CLOUD_GET_REPLY,
    SAL_CLOUD_CREATE_REPLY,
    SAL_CLOUD_DELETE_REPLY,
    SAL_NODE_CANDIDATE_GET_REPLY,
    SAL_NODE_CREATE_REPLY,
    BQA_VALIDATE_REPLY,
    INFLUXDB_GET_REPLY,
];

/// Replies on these topics resolve with the body whatever its status
pub const UNCONDITIONAL_REPLIES: &[&str] = &[BQA_VALIDATE_REPLY, INFLUXDB_GET_REPLY];

/// Destinations opened on every connection
pub const OUTBOUND: &[&str] = &[
    SAL_CLOUD_CREATE,
    SAL_CLOUD_GET,
    SAL_CLOUD_DELETE,
    SAL_NODE_CANDIDATE_GET,
    SAL_NODE_CREATE,
    APPLICATION_NEW,
    APPLICATION_UPDATED,
    APPLICATION_DEPLOY,
    APPLICATION_UNDEPLOY,
    DSL_GENERIC,
    DSL_METRIC_MODEL,
    POLICIES_RULE_UPSERT,
    POLICIES_MODEL_UPSERT,
    APP_GET_REPLY,
    USER_GET_REPLY,
    BQA_VALIDATE,
    INFLUXDB_GET,
];

/// Topic name without the shared prefix, for logs and metric labels
pub fn short_name(topic: &str) -> &str {
    topic.strip_prefix(PREFIX).unwrap_or(topic)
}
