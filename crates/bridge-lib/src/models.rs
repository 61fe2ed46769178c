//! Core data models for application documents
//!
//! These mirror the stored application document. Field names follow the
//! document store's camelCase convention so records can be deserialized
//! straight from it; administrative fields (`_id`, `organization`, ...)
//! are dropped on input, except inside metrics, which keep their unmodeled
//! fields and strip administrative ones when translated.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Lifecycle status of an application
///
/// States outside the lifecycle (`failed`, ...) are kept verbatim in
/// lowercase so whatever the orchestrator reports is stored.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum ApplicationStatus {
    #[default]
    Draft,
    Valid,
    Deploying,
    Running,
    Undeploying,
    Other(String),
}

impl ApplicationStatus {
    pub fn as_str(&self) -> &str {
        match self {
            ApplicationStatus::Draft => "draft",
            ApplicationStatus::Valid => "valid",
            ApplicationStatus::Deploying => "deploying",
            ApplicationStatus::Running => "running",
            ApplicationStatus::Undeploying => "undeploying",
            ApplicationStatus::Other(state) => state,
        }
    }

    /// Returns true if moving from `self` to `next` follows the lifecycle
    pub fn can_transition_to(&self, next: &ApplicationStatus) -> bool {
        use ApplicationStatus::*;
        matches!(
            (self, next),
            (Draft, Valid)
                | (Valid, Deploying)
                | (Deploying, Running)
                | (Running, Draft)
                | (Running, Undeploying)
                | (Undeploying, Draft)
        )
    }

    pub fn is_known(&self) -> bool {
        !matches!(self, ApplicationStatus::Other(_))
    }
}

impl fmt::Display for ApplicationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<&str> for ApplicationStatus {
    /// Case-insensitive, so orchestrator states like `RUNNING` work
    fn from(s: &str) -> Self {
        let state = s.trim().to_lowercase();
        match state.as_str() {
            "draft" => ApplicationStatus::Draft,
            "valid" => ApplicationStatus::Valid,
            "deploying" => ApplicationStatus::Deploying,
            "running" => ApplicationStatus::Running,
            "undeploying" => ApplicationStatus::Undeploying,
            _ => ApplicationStatus::Other(state),
        }
    }
}

impl From<String> for ApplicationStatus {
    fn from(s: String) -> Self {
        ApplicationStatus::from(s.as_str())
    }
}

impl From<ApplicationStatus> for String {
    fn from(status: ApplicationStatus) -> Self {
        match status {
            ApplicationStatus::Other(state) => state,
            known => known.as_str().to_string(),
        }
    }
}

impl FromStr for ApplicationStatus {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(ApplicationStatus::from(s))
    }
}

/// Application document as stored by the CMS
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApplicationRecord {
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub uuid: String,
    #[serde(default)]
    pub status: ApplicationStatus,
    /// Free-form YAML content (the deployable component spec)
    #[serde(default)]
    pub content: String,
    #[serde(default)]
    pub variables: Vec<Variable>,
    #[serde(default)]
    pub environment_variables: Vec<EnvironmentVariable>,
    #[serde(default)]
    pub resources: Vec<Resource>,
    #[serde(default)]
    pub parameters: Vec<Parameter>,
    #[serde(default)]
    pub templates: Vec<Template>,
    #[serde(default)]
    pub metrics: Vec<Metric>,
    /// SLO constraint tree serialized as JSON
    #[serde(default)]
    pub slo_violations: String,
    #[serde(default)]
    pub utility_functions: Vec<UtilityFunction>,
}

/// A tunable variable, named by its path inside the YAML content
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Variable {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub full_path: Option<String>,
    #[serde(default)]
    pub lower_value: f64,
    #[serde(default)]
    pub higher_value: f64,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct EnvironmentVariable {
    pub name: String,
    #[serde(default)]
    pub value: String,
    #[serde(default)]
    pub secret: bool,
}

/// Cloud resource the application may be deployed on
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Resource {
    #[serde(default)]
    pub uuid: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub platform: String,
    #[serde(default)]
    pub enabled: bool,
    #[serde(rename = "_regions", default)]
    pub regions: Option<serde_json::Value>,
    #[serde(rename = "_valid_instance_types", default)]
    pub valid_instance_types: Option<Vec<String>>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Parameter {
    pub name: String,
    #[serde(default)]
    pub template: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub initial_value: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Template {
    pub id: String,
    #[serde(rename = "type", default)]
    pub kind: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_value: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_value: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unit: Option<String>,
}

/// Reference from a metric to a named component of the content
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ComponentRef {
    pub component_name: String,
}

/// Windowing specification for metric input or output
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Window {
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub interval: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unit: Option<String>,
}

impl Window {
    /// Returns `(type, interval, unit)` only when all three are set
    pub fn complete(&self) -> Option<(&str, u64, &str)> {
        let kind = self.kind.as_deref().filter(|k| !k.is_empty())?;
        let interval = self.interval.filter(|i| *i > 0)?;
        let unit = self.unit.as_deref().filter(|u| !u.is_empty())?;
        Some((kind, interval, unit))
    }
}

/// Metric definition; the source is tagged by the `type` field
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Metric {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub level: Option<String>,
    #[serde(default)]
    pub components: Vec<ComponentRef>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub template: Option<String>,
    #[serde(flatten)]
    pub source: MetricSource,
}

impl Metric {
    pub fn component_names(&self) -> impl Iterator<Item = &str> {
        self.components.iter().map(|c| c.component_name.as_str())
    }

    pub fn is_composite(&self) -> bool {
        matches!(self.source, MetricSource::Composite(_))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum MetricSource {
    Composite(CompositeSource),
    Raw(RawSource),
}

/// Keys of the stored document that are never echoed back out
const ADMINISTRATIVE_FIELDS: &[&str] = &["metaType", "organization"];

pub fn is_administrative(key: &str) -> bool {
    key.starts_with('_') || ADMINISTRATIVE_FIELDS.contains(&key)
}

impl MetricSource {
    /// Fields of the stored metric that have no typed counterpart
    pub fn extra(&self) -> &serde_json::Map<String, serde_json::Value> {
        match self {
            MetricSource::Composite(composite) => &composite.extra,
            MetricSource::Raw(raw) => &raw.extra,
        }
    }

    pub fn extra_mut(&mut self) -> &mut serde_json::Map<String, serde_json::Value> {
        match self {
            MetricSource::Composite(composite) => &mut composite.extra,
            MetricSource::Raw(raw) => &mut raw.extra,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompositeSource {
    #[serde(default)]
    pub formula: String,
    #[serde(default)]
    pub is_window_input: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub input: Option<Window>,
    #[serde(default)]
    pub is_window_output: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output: Option<Window>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawSource {
    #[serde(default)]
    pub sensor: String,
    #[serde(default)]
    pub config: Vec<ConfigEntry>,
    #[serde(default)]
    pub is_window_input_raw: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub input_raw: Option<Window>,
    #[serde(default)]
    pub is_window_output_raw: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output_raw: Option<Window>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ConfigEntry {
    pub name: String,
    #[serde(default)]
    pub value: String,
}

/// Kind of utility function
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UtilityFunctionType {
    Maximize,
    Minimize,
    Constant,
    Constraint,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UtilityFunction {
    pub function_name: String,
    pub function_type: UtilityFunctionType,
    #[serde(default)]
    pub function_expression: String,
    #[serde(default)]
    pub function_expression_variables: Vec<VariableBinding>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub function_constraint_operator: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub selected: Option<bool>,
}

/// Binding of an expression symbol to a source variable
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VariableBinding {
    pub name_variable: String,
    pub value_variable: String,
}

/// User document, as far as the bridge needs it
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct UserRecord {
    pub uuid: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub firstname: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lastname: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub organization: Option<String>,
    /// Everything else stored on the user; never sent over the bus
    #[serde(flatten)]
    pub other: serde_json::Map<String, serde_json::Value>,
}
