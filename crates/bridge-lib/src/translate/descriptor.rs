//! Component descriptor translation
//!
//! Produces the deployable component document published on the generic DSL
//! topic and returned to descriptor requests.

use super::keys::{meaning_of, normalize_key};
use super::slo::parse_slo;
use super::TranslateError;
use crate::expression;
use crate::models::{
    is_administrative, ApplicationRecord, ApplicationStatus, EnvironmentVariable, Metric,
    MetricSource, Parameter, Template, UtilityFunction, UtilityFunctionType,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Variable injected when a utility function prices the deployment
pub const DEPLOYMENT_PRICE_VARIABLE: &str = "application_deployment_price";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ComponentDescriptor {
    pub title: String,
    pub uuid: String,
    pub status: ApplicationStatus,
    pub content: String,
    pub variables: Vec<DescriptorVariable>,
    pub environment_variables: Vec<EnvironmentVariable>,
    pub parameters: Vec<Parameter>,
    pub templates: Vec<Template>,
    pub slo_violations: Value,
    pub metrics: Vec<DescriptorMetric>,
    pub utility_functions: Vec<DescriptorUtilityFunction>,
    pub resources: Vec<DescriptorResource>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DescriptorVariable {
    pub key: String,
    pub path: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub meaning: String,
    pub value: VariableBounds,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct VariableBounds {
    pub lower_bound: f64,
    pub higher_bound: f64,
}

/// Input metric plus the derived formula arguments
///
/// Unmodeled fields of the stored metric (`nameResult`, ...) are carried
/// through; administrative ones are dropped.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DescriptorMetric {
    #[serde(flatten)]
    pub metric: Metric,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub arguments: Option<Vec<String>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DescriptorUtilityFunction {
    pub name: String,
    #[serde(rename = "type")]
    pub kind: UtilityFunctionType,
    pub expression: FunctionExpression,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub operator: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub selected: Option<bool>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FunctionExpression {
    pub formula: String,
    pub variables: Vec<ExpressionVariable>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExpressionVariable {
    pub name: String,
    pub value: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DescriptorResource {
    pub title: String,
    pub uuid: String,
    pub platform: String,
    pub enabled: bool,
    pub regions: Option<Value>,
    pub valid_instance_types: Vec<String>,
}

/// Translate an application into its component descriptor
pub fn component_descriptor(
    record: &ApplicationRecord,
) -> Result<ComponentDescriptor, TranslateError> {
    let mut variables: Vec<DescriptorVariable> = record
        .variables
        .iter()
        .map(|v| DescriptorVariable {
            key: normalize_key(&v.name),
            path: format!("/{}", v.name),
            kind: "float".to_string(),
            meaning: meaning_of(&v.name).to_string(),
            value: VariableBounds {
                lower_bound: v.lower_value,
                higher_bound: v.higher_value,
            },
        })
        .collect();

    if uses_deployment_price(&record.utility_functions) {
        variables.push(DescriptorVariable {
            key: DEPLOYMENT_PRICE_VARIABLE.to_string(),
            path: String::new(),
            kind: "float".to_string(),
            meaning: "price".to_string(),
            value: VariableBounds {
                lower_bound: 0.0,
                higher_bound: 0.0,
            },
        });
    }

    let slo_violations = parse_slo(&record.slo_violations)?
        .map(|tree| tree.source)
        .unwrap_or(Value::Null);

    let metrics = record
        .metrics
        .iter()
        .map(describe_metric)
        .collect::<Result<Vec<_>, _>>()?;

    let utility_functions = record
        .utility_functions
        .iter()
        .map(describe_utility_function)
        .collect();

    let resources = record
        .resources
        .iter()
        .map(|r| DescriptorResource {
            title: r.title.clone(),
            uuid: r.uuid.clone(),
            platform: r.platform.clone(),
            enabled: r.enabled,
            regions: r.regions.clone(),
            valid_instance_types: r.valid_instance_types.clone().unwrap_or_default(),
        })
        .collect();

    Ok(ComponentDescriptor {
        title: record.title.clone(),
        uuid: record.uuid.clone(),
        status: record.status.clone(),
        content: record.content.clone(),
        variables,
        environment_variables: record.environment_variables.clone(),
        parameters: record.parameters.clone(),
        templates: record.templates.clone(),
        slo_violations,
        metrics,
        utility_functions,
        resources,
    })
}

fn uses_deployment_price(functions: &[UtilityFunction]) -> bool {
    functions.iter().any(|f| {
        f.function_expression_variables
            .iter()
            .any(|b| b.value_variable == DEPLOYMENT_PRICE_VARIABLE)
    })
}

fn describe_metric(metric: &Metric) -> Result<DescriptorMetric, TranslateError> {
    let arguments = match &metric.source {
        MetricSource::Composite(composite) => Some(
            expression::variables_of(&composite.formula).map_err(|source| {
                TranslateError::Formula {
                    metric: metric.name.clone(),
                    source,
                }
            })?,
        ),
        MetricSource::Raw(_) => None,
    };

    let mut metric = metric.clone();
    metric.source.extra_mut().retain(|key, _| !is_administrative(key));
    Ok(DescriptorMetric { metric, arguments })
}

fn describe_utility_function(function: &UtilityFunction) -> DescriptorUtilityFunction {
    let variables = function
        .function_expression_variables
        .iter()
        .map(|b| ExpressionVariable {
            name: b.name_variable.clone(),
            value: normalize_key(&b.value_variable),
        })
        .collect();

    let (operator, selected) = match function.function_type {
        UtilityFunctionType::Constraint => (function.function_constraint_operator.clone(), None),
        UtilityFunctionType::Maximize | UtilityFunctionType::Minimize => {
            (None, Some(function.selected.unwrap_or(false)))
        }
        UtilityFunctionType::Constant => (None, None),
    };

    DescriptorUtilityFunction {
        name: function.function_name.clone(),
        kind: function.function_type,
        expression: FunctionExpression {
            formula: function.function_expression.clone(),
            variables,
        },
        operator,
        selected,
    }
}
