//! Metric model translation
//!
//! Metrics tied to exactly one component are listed per component; metrics
//! with no component or several components belong to the application-wide
//! scope, together with the combined SLO requirement.

use super::slo::parse_slo;
use super::TranslateError;
use crate::models::{ApplicationRecord, Metric, MetricSource, Parameter, Template, Window};
use serde::Serialize;
use std::collections::BTreeMap;

pub const API_VERSION: &str = "nebulous/v1";
pub const KIND: &str = "MetricModel";
pub const COMPONENT_SCOPE: &str = "spec-comp";
pub const APP_WIDE_SCOPE: &str = "app-wide-scope";
pub const PARAMETERS_SCOPE: &str = "parameters-scope";
pub const COMBINED_SLO: &str = "combined-slo";

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MetricModel {
    pub api_version: String,
    pub kind: String,
    pub metadata: ModelMetadata,
    pub templates: Vec<ModelTemplate>,
    pub spec: ModelSpec,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ModelMetadata {
    pub name: String,
    pub labels: ModelLabels,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ModelLabels {
    pub app: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ModelTemplate {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub range: [Option<i64>; 2],
    #[serde(skip_serializing_if = "Option::is_none")]
    pub unit: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ModelSpec {
    pub components: Vec<ModelComponent>,
    pub scopes: Vec<ModelScope>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ModelComponent {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metrics: Option<Vec<MetricDetail>>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ModelScope {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub components: Option<Vec<String>>,
    pub metrics: Vec<MetricDetail>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub requirements: Option<Vec<Requirement>>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Requirement {
    pub name: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub constraint: String,
}

/// One metric as the monitoring pipeline sees it
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MetricDetail {
    pub name: String,
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub template: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub formula: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sensor: Option<SensorDetail>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub initial: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub window: Option<WindowDetail>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SensorDetail {
    #[serde(rename = "type")]
    pub kind: String,
    pub config: BTreeMap<String, String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WindowDetail {
    #[serde(rename = "type")]
    pub kind: String,
    pub size: String,
}

impl MetricModel {
    /// Render as the YAML document published to the monitoring pipeline
    pub fn to_yaml(&self) -> Result<String, TranslateError> {
        Ok(serde_yaml::to_string(self)?)
    }
}

/// Translate an application into its metric model
pub fn metric_model(record: &ApplicationRecord) -> Result<MetricModel, TranslateError> {
    let mut component_order: Vec<String> = Vec::new();
    let mut component_metrics = Vec::new();
    let mut global_components: Vec<String> = Vec::new();
    let mut global_metrics = Vec::new();

    for metric in &record.metrics {
        let detail = metric_detail(metric);
        let names: Vec<&str> = metric.component_names().collect();

        if let [single] = names.as_slice() {
            push_unique(&mut component_order, single);
            component_metrics.push(detail);
        } else {
            for name in names {
                push_unique(&mut global_components, name);
            }
            global_metrics.push(detail);
        }
    }

    let requirements = parse_slo(&record.slo_violations)?
        .map(|tree| Requirement {
            name: COMBINED_SLO.to_string(),
            kind: "slo".to_string(),
            constraint: tree.root.flatten(),
        })
        .into_iter()
        .collect();

    let mut components: Vec<ModelComponent> = component_order
        .into_iter()
        .map(|name| ModelComponent {
            name,
            metrics: None,
        })
        .collect();
    components.push(ModelComponent {
        name: COMPONENT_SCOPE.to_string(),
        metrics: Some(component_metrics),
    });

    let mut scopes = vec![ModelScope {
        name: APP_WIDE_SCOPE.to_string(),
        components: Some(global_components),
        metrics: global_metrics,
        requirements: Some(requirements),
    }];
    if !record.parameters.is_empty() {
        scopes.push(ModelScope {
            name: PARAMETERS_SCOPE.to_string(),
            components: None,
            metrics: record.parameters.iter().map(parameter_detail).collect(),
            requirements: None,
        });
    }

    Ok(MetricModel {
        api_version: API_VERSION.to_string(),
        kind: KIND.to_string(),
        metadata: ModelMetadata {
            name: record.uuid.clone(),
            labels: ModelLabels {
                app: record.title.clone(),
            },
        },
        templates: record.templates.iter().map(template_detail).collect(),
        spec: ModelSpec { components, scopes },
    })
}

fn push_unique(list: &mut Vec<String>, name: &str) {
    if !list.iter().any(|n| n == name) {
        list.push(name.to_string());
    }
}

fn template_detail(template: &Template) -> ModelTemplate {
    ModelTemplate {
        id: template.id.clone(),
        kind: template.kind.clone(),
        range: [template.min_value, template.max_value],
        unit: template.unit.clone(),
    }
}

fn window_detail(enabled: bool, window: Option<&Window>) -> Option<WindowDetail> {
    if !enabled {
        return None;
    }
    let (kind, interval, unit) = window?.complete()?;
    Some(WindowDetail {
        kind: kind.to_string(),
        size: format!("{} {}", interval, unit),
    })
}

fn output_detail(enabled: bool, window: Option<&Window>) -> Option<String> {
    if !enabled {
        return None;
    }
    let (kind, interval, unit) = window?.complete()?;
    Some(format!("{} {} {}", kind, interval, unit))
}

fn metric_detail(metric: &Metric) -> MetricDetail {
    match &metric.source {
        MetricSource::Composite(composite) => MetricDetail {
            name: metric.name.clone(),
            kind: "composite".to_string(),
            template: metric.template.clone(),
            formula: Some(composite.formula.clone()),
            sensor: None,
            initial: None,
            window: window_detail(composite.is_window_input, composite.input.as_ref()),
            output: output_detail(composite.is_window_output, composite.output.as_ref()),
        },
        MetricSource::Raw(raw) => {
            // later duplicates overwrite earlier ones
            let config = raw
                .config
                .iter()
                .map(|entry| (entry.name.clone(), entry.value.clone()))
                .collect();
            MetricDetail {
                name: metric.name.clone(),
                kind: "raw".to_string(),
                template: metric.template.clone(),
                formula: None,
                sensor: Some(SensorDetail {
                    kind: raw.sensor.clone(),
                    config,
                }),
                initial: None,
                window: window_detail(raw.is_window_input_raw, raw.input_raw.as_ref()),
                output: output_detail(raw.is_window_output_raw, raw.output_raw.as_ref()),
            }
        }
    }
}

fn parameter_detail(parameter: &Parameter) -> MetricDetail {
    MetricDetail {
        name: parameter.name.clone(),
        kind: "constant".to_string(),
        template: Some(parameter.template.clone()),
        formula: None,
        sensor: None,
        initial: parameter.initial_value,
        window: None,
        output: None,
    }
}
