//! Tests for the document translators
//!
//! These tests verify:
//! - Descriptor output shape and determinism
//! - Metric placement between component and application-wide scopes
//! - SLO handling in both documents

use super::*;
use crate::models::*;
use serde_json::{json, Value};

/// Helper to build a composite metric bound to the given components
fn composite(name: &str, formula: &str, components: &[&str]) -> Metric {
    Metric {
        name: name.to_string(),
        level: None,
        components: components
            .iter()
            .map(|c| ComponentRef {
                component_name: c.to_string(),
            })
            .collect(),
        template: None,
        source: MetricSource::Composite(CompositeSource {
            formula: formula.to_string(),
            ..Default::default()
        }),
    }
}

fn raw(name: &str, sensor: &str, components: &[&str]) -> Metric {
    Metric {
        name: name.to_string(),
        level: None,
        components: components
            .iter()
            .map(|c| ComponentRef {
                component_name: c.to_string(),
            })
            .collect(),
        template: Some("tpl-1".to_string()),
        source: MetricSource::Raw(RawSource {
            sensor: sensor.to_string(),
            config: vec![
                ConfigEntry {
                    name: "interval".to_string(),
                    value: "5".to_string(),
                },
                ConfigEntry {
                    name: "interval".to_string(),
                    value: "10".to_string(),
                },
            ],
            ..Default::default()
        }),
    }
}

fn slo_json() -> String {
    json!({
        "isComposite": true,
        "condition": "AND",
        "not": false,
        "children": [
            {"metricName": "latency", "operator": "<", "value": 100},
            {"metricName": "cost", "operator": "<", "value": 5}
        ]
    })
    .to_string()
}

fn price_function() -> UtilityFunction {
    UtilityFunction {
        function_name: "cost".to_string(),
        function_type: UtilityFunctionType::Minimize,
        function_expression: "price * 2".to_string(),
        function_expression_variables: vec![VariableBinding {
            name_variable: "price".to_string(),
            value_variable: DEPLOYMENT_PRICE_VARIABLE.to_string(),
        }],
        function_constraint_operator: None,
        selected: Some(true),
    }
}

fn sample_record() -> ApplicationRecord {
    ApplicationRecord {
        title: "shop".to_string(),
        uuid: "app-1".to_string(),
        status: ApplicationStatus::Valid,
        content: "kind: Application\n".to_string(),
        variables: vec![Variable {
            name: "gpu/count".to_string(),
            full_path: None,
            lower_value: 1.0,
            higher_value: 4.0,
        }],
        environment_variables: vec![EnvironmentVariable {
            name: "MODE".to_string(),
            value: "prod".to_string(),
            secret: false,
        }],
        resources: vec![Resource {
            uuid: "r-1".to_string(),
            title: "aws".to_string(),
            platform: "AWS".to_string(),
            enabled: true,
            regions: Some(json!("eu-west-1")),
            valid_instance_types: None,
        }],
        parameters: vec![],
        templates: vec![Template {
            id: "tpl-1".to_string(),
            kind: "int".to_string(),
            min_value: Some(0),
            max_value: Some(100),
            unit: Some("ms".to_string()),
        }],
        metrics: vec![
            composite("load", "cpu_a + cpu_b * cpu_a", &["web"]),
            composite("total", "sum(x, y)", &[]),
            raw("cpu", "netdata", &["web", "worker"]),
        ],
        slo_violations: slo_json(),
        utility_functions: vec![],
    }
}

mod descriptor_tests {
    use super::*;

    #[test]
    fn test_translation_is_deterministic() {
        let record = sample_record();
        let first = component_descriptor(&record).unwrap();
        let second = component_descriptor(&record).unwrap();
        assert_eq!(first, second);
        assert_eq!(
            serde_json::to_value(&first).unwrap(),
            serde_json::to_value(&second).unwrap()
        );
    }

    #[test]
    fn test_variable_normalization() {
        let descriptor = component_descriptor(&sample_record()).unwrap();
        let variable = &descriptor.variables[0];
        assert_eq!(variable.key, "gpu_count");
        assert_eq!(variable.path, "/gpu/count");
        assert_eq!(variable.meaning, "count");
        assert_eq!(variable.kind, "float");
        assert_eq!(variable.value.lower_bound, 1.0);
        assert_eq!(variable.value.higher_bound, 4.0);
    }

    #[test]
    fn test_price_variable_only_when_referenced() {
        let record = sample_record();
        let descriptor = component_descriptor(&record).unwrap();
        assert!(descriptor
            .variables
            .iter()
            .all(|v| v.key != DEPLOYMENT_PRICE_VARIABLE));

        let mut priced = record;
        priced.utility_functions.push(price_function());
        let descriptor = component_descriptor(&priced).unwrap();
        let price = descriptor.variables.last().unwrap();
        assert_eq!(price.key, DEPLOYMENT_PRICE_VARIABLE);
        assert_eq!(price.path, "");
        assert_eq!(price.meaning, "price");
        assert_eq!(price.value.lower_bound, 0.0);
        assert_eq!(descriptor.variables.len(), 2);
    }

    #[test]
    fn test_composite_metrics_gain_arguments() {
        let descriptor = component_descriptor(&sample_record()).unwrap();
        assert_eq!(
            descriptor.metrics[0].arguments,
            Some(vec!["cpu_a".to_string(), "cpu_b".to_string()])
        );
        assert_eq!(
            descriptor.metrics[1].arguments,
            Some(vec!["x".to_string(), "y".to_string()])
        );
        assert_eq!(descriptor.metrics[2].arguments, None);
    }

    #[test]
    fn test_unmodeled_metric_fields_are_mirrored() {
        let mut record = sample_record();
        record.metrics = vec![serde_json::from_value(json!({
            "type": "composite",
            "name": "load",
            "nameResult": "load_result",
            "formula": "a / b",
            "_id": "m-1",
            "metaType": "metric"
        }))
        .unwrap()];

        let descriptor = serde_json::to_value(component_descriptor(&record).unwrap()).unwrap();
        let metric = &descriptor["metrics"][0];
        assert_eq!(metric["nameResult"], "load_result");
        assert_eq!(metric["type"], "composite");
        assert_eq!(metric["arguments"], json!(["a", "b"]));
        assert!(metric.get("_id").is_none());
        assert!(metric.get("metaType").is_none());
    }

    #[test]
    fn test_malformed_formula_names_the_metric() {
        let mut record = sample_record();
        record.metrics.push(composite("broken", "(a +", &[]));
        match component_descriptor(&record) {
            Err(TranslateError::Formula { metric, .. }) => assert_eq!(metric, "broken"),
            other => panic!("expected formula error, got {:?}", other),
        }
    }

    #[test]
    fn test_slo_is_emitted_as_parsed_json() {
        let descriptor = component_descriptor(&sample_record()).unwrap();
        assert_eq!(descriptor.slo_violations["condition"], "AND");
        assert_eq!(descriptor.slo_violations["children"][1]["metricName"], "cost");

        let mut record = sample_record();
        record.slo_violations = String::new();
        let descriptor = component_descriptor(&record).unwrap();
        assert_eq!(descriptor.slo_violations, Value::Null);

        record.slo_violations = "{broken".to_string();
        assert!(matches!(
            component_descriptor(&record),
            Err(TranslateError::Slo(_))
        ));
    }

    #[test]
    fn test_utility_function_shape() {
        let mut record = sample_record();
        record.utility_functions.push(price_function());
        record.utility_functions.push(UtilityFunction {
            function_name: "limit".to_string(),
            function_type: UtilityFunctionType::Constraint,
            function_expression: "a < 3".to_string(),
            function_expression_variables: vec![VariableBinding {
                name_variable: "a".to_string(),
                value_variable: "spec/components/0 replicas".to_string(),
            }],
            function_constraint_operator: Some("<".to_string()),
            selected: Some(true),
        });

        let value = serde_json::to_value(component_descriptor(&record).unwrap()).unwrap();
        let functions = value["utilityFunctions"].as_array().unwrap();
        assert_eq!(functions[0]["type"], "minimize");
        assert_eq!(functions[0]["selected"], true);
        assert!(functions[0].get("operator").is_none());
        assert_eq!(functions[1]["operator"], "<");
        assert!(functions[1].get("selected").is_none());
        assert_eq!(
            functions[1]["expression"]["variables"][0]["value"],
            "spec_components_0_replicas"
        );
    }

    #[test]
    fn test_wire_shape_and_resources() {
        let value = serde_json::to_value(component_descriptor(&sample_record()).unwrap()).unwrap();
        assert_eq!(value["status"], "valid");
        assert_eq!(value["environmentVariables"][0]["name"], "MODE");
        assert_eq!(value["resources"][0]["regions"], "eu-west-1");
        assert_eq!(value["resources"][0]["valid_instance_types"], json!([]));
        assert_eq!(value["metrics"][0]["type"], "composite");
        assert_eq!(value["metrics"][0]["components"][0]["componentName"], "web");
        assert!(value.get("_id").is_none());
    }
}

mod metric_model_tests {
    use super::*;

    #[test]
    fn test_header_and_templates() {
        let model = metric_model(&sample_record()).unwrap();
        assert_eq!(model.api_version, "nebulous/v1");
        assert_eq!(model.kind, "MetricModel");
        assert_eq!(model.metadata.name, "app-1");
        assert_eq!(model.metadata.labels.app, "shop");
        assert_eq!(model.templates[0].range, [Some(0), Some(100)]);
    }

    #[test]
    fn test_single_component_metrics_are_scoped_to_component() {
        let model = metric_model(&sample_record()).unwrap();
        let components = &model.spec.components;

        assert_eq!(components[0].name, "web");
        assert!(components[0].metrics.is_none());

        let spec_comp = components.last().unwrap();
        assert_eq!(spec_comp.name, "spec-comp");
        let names: Vec<&str> = spec_comp
            .metrics
            .as_ref()
            .unwrap()
            .iter()
            .map(|m| m.name.as_str())
            .collect();
        assert_eq!(names, vec!["load"]);
    }

    #[test]
    fn test_zero_or_many_components_are_global() {
        let model = metric_model(&sample_record()).unwrap();
        let scope = &model.spec.scopes[0];
        assert_eq!(scope.name, "app-wide-scope");

        let names: Vec<&str> = scope.metrics.iter().map(|m| m.name.as_str()).collect();
        assert_eq!(names, vec!["total", "cpu"]);
        assert_eq!(
            scope.components.as_deref(),
            Some(&["web".to_string(), "worker".to_string()][..])
        );
    }

    #[test]
    fn test_combined_slo_requirement() {
        let model = metric_model(&sample_record()).unwrap();
        let requirements = model.spec.scopes[0].requirements.as_ref().unwrap();
        assert_eq!(requirements.len(), 1);
        assert_eq!(requirements[0].kind, "slo");
        assert_eq!(requirements[0].constraint, "(latency < 100 AND cost < 5)");

        let mut record = sample_record();
        record.slo_violations = " ".to_string();
        let model = metric_model(&record).unwrap();
        assert!(model.spec.scopes[0].requirements.as_ref().unwrap().is_empty());
    }

    #[test]
    fn test_raw_config_later_duplicates_win() {
        let model = metric_model(&sample_record()).unwrap();
        let cpu = &model.spec.scopes[0].metrics[1];
        let sensor = cpu.sensor.as_ref().unwrap();
        assert_eq!(sensor.kind, "netdata");
        assert_eq!(sensor.config.get("interval").map(String::as_str), Some("10"));
        assert_eq!(cpu.template.as_deref(), Some("tpl-1"));
    }

    #[test]
    fn test_windows_require_flag_and_complete_spec() {
        let mut record = sample_record();
        record.metrics = vec![Metric {
            source: MetricSource::Composite(CompositeSource {
                formula: "a".to_string(),
                is_window_input: true,
                input: Some(Window {
                    kind: Some("sliding".to_string()),
                    interval: Some(30),
                    unit: Some("sec".to_string()),
                }),
                is_window_output: false,
                output: Some(Window {
                    kind: Some("all".to_string()),
                    interval: Some(1),
                    unit: Some("min".to_string()),
                }),
                ..Default::default()
            }),
            ..composite("windowed", "a", &[])
        }];

        let model = metric_model(&record).unwrap();
        let detail = &model.spec.scopes[0].metrics[0];
        assert_eq!(
            detail.window,
            Some(metric_model::WindowDetail {
                kind: "sliding".to_string(),
                size: "30 sec".to_string(),
            })
        );
        assert_eq!(detail.output, None);
        assert_eq!(detail.formula.as_deref(), Some("a"));
    }

    #[test]
    fn test_parameters_scope() {
        let mut record = sample_record();
        assert_eq!(metric_model(&record).unwrap().spec.scopes.len(), 1);

        record.parameters.push(Parameter {
            name: "replicas".to_string(),
            template: "tpl-1".to_string(),
            initial_value: Some(2.0),
        });
        let model = metric_model(&record).unwrap();
        let scope = &model.spec.scopes[1];
        assert_eq!(scope.name, "parameters-scope");
        assert_eq!(scope.metrics[0].kind, "constant");
        assert_eq!(scope.metrics[0].initial, Some(2.0));
    }

    #[test]
    fn test_yaml_rendering() {
        let yaml = metric_model(&sample_record()).unwrap().to_yaml().unwrap();
        assert!(yaml.contains("apiVersion: nebulous/v1"));
        assert!(yaml.contains("name: app-wide-scope"));
        assert!(yaml.contains("latency < 100 AND cost < 5"));
    }
}
