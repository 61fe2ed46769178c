//! Offline translation of application documents

use anyhow::Result;
use bridge_lib::translate::{component_descriptor, metric_model};
use std::path::Path;
use tabled::Tabled;

use crate::document::load_record;
use crate::output::{color_status, print_document, print_info, print_rows, OutputFormat};

/// Row for the descriptor variables table
#[derive(Tabled, serde::Serialize)]
struct VariableRow {
    #[tabled(rename = "Key")]
    key: String,
    #[tabled(rename = "Path")]
    path: String,
    #[tabled(rename = "Meaning")]
    meaning: String,
    #[tabled(rename = "Lower")]
    lower: f64,
    #[tabled(rename = "Higher")]
    higher: f64,
}

/// Row for the descriptor utility functions table
#[derive(Tabled, serde::Serialize)]
struct FunctionRow {
    #[tabled(rename = "Name")]
    name: String,
    #[tabled(rename = "Type")]
    kind: String,
    #[tabled(rename = "Formula")]
    formula: String,
    #[tabled(rename = "Variables")]
    variables: String,
}

/// Print the component descriptor of a document
pub fn descriptor(path: &Path, format: OutputFormat) -> Result<()> {
    let record = load_record(path)?;
    let descriptor = component_descriptor(&record)?;

    match format {
        OutputFormat::Json | OutputFormat::Yaml => print_document(&descriptor, format)?,
        OutputFormat::Table => {
            print_info(&format!(
                "{} ({}) is {}",
                descriptor.title,
                descriptor.uuid,
                color_status(descriptor.status.as_str())
            ));

            let variables: Vec<VariableRow> = descriptor
                .variables
                .iter()
                .map(|v| VariableRow {
                    key: v.key.clone(),
                    path: v.path.clone(),
                    meaning: v.meaning.clone(),
                    lower: v.value.lower_bound,
                    higher: v.value.higher_bound,
                })
                .collect();
            print_rows(&variables, format, "No variables")?;

            let functions: Vec<FunctionRow> = descriptor
                .utility_functions
                .iter()
                .map(|f| FunctionRow {
                    name: f.name.clone(),
                    kind: format!("{:?}", f.kind).to_lowercase(),
                    formula: f.expression.formula.clone(),
                    variables: f
                        .expression
                        .variables
                        .iter()
                        .map(|v| format!("{}={}", v.name, v.value))
                        .collect::<Vec<_>>()
                        .join(", "),
                })
                .collect();
            print_rows(&functions, format, "No utility functions")?;
        }
    }

    Ok(())
}

/// Print the metric model of a document; YAML unless JSON is asked for
pub fn metric_model_of(path: &Path, format: OutputFormat) -> Result<()> {
    let record = load_record(path)?;
    let model = metric_model(&record)?;

    match format {
        OutputFormat::Json => print_document(&model, format)?,
        OutputFormat::Table | OutputFormat::Yaml => print!("{}", model.to_yaml()?),
    }

    Ok(())
}
