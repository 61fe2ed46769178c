//! Formula and content inspection

use anyhow::Result;
use bridge_lib::expression::variables_of;
use bridge_lib::translate::{component_names, content_keys, meaning_of, normalize_key};
use std::path::Path;
use tabled::Tabled;

use crate::document::load_text;
use crate::output::{print_rows, OutputFormat};

#[derive(Tabled, serde::Serialize)]
struct SymbolRow {
    #[tabled(rename = "Variable")]
    name: String,
}

#[derive(Tabled, serde::Serialize)]
struct KeyRow {
    #[tabled(rename = "Key")]
    key: String,
    #[tabled(rename = "Path")]
    path: String,
    #[tabled(rename = "Label")]
    label: String,
    #[tabled(rename = "Meaning")]
    meaning: String,
}

#[derive(Tabled, serde::Serialize)]
struct ComponentRow {
    #[tabled(rename = "Component")]
    name: String,
}

/// List the free variables of a formula
pub fn formula_variables(formula: &str, format: OutputFormat) -> Result<()> {
    let rows: Vec<SymbolRow> = variables_of(formula)?
        .into_iter()
        .map(|name| SymbolRow { name })
        .collect();
    print_rows(&rows, format, "Formula has no variables")
}

/// List the addressable keys of a YAML content file
pub fn keys(path: &Path, format: OutputFormat) -> Result<()> {
    let content = load_text(path)?;
    let rows: Vec<KeyRow> = content_keys(&content)?
        .into_iter()
        .map(|key| KeyRow {
            key: normalize_key(&key.value),
            meaning: meaning_of(&key.value).to_string(),
            path: key.value,
            label: key.label,
        })
        .collect();
    print_rows(&rows, format, "Content has no keys")
}

/// List the components declared by a YAML content file
pub fn components(path: &Path, format: OutputFormat) -> Result<()> {
    let content = load_text(path)?;
    let rows: Vec<ComponentRow> = component_names(&content)?
        .into_iter()
        .map(|name| ComponentRow { name })
        .collect();
    print_rows(&rows, format, "Content declares no spec.components")
}
