//! Reading application documents from disk

use anyhow::{Context, Result};
use bridge_lib::models::ApplicationRecord;
use std::path::Path;

/// Load an application record from a JSON or YAML file
pub fn load_record(path: &Path) -> Result<ApplicationRecord> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;

    let is_yaml = matches!(
        path.extension().and_then(|e| e.to_str()),
        Some("yaml") | Some("yml")
    );
    if is_yaml {
        serde_yaml::from_str(&raw)
            .with_context(|| format!("{} is not a valid application document", path.display()))
    } else {
        serde_json::from_str(&raw)
            .with_context(|| format!("{} is not a valid application document", path.display()))
    }
}

/// Read a whole file as text
pub fn load_text(path: &Path) -> Result<String> {
    std::fs::read_to_string(path).with_context(|| format!("Failed to read {}", path.display()))
}
