//! Application document translation
//!
//! This module provides:
//! - The component descriptor consumed by the deployment pipeline
//! - The metric model consumed by the monitoring pipeline
//! - Helpers to inspect the YAML content and normalize variable keys
//!
//! Both translators are pure: the same record always yields the same
//! document, and nothing is read or written outside the record.

pub mod content;
pub mod descriptor;
pub mod keys;
pub mod metric_model;
pub mod slo;

#[cfg(test)]
mod tests;

pub use content::{component_names, content_keys, format_label, ContentError, ContentKey};
pub use descriptor::{component_descriptor, ComponentDescriptor, DEPLOYMENT_PRICE_VARIABLE};
pub use keys::{meaning_of, normalize_key};
pub use metric_model::{metric_model, MetricModel};
pub use slo::{parse_slo, SloError, SloNode, SloTree};

use crate::expression::ParseError;

/// Errors that abort a translation
#[derive(Debug, thiserror::Error)]
pub enum TranslateError {
    #[error("invalid SLO tree: {0}")]
    Slo(#[from] SloError),

    #[error("metric '{metric}' has a malformed formula: {source}")]
    Formula {
        metric: String,
        #[source]
        source: ParseError,
    },

    #[error("failed to render document: {0}")]
    Render(#[from] serde_yaml::Error),
}

impl TranslateError {
    /// Short label used for the translation error counter
    pub fn kind(&self) -> &'static str {
        match self {
            TranslateError::Slo(_) => "slo",
            TranslateError::Formula { .. } => "formula",
            TranslateError::Render(_) => "render",
        }
    }
}
