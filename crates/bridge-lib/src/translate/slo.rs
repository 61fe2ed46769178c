//! SLO constraint trees
//!
//! The tree is stored on the application as a JSON string. It is decoded
//! once, validated into [`SloNode`], and either emitted as-is (component
//! descriptor) or flattened into a single boolean constraint (metric model).

use serde::Deserialize;
use serde_json::Value;
use std::fmt;

#[derive(Debug, thiserror::Error)]
pub enum SloError {
    #[error("SLO is not valid JSON: {0}")]
    InvalidJson(#[from] serde_json::Error),

    #[error("SLO leaf '{metric}' must not have children")]
    LeafWithChildren { metric: String },

    #[error("SLO composite node must have at least one child")]
    EmptyComposite,

    #[error("SLO composite node has unknown condition '{0}'")]
    UnknownCondition(String),

    #[error("SLO node is missing '{0}'")]
    MissingField(&'static str),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Condition {
    And,
    Or,
}

impl fmt::Display for Condition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Condition::And => f.write_str("AND"),
            Condition::Or => f.write_str("OR"),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum SloNode {
    Leaf {
        metric_name: String,
        operator: String,
        value: Value,
    },
    Composite {
        condition: Condition,
        negated: bool,
        children: Vec<SloNode>,
    },
}

/// Node shape as written by the editor
#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawNode {
    #[serde(default)]
    is_composite: bool,
    #[serde(default)]
    condition: Option<String>,
    #[serde(default)]
    not: bool,
    #[serde(default)]
    children: Option<Vec<RawNode>>,
    #[serde(default)]
    metric_name: Option<String>,
    #[serde(default)]
    operator: Option<String>,
    #[serde(default)]
    value: Option<Value>,
}

impl TryFrom<RawNode> for SloNode {
    type Error = SloError;

    fn try_from(raw: RawNode) -> Result<Self, Self::Error> {
        let children = raw.children.unwrap_or_default();

        if raw.is_composite {
            if children.is_empty() {
                return Err(SloError::EmptyComposite);
            }
            let condition = match raw.condition.as_deref().map(str::to_uppercase).as_deref() {
                Some("AND") => Condition::And,
                Some("OR") => Condition::Or,
                Some(_) => {
                    return Err(SloError::UnknownCondition(
                        raw.condition.unwrap_or_default(),
                    ))
                }
                None => return Err(SloError::MissingField("condition")),
            };
            let children = children
                .into_iter()
                .map(SloNode::try_from)
                .collect::<Result<Vec<_>, _>>()?;
            return Ok(SloNode::Composite {
                condition,
                negated: raw.not,
                children,
            });
        }

        let metric_name = raw
            .metric_name
            .filter(|m| !m.is_empty())
            .ok_or(SloError::MissingField("metricName"))?;
        if !children.is_empty() {
            return Err(SloError::LeafWithChildren {
                metric: metric_name,
            });
        }
        let operator = raw
            .operator
            .filter(|o| !o.is_empty())
            .ok_or(SloError::MissingField("operator"))?;
        let value = raw
            .value
            .filter(|v| !v.is_null())
            .ok_or(SloError::MissingField("value"))?;

        Ok(SloNode::Leaf {
            metric_name,
            operator,
            value,
        })
    }
}

impl SloNode {
    /// Render as a single boolean constraint, depth-first
    pub fn flatten(&self) -> String {
        match self {
            SloNode::Leaf {
                metric_name,
                operator,
                value,
            } => format!("{} {} {}", metric_name, operator, render_value(value)),
            SloNode::Composite {
                condition,
                negated,
                children,
            } => {
                let joined = children
                    .iter()
                    .map(SloNode::flatten)
                    .collect::<Vec<_>>()
                    .join(&format!(" {} ", condition));
                if *negated {
                    format!("NOT ({})", joined)
                } else {
                    format!("({})", joined)
                }
            }
        }
    }
}

/// Strings unquoted, whole floats without a fraction (`5.0` prints `5`)
fn render_value(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Number(n) if !(n.is_i64() || n.is_u64()) => match n.as_f64() {
            Some(f) => f.to_string(),
            None => n.to_string(),
        },
        other => other.to_string(),
    }
}

/// Decoded SLO: the validated tree plus the exact JSON it came from
#[derive(Debug, Clone, PartialEq)]
pub struct SloTree {
    pub root: SloNode,
    pub source: Value,
}

/// Decode the stored SLO string; blank input means "no SLO"
pub fn parse_slo(json: &str) -> Result<Option<SloTree>, SloError> {
    if json.trim().is_empty() {
        return Ok(None);
    }
    let source: Value = serde_json::from_str(json)?;
    let raw: RawNode = serde_json::from_value(source.clone())?;
    let root = SloNode::try_from(raw)?;
    Ok(Some(SloTree { root, source }))
}
