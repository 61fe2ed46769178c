//! Inspection helpers for the YAML application content
//!
//! Variables are addressed by `/`-joined paths into the content; these
//! helpers list the addressable paths and the declared component names.

use serde::Serialize;
use serde_yaml::Value;

#[derive(Debug, thiserror::Error)]
pub enum ContentError {
    #[error("content is not valid YAML: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("content YAML is empty")]
    Empty,
}

/// One addressable leaf of the content
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ContentKey {
    pub value: String,
    pub label: String,
}

const PROPERTIES_PREFIX: &str = "spec/components/properties";

/// List every leaf path of the content, in document order
pub fn content_keys(content: &str) -> Result<Vec<ContentKey>, ContentError> {
    if content.trim().is_empty() {
        return Ok(Vec::new());
    }
    let document: Value = serde_yaml::from_str(content)?;
    if document.is_null() {
        return Err(ContentError::Empty);
    }

    let mut paths = Vec::new();
    flatten(&document, String::new(), &mut paths);

    Ok(paths
        .into_iter()
        .map(|path| ContentKey {
            label: format_label(&path),
            value: path,
        })
        .collect())
}

fn flatten(value: &Value, prefix: String, out: &mut Vec<String>) {
    let join = |segment: String| {
        if prefix.is_empty() {
            segment
        } else {
            format!("{}/{}", prefix, segment)
        }
    };

    match value {
        Value::Mapping(map) if !map.is_empty() => {
            for (key, child) in map {
                flatten(child, join(scalar_to_string(key)), out);
            }
        }
        Value::Sequence(items) if !items.is_empty() => {
            for (index, child) in items.iter().enumerate() {
                flatten(child, join(index.to_string()), out);
            }
        }
        Value::Tagged(tagged) => flatten(&tagged.value, prefix, out),
        _ => {
            if !prefix.is_empty() {
                out.push(prefix);
            }
        }
    }
}

fn scalar_to_string(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Number(n) => n.to_string(),
        Value::Bool(b) => b.to_string(),
        Value::Null => "null".to_string(),
        other => serde_yaml::to_string(other)
            .map(|s| s.trim().to_string())
            .unwrap_or_default(),
    }
}

/// Shorten long paths to `a/b/c[..]last` for display
pub fn format_label(key: &str) -> String {
    let key = key
        .strip_prefix(PROPERTIES_PREFIX)
        .map(|rest| rest.trim_start_matches('/'))
        .unwrap_or(key);

    let parts: Vec<&str> = key.split('/').collect();
    if parts.len() > 4 {
        let head = parts[..3].join("/");
        let dots = ".".repeat(parts.len() - 4);
        format!("{}[{}]{}", head, dots, parts[parts.len() - 1])
    } else {
        key.to_string()
    }
}

/// Names declared under `spec.components[].name`
pub fn component_names(content: &str) -> Result<Vec<String>, ContentError> {
    if content.trim().is_empty() {
        return Ok(Vec::new());
    }
    let document: Value = serde_yaml::from_str(content)?;

    let names = document
        .get("spec")
        .and_then(|spec| spec.get("components"))
        .and_then(Value::as_sequence)
        .map(|components| {
            components
                .iter()
                .filter_map(|c| c.get("name").and_then(Value::as_str))
                .filter(|name| !name.is_empty())
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default();

    Ok(names)
}

#[cfg(test)]
mod tests {
    use super::*;

    const CONTENT: &str = r#"
apiVersion: core.oam.dev/v1beta1
kind: Application
spec:
  components:
    - name: web
      type: webservice
      properties:
        image: nginx
        cpu: "2"
        ports: []
    - name: worker
      type: worker
"#;

    #[test]
    fn test_keys_are_flattened_in_order() {
        let keys = content_keys(CONTENT).unwrap();
        let values: Vec<&str> = keys.iter().map(|k| k.value.as_str()).collect();
        assert_eq!(
            values,
            vec![
                "apiVersion",
                "kind",
                "spec/components/0/name",
                "spec/components/0/type",
                "spec/components/0/properties/image",
                "spec/components/0/properties/cpu",
                "spec/components/0/properties/ports",
                "spec/components/1/name",
                "spec/components/1/type",
            ]
        );
    }

    #[test]
    fn test_labels_are_shortened() {
        assert_eq!(format_label("spec/components/0/name"), "spec/components/0/name");
        assert_eq!(
            format_label("spec/components/0/properties/image"),
            "spec/components/0[.]image"
        );
        assert_eq!(format_label("spec/components/properties/cpu"), "cpu");
    }

    #[test]
    fn test_component_names() {
        assert_eq!(component_names(CONTENT).unwrap(), vec!["web", "worker"]);
        assert!(component_names("kind: Application").unwrap().is_empty());
        assert!(component_names("").unwrap().is_empty());
    }

    #[test]
    fn test_invalid_yaml() {
        assert!(matches!(content_keys("a: [1, 2"), Err(ContentError::Yaml(_))));
        assert!(matches!(content_keys("~"), Err(ContentError::Empty)));
    }
}
