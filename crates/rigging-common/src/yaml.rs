//! Manifest parsing using yaml-rust2
//!
//! Parses (multi-document) YAML into `serde_json::Value` and from there into
//! `DynamicObject`s, the representation every candidate object travels in.

use kube::api::DynamicObject;
use serde_json::{Map, Number, Value};
use yaml_rust2::{Yaml, YamlLoader};

/// Error type for YAML parsing
#[derive(Debug, Clone, PartialEq)]
pub struct YamlError(String);

impl std::fmt::Display for YamlError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::error::Error for YamlError {}

/// Parse a multi-document YAML string into one Value per document.
///
/// Empty documents (a bare `---` or trailing separator) are dropped.
pub fn parse_yaml_multi(input: &str) -> Result<Vec<Value>, YamlError> {
    let docs = YamlLoader::load_from_str(input).map_err(|e| YamlError(e.to_string()))?;
    docs.into_iter()
        .map(yaml_to_json)
        .filter(|v| !matches!(v, Ok(Value::Null)))
        .collect()
}

/// Parse multi-document YAML into Kubernetes objects.
///
/// Every document must carry `apiVersion`, `kind` and `metadata.name`.
pub fn parse_objects(input: &str) -> Result<Vec<DynamicObject>, YamlError> {
    parse_yaml_multi(input)?
        .into_iter()
        .enumerate()
        .map(|(index, value)| {
            for pointer in ["/apiVersion", "/kind", "/metadata/name"] {
                if value.pointer(pointer).and_then(Value::as_str).is_none() {
                    return Err(YamlError(format!(
                        "document {index}: missing {}",
                        pointer.trim_start_matches('/').replace('/', ".")
                    )));
                }
            }
            serde_json::from_value::<DynamicObject>(value)
                .map_err(|e| YamlError(format!("document {index}: {e}")))
        })
        .collect()
}

/// Convert a yaml_rust2::Yaml value to serde_json::Value
fn yaml_to_json(yaml: Yaml) -> Result<Value, YamlError> {
    match yaml {
        Yaml::Null => Ok(Value::Null),
        Yaml::Boolean(b) => Ok(Value::Bool(b)),
        Yaml::Integer(i) => Ok(Value::Number(i.into())),
        Yaml::Real(s) => {
            let f: f64 = s
                .parse()
                .map_err(|e: std::num::ParseFloatError| YamlError(e.to_string()))?;
            Ok(Number::from_f64(f).map(Value::Number).unwrap_or(Value::Null))
        }
        Yaml::String(s) => Ok(Value::String(s)),
        Yaml::Array(arr) => arr
            .into_iter()
            .map(yaml_to_json)
            .collect::<Result<Vec<_>, _>>()
            .map(Value::Array),
        Yaml::Hash(map) => map
            .into_iter()
            .map(|(k, v)| {
                let key = match k {
                    Yaml::String(s) => s,
                    Yaml::Integer(i) => i.to_string(),
                    Yaml::Real(r) => r,
                    Yaml::Boolean(b) => b.to_string(),
                    _ => return Err(YamlError("unsupported YAML key type".to_string())),
                };
                yaml_to_json(v).map(|v| (key, v))
            })
            .collect::<Result<Map<String, Value>, _>>()
            .map(Value::Object),
        Yaml::Alias(_) => Err(YamlError("YAML aliases not supported".to_string())),
        Yaml::BadValue => Err(YamlError("bad YAML value".to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_multi_doc_skips_empty_documents() {
        let yaml = r#"
name: first
---
---
name: second
"#;
        let docs = parse_yaml_multi(yaml).unwrap();
        assert_eq!(docs.len(), 2);
        assert_eq!(docs[0]["name"], "first");
        assert_eq!(docs[1]["name"], "second");
    }

    #[test]
    fn test_parses_objects_with_types_and_metadata() {
        let yaml = r#"
apiVersion: rbac.authorization.k8s.io/v1
kind: RoleBinding
metadata:
  name: external-secrets-leaderelection
  namespace: external-secrets
roleRef:
  apiGroup: rbac.authorization.k8s.io
  kind: Role
  name: external-secrets-leaderelection
---
apiVersion: v1
kind: ConfigMap
metadata:
  name: settings
data:
  replicas: "2"
"#;
        let objects = parse_objects(yaml).unwrap();
        assert_eq!(objects.len(), 2);

        let binding = &objects[0];
        let types = binding.types.as_ref().unwrap();
        assert_eq!(types.kind, "RoleBinding");
        assert_eq!(types.api_version, "rbac.authorization.k8s.io/v1");
        assert_eq!(
            binding.metadata.name.as_deref(),
            Some("external-secrets-leaderelection")
        );
        assert_eq!(binding.data["roleRef"]["kind"], "Role");

        assert_eq!(objects[1].metadata.namespace, None);
        assert_eq!(objects[1].data["data"]["replicas"], "2");
    }

    #[test]
    fn test_object_without_name_is_rejected() {
        let yaml = "apiVersion: v1\nkind: ConfigMap\nmetadata: {}\n";
        let err = parse_objects(yaml).unwrap_err();
        assert!(err.to_string().contains("metadata.name"));
    }

    #[test]
    fn test_object_without_kind_is_rejected() {
        let err = parse_objects("apiVersion: v1\nmetadata:\n  name: x\n").unwrap_err();
        assert!(err.to_string().contains("document 0: missing kind"));
    }

    #[test]
    fn test_invalid_yaml_is_an_error() {
        assert!(parse_yaml_multi("not: valid: yaml: {{").is_err());
    }

    #[test]
    fn test_floats_and_bools_convert() {
        let docs = parse_yaml_multi("ratio: 1.5\nenabled: true").unwrap();
        assert!((docs[0]["ratio"].as_f64().unwrap() - 1.5).abs() < 0.0001);
        assert_eq!(docs[0]["enabled"], true);
    }
}
