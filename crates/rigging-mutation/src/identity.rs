//! Object identity and registry keys

use std::fmt;

use kube::api::DynamicObject;
use serde::{Deserialize, Serialize};

/// Identity of a candidate object: what errors and outcomes are reported against.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ObjectIdentity {
    /// apiVersion, empty when the object carries no type metadata
    pub api_version: String,
    /// Kind, empty when the object carries no type metadata
    pub kind: String,
    /// Namespace, None for cluster-scoped or not-yet-namespaced objects
    pub namespace: Option<String>,
    /// metadata.name (falls back to generateName, then empty)
    pub name: String,
}

impl ObjectIdentity {
    /// Build an identity from its parts
    pub fn new(
        api_version: impl Into<String>,
        kind: impl Into<String>,
        namespace: Option<String>,
        name: impl Into<String>,
    ) -> Self {
        Self {
            api_version: api_version.into(),
            kind: kind.into(),
            namespace,
            name: name.into(),
        }
    }

    /// Identity of a dynamic object
    pub fn of(obj: &DynamicObject) -> Self {
        let (api_version, kind) = obj
            .types
            .as_ref()
            .map(|t| (t.api_version.clone(), t.kind.clone()))
            .unwrap_or_default();
        let name = obj
            .metadata
            .name
            .clone()
            .or_else(|| obj.metadata.generate_name.clone())
            .unwrap_or_default();
        Self {
            api_version,
            kind,
            namespace: obj.metadata.namespace.clone(),
            name,
        }
    }

    /// Registry key for this identity
    pub fn key(&self) -> HookKey {
        HookKey::new(&self.kind, &self.name)
    }
}

impl fmt::Display for ObjectIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.namespace {
            Some(ns) => write!(f, "{}/{}/{}", self.kind, ns, self.name),
            None => write!(f, "{}/{}", self.kind, self.name),
        }
    }
}

/// Registry key: the (kind, name) pair hooks are registered under.
///
/// Namespace is not part of the key: base manifests are rendered before the
/// target namespace is known, and hooks may move objects between namespaces.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct HookKey {
    /// Object kind (e.g. "RoleBinding")
    pub kind: String,
    /// Object name (e.g. "external-secrets-leaderelection")
    pub name: String,
}

impl HookKey {
    /// Create a key
    pub fn new(kind: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            name: name.into(),
        }
    }
}

impl fmt::Display for HookKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.kind, self.name)
    }
}
