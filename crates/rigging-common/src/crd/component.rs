//! SecretsComponent CRD
//!
//! A SecretsComponent installs the External Secrets Operator into a target
//! namespace. Its spec drives the mutation hooks registered for the ESO
//! manifests; it is read-only for the duration of a reconciliation pass.

use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::{DEFAULT_COLLECTION_NAME, DEFAULT_COMPONENT_NAMESPACE};

/// Image used when the spec does not pin one
pub const DEFAULT_ESO_IMAGE: &str = "ghcr.io/external-secrets/external-secrets:v0.10.7";

/// SecretsComponent installs and configures External Secrets Operator.
///
/// Example:
/// ```yaml
/// apiVersion: rigging.dev/v1alpha1
/// kind: SecretsComponent
/// metadata:
///   name: eso
///   namespace: rigging-system
/// spec:
///   namespace: external-secrets
///   secretName: eso-webhook-credentials
///   replicas: 2
///   collectionRef: platform
/// ```
#[derive(CustomResource, Clone, Debug, Deserialize, Serialize, JsonSchema, PartialEq)]
#[kube(
    group = "rigging.dev",
    version = "v1alpha1",
    kind = "SecretsComponent",
    namespaced,
    status = "SecretsComponentStatus",
    printcolumn = r#"{"name":"Namespace","type":"string","jsonPath":".spec.namespace"}"#,
    printcolumn = r#"{"name":"Phase","type":"string","jsonPath":".status.phase"}"#,
    printcolumn = r#"{"name":"Objects","type":"integer","jsonPath":".status.appliedObjects"}"#,
    printcolumn = r#"{"name":"Age","type":"date","jsonPath":".metadata.creationTimestamp"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct SecretsComponentSpec {
    /// Namespace ESO is installed into
    #[serde(default = "default_namespace")]
    pub namespace: String,

    /// Name of the secret holding the webhook credentials ESO mounts
    #[serde(default)]
    pub secret_name: String,

    /// Controller replica count
    #[serde(default = "default_replicas")]
    pub replicas: i32,

    /// Controller image override
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,

    /// Run the controller with leader election (needs the leader-election RBAC)
    #[serde(default = "default_true")]
    pub leader_election: bool,

    /// Name of the Platform collection this component belongs to
    #[serde(default = "default_collection_ref")]
    pub collection_ref: String,
}

fn default_namespace() -> String {
    DEFAULT_COMPONENT_NAMESPACE.to_string()
}

fn default_replicas() -> i32 {
    1
}

fn default_true() -> bool {
    true
}

fn default_collection_ref() -> String {
    DEFAULT_COLLECTION_NAME.to_string()
}

impl Default for SecretsComponentSpec {
    fn default() -> Self {
        Self {
            namespace: default_namespace(),
            secret_name: String::new(),
            replicas: default_replicas(),
            image: None,
            leader_election: true,
            collection_ref: default_collection_ref(),
        }
    }
}

impl SecretsComponentSpec {
    /// Validate the parts of the spec that no hook can work around.
    pub fn validate(&self) -> Result<(), String> {
        if self.namespace.trim().is_empty() {
            return Err("spec.namespace must not be empty".to_string());
        }
        if self.replicas < 0 {
            return Err(format!(
                "spec.replicas must be >= 0, got {}",
                self.replicas
            ));
        }
        if self.collection_ref.trim().is_empty() {
            return Err("spec.collectionRef must not be empty".to_string());
        }
        Ok(())
    }

    /// Controller image, falling back to the pinned default
    pub fn image(&self) -> &str {
        self.image.as_deref().unwrap_or(DEFAULT_ESO_IMAGE)
    }
}

/// SecretsComponent status
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SecretsComponentStatus {
    /// Current phase
    #[serde(default)]
    pub phase: ComponentPhase,

    /// Human-readable message
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,

    /// Number of objects applied by the last successful pass
    #[serde(default)]
    pub applied_objects: u32,

    /// Generation observed by the last pass
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub observed_generation: Option<i64>,
}

/// SecretsComponent phase
#[derive(Clone, Copy, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
pub enum ComponentPhase {
    /// Waiting on the collection or first reconcile
    #[default]
    Pending,
    /// All objects mutated and applied
    Ready,
    /// Mutation or apply failed
    Failed,
}

impl std::fmt::Display for ComponentPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Pending => write!(f, "Pending"),
            Self::Ready => write!(f, "Ready"),
            Self::Failed => write!(f, "Failed"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_minimal_yaml_gets_defaults() {
        let yaml = r#"
apiVersion: rigging.dev/v1alpha1
kind: SecretsComponent
metadata:
  name: eso
spec: {}
"#;
        let component: SecretsComponent = serde_yaml::from_str(yaml).expect("parse");
        assert_eq!(component.spec.namespace, "external-secrets");
        assert_eq!(component.spec.replicas, 1);
        assert!(component.spec.leader_election);
        assert_eq!(component.spec.collection_ref, "platform");
        assert!(component.spec.secret_name.is_empty());
        assert_eq!(component.spec.image(), DEFAULT_ESO_IMAGE);
    }

    #[test]
    fn test_full_yaml_round_trips_camel_case() {
        let yaml = r#"
apiVersion: rigging.dev/v1alpha1
kind: SecretsComponent
metadata:
  name: eso
  namespace: rigging-system
spec:
  namespace: eso-system
  secretName: eso-webhook
  replicas: 3
  image: registry.local/eso:v1
  leaderElection: false
  collectionRef: prod
"#;
        let component: SecretsComponent = serde_yaml::from_str(yaml).expect("parse");
        assert_eq!(component.spec.secret_name, "eso-webhook");
        assert_eq!(component.spec.replicas, 3);
        assert!(!component.spec.leader_election);
        assert_eq!(component.spec.image(), "registry.local/eso:v1");
        assert_eq!(component.spec.collection_ref, "prod");
    }

    #[test]
    fn test_validate_rejects_empty_namespace_and_negative_replicas() {
        let mut spec = SecretsComponentSpec::default();
        assert!(spec.validate().is_ok());

        spec.namespace = " ".to_string();
        assert!(spec.validate().unwrap_err().contains("spec.namespace"));

        spec.namespace = "eso".to_string();
        spec.replicas = -1;
        assert!(spec.validate().unwrap_err().contains("spec.replicas"));

        spec.replicas = 1;
        spec.collection_ref = String::new();
        assert!(spec.validate().unwrap_err().contains("spec.collectionRef"));
    }

    #[test]
    fn test_phase_displays_as_pascal_case() {
        assert_eq!(ComponentPhase::Ready.to_string(), "Ready");
        assert_eq!(ComponentPhase::default(), ComponentPhase::Pending);
    }
}
