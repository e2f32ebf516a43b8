//! Embedded External Secrets Operator manifests
//!
//! The base manifests are static YAML compiled into the binary. Rendering
//! parses them and places namespaced objects into the component's target
//! namespace; everything that depends on the parent or the platform is left
//! to the mutation hooks.

use kube::api::DynamicObject;
use kube::discovery::ApiResource;

use rigging_common::kube_utils::{api_resource_for, is_cluster_scoped};
use rigging_common::yaml::parse_objects;
use rigging_mutation::{HookKey, ObjectIdentity};

use crate::ReconcileError;

/// Base ESO manifests
pub const ESO_MANIFESTS: &str = include_str!("../manifests/external-secrets.yaml");

/// Name shared by the ServiceAccount, Deployment and Namespace
pub const ESO_NAME: &str = "external-secrets";

/// Leader-election Role and RoleBinding
pub const LEADER_ELECTION_NAME: &str = "external-secrets-leaderelection";

/// Controller ClusterRole and ClusterRoleBinding
pub const CONTROLLER_ROLE_NAME: &str = "external-secrets-controller";

/// Settings ConfigMap shared with tenant namespaces
pub const SETTINGS_CONFIGMAP: &str = "external-secrets-settings";

/// Render the base manifests for a component installed into `namespace`.
///
/// Namespaced objects get `metadata.namespace` set. Cluster-scoped objects,
/// the Namespace object included, are left for the hooks.
pub fn render(namespace: &str) -> Result<Vec<DynamicObject>, ReconcileError> {
    if namespace.trim().is_empty() {
        return Err(ReconcileError::Validation(
            "target namespace must not be empty".to_string(),
        ));
    }

    let mut objects =
        parse_objects(ESO_MANIFESTS).map_err(|e| ReconcileError::Manifest(e.to_string()))?;

    for obj in &mut objects {
        let kind = obj.types.as_ref().map(|t| t.kind.as_str()).unwrap_or("");
        if !is_cluster_scoped(kind) {
            obj.metadata.namespace = Some(namespace.to_string());
        }
    }
    Ok(objects)
}

/// Registry keys of every base object, in manifest order
pub fn object_keys() -> Result<Vec<HookKey>, ReconcileError> {
    let objects =
        parse_objects(ESO_MANIFESTS).map_err(|e| ReconcileError::Manifest(e.to_string()))?;
    Ok(objects
        .iter()
        .map(|o| ObjectIdentity::of(o).key())
        .collect())
}

/// Resources whose stale objects are pruned after a successful apply, one
/// per kind in manifest order.
///
/// Namespaces are never pruned: deleting one takes everything inside with it.
pub fn prunable_resources(objects: &[DynamicObject]) -> Result<Vec<ApiResource>, ReconcileError> {
    let mut resources: Vec<ApiResource> = Vec::new();
    for obj in objects {
        let ar = api_resource_for(obj).map_err(|e| ReconcileError::Manifest(e.to_string()))?;
        if ar.kind != "Namespace" && !resources.iter().any(|r| r.kind == ar.kind) {
            resources.push(ar);
        }
    }
    Ok(resources)
}
