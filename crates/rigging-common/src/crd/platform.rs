//! Platform CRD
//!
//! The cluster-wide collection components belong to. Carries settings that
//! cut across components (tenant namespaces, common labels).

use std::collections::BTreeMap;

use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Platform groups components and carries their shared configuration.
///
/// Example:
/// ```yaml
/// apiVersion: rigging.dev/v1alpha1
/// kind: Platform
/// metadata:
///   name: platform
/// spec:
///   clusterName: prod-us-west
///   namespaces: [team-a, team-b]
///   commonLabels:
///     platform.example.com/tier: core
/// ```
#[derive(CustomResource, Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[kube(
    group = "rigging.dev",
    version = "v1alpha1",
    kind = "Platform",
    printcolumn = r#"{"name":"Cluster","type":"string","jsonPath":".spec.clusterName"}"#,
    printcolumn = r#"{"name":"Age","type":"date","jsonPath":".metadata.creationTimestamp"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct PlatformSpec {
    /// Tenant namespaces that receive shared component configuration
    #[serde(default)]
    pub namespaces: Vec<String>,

    /// Name of the cluster the platform runs on
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cluster_name: Option<String>,

    /// Labels added to every object a component applies
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub common_labels: BTreeMap<String, String>,
}

impl PlatformSpec {
    /// Tenant namespaces with duplicates and blanks removed, order preserved
    pub fn tenant_namespaces(&self) -> Vec<&str> {
        let mut seen = std::collections::BTreeSet::new();
        self.namespaces
            .iter()
            .map(|ns| ns.trim())
            .filter(|ns| !ns.is_empty() && seen.insert(*ns))
            .collect()
    }
}
