//! Shared Kubernetes utilities using kube-rs
//!
//! ApiResource construction for dynamic objects, apply ordering, status
//! patching, `ApplyBatch` for parallel server-side apply, and pruning of
//! labelled objects that are no longer rendered.

use std::collections::BTreeSet;
use std::future::Future;
use std::pin::Pin;

use kube::api::{Api, DeleteParams, DynamicObject, ListParams, Patch, PatchParams};
use kube::discovery::ApiResource;
use kube::Client;
use tracing::{debug, info};

use crate::Error;

/// Kind -> plural overrides for kinds the fallback rules get wrong
const KIND_PLURALS: &[(&str, &str)] = &[
    ("endpoints", "endpoints"),
    ("ingress", "ingresses"),
    ("networkpolicy", "networkpolicies"),
    ("podsecuritypolicy", "podsecuritypolicies"),
];

/// Kinds that live outside any namespace
const CLUSTER_SCOPED_KINDS: &[&str] = &[
    "Namespace",
    "ClusterRole",
    "ClusterRoleBinding",
    "CustomResourceDefinition",
    "ValidatingWebhookConfiguration",
    "MutatingWebhookConfiguration",
    "PriorityClass",
    "StorageClass",
    "ClusterSecretStore",
    "ClusterExternalSecret",
    "Platform",
];

/// Parse apiVersion into (group, version)
///
/// # Examples
/// ```
/// use rigging_common::kube_utils::parse_api_version;
///
/// let (group, version) = parse_api_version("apps/v1");
/// assert_eq!(group, "apps");
/// assert_eq!(version, "v1");
///
/// let (group, version) = parse_api_version("v1");
/// assert_eq!(group, "");
/// assert_eq!(version, "v1");
/// ```
pub fn parse_api_version(api_version: &str) -> (String, String) {
    match api_version.split_once('/') {
        Some((group, version)) => (group.to_string(), version.to_string()),
        None => (String::new(), api_version.to_string()),
    }
}

/// Build an ApiResource from a known apiVersion and kind.
///
/// The version is used exactly as given, which is what we want for objects
/// rendered from our own manifests.
pub fn build_api_resource(api_version: &str, kind: &str) -> ApiResource {
    let (group, version) = parse_api_version(api_version);
    ApiResource {
        group,
        version,
        kind: kind.to_string(),
        api_version: api_version.to_string(),
        plural: pluralize_kind(kind),
    }
}

/// Build the ApiResource for a dynamic object from its type metadata.
pub fn api_resource_for(obj: &DynamicObject) -> Result<ApiResource, Error> {
    let types = obj.types.as_ref().ok_or_else(|| {
        Error::internal_with_context(
            "api_resource_for",
            format!(
                "object {} has no apiVersion/kind",
                obj.metadata.name.as_deref().unwrap_or("<unnamed>")
            ),
        )
    })?;
    Ok(build_api_resource(&types.api_version, &types.kind))
}

/// Whether objects of this kind are cluster scoped
pub fn is_cluster_scoped(kind: &str) -> bool {
    CLUSTER_SCOPED_KINDS.contains(&kind)
}

/// Pluralize a Kubernetes resource kind
///
/// Uses a lookup table for irregular kinds, falling back to simple
/// pluralization rules.
pub fn pluralize_kind(kind: &str) -> String {
    let lower = kind.to_lowercase();

    for (singular, plural) in KIND_PLURALS {
        if *singular == lower {
            return (*plural).to_string();
        }
    }

    if lower.ends_with('s') || lower.ends_with("ch") || lower.ends_with("sh") {
        format!("{}es", lower)
    } else if lower.ends_with('y') && !lower.ends_with("ay") && !lower.ends_with("ey") {
        format!("{}ies", &lower[..lower.len() - 1])
    } else {
        format!("{}s", lower)
    }
}

/// Get priority for a Kubernetes resource kind (lower = apply first)
///
/// Namespaces and RBAC must exist before the workloads that use them.
pub fn kind_priority(kind: &str) -> u8 {
    match kind {
        "Namespace" => 0,
        "CustomResourceDefinition" => 1,
        "ServiceAccount" => 2,
        "ClusterRole" | "Role" => 3,
        "ClusterRoleBinding" | "RoleBinding" => 4,
        "ConfigMap" | "Secret" => 5,
        "Service" => 7,
        "Deployment" | "DaemonSet" | "StatefulSet" => 8,
        _ => 10,
    }
}

/// Group objects into apply layers by [`kind_priority`], keeping the input
/// order within a layer.
pub fn layer_by_priority(objects: &[DynamicObject]) -> Vec<(u8, Vec<&DynamicObject>)> {
    let mut layers: std::collections::BTreeMap<u8, Vec<&DynamicObject>> =
        std::collections::BTreeMap::new();
    for obj in objects {
        let kind = obj.types.as_ref().map(|t| t.kind.as_str()).unwrap_or("");
        layers.entry(kind_priority(kind)).or_default().push(obj);
    }
    layers.into_iter().collect()
}

/// Patch the status sub-resource of a namespaced Kubernetes resource.
///
/// Serializes `status` into `{ "status": <status> }` and applies it via
/// merge-patch.
pub async fn patch_resource_status<T>(
    client: &Client,
    name: &str,
    namespace: &str,
    status: &impl serde::Serialize,
    field_manager: &str,
) -> std::result::Result<(), kube::Error>
where
    T: kube::Resource<Scope = k8s_openapi::NamespaceResourceScope>
        + Clone
        + serde::de::DeserializeOwned
        + std::fmt::Debug,
    <T as kube::Resource>::DynamicType: Default,
{
    let api: Api<T> = Api::namespaced(client.clone(), namespace);
    let patch = serde_json::json!({ "status": status });
    api.patch_status(name, &PatchParams::apply(field_manager), &Patch::Merge(&patch))
        .await?;
    Ok(())
}

// =============================================================================
// ApplyBatch: parallel server-side-apply for dynamic objects
// =============================================================================

type ApplyFuture = Pin<Box<dyn Future<Output = Result<(), Error>> + Send>>;

/// Collects server-side-apply operations and runs them in parallel.
///
/// The `ApiResource` and scope of each object are derived from its own type
/// metadata; namespaced objects without a namespace are applied into
/// `default_namespace`.
pub struct ApplyBatch<'a> {
    client: Client,
    futures: Vec<ApplyFuture>,
    default_namespace: &'a str,
    params: &'a PatchParams,
}

impl<'a> ApplyBatch<'a> {
    /// Create a new batch with the given fallback namespace and `PatchParams`.
    pub fn new(client: Client, default_namespace: &'a str, params: &'a PatchParams) -> Self {
        Self {
            client,
            futures: Vec::new(),
            default_namespace,
            params,
        }
    }

    /// Queue a server-side-apply patch for a dynamic object.
    pub fn push(&mut self, obj: &DynamicObject) -> Result<(), Error> {
        let ar = api_resource_for(obj)?;
        let name = obj.metadata.name.clone().ok_or_else(|| {
            Error::internal_with_context("apply", format!("{} object has no name", ar.kind))
        })?;

        let api: Api<DynamicObject> = if is_cluster_scoped(&ar.kind) {
            Api::all_with(self.client.clone(), &ar)
        } else {
            let ns = obj
                .metadata
                .namespace
                .as_deref()
                .unwrap_or(self.default_namespace);
            Api::namespaced_with(self.client.clone(), ns, &ar)
        };

        let json = serde_json::to_value(obj)
            .map_err(|e| Error::serialization_for_kind(ar.kind.clone(), e.to_string()))?;
        let params = self.params.clone();
        let kind = ar.kind.clone();
        self.futures.push(Box::pin(async move {
            debug!(name = %name, kind = %kind, "applying resource");
            api.patch(&name, &params, &Patch::Apply(&json)).await?;
            Ok(())
        }));
        Ok(())
    }

    /// Number of queued patches
    pub fn len(&self) -> usize {
        self.futures.len()
    }

    /// Whether nothing is queued
    pub fn is_empty(&self) -> bool {
        self.futures.is_empty()
    }

    /// Execute all queued patches in parallel, returning the count applied.
    pub async fn run(self, layer: &str) -> Result<usize, Error> {
        use futures::future::join_all;

        let count = self.futures.len();
        if count == 0 {
            return Ok(0);
        }

        debug!(count, layer, "applying resources in parallel");
        let results = join_all(self.futures).await;

        let mut errors: Vec<_> = results.into_iter().filter_map(|r| r.err()).collect();
        if !errors.is_empty() {
            for (i, err) in errors.iter().enumerate() {
                tracing::error!(error = %err, index = i, layer, "resource application failed");
            }
            return Err(errors.swap_remove(0));
        }

        Ok(count)
    }
}

// =============================================================================
// Pruning
// =============================================================================

/// Objects in `existing` (all of kind `kind`) with no counterpart in `keep`.
///
/// Objects match on kind, namespace and name.
pub fn stale_objects<'a>(
    kind: &str,
    existing: &'a [DynamicObject],
    keep: &[DynamicObject],
) -> Vec<&'a DynamicObject> {
    let kept: BTreeSet<(&str, Option<&str>, &str)> = keep
        .iter()
        .filter_map(|o| {
            let types = o.types.as_ref()?;
            Some((
                types.kind.as_str(),
                o.metadata.namespace.as_deref(),
                o.metadata.name.as_deref()?,
            ))
        })
        .collect();

    existing
        .iter()
        .filter(|o| match o.metadata.name.as_deref() {
            Some(name) => !kept.contains(&(kind, o.metadata.namespace.as_deref(), name)),
            None => false,
        })
        .collect()
}

/// Delete every object of `resources` matching `selector` that is not in
/// `keep`. Returns the number of objects deleted.
pub async fn prune_stale(
    client: &Client,
    resources: &[ApiResource],
    selector: &str,
    keep: &[DynamicObject],
) -> Result<usize, Error> {
    let params = ListParams::default().labels(selector);
    let mut deleted = 0;

    for ar in resources {
        let all: Api<DynamicObject> = Api::all_with(client.clone(), ar);
        let existing = all.list(&params).await?.items;

        for obj in stale_objects(&ar.kind, &existing, keep) {
            let Some(name) = obj.metadata.name.as_deref() else {
                continue;
            };
            let api: Api<DynamicObject> = match obj.metadata.namespace.as_deref() {
                Some(ns) => Api::namespaced_with(client.clone(), ns, ar),
                None => Api::all_with(client.clone(), ar),
            };
            match api.delete(name, &DeleteParams::background()).await {
                Ok(_) => {
                    info!(
                        kind = %ar.kind,
                        name,
                        namespace = ?obj.metadata.namespace,
                        "pruned stale object"
                    );
                    deleted += 1;
                }
                Err(kube::Error::Api(e)) if e.code == 404 => {}
                Err(e) => return Err(e.into()),
            }
        }
    }
    Ok(deleted)
}
