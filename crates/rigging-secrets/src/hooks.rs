//! Mutation hooks for the ESO manifests
//!
//! Each hook adapts one base object to the SecretsComponent (the parent) and
//! the Platform (the collection). Every base object additionally gets the
//! common labels hook, registered last so it sees the outputs of the
//! object-specific hook.

use std::collections::BTreeMap;

use kube::api::DynamicObject;
use kube::ResourceExt;
use serde_json::Value;
use tracing::debug;

use rigging_common::crd::{Platform, SecretsComponent};
use rigging_common::{LABEL_COMPONENT, LABEL_MANAGED_BY, LABEL_MANAGED_BY_RIGGING};
use rigging_mutation::hook::{dropped, in_namespace, unchanged, with_labels};
use rigging_mutation::{MutationContext, MutationError, MutationRegistry, MutationResult};

use crate::manifests::{
    object_keys, CONTROLLER_ROLE_NAME, ESO_NAME, LEADER_ELECTION_NAME, SETTINGS_CONFIGMAP,
};
use crate::ReconcileError;

/// Registry type for the SecretsComponent hooks
pub type ComponentRegistry = MutationRegistry<SecretsComponent, Platform>;

/// Name of the credentials volume in the ESO Deployment
const CREDENTIALS_VOLUME: &str = "credentials";

const LEADER_ELECTION_ARG: &str = "--enable-leader-election";

/// Build the registry with every hook the ESO manifests need.
pub fn build_registry() -> Result<ComponentRegistry, ReconcileError> {
    let mut registry = ComponentRegistry::new();
    registry
        .register("Namespace", ESO_NAME, "namespace", namespace_hook)
        .register("Role", LEADER_ELECTION_NAME, "leader-election", leader_election_hook)
        .register(
            "RoleBinding",
            LEADER_ELECTION_NAME,
            "leader-election",
            leader_election_hook,
        )
        .register(
            "ClusterRoleBinding",
            CONTROLLER_ROLE_NAME,
            "rebind-subjects",
            cluster_binding_hook,
        )
        .register("ConfigMap", SETTINGS_CONFIGMAP, "tenant-settings", settings_hook)
        .register("Deployment", ESO_NAME, "deployment", deployment_hook);

    for key in object_keys()? {
        registry.register(key.kind, key.name, "common-labels", common_labels_hook);
    }
    Ok(registry)
}

/// Rename the Namespace object to the component's target namespace
pub fn namespace_hook(
    original: &DynamicObject,
    parent: &SecretsComponent,
    _platform: &Platform,
    _ctx: &MutationContext,
) -> MutationResult {
    let mut obj = original.clone();
    obj.metadata.name = Some(parent.spec.namespace.clone());
    Ok(vec![obj])
}

/// Leader-election RBAC: dropped when leader election is off, otherwise the
/// RoleBinding subject is rebound to the target namespace.
pub fn leader_election_hook(
    original: &DynamicObject,
    parent: &SecretsComponent,
    _platform: &Platform,
    ctx: &MutationContext,
) -> MutationResult {
    if !parent.spec.leader_election {
        debug!(
            reconcile_id = ctx.reconcile_id(),
            object = %original.name_any(),
            "leader election disabled, dropping RBAC object"
        );
        return dropped();
    }
    let is_binding = original
        .types
        .as_ref()
        .is_some_and(|t| t.kind == "RoleBinding");
    if is_binding {
        rebind_subjects(original, &parent.spec.namespace)
    } else {
        unchanged(original)
    }
}

/// Point the controller ClusterRoleBinding at the target namespace's ServiceAccount
pub fn cluster_binding_hook(
    original: &DynamicObject,
    parent: &SecretsComponent,
    _platform: &Platform,
    _ctx: &MutationContext,
) -> MutationResult {
    rebind_subjects(original, &parent.spec.namespace)
}

/// Fan the settings ConfigMap out to every tenant namespace of the platform.
///
/// The copy in the component namespace is kept; tenant namespaces equal to
/// it are skipped. The platform's cluster name, when set, is added to the data.
pub fn settings_hook(
    original: &DynamicObject,
    parent: &SecretsComponent,
    platform: &Platform,
    _ctx: &MutationContext,
) -> MutationResult {
    let mut base = original.clone();
    let data = base
        .data
        .get_mut("data")
        .and_then(Value::as_object_mut)
        .ok_or_else(|| MutationError::invalid_object("settings ConfigMap has no data"))?;
    if let Some(cluster) = platform.spec.cluster_name.as_deref() {
        data.insert("clusterName".to_string(), Value::String(cluster.to_string()));
    }

    let tenants: Vec<_> = platform
        .spec
        .tenant_namespaces()
        .into_iter()
        .filter(|ns| *ns != parent.spec.namespace)
        .collect();

    let mut out = Vec::with_capacity(tenants.len() + 1);
    for ns in tenants {
        out.push(in_namespace(&base, ns));
    }
    out.insert(0, base);
    Ok(out)
}

/// Configure the ESO Deployment from the component spec.
///
/// Requires `spec.secretName`: without the credentials secret the controller
/// cannot start.
pub fn deployment_hook(
    original: &DynamicObject,
    parent: &SecretsComponent,
    _platform: &Platform,
    _ctx: &MutationContext,
) -> MutationResult {
    let spec = &parent.spec;
    if spec.secret_name.trim().is_empty() {
        return Err(MutationError::invalid_parent(
            "spec.secretName",
            "must name the credentials secret",
        ));
    }

    let mut obj = original.clone();
    obj.data
        .pointer_mut("/spec")
        .and_then(Value::as_object_mut)
        .ok_or_else(|| MutationError::invalid_object("Deployment has no spec"))?
        .insert("replicas".to_string(), Value::from(spec.replicas));

    let container = obj
        .data
        .pointer_mut("/spec/template/spec/containers/0")
        .and_then(Value::as_object_mut)
        .ok_or_else(|| MutationError::invalid_object("Deployment has no containers"))?;
    container.insert("image".to_string(), Value::String(spec.image().to_string()));

    let args = container
        .entry("args")
        .or_insert_with(|| Value::Array(Vec::new()))
        .as_array_mut()
        .ok_or_else(|| MutationError::invalid_object("container args is not a list"))?;
    args.retain(|a| !a.as_str().is_some_and(|s| s.starts_with(LEADER_ELECTION_ARG)));
    args.push(Value::String(format!(
        "{LEADER_ELECTION_ARG}={}",
        spec.leader_election
    )));

    let volume = obj
        .data
        .pointer_mut("/spec/template/spec/volumes")
        .and_then(Value::as_array_mut)
        .and_then(|volumes| {
            volumes
                .iter_mut()
                .find(|v| v.get("name").and_then(Value::as_str) == Some(CREDENTIALS_VOLUME))
        })
        .ok_or_else(|| {
            MutationError::invalid_object(format!("Deployment has no {CREDENTIALS_VOLUME} volume"))
        })?;
    volume["secret"] = serde_json::json!({ "secretName": spec.secret_name });

    Ok(vec![obj])
}

/// Label every object with the platform's common labels and Rigging's own.
///
/// Rigging's labels win over platform labels with the same key.
pub fn common_labels_hook(
    original: &DynamicObject,
    parent: &SecretsComponent,
    platform: &Platform,
    _ctx: &MutationContext,
) -> MutationResult {
    let mut labels: BTreeMap<String, String> = platform.spec.common_labels.clone();
    labels.insert(LABEL_MANAGED_BY.to_string(), LABEL_MANAGED_BY_RIGGING.to_string());
    labels.insert(LABEL_COMPONENT.to_string(), parent.name_any());
    Ok(vec![with_labels(original, &labels)])
}

fn rebind_subjects(original: &DynamicObject, namespace: &str) -> MutationResult {
    let mut obj = original.clone();
    let subjects = obj
        .data
        .get_mut("subjects")
        .and_then(Value::as_array_mut)
        .ok_or_else(|| MutationError::invalid_object("binding has no subjects"))?;
    for subject in subjects.iter_mut().filter_map(Value::as_object_mut) {
        if subject.get("kind").and_then(Value::as_str) == Some("ServiceAccount") {
            subject.insert("namespace".to_string(), Value::String(namespace.to_string()));
        }
    }
    Ok(vec![obj])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::manifests::render;
    use rigging_common::crd::{PlatformSpec, SecretsComponentSpec};
    use rigging_mutation::{CandidateState, MutationPipeline, ObjectIdentity, ReconcileRequest};

    fn component(spec: SecretsComponentSpec) -> SecretsComponent {
        let mut c = SecretsComponent::new("eso", spec);
        c.metadata.namespace = Some("rigging-system".to_string());
        c
    }

    fn spec() -> SecretsComponentSpec {
        SecretsComponentSpec {
            namespace: "secrets".to_string(),
            secret_name: "eso-credentials".to_string(),
            replicas: 2,
            ..Default::default()
        }
    }

    fn platform(namespaces: &[&str]) -> Platform {
        Platform::new(
            "platform",
            PlatformSpec {
                namespaces: namespaces.iter().map(|s| s.to_string()).collect(),
                cluster_name: Some("prod-us-west".to_string()),
                common_labels: BTreeMap::from([
                    ("tier".to_string(), "core".to_string()),
                    (LABEL_MANAGED_BY.to_string(), "someone-else".to_string()),
                ]),
            },
        )
    }

    fn ctx() -> MutationContext {
        MutationContext::new(
            "secrets-component",
            ReconcileRequest::namespaced("eso", "rigging-system"),
        )
    }

    fn run(parent: &SecretsComponent, platform: &Platform) -> rigging_mutation::MutationOutput {
        let pipeline = MutationPipeline::new(build_registry().unwrap());
        pipeline.run(render(&parent.spec.namespace).unwrap(), parent, platform, Some(&ctx()))
    }

    fn find<'a>(objects: &'a [DynamicObject], kind: &str, name: &str) -> Vec<&'a DynamicObject> {
        objects
            .iter()
            .filter(|o| {
                let id = ObjectIdentity::of(o);
                id.kind == kind && id.name == name
            })
            .collect()
    }

    /// Story: a fully specified component renders every object, adapted to
    /// its namespace and labelled for the platform.
    #[test]
    fn test_full_render_for_valid_component() {
        let parent = component(spec());
        let out = run(&parent, &platform(&["team-a", "team-b"]));

        assert!(out.is_clean(), "{:?}", out.errors);
        // 8 base objects plus two tenant copies of the settings ConfigMap
        assert_eq!(out.objects.len(), 10);
        assert_eq!(out.count(CandidateState::Mutated), 8);

        for obj in &out.objects {
            let labels = obj.metadata.labels.as_ref().unwrap();
            assert_eq!(labels[LABEL_MANAGED_BY], LABEL_MANAGED_BY_RIGGING);
            assert_eq!(labels[LABEL_COMPONENT], "eso");
            assert_eq!(labels["tier"], "core");
        }

        assert_eq!(find(&out.objects, "Namespace", "secrets").len(), 1);
        let crb = find(&out.objects, "ClusterRoleBinding", CONTROLLER_ROLE_NAME)[0];
        assert_eq!(crb.data["subjects"][0]["namespace"], "secrets");
    }

    #[test]
    fn test_leader_election_disabled_drops_rbac() {
        let parent = component(SecretsComponentSpec {
            leader_election: false,
            ..spec()
        });
        let out = run(&parent, &platform(&[]));

        assert!(out.is_clean());
        assert!(find(&out.objects, "Role", LEADER_ELECTION_NAME).is_empty());
        assert!(find(&out.objects, "RoleBinding", LEADER_ELECTION_NAME).is_empty());

        let deploy = find(&out.objects, "Deployment", ESO_NAME)[0];
        let args = deploy.data["spec"]["template"]["spec"]["containers"][0]["args"]
            .as_array()
            .unwrap();
        assert!(args.contains(&Value::String("--enable-leader-election=false".into())));
    }

    #[test]
    fn test_leader_election_binding_rebound_to_target_namespace() {
        let parent = component(spec());
        let out = run(&parent, &platform(&[]));
        let rb = find(&out.objects, "RoleBinding", LEADER_ELECTION_NAME)[0];
        assert_eq!(rb.data["subjects"][0]["namespace"], "secrets");
        assert_eq!(rb.metadata.namespace.as_deref(), Some("secrets"));
    }

    #[test]
    fn test_settings_fan_out_to_tenants() {
        let parent = component(spec());
        let out = run(&parent, &platform(&["team-a", " ", "secrets", "team-b", "team-a"]));

        let copies = find(&out.objects, "ConfigMap", SETTINGS_CONFIGMAP);
        let namespaces: Vec<_> = copies
            .iter()
            .map(|o| o.metadata.namespace.as_deref().unwrap())
            .collect();
        assert_eq!(namespaces, vec!["secrets", "team-a", "team-b"]);
        for cm in copies {
            assert_eq!(cm.data["data"]["clusterName"], "prod-us-west");
            assert_eq!(cm.data["data"]["logLevel"], "info");
        }
    }

    /// Story: a component without a credentials secret must not roll out a
    /// Deployment that can never start, but the rest still renders.
    #[test]
    fn test_missing_secret_name_fails_only_the_deployment() {
        let parent = component(SecretsComponentSpec {
            secret_name: String::new(),
            ..spec()
        });
        let out = run(&parent, &platform(&[]));

        assert_eq!(out.errors.len(), 1);
        let err = &out.errors[0];
        assert_eq!(err.identity().kind, "Deployment");
        assert_eq!(err.hook(), Some("deployment"));
        assert!(err.to_string().contains("spec.secretName"));
        assert!(find(&out.objects, "Deployment", ESO_NAME).is_empty());
        assert_eq!(out.objects.len(), 7);
    }

    #[test]
    fn test_deployment_configured_from_spec() {
        let parent = component(SecretsComponentSpec {
            image: Some("registry.local/eso:v1".to_string()),
            ..spec()
        });
        let out = run(&parent, &platform(&[]));
        let deploy = find(&out.objects, "Deployment", ESO_NAME)[0];

        assert_eq!(deploy.data["spec"]["replicas"], 2);
        let pod = &deploy.data["spec"]["template"]["spec"];
        assert_eq!(pod["containers"][0]["image"], "registry.local/eso:v1");
        assert_eq!(pod["volumes"][0]["secret"]["secretName"], "eso-credentials");
    }

    #[test]
    fn test_hooks_are_idempotent() {
        let parent = component(spec());
        let platform = platform(&["team-a"]);
        let first = run(&parent, &platform);
        let second = run(&parent, &platform);
        assert_eq!(
            serde_json::to_vec(&first.objects).unwrap(),
            serde_json::to_vec(&second.objects).unwrap()
        );

        let deploy = find(&first.objects, "Deployment", ESO_NAME)[0];
        let again = deployment_hook(deploy, &parent, &platform, &ctx()).unwrap();
        let args = again[0].data["spec"]["template"]["spec"]["containers"][0]["args"]
            .as_array()
            .unwrap()
            .iter()
            .filter(|a| a.as_str().unwrap().starts_with(LEADER_ELECTION_ARG))
            .count();
        assert_eq!(args, 1);
    }

    #[test]
    fn test_without_context_manifests_pass_through() {
        let parent = component(SecretsComponentSpec {
            secret_name: String::new(),
            ..spec()
        });
        let pipeline = MutationPipeline::new(build_registry().unwrap());
        let input = render("secrets").unwrap();
        let out = pipeline.run(input.clone(), &parent, &platform(&["team-a"]), None);

        assert!(out.is_clean());
        assert_eq!(out.objects, input);
    }

    #[test]
    fn test_binding_without_subjects_is_invalid() {
        let objects = render("secrets").unwrap();
        let mut rb = find(&objects, "RoleBinding", LEADER_ELECTION_NAME)[0].clone();
        rb.data.as_object_mut().unwrap().remove("subjects");
        let err =
            cluster_binding_hook(&rb, &component(spec()), &platform(&[]), &ctx()).unwrap_err();
        assert!(matches!(err, MutationError::InvalidObject { .. }));
    }
}
