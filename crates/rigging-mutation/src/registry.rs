//! Identity-keyed registry of mutation hooks
//!
//! Hooks are registered once at startup under a (kind, name) key. A lookup
//! for an identity with no hooks yields an empty slice: most candidates have
//! no hook, and that is not an error.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use kube::api::DynamicObject;

use crate::context::{usable, MutationContext};
use crate::error::PipelineError;
use crate::hook::Mutation;
use crate::identity::{HookKey, ObjectIdentity};
use crate::pipeline::{run_chain, ChainOutcome};

/// A hook with the name it was registered under
pub struct RegisteredHook<P, C> {
    name: String,
    hook: Arc<dyn Mutation<P, C>>,
}

impl<P, C> RegisteredHook<P, C> {
    /// Registered name, used in logs and errors
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The hook itself
    pub fn hook(&self) -> &dyn Mutation<P, C> {
        self.hook.as_ref()
    }
}

impl<P, C> Clone for RegisteredHook<P, C> {
    fn clone(&self) -> Self {
        Self {
            name: self.name.clone(),
            hook: Arc::clone(&self.hook),
        }
    }
}

impl<P, C> fmt::Debug for RegisteredHook<P, C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RegisteredHook")
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}

/// Registry of mutation hooks keyed by (kind, name).
///
/// Hooks registered under the same key run in registration order, each one
/// seeing the previous hook's outputs.
pub struct MutationRegistry<P, C> {
    hooks: HashMap<HookKey, Vec<RegisteredHook<P, C>>>,
    count: usize,
}

impl<P, C> Default for MutationRegistry<P, C> {
    fn default() -> Self {
        Self {
            hooks: HashMap::new(),
            count: 0,
        }
    }
}

impl<P, C> MutationRegistry<P, C> {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `hook` for objects of `kind` named `name`.
    pub fn register<M>(
        &mut self,
        kind: impl Into<String>,
        name: impl Into<String>,
        hook_name: impl Into<String>,
        hook: M,
    ) -> &mut Self
    where
        M: Mutation<P, C> + 'static,
    {
        let key = HookKey::new(kind, name);
        let hook = RegisteredHook {
            name: hook_name.into(),
            hook: Arc::new(hook),
        };
        tracing::trace!(key = %key, hook = %hook.name, "registering mutation hook");
        self.hooks.entry(key).or_default().push(hook);
        self.count += 1;
        self
    }

    /// Builder form of [`register`](Self::register)
    pub fn with<M>(
        mut self,
        kind: impl Into<String>,
        name: impl Into<String>,
        hook_name: impl Into<String>,
        hook: M,
    ) -> Self
    where
        M: Mutation<P, C> + 'static,
    {
        self.register(kind, name, hook_name, hook);
        self
    }

    /// Hooks registered for a key, in registration order
    pub fn hooks_for(&self, key: &HookKey) -> &[RegisteredHook<P, C>] {
        self.hooks.get(key).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Hooks applicable to an object identity
    pub fn lookup(&self, identity: &ObjectIdentity) -> &[RegisteredHook<P, C>] {
        self.hooks_for(&identity.key())
    }

    /// Total number of registered hooks
    pub fn len(&self) -> usize {
        self.count
    }

    /// Whether no hook is registered
    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    /// Registered keys, sorted
    pub fn keys(&self) -> Vec<&HookKey> {
        let mut keys: Vec<_> = self.hooks.keys().collect();
        keys.sort();
        keys
    }

    /// Run every hook registered for `original`'s identity.
    ///
    /// Returns `[original]` untouched when no usable context is given or no
    /// hook is registered.
    pub fn mutate(
        &self,
        original: &DynamicObject,
        parent: &P,
        collection: &C,
        ctx: Option<&MutationContext>,
    ) -> Result<Vec<DynamicObject>, PipelineError> {
        let Some(ctx) = usable(ctx) else {
            return Ok(vec![original.clone()]);
        };
        let identity = ObjectIdentity::of(original);
        let hooks = self.lookup(&identity);
        if hooks.is_empty() {
            return Ok(vec![original.clone()]);
        }
        match run_chain(hooks, original.clone(), &identity, parent, collection, ctx) {
            ChainOutcome::Done { objects, .. } => Ok(objects),
            ChainOutcome::Failed { error, .. } => Err(error),
        }
    }
}

impl<P, C> fmt::Debug for MutationRegistry<P, C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MutationRegistry")
            .field("keys", &self.keys())
            .field("hooks", &self.count)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::ReconcileRequest;
    use crate::error::MutationError;
    use crate::hook::{unchanged, MutationResult};
    use kube::api::{ApiResource, GroupVersionKind};

    type Registry = MutationRegistry<String, ()>;

    fn object(kind: &str, name: &str) -> DynamicObject {
        let ar = ApiResource::from_gvk(&GroupVersionKind::gvk("", "v1", kind));
        DynamicObject::new(name, &ar)
    }

    fn ctx() -> MutationContext {
        MutationContext::new("test-controller", ReconcileRequest::cluster("parent"))
    }

    fn label_hook(
        value: &'static str,
    ) -> impl Fn(&DynamicObject, &String, &(), &MutationContext) -> MutationResult {
        move |o, _, _, _| {
            let mut obj = o.clone();
            obj.metadata
                .labels
                .get_or_insert_with(Default::default)
                .entry("trail".to_string())
                .and_modify(|t| t.push_str(value))
                .or_insert_with(|| value.to_string());
            Ok(vec![obj])
        }
    }

    #[test]
    fn test_unregistered_identity_has_no_hooks() {
        let registry = Registry::new();
        assert!(registry.lookup(&ObjectIdentity::of(&object("ConfigMap", "x"))).is_empty());
        assert!(registry.is_empty());
    }

    #[test]
    fn test_lookup_matches_kind_and_name_only() {
        let registry = Registry::new().with(
            "ConfigMap",
            "settings",
            "noop",
            |o: &DynamicObject, _: &String, _: &(), _: &MutationContext| unchanged(o),
        );

        let mut namespaced = object("ConfigMap", "settings");
        namespaced.metadata.namespace = Some("anywhere".to_string());
        assert_eq!(registry.lookup(&ObjectIdentity::of(&namespaced)).len(), 1);
        assert!(registry.lookup(&ObjectIdentity::of(&object("Secret", "settings"))).is_empty());
        assert!(registry.lookup(&ObjectIdentity::of(&object("ConfigMap", "other"))).is_empty());
    }

    #[test]
    fn test_hooks_keep_registration_order() {
        let mut registry = Registry::new();
        registry
            .register("ConfigMap", "settings", "first", label_hook("a"))
            .register("ConfigMap", "settings", "second", label_hook("b"));

        let names: Vec<_> = registry
            .hooks_for(&HookKey::new("ConfigMap", "settings"))
            .iter()
            .map(RegisteredHook::name)
            .collect();
        assert_eq!(names, vec!["first", "second"]);
        assert_eq!(registry.len(), 2);
        assert_eq!(registry.keys().len(), 1);

        let out = registry
            .mutate(&object("ConfigMap", "settings"), &String::new(), &(), Some(&ctx()))
            .unwrap();
        assert_eq!(out[0].metadata.labels.as_ref().unwrap()["trail"], "ab");
    }

    #[test]
    fn test_mutate_without_context_returns_original() {
        let registry = Registry::new().with(
            "ConfigMap",
            "settings",
            "always-fails",
            |_: &DynamicObject, _: &String, _: &(), _: &MutationContext| -> MutationResult {
                Err(MutationError::invalid_object("should never run"))
            },
        );
        let original = object("ConfigMap", "settings");

        let out = registry.mutate(&original, &String::new(), &(), None).unwrap();
        assert_eq!(out, vec![original.clone()]);

        let detached = MutationContext::detached(ReconcileRequest::cluster("parent"));
        let out = registry
            .mutate(&original, &String::new(), &(), Some(&detached))
            .unwrap();
        assert_eq!(out, vec![original]);
    }

    #[test]
    fn test_mutate_attaches_identity_to_errors() {
        let registry = Registry::new().with(
            "ConfigMap",
            "settings",
            "needs-parent",
            |_: &DynamicObject, p: &String, _: &(), _: &MutationContext| -> MutationResult {
                Err(MutationError::invalid_parent("spec.value", format!("got '{p}'")))
            },
        );
        let err = registry
            .mutate(&object("ConfigMap", "settings"), &String::new(), &(), Some(&ctx()))
            .unwrap_err();
        assert_eq!(err.identity().name, "settings");
        assert_eq!(err.hook(), Some("needs-parent"));
    }

    #[test]
    fn test_debug_lists_keys() {
        let registry = Registry::new().with("ConfigMap", "settings", "first", label_hook("a"));
        let debug = format!("{registry:?}");
        assert!(debug.contains("settings"));
    }
}
