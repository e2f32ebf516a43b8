//! The mutation hook contract
//!
//! A hook receives the candidate by shared reference and returns the objects
//! that replace it: `[original]` to leave it alone, a modified clone, several
//! objects to fan out, or nothing to drop it. Hooks must be idempotent and
//! must not perform I/O beyond what the context's client offers.

use std::collections::BTreeMap;

use kube::api::DynamicObject;

use crate::context::MutationContext;
use crate::error::MutationError;

/// Result type of a hook
pub type MutationResult = Result<Vec<DynamicObject>, MutationError>;

/// A mutation hook over parent resource `P` and collection resource `C`.
///
/// Any `Fn(&DynamicObject, &P, &C, &MutationContext) -> MutationResult`
/// that is `Send + Sync` is a hook, so plain functions and closures can be
/// registered directly.
pub trait Mutation<P, C>: Send + Sync {
    /// Produce the objects that replace `original`.
    fn mutate(
        &self,
        original: &DynamicObject,
        parent: &P,
        collection: &C,
        ctx: &MutationContext,
    ) -> MutationResult;
}

impl<P, C, F> Mutation<P, C> for F
where
    F: Fn(&DynamicObject, &P, &C, &MutationContext) -> MutationResult + Send + Sync,
{
    fn mutate(
        &self,
        original: &DynamicObject,
        parent: &P,
        collection: &C,
        ctx: &MutationContext,
    ) -> MutationResult {
        self(original, parent, collection, ctx)
    }
}

/// Leave the candidate as it is
pub fn unchanged(original: &DynamicObject) -> MutationResult {
    Ok(vec![original.clone()])
}

/// Drop the candidate from the final object set
pub fn dropped() -> MutationResult {
    Ok(Vec::new())
}

/// Clone `original` into `namespace`
pub fn in_namespace(original: &DynamicObject, namespace: &str) -> DynamicObject {
    let mut obj = original.clone();
    obj.metadata.namespace = Some(namespace.to_string());
    obj
}

/// Clone `original` with `labels` merged over its existing labels
pub fn with_labels(original: &DynamicObject, labels: &BTreeMap<String, String>) -> DynamicObject {
    let mut obj = original.clone();
    let merged = obj.metadata.labels.get_or_insert_with(BTreeMap::new);
    for (k, v) in labels {
        merged.insert(k.clone(), v.clone());
    }
    obj
}
