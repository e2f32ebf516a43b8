//! External Secrets Operator component for Rigging
//!
//! Renders the ESO manifests, adapts them to a `SecretsComponent` and its
//! `Platform` through the mutation pipeline, and applies the result.

#![deny(missing_docs)]

pub mod controller;
pub mod error;
pub mod hooks;
pub mod manifests;

pub use controller::{
    error_policy, reconcile, ComponentClient, ComponentContext, KubeComponentClient,
    CONTROLLER_NAME, FIELD_MANAGER,
};
pub use error::ReconcileError;
pub use hooks::{build_registry, ComponentRegistry};
