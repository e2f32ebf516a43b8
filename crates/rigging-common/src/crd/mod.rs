//! Custom Resource Definitions for Rigging
//!
//! `SecretsComponent` is the parent resource a reconciliation pass is driven
//! by; `Platform` is the cluster-wide collection it belongs to.

mod component;
mod platform;

pub use component::{
    ComponentPhase, SecretsComponent, SecretsComponentSpec, SecretsComponentStatus,
    DEFAULT_ESO_IMAGE,
};
pub use platform::{Platform, PlatformSpec};
