//! Common types for Rigging: CRDs, errors, and utilities

#![deny(missing_docs)]

pub mod crd;
pub mod error;
pub mod events;
pub mod kube_utils;
pub mod metrics;
pub mod telemetry;
pub mod yaml;

pub use error::Error;

/// Result type alias using our custom Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Default namespace the External Secrets component is installed into
pub const DEFAULT_COMPONENT_NAMESPACE: &str = "external-secrets";

/// Default name of the Platform collection a component belongs to
pub const DEFAULT_COLLECTION_NAME: &str = "platform";

/// Standard Kubernetes label for the managing tool
pub const LABEL_MANAGED_BY: &str = "app.kubernetes.io/managed-by";

/// Value of [`LABEL_MANAGED_BY`] for everything Rigging applies
pub const LABEL_MANAGED_BY_RIGGING: &str = "rigging";

/// Label carrying the name of the parent component that produced an object
pub const LABEL_COMPONENT: &str = "rigging.dev/component";

/// Default requeue interval after a successful reconcile
pub const REQUEUE_SUCCESS_SECS: u64 = 300;

/// Requeue interval after a failed reconcile
pub const REQUEUE_ERROR_SECS: u64 = 30;

/// Requeue interval while waiting on a dependency (e.g. the collection)
pub const REQUEUE_WAITING_SECS: u64 = 10;
