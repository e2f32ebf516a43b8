//! Rigging mutation pipeline
//!
//! Component manifests are rendered once from static YAML and then adapted
//! to a specific parent resource by small hooks. This crate holds the
//! machinery around those hooks:
//!
//! - [`identity`]: how candidates are identified and hooks keyed
//! - [`context`]: per-pass reconciliation context and cancellation
//! - [`hook`]: the [`Mutation`] contract and small helpers for writing hooks
//! - [`registry`]: the (kind, name) keyed hook registry
//! - [`pipeline`]: runs the registry over a pass's candidates
//!
//! ```ignore
//! let registry = MutationRegistry::new()
//!     .with("RoleBinding", "external-secrets-leaderelection", "leader-election", leader_election);
//! let pipeline = MutationPipeline::new(registry);
//! let output = pipeline.run(objects, &parent, &platform, Some(&ctx));
//! ```

#![deny(missing_docs)]

pub mod context;
pub mod error;
pub mod hook;
pub mod identity;
pub mod pipeline;
pub mod registry;

pub use context::{MutationContext, ReconcileRequest};
pub use error::{MutationError, PipelineError};
pub use hook::{Mutation, MutationResult};
pub use identity::{HookKey, ObjectIdentity};
pub use pipeline::{CandidateOutcome, CandidateState, MutationOutput, MutationPipeline};
pub use registry::{MutationRegistry, RegisteredHook};
