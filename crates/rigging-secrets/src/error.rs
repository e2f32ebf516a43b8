//! Reconciler error type

use thiserror::Error;

use rigging_mutation::PipelineError;

/// Error returned from the SecretsComponent reconciler.
///
/// Every variant ends in `error_policy`, which requeues with backoff.
#[derive(Debug, Error)]
pub enum ReconcileError {
    /// Kubernetes API call failed
    #[error("kubernetes error: {0}")]
    Kube(String),

    /// The component or its collection is invalid
    #[error("validation error: {0}")]
    Validation(String),

    /// The embedded manifests could not be rendered
    #[error("manifest error: {0}")]
    Manifest(String),

    /// Internal invariant violated
    #[error("internal error: {0}")]
    Internal(String),
}

impl ReconcileError {
    /// Kube error with a description of the failed call
    pub fn kube(msg: impl std::fmt::Display, err: impl std::fmt::Display) -> Self {
        Self::Kube(format!("{msg}: {err}"))
    }

    /// Whether retrying without a spec change can succeed
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Kube(_) | Self::Internal(_) => true,
            Self::Validation(_) | Self::Manifest(_) => false,
        }
    }
}

impl From<rigging_common::Error> for ReconcileError {
    fn from(e: rigging_common::Error) -> Self {
        match e {
            rigging_common::Error::Kube { source } => Self::Kube(source.to_string()),
            rigging_common::Error::Validation { .. } => Self::Validation(e.to_string()),
            other => Self::Internal(other.to_string()),
        }
    }
}

/// Join pipeline errors into one line
pub fn summarize(errors: &[PipelineError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}
