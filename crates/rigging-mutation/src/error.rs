//! Mutation error types
//!
//! Hooks return [`MutationError`]; the pipeline wraps it in a
//! [`PipelineError`] carrying the candidate's identity and the hook name.

use thiserror::Error;

use crate::identity::ObjectIdentity;

/// Error returned by a mutation hook
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum MutationError {
    /// Parent resource state makes correct mutation impossible
    #[error("invalid parent field {field}: {message}")]
    InvalidParent {
        /// Field path on the parent (e.g. "spec.secretName")
        field: String,
        /// What is wrong with it
        message: String,
    },

    /// Collection resource state makes correct mutation impossible
    #[error("invalid collection field {field}: {message}")]
    InvalidCollection {
        /// Field path on the collection (e.g. "spec.namespaces")
        field: String,
        /// What is wrong with it
        message: String,
    },

    /// The candidate object itself is malformed
    #[error("invalid object: {message}")]
    InvalidObject {
        /// What is wrong with it
        message: String,
    },

    /// Converting between typed and dynamic representations failed
    #[error("serialization error: {message}")]
    Serialization {
        /// Description of what failed
        message: String,
    },
}

impl MutationError {
    /// Parent field error
    pub fn invalid_parent(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidParent {
            field: field.into(),
            message: message.into(),
        }
    }

    /// Collection field error
    pub fn invalid_collection(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidCollection {
            field: field.into(),
            message: message.into(),
        }
    }

    /// Malformed candidate
    pub fn invalid_object(message: impl Into<String>) -> Self {
        Self::InvalidObject {
            message: message.into(),
        }
    }
}

impl From<serde_json::Error> for MutationError {
    fn from(e: serde_json::Error) -> Self {
        Self::Serialization {
            message: e.to_string(),
        }
    }
}

/// Error reported by the pipeline for one candidate
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum PipelineError {
    /// A hook failed; no object derived from the candidate is emitted
    #[error("mutation hook '{hook}' failed for {identity}: {source}")]
    Mutation {
        /// The candidate the hook ran for
        identity: ObjectIdentity,
        /// Registered name of the failing hook
        hook: String,
        /// The hook's error
        source: MutationError,
    },

    /// The pass was cancelled before the candidate finished
    #[error("mutation cancelled before {identity} completed")]
    Cancelled {
        /// The candidate that was not completed
        identity: ObjectIdentity,
    },
}

impl PipelineError {
    /// Identity of the candidate this error is about
    pub fn identity(&self) -> &ObjectIdentity {
        match self {
            Self::Mutation { identity, .. } | Self::Cancelled { identity } => identity,
        }
    }

    /// Whether this is a cancellation rather than a logic failure
    pub fn is_cancellation(&self) -> bool {
        matches!(self, Self::Cancelled { .. })
    }

    /// Whether the reconciler should retry the pass as-is.
    ///
    /// Cancellations are retryable; hook failures need the parent or
    /// collection to change first.
    pub fn is_retryable(&self) -> bool {
        self.is_cancellation()
    }

    /// Name of the failing hook, if any
    pub fn hook(&self) -> Option<&str> {
        match self {
            Self::Mutation { hook, .. } => Some(hook),
            Self::Cancelled { .. } => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn identity() -> ObjectIdentity {
        ObjectIdentity::new("apps/v1", "Deployment", Some("eso".into()), "external-secrets")
    }

    #[test]
    fn test_mutation_error_names_identity_hook_and_field() {
        let err = PipelineError::Mutation {
            identity: identity(),
            hook: "require-secret-name".to_string(),
            source: MutationError::invalid_parent("spec.secretName", "must not be empty"),
        };
        let msg = err.to_string();
        assert!(msg.contains("Deployment/eso/external-secrets"));
        assert!(msg.contains("require-secret-name"));
        assert!(msg.contains("spec.secretName"));
        assert_eq!(err.hook(), Some("require-secret-name"));
        assert!(!err.is_cancellation());
        assert!(!err.is_retryable());
    }

    #[test]
    fn test_cancellation_is_distinct_and_retryable() {
        let err = PipelineError::Cancelled {
            identity: identity(),
        };
        assert!(err.is_cancellation());
        assert!(err.is_retryable());
        assert_eq!(err.identity(), &identity());
        assert_eq!(err.hook(), None);
    }

    #[test]
    fn test_serde_errors_become_serialization() {
        let parse: Result<serde_json::Value, _> = serde_json::from_str("[");
        let err: MutationError = parse.unwrap_err().into();
        assert!(matches!(err, MutationError::Serialization { .. }));
    }
}
