//! Error types shared by Rigging crates
//!
//! Errors are structured with fields to aid debugging in production.
//! Each variant carries the resource or context it was raised for.

use thiserror::Error;

/// Default context value when no specific context is available
pub const UNKNOWN_CONTEXT: &str = "unknown";

/// Main error type for Rigging operations
#[derive(Debug, Error)]
pub enum Error {
    /// Kubernetes API error
    #[error("kubernetes error: {source}")]
    Kube {
        /// The underlying kube-rs error
        #[from]
        source: kube::Error,
    },

    /// Validation error for a CRD spec
    #[error("validation error for {resource}: {message}")]
    Validation {
        /// Name of the resource with invalid configuration
        resource: String,
        /// Description of what's invalid
        message: String,
        /// The invalid field path (e.g., "spec.secretName")
        field: Option<String>,
    },

    /// Serialization/deserialization error
    #[error("serialization error: {message}")]
    Serialization {
        /// Description of what failed
        message: String,
        /// The resource kind being serialized (if known)
        kind: Option<String>,
    },

    /// Internal/operational error
    #[error("internal error [{context}]: {message}")]
    Internal {
        /// Description of what failed
        message: String,
        /// Where the error occurred (e.g., "reconciler", "apply")
        context: String,
    },
}

impl Error {
    /// Create a validation error without resource context
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation {
            resource: UNKNOWN_CONTEXT.to_string(),
            message: msg.into(),
            field: None,
        }
    }

    /// Create a validation error for a named resource and field path
    pub fn validation_for_field(
        resource: impl Into<String>,
        field: impl Into<String>,
        msg: impl Into<String>,
    ) -> Self {
        Self::Validation {
            resource: resource.into(),
            message: msg.into(),
            field: Some(field.into()),
        }
    }

    /// Create a serialization error
    pub fn serialization(msg: impl Into<String>) -> Self {
        Self::Serialization {
            message: msg.into(),
            kind: None,
        }
    }

    /// Create a serialization error with resource kind context
    pub fn serialization_for_kind(kind: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::Serialization {
            message: msg.into(),
            kind: Some(kind.into()),
        }
    }

    /// Create an internal error without context
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal {
            message: msg.into(),
            context: UNKNOWN_CONTEXT.to_string(),
        }
    }

    /// Create an internal error with context
    pub fn internal_with_context(context: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::Internal {
            message: msg.into(),
            context: context.into(),
        }
    }

    /// Check if this error is retryable
    ///
    /// Validation and serialization errors need a spec or code fix.
    /// Kubernetes 4xx responses are not retried either.
    pub fn is_retryable(&self) -> bool {
        match self {
            Error::Kube { source } => !matches!(
                source,
                kube::Error::Api(ae) if (400..500).contains(&ae.code)
            ),
            Error::Validation { .. } => false,
            Error::Serialization { .. } => false,
            Error::Internal { .. } => true,
        }
    }

    /// Get the resource name if this error is tied to one
    pub fn resource(&self) -> Option<&str> {
        match self {
            Error::Validation { resource, .. } => Some(resource),
            _ => None,
        }
    }

    /// Get the context if this error has one
    pub fn context(&self) -> Option<&str> {
        match self {
            Error::Internal { context, .. } => Some(context),
            _ => None,
        }
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Self::serialization(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Story: a component with a bad spec is rejected with the field that is wrong
    #[test]
    fn test_validation_names_resource_and_field() {
        let err = Error::validation_for_field("eso", "spec.secretName", "must not be empty");
        assert!(err.to_string().contains("validation error for eso"));
        assert!(err.to_string().contains("must not be empty"));
        assert_eq!(err.resource(), Some("eso"));
        match &err {
            Error::Validation { field, .. } => {
                assert_eq!(field.as_deref(), Some("spec.secretName"));
            }
            _ => panic!("Expected Validation variant"),
        }
    }

    #[test]
    fn test_validation_without_resource_uses_unknown_context() {
        match Error::validation("bad") {
            Error::Validation { resource, .. } => assert_eq!(resource, UNKNOWN_CONTEXT),
            _ => panic!("Expected Validation variant"),
        }
    }

    #[test]
    fn test_serialization_carries_kind() {
        let err = Error::serialization_for_kind("RoleBinding", "missing field 'roleRef'");
        match &err {
            Error::Serialization { kind, .. } => assert_eq!(kind.as_deref(), Some("RoleBinding")),
            _ => panic!("Expected Serialization variant"),
        }
        assert!(!err.is_retryable());
    }

    #[test]
    fn test_serde_errors_convert_to_serialization() {
        let parse: std::result::Result<serde_json::Value, _> = serde_json::from_str("{");
        let err: Error = parse.unwrap_err().into();
        assert!(matches!(err, Error::Serialization { .. }));
    }

    #[test]
    fn test_internal_errors_are_retryable_and_keep_context() {
        let err = Error::internal_with_context("apply", "connection reset");
        assert!(err.is_retryable());
        assert_eq!(err.context(), Some("apply"));
        assert!(err.to_string().contains("[apply]"));

        let err = Error::internal("unexpected state");
        assert_eq!(err.context(), Some(UNKNOWN_CONTEXT));
    }

    #[test]
    fn test_validation_is_not_retryable() {
        assert!(!Error::validation("bad config").is_retryable());
        assert_eq!(Error::internal("x").resource(), None);
    }
}
