//! Kubernetes Event recording for Rigging controllers.
//!
//! Trait-based so controllers can be tested without an API server. Events are
//! fire-and-forget: a failed publish is logged and never fails a reconcile.

use async_trait::async_trait;
use k8s_openapi::api::core::v1::ObjectReference;
use kube::runtime::events::{Event, EventType, Recorder, Reporter};
use kube::Client;
use tracing::warn;

/// Trait for publishing Kubernetes Events.
#[async_trait]
pub trait EventPublisher: Send + Sync {
    /// Publish an Event about `resource_ref`. Never returns an error.
    async fn publish(
        &self,
        resource_ref: &ObjectReference,
        type_: EventType,
        reason: &str,
        action: &str,
        note: Option<String>,
    );
}

/// Production implementation wrapping `kube::runtime::events::Recorder`.
pub struct KubeEventPublisher {
    recorder: Recorder,
}

impl KubeEventPublisher {
    /// Create a publisher reporting as `controller_name`.
    pub fn new(client: Client, controller_name: &str) -> Self {
        let reporter = Reporter {
            controller: controller_name.to_string(),
            instance: std::env::var("POD_NAME").ok(),
        };
        Self {
            recorder: Recorder::new(client, reporter),
        }
    }
}

#[async_trait]
impl EventPublisher for KubeEventPublisher {
    async fn publish(
        &self,
        resource_ref: &ObjectReference,
        type_: EventType,
        reason: &str,
        action: &str,
        note: Option<String>,
    ) {
        let event = Event {
            type_,
            reason: reason.to_string(),
            note,
            action: action.to_string(),
            secondary: None,
        };
        if let Err(e) = self.recorder.publish(&event, resource_ref).await {
            warn!(reason, action, error = %e, "Failed to publish Kubernetes event");
        }
    }
}

/// No-op implementation for tests and dry runs.
pub struct NoopEventPublisher;

#[async_trait]
impl EventPublisher for NoopEventPublisher {
    async fn publish(
        &self,
        _resource_ref: &ObjectReference,
        _type_: EventType,
        _reason: &str,
        _action: &str,
        _note: Option<String>,
    ) {
    }
}

/// Well-known event reason strings.
pub mod reasons {
    /// Every candidate mutated and the object set was applied
    pub const COMPONENT_READY: &str = "ComponentReady";
    /// One or more mutation hooks failed; nothing was applied
    pub const MUTATION_FAILED: &str = "MutationFailed";
    /// Applying the mutated objects failed
    pub const APPLY_FAILED: &str = "ApplyFailed";
    /// Deleting objects no longer rendered failed
    pub const PRUNE_FAILED: &str = "PruneFailed";
    /// The referenced Platform collection does not exist
    pub const COLLECTION_MISSING: &str = "CollectionMissing";
    /// Spec validation failed
    pub const VALIDATION_FAILED: &str = "ValidationFailed";
}

/// Well-known event action strings.
pub mod actions {
    /// Standard reconciliation loop
    pub const RECONCILE: &str = "Reconcile";
    /// Running the mutation pipeline
    pub const MUTATE: &str = "Mutate";
    /// Server-side apply of the final object set
    pub const APPLY: &str = "Apply";
    /// Deleting objects no longer rendered
    pub const PRUNE: &str = "Prune";
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_noop_publisher_is_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<NoopEventPublisher>();
    }

    #[test]
    fn test_reasons_are_pascal_case() {
        for reason in [
            reasons::COMPONENT_READY,
            reasons::MUTATION_FAILED,
            reasons::APPLY_FAILED,
            reasons::PRUNE_FAILED,
            reasons::COLLECTION_MISSING,
            reasons::VALIDATION_FAILED,
        ] {
            assert!(reason.chars().next().unwrap().is_ascii_uppercase());
            assert!(!reason.contains(' '));
        }
    }

    #[tokio::test]
    async fn test_noop_publisher_does_not_panic() {
        NoopEventPublisher
            .publish(
                &ObjectReference::default(),
                EventType::Warning,
                reasons::MUTATION_FAILED,
                actions::MUTATE,
                Some("test".to_string()),
            )
            .await;
    }
}
