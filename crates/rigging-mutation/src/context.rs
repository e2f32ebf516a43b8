//! Reconciliation context handed to mutation hooks
//!
//! A context is created once per reconciliation pass. The pipeline only
//! dispatches hooks when a context is present and owned by a controller;
//! otherwise every candidate passes through unchanged.

use std::fmt;

use kube::Client;
use tokio_util::sync::CancellationToken;

/// The request a reconciliation pass is serving
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ReconcileRequest {
    /// Name of the parent resource
    pub name: String,
    /// Namespace of the parent resource (None when cluster scoped)
    pub namespace: Option<String>,
}

impl ReconcileRequest {
    /// Request for a namespaced parent
    pub fn namespaced(name: impl Into<String>, namespace: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            namespace: Some(namespace.into()),
        }
    }

    /// Request for a cluster-scoped parent
    pub fn cluster(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            namespace: None,
        }
    }
}

impl fmt::Display for ReconcileRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.namespace {
            Some(ns) => write!(f, "{}/{}", ns, self.name),
            None => write!(f, "{}", self.name),
        }
    }
}

/// Request-scoped state for one reconciliation pass.
///
/// Cheap to clone: the cancellation token and client are reference counted.
#[derive(Clone)]
pub struct MutationContext {
    reconcile_id: String,
    request: ReconcileRequest,
    controller: Option<String>,
    cancel: CancellationToken,
    client: Option<Client>,
}

impl MutationContext {
    /// Context for a pass run by `controller`, with a fresh reconcile id.
    pub fn new(controller: impl Into<String>, request: ReconcileRequest) -> Self {
        Self {
            reconcile_id: uuid::Uuid::new_v4().to_string(),
            request,
            controller: Some(controller.into()),
            cancel: CancellationToken::new(),
            client: None,
        }
    }

    /// Context with no owning controller.
    ///
    /// Used during partial initialization; the pipeline treats it exactly
    /// like an absent context.
    pub fn detached(request: ReconcileRequest) -> Self {
        Self {
            reconcile_id: uuid::Uuid::new_v4().to_string(),
            request,
            controller: None,
            cancel: CancellationToken::new(),
            client: None,
        }
    }

    /// Use a caller-provided cancellation token (e.g. a child of the
    /// controller's shutdown token).
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    /// Attach a cluster client for the rare hook that needs to read state
    pub fn with_client(mut self, client: Client) -> Self {
        self.client = Some(client);
        self
    }

    /// Override the generated reconcile id
    pub fn with_reconcile_id(mut self, id: impl Into<String>) -> Self {
        self.reconcile_id = id.into();
        self
    }

    /// Whether hooks may run with this context
    pub fn is_ready(&self) -> bool {
        self.controller
            .as_deref()
            .is_some_and(|c| !c.trim().is_empty())
    }

    /// Whether the pass has been cancelled
    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Cancel the pass; hooks not yet dispatched will not run
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// The token backing [`is_cancelled`](Self::is_cancelled)
    pub fn cancellation_token(&self) -> &CancellationToken {
        &self.cancel
    }

    /// Unique id of this pass, for correlating logs
    pub fn reconcile_id(&self) -> &str {
        &self.reconcile_id
    }

    /// The request being reconciled
    pub fn request(&self) -> &ReconcileRequest {
        &self.request
    }

    /// Name of the owning controller
    pub fn controller(&self) -> Option<&str> {
        self.controller.as_deref()
    }

    /// Cluster client, if one was attached
    pub fn client(&self) -> Option<&Client> {
        self.client.as_ref()
    }
}

impl fmt::Debug for MutationContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MutationContext")
            .field("reconcile_id", &self.reconcile_id)
            .field("request", &self.request)
            .field("controller", &self.controller)
            .field("cancelled", &self.cancel.is_cancelled())
            .field("has_client", &self.client.is_some())
            .finish()
    }
}

/// A context is usable when present and owned by a controller.
pub(crate) fn usable(ctx: Option<&MutationContext>) -> Option<&MutationContext> {
    ctx.filter(|c| c.is_ready())
}
