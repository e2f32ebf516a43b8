//! SecretsComponent reconciliation controller
//!
//! Each pass renders the ESO base manifests, runs them through the mutation
//! pipeline against the component and its Platform, and applies the result.
//! Nothing is applied unless every candidate mutated cleanly. After a
//! successful apply, labelled objects the pass no longer produced (a dropped
//! leader-election Role, the settings copy of a removed tenant namespace) are
//! pruned.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use kube::api::{Api, DynamicObject, PatchParams};
use kube::discovery::ApiResource;
use kube::runtime::controller::Action;
use kube::runtime::events::EventType;
use kube::{Client, Resource, ResourceExt};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};

#[cfg(test)]
use mockall::automock;

use rigging_common::crd::{ComponentPhase, Platform, SecretsComponent, SecretsComponentStatus};
use rigging_common::events::{actions, reasons, EventPublisher};
use rigging_common::kube_utils::{
    layer_by_priority, patch_resource_status, prune_stale, ApplyBatch,
};
use rigging_common::{
    metrics, Error, LABEL_COMPONENT, LABEL_MANAGED_BY, LABEL_MANAGED_BY_RIGGING,
    REQUEUE_ERROR_SECS, REQUEUE_SUCCESS_SECS, REQUEUE_WAITING_SECS,
};
use rigging_mutation::{MutationContext, MutationPipeline, ReconcileRequest};

use crate::error::summarize;
use crate::manifests;
use crate::ReconcileError;

/// Default field manager for server-side apply
pub const FIELD_MANAGER: &str = "rigging-secrets-controller";

/// Controller name reported in events and mutation contexts
pub const CONTROLLER_NAME: &str = "secrets-component-controller";

// =============================================================================
// Traits for dependency injection and testability
// =============================================================================

/// Cluster operations the reconciler needs
///
/// Mocked in tests; [`KubeComponentClient`] is the production implementation.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait ComponentClient: Send + Sync {
    /// Get a Platform by name
    async fn get_platform(&self, name: &str) -> Result<Option<Platform>, Error>;

    /// Server-side apply `objects`, namespaced ones defaulting to `namespace`.
    /// Returns the number of objects applied.
    async fn apply_objects(
        &self,
        namespace: &str,
        objects: &[DynamicObject],
    ) -> Result<usize, Error>;

    /// Delete objects of `resources` labelled for `component` that are not in
    /// `keep`. Returns the number of objects deleted.
    async fn prune_objects(
        &self,
        component: &str,
        resources: &[ApiResource],
        keep: &[DynamicObject],
    ) -> Result<usize, Error>;

    /// Patch the status of a SecretsComponent
    async fn patch_status(
        &self,
        name: &str,
        namespace: &str,
        status: &SecretsComponentStatus,
    ) -> Result<(), Error>;
}

/// Production client backed by kube-rs
pub struct KubeComponentClient {
    client: Client,
    field_manager: String,
}

impl KubeComponentClient {
    /// Create a client applying as `field_manager`
    pub fn new(client: Client, field_manager: impl Into<String>) -> Self {
        Self {
            client,
            field_manager: field_manager.into(),
        }
    }
}

#[async_trait]
impl ComponentClient for KubeComponentClient {
    async fn get_platform(&self, name: &str) -> Result<Option<Platform>, Error> {
        let api: Api<Platform> = Api::all(self.client.clone());
        Ok(api.get_opt(name).await?)
    }

    async fn apply_objects(
        &self,
        namespace: &str,
        objects: &[DynamicObject],
    ) -> Result<usize, Error> {
        let params = PatchParams::apply(&self.field_manager).force();
        let mut applied = 0;

        // Layers run in order so namespaces and RBAC exist before workloads
        for (priority, layer) in layer_by_priority(objects) {
            let mut batch = ApplyBatch::new(self.client.clone(), namespace, &params);
            for obj in layer {
                batch.push(obj)?;
            }
            applied += batch.run(&format!("priority-{priority}")).await?;
        }
        Ok(applied)
    }

    async fn prune_objects(
        &self,
        component: &str,
        resources: &[ApiResource],
        keep: &[DynamicObject],
    ) -> Result<usize, Error> {
        prune_stale(&self.client, resources, &component_selector(component), keep).await
    }

    async fn patch_status(
        &self,
        name: &str,
        namespace: &str,
        status: &SecretsComponentStatus,
    ) -> Result<(), Error> {
        patch_resource_status::<SecretsComponent>(
            &self.client,
            name,
            namespace,
            status,
            &self.field_manager,
        )
        .await?;
        Ok(())
    }
}

// =============================================================================
// Controller context
// =============================================================================

/// Shared context for the SecretsComponent controller
pub struct ComponentContext {
    /// Cluster access
    pub client: Arc<dyn ComponentClient>,
    /// Event sink
    pub events: Arc<dyn EventPublisher>,
    /// Mutation pipeline built from the ESO hooks
    pub pipeline: MutationPipeline<SecretsComponent, Platform>,
    /// Controller name carried in each pass's mutation context
    pub controller_name: String,
    /// Requeue interval after a successful pass
    pub requeue: Duration,
    /// Cancelled on shutdown; each pass runs on a child token
    pub shutdown: CancellationToken,
}

impl ComponentContext {
    /// Create a context with default controller name and requeue interval
    pub fn new(
        client: Arc<dyn ComponentClient>,
        events: Arc<dyn EventPublisher>,
        pipeline: MutationPipeline<SecretsComponent, Platform>,
    ) -> Self {
        Self {
            client,
            events,
            pipeline,
            controller_name: CONTROLLER_NAME.to_string(),
            requeue: Duration::from_secs(REQUEUE_SUCCESS_SECS),
            shutdown: CancellationToken::new(),
        }
    }

    /// Override the requeue interval after success
    pub fn with_requeue(mut self, requeue: Duration) -> Self {
        self.requeue = requeue;
        self
    }

    /// Tie passes to a shutdown token
    pub fn with_shutdown(mut self, shutdown: CancellationToken) -> Self {
        self.shutdown = shutdown;
        self
    }

    /// Override the controller name
    pub fn with_controller_name(mut self, name: impl Into<String>) -> Self {
        self.controller_name = name.into();
        self
    }

    fn mutation_context(&self, name: &str, namespace: &str) -> MutationContext {
        MutationContext::new(
            self.controller_name.clone(),
            ReconcileRequest::namespaced(name, namespace),
        )
        .with_cancellation(self.shutdown.child_token())
    }
}

// =============================================================================
// Reconciliation
// =============================================================================

/// Reconcile a SecretsComponent
#[instrument(skip(component, ctx), fields(component = %component.name_any()))]
pub async fn reconcile(
    component: Arc<SecretsComponent>,
    ctx: Arc<ComponentContext>,
) -> Result<Action, ReconcileError> {
    let name = component.name_any();
    let namespace = component
        .metadata
        .namespace
        .clone()
        .ok_or_else(|| ReconcileError::Validation("SecretsComponent missing namespace".into()))?;
    let generation = component.metadata.generation;

    info!("reconciling SecretsComponent");

    if let Err(msg) = component.spec.validate() {
        warn!(error = %msg, "invalid SecretsComponent spec");
        publish_warning(&ctx, &component, reasons::VALIDATION_FAILED, actions::RECONCILE, &msg)
            .await;
        update_status(&ctx, &name, &namespace, failed(msg, generation)).await?;
        metrics::record_reconcile("failed");
        return Ok(Action::await_change());
    }

    let collection = &component.spec.collection_ref;
    let Some(platform) = ctx.client.get_platform(collection).await? else {
        let msg = format!("waiting for Platform '{collection}'");
        info!(platform = %collection, "Platform not found, waiting");
        publish_warning(&ctx, &component, reasons::COLLECTION_MISSING, actions::RECONCILE, &msg)
            .await;
        update_status(
            &ctx,
            &name,
            &namespace,
            SecretsComponentStatus {
                phase: ComponentPhase::Pending,
                message: Some(msg),
                applied_objects: 0,
                observed_generation: generation,
            },
        )
        .await?;
        metrics::record_reconcile("waiting");
        return Ok(Action::requeue(Duration::from_secs(REQUEUE_WAITING_SECS)));
    };

    let candidates = manifests::render(&component.spec.namespace)?;
    let prunable = manifests::prunable_resources(&candidates)?;
    let mctx = ctx.mutation_context(&name, &namespace);
    let output = ctx
        .pipeline
        .run(candidates, component.as_ref(), &platform, Some(&mctx));

    if output.is_cancelled() {
        info!(reconcile_id = mctx.reconcile_id(), "mutation cancelled, requeueing");
        metrics::record_reconcile("cancelled");
        return Ok(Action::requeue(Duration::from_secs(REQUEUE_WAITING_SECS)));
    }

    if !output.is_clean() {
        let msg = summarize(&output.errors);
        warn!(
            reconcile_id = mctx.reconcile_id(),
            errors = output.errors.len(),
            "mutation failed, nothing applied"
        );
        publish_warning(&ctx, &component, reasons::MUTATION_FAILED, actions::MUTATE, &msg).await;
        update_status(&ctx, &name, &namespace, failed(msg, generation)).await?;
        metrics::record_reconcile("failed");
        return Ok(Action::requeue(Duration::from_secs(REQUEUE_ERROR_SECS)));
    }

    let applied = match ctx
        .client
        .apply_objects(&component.spec.namespace, &output.objects)
        .await
    {
        Ok(applied) => applied,
        Err(e) => {
            let msg = format!("apply failed: {e}");
            warn!(error = %e, "failed to apply component objects");
            publish_warning(&ctx, &component, reasons::APPLY_FAILED, actions::APPLY, &msg).await;
            update_status(&ctx, &name, &namespace, failed(msg, generation)).await?;
            metrics::record_reconcile("failed");
            return Ok(Action::requeue(Duration::from_secs(REQUEUE_ERROR_SECS)));
        }
    };

    let pruned = match ctx
        .client
        .prune_objects(&name, &prunable, &output.objects)
        .await
    {
        Ok(pruned) => pruned,
        Err(e) => {
            let msg = format!("prune failed: {e}");
            warn!(error = %e, "failed to prune stale component objects");
            publish_warning(&ctx, &component, reasons::PRUNE_FAILED, actions::PRUNE, &msg).await;
            update_status(&ctx, &name, &namespace, failed(msg, generation)).await?;
            metrics::record_reconcile("failed");
            return Ok(Action::requeue(Duration::from_secs(REQUEUE_ERROR_SECS)));
        }
    };

    let was_ready = component
        .status
        .as_ref()
        .is_some_and(|s| s.phase == ComponentPhase::Ready);
    if !was_ready {
        ctx.events
            .publish(
                &component.object_ref(&()),
                EventType::Normal,
                reasons::COMPONENT_READY,
                actions::RECONCILE,
                Some(format!("applied {applied} objects")),
            )
            .await;
    }

    debug!(applied, pruned, "component objects applied");
    update_status(
        &ctx,
        &name,
        &namespace,
        SecretsComponentStatus {
            phase: ComponentPhase::Ready,
            message: None,
            applied_objects: u32::try_from(applied).unwrap_or(u32::MAX),
            observed_generation: generation,
        },
    )
    .await?;
    metrics::record_reconcile("ready");
    Ok(Action::requeue(ctx.requeue))
}

/// Error policy: log and requeue with backoff
pub fn error_policy(
    component: Arc<SecretsComponent>,
    error: &ReconcileError,
    _ctx: Arc<ComponentContext>,
) -> Action {
    error!(
        ?error,
        component = %component.name_any(),
        retryable = error.is_retryable(),
        "SecretsComponent reconciliation failed"
    );
    metrics::record_reconcile("error");
    Action::requeue(Duration::from_secs(REQUEUE_ERROR_SECS))
}

/// Label selector matching everything applied for `component`
fn component_selector(component: &str) -> String {
    format!("{LABEL_MANAGED_BY}={LABEL_MANAGED_BY_RIGGING},{LABEL_COMPONENT}={component}")
}

fn failed(message: String, generation: Option<i64>) -> SecretsComponentStatus {
    SecretsComponentStatus {
        phase: ComponentPhase::Failed,
        message: Some(message),
        applied_objects: 0,
        observed_generation: generation,
    }
}

async fn update_status(
    ctx: &ComponentContext,
    name: &str,
    namespace: &str,
    status: SecretsComponentStatus,
) -> Result<(), ReconcileError> {
    ctx.client
        .patch_status(name, namespace, &status)
        .await
        .map_err(|e| ReconcileError::kube("failed to update SecretsComponent status", e))
}

async fn publish_warning(
    ctx: &ComponentContext,
    component: &SecretsComponent,
    reason: &str,
    action: &str,
    note: &str,
) {
    ctx.events
        .publish(
            &component.object_ref(&()),
            EventType::Warning,
            reason,
            action,
            Some(note.to_string()),
        )
        .await;
}
