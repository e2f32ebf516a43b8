//! Controller runner - builds the SecretsComponent controller future
//!
//! Construction is kept separate from `main` so the wiring (context, pipeline,
//! watches) can be read in one place.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use futures::StreamExt;
use kube::runtime::reflector::ObjectRef;
use kube::runtime::watcher::Config as WatcherConfig;
use kube::runtime::Controller;
use kube::{Api, Client};
use tokio_util::sync::CancellationToken;

use rigging_common::crd::{Platform, SecretsComponent};
use rigging_common::events::KubeEventPublisher;
use rigging_mutation::MutationPipeline;
use rigging_secrets::{
    build_registry, error_policy, reconcile, ComponentContext, KubeComponentClient,
    ReconcileError, CONTROLLER_NAME,
};

use crate::config::OperatorConfig;

/// Watcher timeout (seconds) - must be less than client read_timeout (30s)
const WATCH_TIMEOUT_SECS: u32 = 25;

/// Controller future type
pub type ControllerFuture = Pin<Box<dyn Future<Output = ()> + Send>>;

/// Build the context shared by every SecretsComponent reconcile
pub fn build_component_context(
    client: Client,
    config: &OperatorConfig,
    shutdown: CancellationToken,
) -> Result<ComponentContext, ReconcileError> {
    let registry = build_registry()?;
    tracing::info!(
        hooks = registry.len(),
        workers = config.mutation_workers,
        "built mutation registry"
    );
    let pipeline = MutationPipeline::new(registry).with_workers(config.mutation_workers);

    Ok(ComponentContext::new(
        Arc::new(KubeComponentClient::new(client.clone(), config.field_manager.clone())),
        Arc::new(KubeEventPublisher::new(client, CONTROLLER_NAME)),
        pipeline,
    )
    .with_requeue(config.requeue)
    .with_shutdown(shutdown))
}

/// Build the SecretsComponent controller future.
///
/// Components are re-reconciled when the Platform they reference changes.
pub fn build_component_controller(client: Client, ctx: ComponentContext) -> Vec<ControllerFuture> {
    let components: Api<SecretsComponent> = Api::all(client.clone());
    let platforms: Api<Platform> = Api::all(client);

    tracing::info!("- SecretsComponent controller");

    let controller = Controller::new(
        components,
        WatcherConfig::default().timeout(WATCH_TIMEOUT_SECS),
    );
    let store = controller.store();

    vec![Box::pin(
        controller
            .watches(
                platforms,
                WatcherConfig::default().timeout(WATCH_TIMEOUT_SECS),
                move |platform: Platform| {
                    let name = platform.metadata.name.unwrap_or_default();
                    store
                        .state()
                        .into_iter()
                        .filter(|c| c.spec.collection_ref == name)
                        .map(|c| ObjectRef::from_obj(c.as_ref()))
                        .collect::<Vec<_>>()
                },
            )
            .shutdown_on_signal()
            .run(reconcile, error_policy, Arc::new(ctx))
            .for_each(log_reconcile_result("SecretsComponent")),
    )]
}

fn log_reconcile_result<T: std::fmt::Debug, E: std::fmt::Debug>(
    controller_name: &'static str,
) -> impl Fn(Result<T, E>) -> std::future::Ready<()> {
    move |result| {
        match result {
            Ok(action) => tracing::debug!(?action, "{} reconciliation completed", controller_name),
            Err(e) => tracing::error!(error = ?e, "{} reconciliation error", controller_name),
        }
        std::future::ready(())
    }
}
