//! Rigging Operator - renders, mutates and applies platform components

use anyhow::Context as _;
use clap::{Parser, Subcommand};
use kube::config::{KubeConfigOptions, Kubeconfig};
use kube::{Client, Config, CustomResourceExt};
use tokio_util::sync::CancellationToken;

use rigging_common::crd::{Platform, SecretsComponent};
use rigging_common::telemetry::{init_telemetry, TelemetryConfig};
use rigging_operator::config::{ControllerArgs, OperatorConfig};
use rigging_operator::controller_runner::{build_component_context, build_component_controller};

/// Rigging - adapts component manifests to their parent resources and applies them
#[derive(Parser, Debug)]
#[command(name = "rigging", version, about, long_about = None)]
struct Cli {
    /// Generate CRD manifests and exit
    #[arg(long)]
    crd: bool,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run the SecretsComponent controller
    Controller(ControllerArgs),
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    if cli.crd {
        for crd in [SecretsComponent::crd(), Platform::crd()] {
            let yaml = serde_yaml::to_string(&crd)
                .map_err(|e| anyhow::anyhow!("Failed to serialize CRD: {}", e))?;
            println!("---\n{yaml}");
        }
        return Ok(());
    }

    let args = match cli.command {
        Some(Commands::Controller(args)) => args,
        None => ControllerArgs::parse_from(["controller"]),
    };
    let config = OperatorConfig::try_from(args)?;

    init_telemetry(
        TelemetryConfig::for_service("rigging-operator").with_log_format(config.log_format),
    )?;

    run_controller(config).await
}

async fn build_client(config: &OperatorConfig) -> anyhow::Result<Client> {
    let kube_config = match &config.kubeconfig {
        Some(path) => {
            let kubeconfig = Kubeconfig::read_from(path)
                .with_context(|| format!("failed to read kubeconfig {}", path.display()))?;
            Config::from_custom_kubeconfig(kubeconfig, &KubeConfigOptions::default()).await?
        }
        None => Config::infer().await?,
    };
    Ok(Client::try_from(kube_config)?)
}

async fn run_controller(config: OperatorConfig) -> anyhow::Result<()> {
    tracing::info!(
        field_manager = %config.field_manager,
        workers = config.mutation_workers,
        requeue_secs = config.requeue.as_secs(),
        "starting Rigging controller"
    );

    let client = build_client(&config).await?;

    // Cancelled on SIGINT/SIGTERM so in-flight mutation passes stop dispatching hooks
    let shutdown = CancellationToken::new();
    tokio::spawn(cancel_on_signal(shutdown.clone()));

    let ctx = build_component_context(client.clone(), &config, shutdown)?;
    let controllers = build_component_controller(client, ctx);

    tracing::info!("Starting controllers:");
    futures::future::join_all(controllers).await;

    tracing::info!("Rigging controller stopped");
    Ok(())
}

async fn cancel_on_signal(token: CancellationToken) {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut term) => {
                tokio::select! {
                    _ = tokio::signal::ctrl_c() => {}
                    _ = term.recv() => {}
                }
            }
            Err(e) => {
                tracing::warn!(error = %e, "failed to install SIGTERM handler");
                let _ = tokio::signal::ctrl_c().await;
            }
        }
    }
    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }
    tracing::info!("shutdown signal received, cancelling in-flight reconciles");
    token.cancel();
}
