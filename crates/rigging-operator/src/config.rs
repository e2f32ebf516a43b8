//! Controller configuration
//!
//! Flags are parsed by clap with environment fallbacks, then validated into
//! an [`OperatorConfig`] before anything talks to the cluster.

use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;
use thiserror::Error;

use rigging_common::telemetry::LogFormat;
use rigging_common::REQUEUE_SUCCESS_SECS;
use rigging_secrets::FIELD_MANAGER;

/// Upper bound on mutation worker threads
pub const MAX_MUTATION_WORKERS: usize = 64;

/// Configuration errors, reported before the controller starts
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    /// A flag has a value outside its accepted range
    #[error("invalid value for --{flag}: {message}")]
    Invalid {
        /// Flag name without dashes
        flag: &'static str,
        /// What is wrong with the value
        message: String,
    },
}

impl ConfigError {
    fn invalid(flag: &'static str, message: impl Into<String>) -> Self {
        Self::Invalid {
            flag,
            message: message.into(),
        }
    }
}

/// Flags of the `controller` subcommand
#[derive(Parser, Debug, Clone)]
pub struct ControllerArgs {
    /// Field manager used for server-side apply and status patches
    #[arg(long, env = "RIGGING_FIELD_MANAGER", default_value = FIELD_MANAGER)]
    pub field_manager: String,

    /// Threads used to run mutation hooks within one reconcile
    #[arg(long, env = "RIGGING_MUTATION_WORKERS", default_value_t = 1)]
    pub mutation_workers: usize,

    /// Seconds between reconciles of a healthy component
    #[arg(long, env = "RIGGING_REQUEUE_SECS", default_value_t = REQUEUE_SUCCESS_SECS)]
    pub requeue_secs: u64,

    /// Path to a kubeconfig; in-cluster config is used when unset
    #[arg(long, env = "KUBECONFIG")]
    pub kubeconfig: Option<PathBuf>,

    /// Log format: json or pretty
    #[arg(long, env = "RIGGING_LOG_FORMAT", default_value = "json")]
    pub log_format: String,
}

/// Validated controller configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OperatorConfig {
    /// Field manager for apply and status patches
    pub field_manager: String,
    /// Mutation worker threads (at least 1)
    pub mutation_workers: usize,
    /// Requeue interval after a successful reconcile
    pub requeue: Duration,
    /// Explicit kubeconfig path
    pub kubeconfig: Option<PathBuf>,
    /// Log line format
    pub log_format: LogFormat,
}

impl TryFrom<ControllerArgs> for OperatorConfig {
    type Error = ConfigError;

    fn try_from(args: ControllerArgs) -> Result<Self, Self::Error> {
        let field_manager = args.field_manager.trim().to_string();
        if field_manager.is_empty() {
            return Err(ConfigError::invalid("field-manager", "must not be empty"));
        }

        if args.mutation_workers == 0 || args.mutation_workers > MAX_MUTATION_WORKERS {
            return Err(ConfigError::invalid(
                "mutation-workers",
                format!(
                    "must be between 1 and {MAX_MUTATION_WORKERS}, got {}",
                    args.mutation_workers
                ),
            ));
        }

        if args.requeue_secs == 0 {
            return Err(ConfigError::invalid("requeue-secs", "must be at least 1"));
        }

        let log_format = match args.log_format.to_ascii_lowercase().as_str() {
            "json" => LogFormat::Json,
            "pretty" | "text" => LogFormat::Pretty,
            other => {
                return Err(ConfigError::invalid(
                    "log-format",
                    format!("expected json or pretty, got '{other}'"),
                ))
            }
        };

        Ok(Self {
            field_manager,
            mutation_workers: args.mutation_workers,
            requeue: Duration::from_secs(args.requeue_secs),
            kubeconfig: args.kubeconfig.filter(|p| !p.as_os_str().is_empty()),
            log_format,
        })
    }
}

impl Default for OperatorConfig {
    fn default() -> Self {
        Self {
            field_manager: FIELD_MANAGER.to_string(),
            mutation_workers: 1,
            requeue: Duration::from_secs(REQUEUE_SUCCESS_SECS),
            kubeconfig: None,
            log_format: LogFormat::Json,
        }
    }
}
