// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0
use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use kube::Client;
use serde_json::Value;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use airlift::cancel::CancelSignal;
use airlift::commands::{self, Collaborators};
use airlift::config::Config;
use airlift::constants::env;
use airlift::engine::{CliEngine, ContainerEngine, HelmCli};
use airlift::kubernetes::KubeCluster;
use airlift::reconcile::StageOutcome;
use airlift::registry::HttpRegistry;

/// Moves Knative images across an air gap and installs Knative from them
#[derive(Parser)]
#[command(name = "airlift", version)]
struct Cli {
    /// Path to the YAML configuration file
    #[arg(short, long, env = env::CONFIG, default_value = "airlift.yaml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Pull the source images into the archive and write the version markers
    Prepare,
    /// Load the archive and push the images missing from the private registry
    SyncImages {
        /// Push every image, even those already in the registry
        #[arg(long)]
        force: bool,
    },
    /// Sync images, then install the operator and serving and verify them
    Install {
        /// Keep going with the next stage when a readiness wait times out
        #[arg(long)]
        continue_on_timeout: bool,
        /// Assume the registry is already populated
        #[arg(long)]
        skip_images: bool,
    },
    /// Remove serving, the operator release and the namespaces
    Uninstall,
    /// Delete the mirrored images from the private registry
    CleanRegistry {
        /// Only report what would be deleted
        #[arg(long)]
        dry_run: bool,
    },
}

fn engine(config: &Config) -> Arc<dyn ContainerEngine> {
    Arc::new(CliEngine::new(config.engine, config.insecure_registry))
}

async fn collaborators(config: &Config) -> Result<Collaborators> {
    let client = Client::try_default()
        .await
        .context("failed to connect to the Kubernetes cluster")?;
    info!("Connected to Kubernetes cluster");
    Ok(Collaborators {
        cluster: Arc::new(KubeCluster::new(client)),
        installer: Arc::new(HelmCli::new(config.helm_binary.clone())),
        engine: engine(config),
    })
}

/// Log a diagnostic snapshot as pretty JSON
fn log_diagnostics(diagnostics: &Value) {
    let pretty = serde_json::to_string_pretty(diagnostics).unwrap_or_else(|_| diagnostics.to_string());
    error!("Last known state:\n{}", pretty);
}

async fn run(cli: Cli, cancel: CancelSignal) -> Result<()> {
    let mut config = Config::load(&cli.config)?;
    info!(
        "Configuration loaded: registry={}, engine={:?}, images={}",
        config.registry_location(),
        config.engine,
        config.images.len()
    );

    match cli.command {
        Command::Prepare => {
            commands::prepare(engine(&config).as_ref(), &config, &cancel).await?;
            info!("Archive written to {}", config.image_archive.display());
        }
        Command::SyncImages { force } => {
            let report = commands::sync_images(engine(&config), &config, force, &cancel).await?;
            for failure in &report.failures {
                error!("{}: {}", failure.mapping, failure.reason);
            }
            if !report.is_success() {
                bail!("{} images failed to sync", report.failures.len());
            }
            info!("{} images pushed", report.pushed.len());
        }
        Command::Install {
            continue_on_timeout,
            skip_images,
        } => {
            config.continue_on_timeout |= continue_on_timeout;
            let collaborators = collaborators(&config).await?;
            let report = match commands::install(&collaborators, &config, skip_images, &cancel).await {
                Ok(report) => report,
                Err(e) => {
                    if let Some(diagnostics) = e.diagnostics() {
                        log_diagnostics(diagnostics);
                    }
                    return Err(e.into());
                }
            };
            for stage in report.timed_out() {
                if let StageOutcome::TimedOut { diagnostics } = &stage.outcome {
                    warn!("Stage {} timed out", stage.name);
                    log_diagnostics(diagnostics);
                }
            }
            if !report.is_complete() {
                bail!("{} stages timed out", report.timed_out().count());
            }
            info!("Knative is installed and ready");
        }
        Command::Uninstall => {
            let collaborators = collaborators(&config).await?;
            commands::remove(&collaborators, &config, &cancel).await?;
            info!("Knative removed");
        }
        Command::CleanRegistry { dry_run } => {
            let registry = HttpRegistry::new(
                config.registry_host(),
                config.insecure_registry,
                config.credentials.clone(),
            )?;
            let report = commands::clean(&registry, &config, dry_run, &cancel).await?;
            for failure in &report.failures {
                error!("{} {}: {}", failure.repository, failure.reference, failure.reason);
            }
            if !report.is_success() {
                bail!("{} registry deletions failed", report.failures.len());
            }
            info!(
                "{} {} manifests",
                if dry_run { "Would delete" } else { "Deleted" },
                report.deleted.len()
            );
        }
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("airlift=info")),
        )
        .init();

    let cli = Cli::parse();

    let cancel = CancelSignal::new();
    let on_interrupt = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupted, stopping at the next step boundary");
            on_interrupt.cancel();
        }
    });

    run(cli, cancel).await
}
