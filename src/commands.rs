// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! The top-level workflows behind each CLI subcommand.

use crate::artifacts::{
    read_text_marker, read_version_marker, write_text_marker, write_version_marker,
};
use crate::cancel::CancelSignal;
use crate::config::Config;
use crate::engine::{ChartInstaller, ContainerEngine};
use crate::error::{AirliftError, Result};
use crate::knative::{uninstall, Pipeline, UninstallReport};
use crate::kubernetes::{ClusterApi, TemplateVars};
use crate::reconcile::{bundle, ImageSynchronizer, SequenceReport, Sequencer, SyncReport};
use crate::registry::{clean_registry, CleanReport, RegistryApi};
use std::sync::Arc;
use tracing::{info, warn};

/// Connected side: pull every source image into the archive and write the
/// version markers.
pub async fn prepare(engine: &dyn ContainerEngine, config: &Config, cancel: &CancelSignal) -> Result<()> {
    let mappings = config.mappings()?;
    bundle(engine, &mappings, &config.image_archive, cancel).await?;

    match &config.knative_version {
        Some(version) => write_version_marker(&config.knative_version_file, version).await?,
        None => warn!("knativeVersion not set, {} not written", config.knative_version_file.display()),
    }
    if let Some(version) = &config.envoy_version {
        write_text_marker(&config.envoy_version_file, version).await?;
    }
    Ok(())
}

/// Air-gapped side: push whatever the private registry is missing
pub async fn sync_images(
    engine: Arc<dyn ContainerEngine>,
    config: &Config,
    force: bool,
    cancel: &CancelSignal,
) -> Result<SyncReport> {
    let mappings = config.mappings()?;
    if let Some(credentials) = &config.credentials {
        engine.login(config.registry_host(), credentials).await?;
    }

    let synchronizer = ImageSynchronizer::new(
        engine,
        &config.image_archive,
        config.push_concurrency,
        cancel.clone(),
    );
    let plan = synchronizer.plan(&mappings).await?;
    info!(
        "{} of {} images missing from {}",
        plan.missing().len(),
        plan.mappings().len(),
        config.registry_location()
    );
    synchronizer.execute(&plan, force).await
}

/// Placeholder values for manifests and chart values. The Knative marker
/// must be a semantic version; the Envoy marker is any single-line tag.
pub async fn template_vars(config: &Config) -> Result<TemplateVars> {
    let knative_version = read_version_marker(&config.knative_version_file).await?;
    let envoy_version = if tokio::fs::try_exists(&config.envoy_version_file).await? {
        read_text_marker(&config.envoy_version_file).await?
    } else {
        String::new()
    };
    Ok(TemplateVars {
        private_registry_url: config.registry_location().to_string(),
        knative_version,
        envoy_version,
    })
}

pub struct Collaborators {
    pub cluster: Arc<dyn ClusterApi>,
    pub installer: Arc<dyn ChartInstaller>,
    pub engine: Arc<dyn ContainerEngine>,
}

/// Sync images (unless `skip_images`), then run the install stages
pub async fn install(
    collaborators: &Collaborators,
    config: &Config,
    skip_images: bool,
    cancel: &CancelSignal,
) -> Result<SequenceReport> {
    let vars = template_vars(config).await?;
    let stages = Pipeline {
        config,
        cluster: collaborators.cluster.clone(),
        installer: collaborators.installer.clone(),
        vars,
    }
    .stages()?;

    if !skip_images {
        let report = sync_images(collaborators.engine.clone(), config, false, cancel).await?;
        if !report.is_success() {
            let failed: Vec<String> = report
                .failures
                .iter()
                .map(|f| format!("{}: {}", f.mapping.destination(), f.reason))
                .collect();
            return Err(AirliftError::Unrecoverable(format!(
                "image sync failed for {}",
                failed.join("; ")
            )));
        }
    }

    Sequencer::new(
        collaborators.cluster.clone(),
        config.sequencer_settings(),
        cancel.clone(),
    )
    .run(&stages)
    .await
}

pub async fn remove(
    collaborators: &Collaborators,
    config: &Config,
    cancel: &CancelSignal,
) -> Result<UninstallReport> {
    uninstall(
        collaborators.cluster.as_ref(),
        collaborators.installer.as_ref(),
        config,
        cancel,
    )
    .await
}

pub async fn clean(
    registry: &dyn RegistryApi,
    config: &Config,
    dry_run: bool,
    cancel: &CancelSignal,
) -> Result<CleanReport> {
    let repositories = config.destination_repositories()?;
    clean_registry(registry, &repositories, dry_run, cancel).await
}
