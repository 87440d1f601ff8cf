// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! Moves images from a local archive into the private registry, pushing
//! only what the registry is missing.

use crate::cancel::CancelSignal;
use crate::engine::ContainerEngine;
use crate::error::{AirliftError, Result};
use crate::types::{ImageMapping, ImageReference};
use futures::{stream, StreamExt};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, instrument, warn};

/// Mappings in configuration order plus the subset absent from the registry
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncPlan {
    mappings: Vec<ImageMapping>,
    missing: Vec<ImageMapping>,
}

impl SyncPlan {
    pub fn mappings(&self) -> &[ImageMapping] {
        &self.mappings
    }

    pub fn missing(&self) -> &[ImageMapping] {
        &self.missing
    }

    pub fn is_up_to_date(&self) -> bool {
        self.missing.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncFailure {
    pub mapping: ImageMapping,
    pub reason: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncReport {
    /// Whether the archive was loaded into the local store
    pub loaded: bool,
    pub pushed: Vec<ImageMapping>,
    pub failures: Vec<SyncFailure>,
}

impl SyncReport {
    pub fn is_success(&self) -> bool {
        self.failures.is_empty()
    }
}

pub struct ImageSynchronizer {
    engine: Arc<dyn ContainerEngine>,
    archive: PathBuf,
    push_concurrency: usize,
    cancel: CancelSignal,
}

impl ImageSynchronizer {
    pub fn new(
        engine: Arc<dyn ContainerEngine>,
        archive: impl Into<PathBuf>,
        push_concurrency: usize,
        cancel: CancelSignal,
    ) -> Self {
        Self {
            engine,
            archive: archive.into(),
            push_concurrency: push_concurrency.max(1),
            cancel,
        }
    }

    /// Probe every destination. Presence of the reference counts as synced;
    /// content is not compared.
    #[instrument(skip(self, mappings), fields(count = mappings.len()))]
    pub async fn plan(&self, mappings: &[ImageMapping]) -> Result<SyncPlan> {
        let mut missing = Vec::new();
        for mapping in mappings {
            self.cancel.check()?;
            if self.engine.image_exists(mapping.destination()).await? {
                info!("{} already present", mapping.destination());
            } else {
                info!("{} missing", mapping.destination());
                missing.push(mapping.clone());
            }
        }
        Ok(SyncPlan {
            mappings: mappings.to_vec(),
            missing,
        })
    }

    /// Load the archive once, then tag and push the missing mappings (all of
    /// them when `force`). Per-image failures are reported, not raised.
    #[instrument(skip(self, plan), fields(missing = plan.missing.len()))]
    pub async fn execute(&self, plan: &SyncPlan, force: bool) -> Result<SyncReport> {
        let todo = if force { &plan.mappings } else { &plan.missing };
        if todo.is_empty() {
            info!("Registry is up to date, nothing to push");
            return Ok(SyncReport::default());
        }

        self.cancel.check()?;
        if !self.archive.exists() {
            return Err(AirliftError::ConfigError(format!(
                "image archive {} does not exist",
                self.archive.display()
            )));
        }
        self.engine.load(&self.archive).await?;

        let results: Vec<(ImageMapping, Result<()>)> = stream::iter(todo.iter().cloned())
            .map(|mapping| async move {
                let result = self.transfer(&mapping).await;
                (mapping, result)
            })
            .buffered(self.push_concurrency)
            .collect()
            .await;

        self.cancel.check()?;

        let mut report = SyncReport {
            loaded: true,
            ..Default::default()
        };
        for (mapping, result) in results {
            match result {
                Ok(()) => report.pushed.push(mapping),
                Err(e) => {
                    warn!("Failed to push {}: {}", mapping, e);
                    report.failures.push(SyncFailure {
                        mapping,
                        reason: e.to_string(),
                    });
                }
            }
        }

        info!(
            "Pushed {} images, {} failed",
            report.pushed.len(),
            report.failures.len()
        );
        Ok(report)
    }

    async fn transfer(&self, mapping: &ImageMapping) -> Result<()> {
        self.cancel.check()?;
        self.engine.tag(mapping.source(), mapping.destination()).await?;
        self.engine.push(mapping.destination()).await
    }
}

/// Pull every source image and save them into one archive.
///
/// The archive is written to a temporary file next to `archive` and only
/// moved into place once complete.
#[instrument(skip(engine, mappings, cancel), fields(count = mappings.len()))]
pub async fn bundle(
    engine: &dyn ContainerEngine,
    mappings: &[ImageMapping],
    archive: &Path,
    cancel: &CancelSignal,
) -> Result<()> {
    let mut sources: Vec<ImageReference> = Vec::new();
    for mapping in mappings {
        if !sources.contains(mapping.source()) {
            sources.push(mapping.source().clone());
        }
    }

    for source in &sources {
        cancel.check()?;
        engine.pull(source).await?;
    }
    cancel.check()?;

    let dir = match archive.parent() {
        Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
        _ => PathBuf::from("."),
    };
    tokio::fs::create_dir_all(&dir).await?;
    let partial = tempfile::Builder::new()
        .prefix(".airlift-")
        .suffix(".tar")
        .tempfile_in(&dir)?;

    engine.save(&sources, partial.path()).await?;
    partial
        .persist(archive)
        .map_err(|e| AirliftError::IoError(e.error))?;

    info!("Bundled {} images into {}", sources.len(), archive.display());
    Ok(())
}
