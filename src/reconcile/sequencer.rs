// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! Drives install stages in order: preconditions, install, service-account
//! patches, restart, readiness wait.

use crate::cancel::CancelSignal;
use crate::constants::polling;
use crate::engine::ChartInstaller;
use crate::error::{AirliftError, Result};
use crate::kubernetes::ClusterApi;
use crate::reconcile::poller::{wait_until, ReadinessCheck, WaitOutcome};
use crate::reconcile::remediation::{RemediationHook, RemediationRule};
use crate::reconcile::upsert::{upsert, UpsertOutcome};
use crate::types::ReconcileTarget;
use async_trait::async_trait;
use serde_json::Value;
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{info, instrument, warn};

/// The opaque install step of a stage
#[async_trait]
pub trait InstallAction: Send + Sync {
    fn describe(&self) -> String;

    async fn install(&self) -> Result<()>;
}

/// Install or upgrade a chart release
pub struct HelmInstall {
    pub installer: Arc<dyn ChartInstaller>,
    pub release: String,
    pub chart: PathBuf,
    pub namespace: String,
    pub values: BTreeMap<String, String>,
}

#[async_trait]
impl InstallAction for HelmInstall {
    fn describe(&self) -> String {
        format!("helm release {} in {}", self.release, self.namespace)
    }

    async fn install(&self) -> Result<()> {
        self.installer
            .install_or_upgrade(&self.release, &self.chart, &self.namespace, &self.values)
            .await
    }
}

/// Apply an already rendered manifest
pub struct ManifestApply {
    pub cluster: Arc<dyn ClusterApi>,
    pub name: String,
    pub manifest: String,
}

#[async_trait]
impl InstallAction for ManifestApply {
    fn describe(&self) -> String {
        format!("manifest {}", self.name)
    }

    async fn install(&self) -> Result<()> {
        let count = self.cluster.apply_manifest(&self.manifest).await?;
        info!("Applied {} objects from {}", count, self.name);
        Ok(())
    }
}

pub struct WaitPhase {
    pub check: ReadinessCheck,
    pub remediation: Option<Box<dyn RemediationRule>>,
}

pub struct Stage {
    pub name: String,
    pub preconditions: Vec<ReconcileTarget>,
    pub install: Option<Box<dyn InstallAction>>,
    pub post_patch: Vec<ReconcileTarget>,
    /// Namespaces whose workloads are restarted once a service account carries
    /// the pull secret
    pub restart_namespaces: Vec<String>,
    pub wait: Option<WaitPhase>,
}

#[derive(Debug, Clone)]
pub struct SequencerSettings {
    pub patch_attempts: u32,
    pub patch_backoff: Duration,
    pub patch_max_backoff: Duration,
    pub continue_on_timeout: bool,
}

impl Default for SequencerSettings {
    fn default() -> Self {
        Self {
            patch_attempts: polling::PATCH_ATTEMPTS,
            patch_backoff: Duration::from_secs(polling::PATCH_BACKOFF_SECS),
            patch_max_backoff: Duration::from_secs(polling::PATCH_MAX_BACKOFF_SECS),
            continue_on_timeout: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum StageOutcome {
    Completed { waited: Option<Duration> },
    TimedOut { diagnostics: Value },
}

#[derive(Debug, Clone, PartialEq)]
pub struct StageReport {
    pub name: String,
    pub patches: Vec<(String, UpsertOutcome)>,
    pub outcome: StageOutcome,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct SequenceReport {
    pub stages: Vec<StageReport>,
}

impl SequenceReport {
    pub fn timed_out(&self) -> impl Iterator<Item = &StageReport> {
        self.stages
            .iter()
            .filter(|s| matches!(s.outcome, StageOutcome::TimedOut { .. }))
    }

    pub fn is_complete(&self) -> bool {
        self.timed_out().next().is_none()
    }
}

pub struct Sequencer {
    cluster: Arc<dyn ClusterApi>,
    settings: SequencerSettings,
    cancel: CancelSignal,
}

impl Sequencer {
    pub fn new(cluster: Arc<dyn ClusterApi>, settings: SequencerSettings, cancel: CancelSignal) -> Self {
        Self {
            cluster,
            settings,
            cancel,
        }
    }

    /// Run the stages strictly in order. The first error aborts the sequence;
    /// a timeout aborts too unless `continue_on_timeout` is set.
    pub async fn run(&self, stages: &[Stage]) -> Result<SequenceReport> {
        let mut report = SequenceReport::default();
        for stage in stages {
            let stage_report = self.run_stage(stage).await?;
            if let StageOutcome::TimedOut { diagnostics } = &stage_report.outcome {
                if !self.settings.continue_on_timeout {
                    return Err(AirliftError::StageTimedOut {
                        stage: stage.name.clone(),
                        target: stage
                            .wait
                            .as_ref()
                            .map(|w| w.check.probe.describe())
                            .unwrap_or_default(),
                        diagnostics: diagnostics.clone(),
                    });
                }
                warn!("Stage {} timed out, continuing", stage.name);
            }
            report.stages.push(stage_report);
        }
        Ok(report)
    }

    #[instrument(skip(self, stage), fields(stage = %stage.name))]
    async fn run_stage(&self, stage: &Stage) -> Result<StageReport> {
        info!("Starting stage {}", stage.name);

        for target in &stage.preconditions {
            self.cancel.check()?;
            upsert(self.cluster.as_ref(), target).await?;
        }

        if let Some(action) = &stage.install {
            self.cancel.check()?;
            info!("Installing {}", action.describe());
            action.install().await?;
        }

        let mut patches = Vec::new();
        for target in &stage.post_patch {
            let outcome = self.patch_with_retry(target).await?;
            patches.push((target.resource_ref().to_string(), outcome));
        }

        // A previous run may have patched the accounts and stopped before the
        // restart, so an account that already carries the secret counts too.
        if patches
            .iter()
            .any(|(_, o)| matches!(o, UpsertOutcome::Applied | UpsertOutcome::AlreadyExists))
        {
            for namespace in &stage.restart_namespaces {
                self.cancel.check()?;
                self.cluster.restart_workloads(namespace).await?;
            }
        }

        let outcome = match &stage.wait {
            None => StageOutcome::Completed { waited: None },
            Some(phase) => {
                let hook = phase
                    .remediation
                    .as_deref()
                    .map(|rule| RemediationHook::new(self.cluster.as_ref(), rule));
                match wait_until(&phase.check, hook.as_ref(), &self.cancel).await? {
                    WaitOutcome::Ready { elapsed, .. } => StageOutcome::Completed {
                        waited: Some(elapsed),
                    },
                    WaitOutcome::TimedOut { last_state, .. } => StageOutcome::TimedOut {
                        diagnostics: last_state.unwrap_or(Value::Null),
                    },
                }
            }
        };

        info!("Stage {} finished: {:?}", stage.name, outcome);
        Ok(StageReport {
            name: stage.name.clone(),
            patches,
            outcome,
        })
    }

    /// Service accounts appear asynchronously after an install, so a
    /// `Skipped` patch (or a transient failure) is retried with exponential
    /// backoff. A patch still skipped after the last attempt is tolerated.
    async fn patch_with_retry(&self, target: &ReconcileTarget) -> Result<UpsertOutcome> {
        let attempts = self.settings.patch_attempts.max(1);
        let mut backoff = self.settings.patch_backoff;

        for attempt in 1..=attempts {
            self.cancel.check()?;
            let last = attempt == attempts;
            match upsert(self.cluster.as_ref(), target).await {
                Ok(UpsertOutcome::Skipped) if !last => {
                    info!(
                        "{} not there yet (attempt {}/{}), retrying in {:?}",
                        target.resource_ref(),
                        attempt,
                        attempts,
                        backoff
                    );
                }
                Ok(UpsertOutcome::Skipped) => {
                    warn!(
                        "{} never appeared, leaving it unpatched",
                        target.resource_ref()
                    );
                    return Ok(UpsertOutcome::Skipped);
                }
                Ok(outcome) => return Ok(outcome),
                Err(e) if e.is_transient() && !last => {
                    warn!("Patching {} failed: {}, retrying", target.resource_ref(), e);
                }
                Err(e) => return Err(e),
            }
            sleep(backoff).await;
            backoff = (backoff * 2).min(self.settings.patch_max_backoff);
        }

        Ok(UpsertOutcome::Skipped)
    }
}
