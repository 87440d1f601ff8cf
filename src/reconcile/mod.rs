// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

pub mod poller;
pub mod remediation;
pub mod sequencer;
pub mod sync;
pub mod upsert;

pub use poller::{wait_until, ProbeResult, Readiness, ReadinessCheck, ReadinessProbe, WaitOutcome};
pub use remediation::{remediate, RemediationHook, RemediationOutcome, RemediationRule};
pub use sequencer::{
    HelmInstall, InstallAction, ManifestApply, SequenceReport, Sequencer, SequencerSettings, Stage,
    StageOutcome, StageReport, WaitPhase,
};
pub use sync::{bundle, ImageSynchronizer, SyncPlan, SyncReport};
pub use upsert::{upsert, UpsertOutcome};
