// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! Fixed-interval readiness polling with an optional remediation step.

use crate::cancel::CancelSignal;
use crate::error::{AirliftError, Result};
use crate::reconcile::remediation::{RemediationHook, RemediationOutcome};
use async_trait::async_trait;
use serde_json::Value;
use std::time::Duration;
use tokio::time::{sleep, Instant};
use tracing::{debug, info, warn};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Readiness {
    Ready,
    Pending,
    /// A condition that will not resolve by waiting
    Error(String),
}

/// One evaluation of a readiness predicate, with the state it looked at
#[derive(Debug, Clone, PartialEq)]
pub struct ProbeResult {
    pub readiness: Readiness,
    pub snapshot: Value,
}

impl ProbeResult {
    pub fn new(readiness: Readiness, snapshot: Value) -> Self {
        Self {
            readiness,
            snapshot,
        }
    }
}

#[async_trait]
pub trait ReadinessProbe: Send + Sync {
    /// Human readable name of what is being waited on
    fn describe(&self) -> String;

    async fn probe(&self) -> Result<ProbeResult>;
}

pub struct ReadinessCheck {
    pub probe: Box<dyn ReadinessProbe>,
    pub timeout: Duration,
    pub poll_interval: Duration,
}

impl ReadinessCheck {
    pub fn new(probe: Box<dyn ReadinessProbe>, timeout: Duration, poll_interval: Duration) -> Self {
        Self {
            probe,
            timeout,
            poll_interval,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum WaitOutcome {
    Ready {
        elapsed: Duration,
        probes: u32,
    },
    /// Still pending when the timeout ran out. `last_state` is the most
    /// recent probe snapshot.
    TimedOut {
        elapsed: Duration,
        probes: u32,
        last_state: Option<Value>,
    },
}

/// Poll `check` until it reports ready, the timeout elapses, or it fails.
///
/// Probes run at t = 0, I, 2I, ... and only while the elapsed time is
/// strictly below the timeout. Each cycle runs the remediation hook (if any)
/// before the probe. Cancellation is checked at the start of every cycle
/// and again before sleeping.
pub async fn wait_until(
    check: &ReadinessCheck,
    remediation: Option<&RemediationHook<'_>>,
    cancel: &CancelSignal,
) -> Result<WaitOutcome> {
    let target = check.probe.describe();
    let start = Instant::now();
    let mut probes = 0u32;
    let mut last_state = None;

    loop {
        cancel.check()?;

        if let Some(hook) = remediation {
            match hook.run().await {
                Ok(RemediationOutcome::Patched) => info!("Remediation {} applied", hook.name()),
                Ok(RemediationOutcome::NoActionNeeded) => {}
                Err(e) if e.is_transient() => warn!("Remediation {} failed: {}", hook.name(), e),
                Err(e) => return Err(e),
            }
        }

        probes += 1;
        match check.probe.probe().await {
            Ok(result) => match result.readiness {
                Readiness::Ready => {
                    let elapsed = start.elapsed();
                    info!("{} ready after {:?}", target, elapsed);
                    return Ok(WaitOutcome::Ready { elapsed, probes });
                }
                Readiness::Error(reason) => {
                    return Err(AirliftError::NotReady {
                        reason: format!("{}: {}", target, reason),
                        diagnostics: result.snapshot,
                    });
                }
                Readiness::Pending => {
                    debug!("{} not ready yet", target);
                    last_state = Some(result.snapshot);
                }
            },
            Err(e) if e.is_transient() => warn!("Probing {} failed: {}", target, e),
            Err(e) => return Err(e),
        }

        cancel.check()?;
        sleep(check.poll_interval).await;

        let elapsed = start.elapsed();
        if elapsed >= check.timeout {
            warn!("{} not ready after {:?}", target, elapsed);
            return Ok(WaitOutcome::TimedOut {
                elapsed,
                probes,
                last_state,
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::ScriptedProbe;
    use serde_json::json;

    fn check(probe: ScriptedProbe, timeout: u64, interval: u64) -> ReadinessCheck {
        ReadinessCheck::new(
            Box::new(probe),
            Duration::from_secs(timeout),
            Duration::from_secs(interval),
        )
    }

    #[tokio::test(start_paused = true)]
    async fn test_ready_immediately() {
        let probe = ScriptedProbe::new(vec![Readiness::Ready]);
        let outcome = wait_until(&check(probe, 30, 10), None, &CancelSignal::new())
            .await
            .unwrap();
        assert_eq!(
            outcome,
            WaitOutcome::Ready {
                elapsed: Duration::ZERO,
                probes: 1
            }
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_ready_after_k_pending_cycles() {
        let probe = ScriptedProbe::new(vec![
            Readiness::Pending,
            Readiness::Pending,
            Readiness::Ready,
        ]);
        let outcome = wait_until(&check(probe, 100, 10), None, &CancelSignal::new())
            .await
            .unwrap();

        let WaitOutcome::Ready { elapsed, probes } = outcome else {
            panic!("expected ready, got {:?}", outcome);
        };
        assert_eq!(probes, 3);
        assert!(elapsed >= Duration::from_secs(20));
        assert!(elapsed < Duration::from_secs(30));
    }

    #[tokio::test(start_paused = true)]
    async fn test_always_pending_times_out_within_one_interval() {
        let probe = ScriptedProbe::new(vec![Readiness::Pending]);
        let outcome = wait_until(&check(probe, 25, 10), None, &CancelSignal::new())
            .await
            .unwrap();

        let WaitOutcome::TimedOut {
            elapsed,
            last_state,
            ..
        } = outcome
        else {
            panic!("expected timeout, got {:?}", outcome);
        };
        assert!(elapsed >= Duration::from_secs(25));
        assert!(elapsed <= Duration::from_secs(35));
        assert_eq!(last_state, Some(json!({ "probe": 3 })));
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_boundary_is_exclusive() {
        // Probes at t=0,10,20 are pending; at t=30 the elapsed time equals the
        // timeout, so the fourth probe (which would be Ready) never runs.
        let probe = ScriptedProbe::new(vec![
            Readiness::Pending,
            Readiness::Pending,
            Readiness::Pending,
            Readiness::Ready,
        ]);
        let outcome = wait_until(&check(probe.clone(), 30, 10), None, &CancelSignal::new())
            .await
            .unwrap();

        assert_eq!(
            outcome,
            WaitOutcome::TimedOut {
                elapsed: Duration::from_secs(30),
                probes: 3,
                last_state: Some(json!({ "probe": 3 })),
            }
        );
        assert_eq!(probe.calls(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_error_is_fatal() {
        let probe = ScriptedProbe::new(vec![
            Readiness::Pending,
            Readiness::Error("InvalidImageName".to_string()),
            Readiness::Ready,
        ]);
        let err = wait_until(&check(probe, 100, 10), None, &CancelSignal::new())
            .await
            .unwrap_err();
        assert!(matches!(&err, AirliftError::NotReady { reason, .. } if reason.contains("InvalidImageName")));
        // the snapshot of the failing probe, not the earlier pending one
        assert_eq!(err.diagnostics(), Some(&json!({ "probe": 2 })));
    }

    #[tokio::test(start_paused = true)]
    async fn test_transient_probe_failure_keeps_polling() {
        let probe = ScriptedProbe::new(vec![Readiness::Pending, Readiness::Ready])
            .failing_first(1);
        let outcome = wait_until(&check(probe, 100, 10), None, &CancelSignal::new())
            .await
            .unwrap();
        assert!(matches!(outcome, WaitOutcome::Ready { probes: 3, .. }));
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancelled_before_first_probe() {
        let probe = ScriptedProbe::new(vec![Readiness::Ready]);
        let cancel = CancelSignal::new();
        cancel.cancel();

        let result = wait_until(&check(probe.clone(), 30, 10), None, &cancel).await;

        assert!(matches!(result, Err(AirliftError::Cancelled)));
        assert_eq!(probe.calls(), 0);
    }
}
