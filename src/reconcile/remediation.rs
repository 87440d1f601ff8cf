// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! Pluggable fixes for known defects in resources generated by other controllers.

use crate::error::{AirliftError, Result};
use crate::kubernetes::ClusterApi;
use crate::types::ResourceRef;
use serde_json::Value;
use tracing::{debug, info, instrument};

/// A detect/patch pair for one known defect.
///
/// `apply` must be idempotent. The hook consults `is_already_applied` before
/// every `apply`, so a fixed resource is never patched again.
pub trait RemediationRule: Send + Sync {
    fn name(&self) -> &str;

    /// The resource the rule inspects and repairs
    fn target(&self) -> ResourceRef;

    /// Whether the defect is present. `None` means the resource does not exist yet.
    fn detect(&self, state: Option<&Value>) -> bool;

    fn is_already_applied(&self, state: Option<&Value>) -> bool;

    /// Compute the repaired resource from the current one
    fn apply(&self, state: &Value) -> Result<Value>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RemediationOutcome {
    Patched,
    NoActionNeeded,
}

/// Decide what the rule wants for `state`: `None` when nothing is to be done,
/// otherwise the replacement resource.
pub fn plan_remediation(rule: &dyn RemediationRule, state: Option<&Value>) -> Result<Option<Value>> {
    if rule.is_already_applied(state) {
        return Ok(None);
    }
    match state {
        Some(current) if rule.detect(state) => rule.apply(current).map(Some),
        _ => Ok(None),
    }
}

/// Inspect the rule's target and, if the defect is present, replace the
/// resource with the repaired version. The field being fixed is immutable,
/// so the replacement is a delete followed by a create.
#[instrument(skip(cluster, rule), fields(rule = rule.name()))]
pub async fn remediate(
    cluster: &dyn ClusterApi,
    rule: &dyn RemediationRule,
) -> Result<RemediationOutcome> {
    let target = rule.target();
    let state = cluster.get_resource(&target).await?;

    let Some(replacement) = plan_remediation(rule, state.as_ref())? else {
        debug!("{}: nothing to do for {}", rule.name(), target);
        return Ok(RemediationOutcome::NoActionNeeded);
    };

    info!("{}: replacing {}", rule.name(), target);
    cluster.delete_resource(&target).await?;
    if !cluster.create_resource(target.kind, &replacement).await? {
        return Err(AirliftError::Transient(format!(
            "{} still present after delete, will retry",
            target
        )));
    }
    Ok(RemediationOutcome::Patched)
}

/// A rule bound to the cluster it runs against, invoked once per poll cycle
pub struct RemediationHook<'a> {
    cluster: &'a dyn ClusterApi,
    rule: &'a dyn RemediationRule,
}

impl<'a> RemediationHook<'a> {
    pub fn new(cluster: &'a dyn ClusterApi, rule: &'a dyn RemediationRule) -> Self {
        Self { cluster, rule }
    }

    pub fn name(&self) -> &str {
        self.rule.name()
    }

    pub async fn run(&self) -> Result<RemediationOutcome> {
        remediate(self.cluster, self.rule).await
    }
}
