// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! Removal of a Knative install in reverse order.

use crate::cancel::CancelSignal;
use crate::config::Config;
use crate::engine::ChartInstaller;
use crate::error::Result;
use crate::kubernetes::ClusterApi;
use crate::types::{ResourceKind, ResourceRef};
use tracing::{info, instrument};

/// What each uninstall step found: `true` when something was removed
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UninstallReport {
    pub steps: Vec<(String, bool)>,
}

impl UninstallReport {
    fn record(&mut self, step: impl Into<String>, removed: bool) {
        let step = step.into();
        if removed {
            info!("Removed {}", step);
        } else {
            info!("{} was already gone", step);
        }
        self.steps.push((step, removed));
    }
}

/// Delete the KnativeServing resource (waiting for the operator to tear it
/// down), uninstall the operator release, then remove the bindings and
/// namespaces. Anything already absent counts as done.
#[instrument(skip_all)]
pub async fn uninstall(
    cluster: &dyn ClusterApi,
    installer: &dyn ChartInstaller,
    config: &Config,
    cancel: &CancelSignal,
) -> Result<UninstallReport> {
    let mut report = UninstallReport::default();
    let serving = &config.serving;
    let operator = &config.operator;

    cancel.check()?;
    let resource =
        ResourceRef::namespaced(ResourceKind::KnativeServing, &serving.namespace, &serving.name);
    let removed = cluster.delete_resource(&resource).await?;
    report.record(resource.to_string(), removed);

    cancel.check()?;
    let removed = installer
        .uninstall(&operator.release, &operator.namespace)
        .await?;
    report.record(format!("helm release {}", operator.release), removed);

    for binding in &operator.cluster_role_bindings {
        cancel.check()?;
        let resource = ResourceRef::cluster_scoped(ResourceKind::ClusterRoleBinding, &binding.name);
        let removed = cluster.delete_resource(&resource).await?;
        report.record(resource.to_string(), removed);
    }

    let namespaces = serving
        .extra_namespaces
        .iter()
        .chain([&serving.namespace, &operator.namespace]);
    for namespace in namespaces {
        cancel.check()?;
        let resource = ResourceRef::cluster_scoped(ResourceKind::Namespace, namespace);
        let removed = cluster.delete_resource(&resource).await?;
        report.record(resource.to_string(), removed);
    }

    Ok(report)
}
