// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! Idempotent create-if-absent for the resources a stage depends on.

use crate::error::{AirliftError, Result};
use crate::kubernetes::ClusterApi;
use crate::types::{ReconcileTarget, TargetKind};
use serde_json::{json, Value};
use tracing::{debug, info, instrument};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpsertOutcome {
    /// The cluster was changed to match the target
    Applied,
    /// The cluster already matched; nothing was changed
    AlreadyExists,
    /// The object to patch does not exist yet
    Skipped,
}

/// Converge one target. "Already exists" and "not found" are outcomes, not errors.
#[instrument(skip(cluster, target), fields(target = %target.resource_ref()))]
pub async fn upsert(cluster: &dyn ClusterApi, target: &ReconcileTarget) -> Result<UpsertOutcome> {
    match target.kind {
        TargetKind::Namespace | TargetKind::Secret => ensure_exists(cluster, target).await,
        TargetKind::ClusterRoleBinding => ensure_binding(cluster, target).await,
        TargetKind::ServiceAccountPatch => patch_pull_secrets(cluster, target).await,
    }
}

async fn ensure_exists(cluster: &dyn ClusterApi, target: &ReconcileTarget) -> Result<UpsertOutcome> {
    let resource = target.resource_ref();
    if cluster.get_resource(&resource).await?.is_some() {
        debug!("{} already exists", resource);
        return Ok(UpsertOutcome::AlreadyExists);
    }
    create(cluster, target).await
}

async fn create(cluster: &dyn ClusterApi, target: &ReconcileTarget) -> Result<UpsertOutcome> {
    let resource = target.resource_ref();
    if cluster.create_resource(resource.kind, &target.desired).await? {
        info!("{} created", resource);
        Ok(UpsertOutcome::Applied)
    } else {
        Ok(UpsertOutcome::AlreadyExists)
    }
}

/// roleRef is immutable, so a binding to a different role is recreated
async fn ensure_binding(cluster: &dyn ClusterApi, target: &ReconcileTarget) -> Result<UpsertOutcome> {
    let resource = target.resource_ref();
    let Some(existing) = cluster.get_resource(&resource).await? else {
        return create(cluster, target).await;
    };

    if existing.get("roleRef") != target.desired.get("roleRef") {
        info!("{} points at a different role, recreating", resource);
        cluster.delete_resource(&resource).await?;
        if !cluster.create_resource(resource.kind, &target.desired).await? {
            return Err(AirliftError::Transient(format!(
                "{} reappeared before it could be recreated",
                resource
            )));
        }
        return Ok(UpsertOutcome::Applied);
    }

    let desired_subjects = target.desired.get("subjects").cloned().unwrap_or(Value::Null);
    let existing_subjects = existing.get("subjects").cloned().unwrap_or(Value::Null);
    if desired_subjects != existing_subjects {
        cluster
            .patch_resource(&resource, &json!({ "subjects": desired_subjects }))
            .await?;
        info!("{} subjects updated", resource);
        return Ok(UpsertOutcome::Applied);
    }

    Ok(UpsertOutcome::AlreadyExists)
}

fn secret_names(list: Option<&Value>) -> Vec<String> {
    list.and_then(Value::as_array)
        .map(|items| {
            items
                .iter()
                .filter_map(|item| item.get("name").and_then(Value::as_str))
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default()
}

/// Merge patches replace lists wholesale, so the patch carries the union
async fn patch_pull_secrets(
    cluster: &dyn ClusterApi,
    target: &ReconcileTarget,
) -> Result<UpsertOutcome> {
    let resource = target.resource_ref();
    let Some(account) = cluster.get_resource(&resource).await? else {
        debug!("{} does not exist yet, skipping patch", resource);
        return Ok(UpsertOutcome::Skipped);
    };

    let mut names = secret_names(account.get("imagePullSecrets"));
    let wanted = secret_names(target.desired.get("imagePullSecrets"));
    let missing: Vec<String> = wanted.into_iter().filter(|n| !names.contains(n)).collect();
    if missing.is_empty() {
        return Ok(UpsertOutcome::AlreadyExists);
    }

    names.extend(missing);
    let list: Vec<Value> = names.iter().map(|n| json!({ "name": n })).collect();
    cluster
        .patch_resource(&resource, &json!({ "imagePullSecrets": list }))
        .await?;
    info!("{} now pulls with {}", resource, names.join(", "));
    Ok(UpsertOutcome::Applied)
}
