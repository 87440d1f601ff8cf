// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! Cluster API access: typed-by-kind CRUD over dynamic objects.

use crate::constants::{annotations, polling::DELETE_TIMEOUT_SECS, FIELD_MANAGER};
use crate::error::{is_conflict, AirliftError, Result};
use crate::kubernetes::manifest::parse_manifest;
use crate::types::{KnativeServing, ResourceKind, ResourceRef};
use async_trait::async_trait;
use k8s_openapi::api::apps::v1::Deployment;
use k8s_openapi::api::batch::v1::Job;
use k8s_openapi::api::core::v1::{Namespace, Pod, Secret, ServiceAccount};
use k8s_openapi::api::rbac::v1::ClusterRoleBinding;
use kube::{
    api::{ApiResource, DeleteParams, DynamicObject, ListParams, Patch, PatchParams, PostParams},
    core::{GroupVersionKind, TypeMeta},
    discovery::{pinned_kind, Scope},
    runtime::wait::{await_condition, conditions},
    Api, Client, ResourceExt,
};
use serde_json::{json, Value};
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tracing::{debug, info, instrument, warn};

/// The cluster operations the orchestrator depends on.
///
/// Implementations never cache: every call observes the live cluster.
#[async_trait]
pub trait ClusterApi: Send + Sync {
    /// Fetch a resource; `None` when it does not exist
    async fn get_resource(&self, resource: &ResourceRef) -> Result<Option<Value>>;

    /// List resources of a kind, optionally restricted to one namespace
    async fn list_resources(&self, kind: ResourceKind, namespace: Option<&str>)
        -> Result<Vec<Value>>;

    /// Create a resource. Returns `false` when it already existed.
    async fn create_resource(&self, kind: ResourceKind, spec: &Value) -> Result<bool>;

    /// Apply a JSON merge patch to an existing resource
    async fn patch_resource(&self, resource: &ResourceRef, merge_patch: &Value) -> Result<()>;

    /// Delete a resource and wait until it is gone. Returns `false` when it did not exist.
    async fn delete_resource(&self, resource: &ResourceRef) -> Result<bool>;

    /// Server-side apply every document of a YAML manifest. Returns the object count.
    async fn apply_manifest(&self, yaml: &str) -> Result<usize>;

    /// Roll the workloads of a namespace so new pods pick up patched settings.
    /// Returns the number of workloads restarted. Every workload is attempted;
    /// any failed restart is returned as an error afterwards.
    async fn restart_workloads(&self, namespace: &str) -> Result<usize>;
}

/// [`ClusterApi`] backed by a kube client
#[derive(Clone)]
pub struct KubeCluster {
    client: Client,
    delete_timeout: Duration,
}

impl KubeCluster {
    pub fn new(client: Client) -> Self {
        Self {
            client,
            delete_timeout: Duration::from_secs(DELETE_TIMEOUT_SECS),
        }
    }

    fn api(&self, kind: ResourceKind, namespace: Option<&str>) -> Api<DynamicObject> {
        let ar = api_resource(kind);
        match namespace {
            Some(ns) if kind.is_namespaced() => Api::namespaced_with(self.client.clone(), ns, &ar),
            _ => Api::all_with(self.client.clone(), &ar),
        }
    }
}

fn api_resource(kind: ResourceKind) -> ApiResource {
    match kind {
        ResourceKind::Namespace => ApiResource::erase::<Namespace>(&()),
        ResourceKind::Secret => ApiResource::erase::<Secret>(&()),
        ResourceKind::ServiceAccount => ApiResource::erase::<ServiceAccount>(&()),
        ResourceKind::ClusterRoleBinding => ApiResource::erase::<ClusterRoleBinding>(&()),
        ResourceKind::Job => ApiResource::erase::<Job>(&()),
        ResourceKind::Deployment => ApiResource::erase::<Deployment>(&()),
        ResourceKind::Pod => ApiResource::erase::<Pod>(&()),
        ResourceKind::KnativeServing => ApiResource::erase::<KnativeServing>(&()),
    }
}

#[async_trait]
impl ClusterApi for KubeCluster {
    #[instrument(skip(self), fields(resource = %resource))]
    async fn get_resource(&self, resource: &ResourceRef) -> Result<Option<Value>> {
        let api = self.api(resource.kind, resource.namespace.as_deref());
        match api.get_opt(&resource.name).await? {
            Some(obj) => Ok(Some(serde_json::to_value(obj)?)),
            None => Ok(None),
        }
    }

    async fn list_resources(
        &self,
        kind: ResourceKind,
        namespace: Option<&str>,
    ) -> Result<Vec<Value>> {
        let api = self.api(kind, namespace);
        let list = api.list(&ListParams::default()).await?;
        let ar = api_resource(kind);
        // list items come back without their type information
        list.items
            .into_iter()
            .map(|mut obj| {
                obj.types.get_or_insert_with(|| TypeMeta {
                    api_version: ar.api_version.clone(),
                    kind: ar.kind.clone(),
                });
                serde_json::to_value(obj).map_err(AirliftError::from)
            })
            .collect()
    }

    #[instrument(skip(self, spec))]
    async fn create_resource(&self, kind: ResourceKind, spec: &Value) -> Result<bool> {
        let obj: DynamicObject = serde_json::from_value(spec.clone())?;
        let api = self.api(kind, obj.metadata.namespace.as_deref());
        match api.create(&PostParams::default(), &obj).await {
            Ok(_) => {
                info!("Created {} {}", kind, obj.name_any());
                Ok(true)
            }
            Err(e) if is_conflict(&e) => {
                debug!("{} {} already exists", kind, obj.name_any());
                Ok(false)
            }
            Err(e) => Err(e.into()),
        }
    }

    #[instrument(skip(self, merge_patch), fields(resource = %resource))]
    async fn patch_resource(&self, resource: &ResourceRef, merge_patch: &Value) -> Result<()> {
        let api = self.api(resource.kind, resource.namespace.as_deref());
        api.patch(&resource.name, &PatchParams::default(), &Patch::Merge(merge_patch))
            .await?;
        Ok(())
    }

    #[instrument(skip(self), fields(resource = %resource))]
    async fn delete_resource(&self, resource: &ResourceRef) -> Result<bool> {
        let api = self.api(resource.kind, resource.namespace.as_deref());
        let Some(existing) = api.get_opt(&resource.name).await? else {
            debug!("{} already gone", resource);
            return Ok(false);
        };

        api.delete(&resource.name, &DeleteParams::background()).await?;

        let Some(uid) = existing.uid() else {
            return Ok(true);
        };
        let gone = await_condition(api, &resource.name, conditions::is_deleted(&uid));
        match tokio::time::timeout(self.delete_timeout, gone).await {
            Ok(Ok(_)) => {
                info!("Deleted {}", resource);
                Ok(true)
            }
            Ok(Err(e)) => Err(AirliftError::Transient(format!(
                "watching deletion of {} failed: {}",
                resource, e
            ))),
            Err(_) => Err(AirliftError::Transient(format!(
                "{} still terminating after {}s",
                resource,
                self.delete_timeout.as_secs()
            ))),
        }
    }

    #[instrument(skip(self, yaml))]
    async fn apply_manifest(&self, yaml: &str) -> Result<usize> {
        let objects = parse_manifest(yaml)?;
        let params = PatchParams::apply(FIELD_MANAGER).force();

        for obj in &objects {
            let types = obj.types.as_ref().ok_or_else(|| {
                AirliftError::Unrecoverable(format!("{} has no apiVersion/kind", obj.name_any()))
            })?;
            let gvk = GroupVersionKind::try_from(types).map_err(|e| {
                AirliftError::Unrecoverable(format!("invalid apiVersion in manifest: {}", e))
            })?;
            let (ar, caps) = pinned_kind(&self.client, &gvk).await?;
            let api: Api<DynamicObject> = match caps.scope {
                Scope::Namespaced => {
                    let ns = obj.namespace().unwrap_or_else(|| "default".to_string());
                    Api::namespaced_with(self.client.clone(), &ns, &ar)
                }
                Scope::Cluster => Api::all_with(self.client.clone(), &ar),
            };
            let name = obj.name_any();
            api.patch(&name, &params, &Patch::Apply(obj)).await?;
            info!("Applied {} {}", gvk.kind, name);
        }

        Ok(objects.len())
    }

    #[instrument(skip(self))]
    async fn restart_workloads(&self, namespace: &str) -> Result<usize> {
        let deployments: Api<Deployment> = Api::namespaced(self.client.clone(), namespace);
        let list = deployments.list(&ListParams::default()).await?;
        let patch = restart_patch(SystemTime::now());

        let mut restarted = 0;
        let mut failure: Option<AirliftError> = None;
        for deployment in &list.items {
            let name = deployment.name_any();
            match deployments
                .patch(&name, &PatchParams::default(), &Patch::Merge(&patch))
                .await
            {
                Ok(_) => restarted += 1,
                Err(e) => {
                    warn!("Failed to restart deployment {}/{}: {}", namespace, name, e);
                    let e = AirliftError::from(e);
                    // report the first permanent failure over any transient one
                    if failure.as_ref().map_or(true, |f| f.is_transient() && !e.is_transient()) {
                        failure = Some(e);
                    }
                }
            }
        }

        if let Some(e) = failure {
            return Err(e);
        }
        info!("Restarted {} deployments in {}", restarted, namespace);
        Ok(restarted)
    }
}

/// Merge patch that bumps the pod template restart annotation
fn restart_patch(now: SystemTime) -> Value {
    let stamp = now
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or_default();
    let mut template_annotations = serde_json::Map::new();
    template_annotations.insert(annotations::RESTARTED_AT.to_string(), json!(stamp.to_string()));
    json!({
        "spec": {
            "template": {
                "metadata": { "annotations": template_annotations }
            }
        }
    })
}
