// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! Readiness predicates for the Knative install stages.

use crate::constants::FATAL_WAITING_REASONS;
use crate::error::Result;
use crate::kubernetes::ClusterApi;
use crate::reconcile::{ProbeResult, Readiness, ReadinessProbe};
use crate::types::{KnativeServing, ResourceKind, ResourceRef};
use async_trait::async_trait;
use k8s_openapi::api::apps::v1::Deployment;
use k8s_openapi::api::core::v1::Pod;
use kube::ResourceExt;
use serde::de::DeserializeOwned;
use serde_json::{json, Value};
use std::sync::Arc;

fn typed<K: DeserializeOwned>(items: Vec<Value>) -> Result<Vec<K>> {
    items
        .into_iter()
        .map(|item| serde_json::from_value(item).map_err(Into::into))
        .collect()
}

/// First container stuck on a waiting reason that will never clear
fn fatal_reason(pod: &Pod) -> Option<String> {
    let status = pod.status.as_ref()?;
    status
        .init_container_statuses
        .iter()
        .flatten()
        .chain(status.container_statuses.iter().flatten())
        .find_map(|cs| {
            let waiting = cs.state.as_ref()?.waiting.as_ref()?;
            let reason = waiting.reason.as_deref()?;
            FATAL_WAITING_REASONS.contains(&reason).then(|| {
                format!(
                    "pod {}/{} container {}: {}",
                    pod.namespace().unwrap_or_default(),
                    pod.name_any(),
                    cs.name,
                    reason
                )
            })
        })
}

fn pod_is_ready(pod: &Pod) -> bool {
    let Some(status) = pod.status.as_ref() else {
        return false;
    };
    match status.phase.as_deref() {
        Some("Succeeded") => true,
        Some("Running") => status
            .conditions
            .iter()
            .flatten()
            .any(|c| c.type_ == "Ready" && c.status == "True"),
        _ => false,
    }
}

fn pod_summary(pod: &Pod) -> Value {
    let status = pod.status.as_ref();
    let waiting: Vec<Value> = status
        .and_then(|s| s.container_statuses.as_ref())
        .into_iter()
        .flatten()
        .filter_map(|cs| {
            let waiting = cs.state.as_ref()?.waiting.as_ref()?;
            Some(json!({
                "container": cs.name,
                "reason": waiting.reason,
                "message": waiting.message,
            }))
        })
        .collect();
    json!({
        "namespace": pod.namespace(),
        "name": pod.name_any(),
        "phase": status.and_then(|s| s.phase.clone()),
        "waiting": waiting,
    })
}

async fn list_pods(cluster: &dyn ClusterApi, namespace: &str) -> Result<Vec<Pod>> {
    typed(cluster.list_resources(ResourceKind::Pod, Some(namespace)).await?)
}

/// Every deployment in a namespace reports `Available=True`
pub struct DeploymentsAvailable {
    cluster: Arc<dyn ClusterApi>,
    namespace: String,
}

impl DeploymentsAvailable {
    pub fn new(cluster: Arc<dyn ClusterApi>, namespace: &str) -> Self {
        Self {
            cluster,
            namespace: namespace.to_string(),
        }
    }
}

fn is_available(deployment: &Deployment) -> bool {
    deployment
        .status
        .as_ref()
        .and_then(|s| s.conditions.as_ref())
        .is_some_and(|conditions| {
            conditions
                .iter()
                .any(|c| c.type_ == "Available" && c.status == "True")
        })
}

#[async_trait]
impl ReadinessProbe for DeploymentsAvailable {
    fn describe(&self) -> String {
        format!("deployments in {}", self.namespace)
    }

    async fn probe(&self) -> Result<ProbeResult> {
        let deployments: Vec<Deployment> = typed(
            self.cluster
                .list_resources(ResourceKind::Deployment, Some(&self.namespace))
                .await?,
        )?;
        let pods = list_pods(self.cluster.as_ref(), &self.namespace).await?;

        let unavailable: Vec<Value> = deployments
            .iter()
            .filter(|d| !is_available(d))
            .map(|d| {
                let status = d.status.as_ref();
                json!({
                    "name": d.name_any(),
                    "replicas": status.and_then(|s| s.replicas),
                    "readyReplicas": status.and_then(|s| s.ready_replicas),
                })
            })
            .collect();
        let snapshot = json!({
            "namespace": self.namespace,
            "deployments": deployments.len(),
            "unavailable": unavailable,
            "pods": pods.iter().filter(|p| !pod_is_ready(p)).map(pod_summary).collect::<Vec<_>>(),
        });

        let readiness = if let Some(reason) = pods.iter().find_map(fatal_reason) {
            Readiness::Error(reason)
        } else if !deployments.is_empty() && unavailable.is_empty() {
            Readiness::Ready
        } else {
            Readiness::Pending
        };
        Ok(ProbeResult::new(readiness, snapshot))
    }
}

/// The KnativeServing resource reports `Ready=True`
pub struct ServingReady {
    cluster: Arc<dyn ClusterApi>,
    resource: ResourceRef,
}

impl ServingReady {
    pub fn new(cluster: Arc<dyn ClusterApi>, namespace: &str, name: &str) -> Self {
        Self {
            cluster,
            resource: ResourceRef::namespaced(ResourceKind::KnativeServing, namespace, name),
        }
    }
}

#[async_trait]
impl ReadinessProbe for ServingReady {
    fn describe(&self) -> String {
        self.resource.to_string()
    }

    async fn probe(&self) -> Result<ProbeResult> {
        let namespace = self.resource.namespace.as_deref().unwrap_or_default();
        let pods = list_pods(self.cluster.as_ref(), namespace).await?;
        let not_ready: Vec<Value> = pods
            .iter()
            .filter(|p| !pod_is_ready(p))
            .map(pod_summary)
            .collect();

        let Some(state) = self.cluster.get_resource(&self.resource).await? else {
            return Ok(ProbeResult::new(
                Readiness::Pending,
                json!({ "resource": self.resource.to_string(), "exists": false, "pods": not_ready }),
            ));
        };
        let serving: KnativeServing = serde_json::from_value(state)?;

        let snapshot = json!({
            "resource": self.resource.to_string(),
            "exists": true,
            "status": serving.status,
            "unmet": serving.unmet_conditions(),
            "pods": not_ready,
        });
        let readiness = if let Some(reason) = pods.iter().find_map(fatal_reason) {
            Readiness::Error(reason)
        } else if serving.is_ready() {
            Readiness::Ready
        } else {
            Readiness::Pending
        };
        Ok(ProbeResult::new(readiness, snapshot))
    }
}

/// Every pod in a set of namespaces is Running and Ready, or Succeeded
pub struct PodsReady {
    cluster: Arc<dyn ClusterApi>,
    namespaces: Vec<String>,
}

impl PodsReady {
    pub fn new(cluster: Arc<dyn ClusterApi>, namespaces: Vec<String>) -> Self {
        Self {
            cluster,
            namespaces,
        }
    }
}

#[async_trait]
impl ReadinessProbe for PodsReady {
    fn describe(&self) -> String {
        format!("pods in {}", self.namespaces.join(", "))
    }

    async fn probe(&self) -> Result<ProbeResult> {
        let mut pods = Vec::new();
        for namespace in &self.namespaces {
            pods.extend(list_pods(self.cluster.as_ref(), namespace).await?);
        }

        let not_ready: Vec<&Pod> = pods.iter().filter(|p| !pod_is_ready(p)).collect();
        let snapshot = json!({
            "namespaces": self.namespaces,
            "pods": pods.len(),
            "notReady": not_ready.iter().map(|p| pod_summary(p)).collect::<Vec<_>>(),
        });

        let readiness = if let Some(reason) = pods.iter().find_map(fatal_reason) {
            Readiness::Error(reason)
        } else if !pods.is_empty() && not_ready.is_empty() {
            Readiness::Ready
        } else {
            Readiness::Pending
        };
        Ok(ProbeResult::new(readiness, snapshot))
    }
}
