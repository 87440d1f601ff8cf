// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! Repair for the storage-version-migration Job the Knative operator
//! generates without `SYSTEM_NAMESPACE`. The pod template of a Job is
//! immutable, so the fixed Job replaces the broken one.

use crate::constants::{GENERATED_JOB_LABELS, SYSTEM_NAMESPACE_ENV};
use crate::error::Result;
use crate::reconcile::RemediationRule;
use crate::types::{ResourceKind, ResourceRef};
use k8s_openapi::api::batch::v1::Job;
use k8s_openapi::api::core::v1::{Container, EnvVar, EnvVarSource, ObjectFieldSelector};
use serde_json::Value;
use std::collections::BTreeMap;

pub struct MissingEnvRule {
    job: ResourceRef,
}

impl MissingEnvRule {
    pub fn new(namespace: &str, job: &str) -> Self {
        Self {
            job: ResourceRef::namespaced(ResourceKind::Job, namespace, job),
        }
    }
}

fn parse(state: Option<&Value>) -> Option<Job> {
    serde_json::from_value(state?.clone()).ok()
}

fn containers(job: &Job) -> &[Container] {
    job.spec
        .as_ref()
        .and_then(|s| s.template.spec.as_ref())
        .map(|s| s.containers.as_slice())
        .unwrap_or_default()
}

fn has_env(container: &Container) -> bool {
    container
        .env
        .iter()
        .flatten()
        .any(|e| e.name == SYSTEM_NAMESPACE_ENV)
}

fn system_namespace_env() -> EnvVar {
    EnvVar {
        name: SYSTEM_NAMESPACE_ENV.to_string(),
        value_from: Some(EnvVarSource {
            field_ref: Some(ObjectFieldSelector {
                field_path: "metadata.namespace".to_string(),
                ..Default::default()
            }),
            ..Default::default()
        }),
        ..Default::default()
    }
}

fn strip_generated(labels: &mut Option<BTreeMap<String, String>>) {
    if let Some(map) = labels.as_mut() {
        map.retain(|k, _| !GENERATED_JOB_LABELS.contains(&k.as_str()));
        if map.is_empty() {
            *labels = None;
        }
    }
}

impl RemediationRule for MissingEnvRule {
    fn name(&self) -> &str {
        "system-namespace-env"
    }

    fn target(&self) -> ResourceRef {
        self.job.clone()
    }

    fn detect(&self, state: Option<&Value>) -> bool {
        parse(state).is_some_and(|job| containers(&job).iter().any(|c| !has_env(c)))
    }

    fn is_already_applied(&self, state: Option<&Value>) -> bool {
        parse(state).is_some_and(|job| {
            let containers = containers(&job);
            !containers.is_empty() && containers.iter().all(has_env)
        })
    }

    fn apply(&self, state: &Value) -> Result<Value> {
        let mut job: Job = serde_json::from_value(state.clone())?;

        // server-populated fields would be rejected on create
        let meta = &mut job.metadata;
        meta.uid = None;
        meta.resource_version = None;
        meta.creation_timestamp = None;
        meta.generation = None;
        meta.managed_fields = None;
        strip_generated(&mut meta.labels);
        job.status = None;

        if let Some(spec) = job.spec.as_mut() {
            spec.selector = None;
            spec.manual_selector = None;
            if let Some(template_meta) = spec.template.metadata.as_mut() {
                strip_generated(&mut template_meta.labels);
            }
            if let Some(pod) = spec.template.spec.as_mut() {
                for container in pod.containers.iter_mut().filter(|c| !has_env(c)) {
                    container
                        .env
                        .get_or_insert_with(Vec::new)
                        .push(system_namespace_env());
                }
            }
        }

        Ok(serde_json::to_value(job)?)
    }
}
