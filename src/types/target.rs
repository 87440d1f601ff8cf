// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! Declarative descriptions of cluster state a stage wants converged.

use crate::error::Result;
use crate::types::resource::{ResourceKind, ResourceRef};
use k8s_openapi::api::core::v1::{Namespace, Secret};
use k8s_openapi::api::rbac::v1::{ClusterRoleBinding, RoleRef, Subject};
use k8s_openapi::ByteString;
use kube::api::ObjectMeta;
use serde_json::{json, Value};
use std::collections::BTreeMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TargetKind {
    Namespace,
    Secret,
    ServiceAccountPatch,
    ClusterRoleBinding,
}

/// Desired state for one resource. `desired` is the full object for
/// Namespace, Secret and ClusterRoleBinding, and a merge patch for
/// ServiceAccountPatch.
#[derive(Debug, Clone, PartialEq)]
pub struct ReconcileTarget {
    pub kind: TargetKind,
    pub name: String,
    pub namespace: Option<String>,
    pub desired: Value,
}

impl ReconcileTarget {
    pub fn namespace(name: &str) -> Result<Self> {
        let ns = Namespace {
            metadata: ObjectMeta {
                name: Some(name.to_string()),
                ..Default::default()
            },
            ..Default::default()
        };
        Ok(Self {
            kind: TargetKind::Namespace,
            name: name.to_string(),
            namespace: None,
            desired: serde_json::to_value(ns)?,
        })
    }

    /// A `kubernetes.io/dockerconfigjson` secret for the private registry
    pub fn pull_secret(
        namespace: &str,
        name: &str,
        registry_host: &str,
        username: &str,
        password: &str,
    ) -> Result<Self> {
        let mut auths = serde_json::Map::new();
        auths.insert(
            registry_host.to_string(),
            json!({ "username": username, "password": password }),
        );
        let docker_config = json!({ "auths": auths });
        let secret = Secret {
            metadata: ObjectMeta {
                name: Some(name.to_string()),
                namespace: Some(namespace.to_string()),
                ..Default::default()
            },
            type_: Some("kubernetes.io/dockerconfigjson".to_string()),
            data: Some(BTreeMap::from([(
                ".dockerconfigjson".to_string(),
                ByteString(serde_json::to_vec(&docker_config)?),
            )])),
            ..Default::default()
        };
        Ok(Self {
            kind: TargetKind::Secret,
            name: name.to_string(),
            namespace: Some(namespace.to_string()),
            desired: serde_json::to_value(secret)?,
        })
    }

    /// Add `secret` to the image pull secrets of a service account
    pub fn service_account_pull_secret(namespace: &str, account: &str, secret: &str) -> Self {
        Self {
            kind: TargetKind::ServiceAccountPatch,
            name: account.to_string(),
            namespace: Some(namespace.to_string()),
            desired: json!({ "imagePullSecrets": [{ "name": secret }] }),
        }
    }

    /// Bind a cluster role to a service account
    pub fn cluster_role_binding(
        name: &str,
        cluster_role: &str,
        account_namespace: &str,
        account: &str,
    ) -> Result<Self> {
        let binding = ClusterRoleBinding {
            metadata: ObjectMeta {
                name: Some(name.to_string()),
                ..Default::default()
            },
            role_ref: RoleRef {
                api_group: "rbac.authorization.k8s.io".to_string(),
                kind: "ClusterRole".to_string(),
                name: cluster_role.to_string(),
            },
            subjects: Some(vec![Subject {
                kind: "ServiceAccount".to_string(),
                name: account.to_string(),
                namespace: Some(account_namespace.to_string()),
                ..Default::default()
            }]),
        };
        Ok(Self {
            kind: TargetKind::ClusterRoleBinding,
            name: name.to_string(),
            namespace: None,
            desired: serde_json::to_value(binding)?,
        })
    }

    /// The live resource this target converges
    pub fn resource_ref(&self) -> ResourceRef {
        let kind = match self.kind {
            TargetKind::Namespace => ResourceKind::Namespace,
            TargetKind::Secret => ResourceKind::Secret,
            TargetKind::ServiceAccountPatch => ResourceKind::ServiceAccount,
            TargetKind::ClusterRoleBinding => ResourceKind::ClusterRoleBinding,
        };
        ResourceRef {
            kind,
            name: self.name.clone(),
            namespace: self.namespace.clone(),
        }
    }
}
