// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! Addressing for the cluster resources the orchestrator touches.

use std::fmt;

/// Kinds of cluster resources the orchestrator reads or writes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ResourceKind {
    Namespace,
    Secret,
    ServiceAccount,
    ClusterRoleBinding,
    Job,
    Deployment,
    Pod,
    KnativeServing,
}

impl ResourceKind {
    pub fn is_namespaced(&self) -> bool {
        !matches!(self, ResourceKind::Namespace | ResourceKind::ClusterRoleBinding)
    }

    /// Map an object's `kind` field back to a known kind
    pub fn from_kind(kind: &str) -> Option<Self> {
        [
            ResourceKind::Namespace,
            ResourceKind::Secret,
            ResourceKind::ServiceAccount,
            ResourceKind::ClusterRoleBinding,
            ResourceKind::Job,
            ResourceKind::Deployment,
            ResourceKind::Pod,
            ResourceKind::KnativeServing,
        ]
        .into_iter()
        .find(|k| k.as_str() == kind)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ResourceKind::Namespace => "Namespace",
            ResourceKind::Secret => "Secret",
            ResourceKind::ServiceAccount => "ServiceAccount",
            ResourceKind::ClusterRoleBinding => "ClusterRoleBinding",
            ResourceKind::Job => "Job",
            ResourceKind::Deployment => "Deployment",
            ResourceKind::Pod => "Pod",
            ResourceKind::KnativeServing => "KnativeServing",
        }
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A resource addressed by kind, name and (for namespaced kinds) namespace
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ResourceRef {
    pub kind: ResourceKind,
    pub name: String,
    pub namespace: Option<String>,
}

impl ResourceRef {
    pub fn cluster_scoped(kind: ResourceKind, name: &str) -> Self {
        Self {
            kind,
            name: name.to_string(),
            namespace: None,
        }
    }

    pub fn namespaced(kind: ResourceKind, namespace: &str, name: &str) -> Self {
        Self {
            kind,
            name: name.to_string(),
            namespace: Some(namespace.to_string()),
        }
    }
}

impl fmt::Display for ResourceRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.namespace {
            Some(ns) => write!(f, "{} {}/{}", self.kind, ns, self.name),
            None => write!(f, "{} {}", self.kind, self.name),
        }
    }
}
