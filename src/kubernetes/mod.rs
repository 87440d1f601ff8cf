// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! Kubernetes utilities for resource access and manifest handling.

pub mod cluster;
pub mod manifest;

pub use cluster::{ClusterApi, KubeCluster};
pub use manifest::{parse_manifest, render_template, TemplateVars};
