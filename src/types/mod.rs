// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! Data model shared by the reconcile stages.

pub mod image;
pub mod knative_serving;
pub mod resource;
pub mod target;

pub use image::{ImageMapping, ImageReference};
pub use knative_serving::KnativeServing;
pub use resource::{ResourceKind, ResourceRef};
pub use target::{ReconcileTarget, TargetKind};
