// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0
pub mod migration;
pub mod pipeline;
pub mod probes;
pub mod uninstall;

pub use migration::MissingEnvRule;
pub use pipeline::Pipeline;
pub use probes::{DeploymentsAvailable, PodsReady, ServingReady};
pub use uninstall::{uninstall, UninstallReport};
