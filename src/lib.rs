// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0
pub mod artifacts;
pub mod cancel;
pub mod commands;
pub mod config;
pub mod constants;
pub mod engine;
pub mod error;
pub mod knative;
pub mod kubernetes;
pub mod reconcile;
pub mod registry;
pub mod types;

#[cfg(test)]
pub mod test_utils;
