// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! Helm CLI implementation of [`ChartInstaller`].

use crate::engine::process::{self, args};
use crate::engine::ChartInstaller;
use crate::error::{AirliftError, Result};
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::path::Path;
use tracing::{info, instrument};

#[derive(Debug, Clone)]
pub struct HelmCli {
    binary: String,
}

impl HelmCli {
    pub fn new(binary: impl Into<String>) -> Self {
        Self {
            binary: binary.into(),
        }
    }

    fn install_args(
        release: &str,
        chart: &Path,
        namespace: &str,
        values: &BTreeMap<String, String>,
    ) -> Vec<String> {
        let mut a = args([
            "upgrade".to_string(),
            "--install".to_string(),
            release.to_string(),
            chart.display().to_string(),
            "--namespace".to_string(),
            namespace.to_string(),
        ]);
        for (key, value) in values {
            a.push("--set".to_string());
            a.push(format!("{}={}", key, escape_set_value(value)));
        }
        a
    }
}

impl Default for HelmCli {
    fn default() -> Self {
        Self::new("helm")
    }
}

/// `--set` splits on commas; escape them so image lists survive intact
fn escape_set_value(value: &str) -> String {
    value.replace(',', "\\,")
}

#[async_trait]
impl ChartInstaller for HelmCli {
    #[instrument(skip(self, values))]
    async fn install_or_upgrade(
        &self,
        release: &str,
        chart: &Path,
        namespace: &str,
        values: &BTreeMap<String, String>,
    ) -> Result<()> {
        if !chart.exists() {
            return Err(AirliftError::ConfigError(format!(
                "chart archive {} does not exist",
                chart.display()
            )));
        }
        let a = Self::install_args(release, chart, namespace, values);
        process::run_checked(&self.binary, &a, None).await?;
        info!("Release {} installed in {}", release, namespace);
        Ok(())
    }

    #[instrument(skip(self))]
    async fn uninstall(&self, release: &str, namespace: &str) -> Result<bool> {
        let a = args(["uninstall", release, "--namespace", namespace]);
        let output = process::run(&self.binary, &a, None).await?;
        if output.success {
            info!("Release {} uninstalled from {}", release, namespace);
            return Ok(true);
        }
        if output.stderr.contains("not found") {
            info!("Release {} not installed in {}", release, namespace);
            return Ok(false);
        }
        Err(AirliftError::CommandFailed {
            program: self.binary.clone(),
            args: a.join(" "),
            status: output.status,
            stderr: output.stderr,
        })
    }
}
