// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! Docker/Podman CLI implementation of [`ContainerEngine`].

use crate::engine::process::{self, args};
use crate::engine::{ContainerEngine, Credentials};
use crate::error::{AirliftError, Result};
use crate::types::ImageReference;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::str::FromStr;
use tracing::{debug, info, instrument};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EngineKind {
    #[default]
    Docker,
    Podman,
}

impl EngineKind {
    pub fn program(&self) -> &'static str {
        match self {
            EngineKind::Docker => "docker",
            EngineKind::Podman => "podman",
        }
    }
}

impl FromStr for EngineKind {
    type Err = AirliftError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "docker" => Ok(EngineKind::Docker),
            "podman" => Ok(EngineKind::Podman),
            other => Err(AirliftError::ConfigError(format!(
                "unsupported container engine '{}', expected docker or podman",
                other
            ))),
        }
    }
}

/// Shells out to the docker or podman binary
#[derive(Debug, Clone)]
pub struct CliEngine {
    kind: EngineKind,
    insecure_registry: bool,
}

impl CliEngine {
    pub fn new(kind: EngineKind, insecure_registry: bool) -> Self {
        Self {
            kind,
            insecure_registry,
        }
    }

    /// Flags that relax TLS verification against the private registry
    fn tls_flags(&self) -> Vec<String> {
        match (self.kind, self.insecure_registry) {
            (EngineKind::Podman, true) => args(["--tls-verify=false"]),
            _ => Vec::new(),
        }
    }

    fn manifest_inspect_args(&self, image: &ImageReference) -> Vec<String> {
        let mut a = args(["manifest", "inspect"]);
        match (self.kind, self.insecure_registry) {
            (EngineKind::Docker, true) => a.push("--insecure".to_string()),
            (EngineKind::Podman, true) => a.extend(self.tls_flags()),
            _ => {}
        }
        a.push(image.to_string());
        a
    }

    fn push_args(&self, image: &ImageReference) -> Vec<String> {
        let mut a = args(["push"]);
        a.extend(self.tls_flags());
        a.push(image.to_string());
        a
    }

    fn save_args(&self, images: &[ImageReference], archive: &Path) -> Vec<String> {
        let mut a = args(["save"]);
        if self.kind == EngineKind::Podman {
            a.push("--multi-image-archive".to_string());
        }
        a.push("-o".to_string());
        a.push(archive.display().to_string());
        a.extend(images.iter().map(ToString::to_string));
        a
    }

    fn login_args(&self, registry: &str, username: &str) -> Vec<String> {
        let mut a = args(["login"]);
        a.extend(self.tls_flags());
        a.extend(args(["--username", username, "--password-stdin", registry]));
        a
    }
}

#[async_trait]
impl ContainerEngine for CliEngine {
    #[instrument(skip(self), fields(image = %image))]
    async fn pull(&self, image: &ImageReference) -> Result<()> {
        process::run_checked(self.kind.program(), &args(["pull".to_string(), image.to_string()]), None)
            .await?;
        info!("Pulled {}", image);
        Ok(())
    }

    #[instrument(skip(self, images), fields(count = images.len()))]
    async fn save(&self, images: &[ImageReference], archive: &Path) -> Result<()> {
        process::run_checked(self.kind.program(), &self.save_args(images, archive), None).await?;
        info!("Saved {} images to {}", images.len(), archive.display());
        Ok(())
    }

    #[instrument(skip(self))]
    async fn load(&self, archive: &Path) -> Result<()> {
        let a = args(["load".to_string(), "-i".to_string(), archive.display().to_string()]);
        process::run_checked(self.kind.program(), &a, None).await?;
        info!("Loaded image archive {}", archive.display());
        Ok(())
    }

    async fn tag(&self, source: &ImageReference, destination: &ImageReference) -> Result<()> {
        let a = args(["tag".to_string(), source.to_string(), destination.to_string()]);
        process::run_checked(self.kind.program(), &a, None).await?;
        debug!("Tagged {} as {}", source, destination);
        Ok(())
    }

    #[instrument(skip(self), fields(image = %image))]
    async fn push(&self, image: &ImageReference) -> Result<()> {
        process::run_checked(self.kind.program(), &self.push_args(image), None).await?;
        info!("Pushed {}", image);
        Ok(())
    }

    async fn image_exists(&self, image: &ImageReference) -> Result<bool> {
        let a = self.manifest_inspect_args(image);
        let output = process::run(self.kind.program(), &a, None).await?;
        if output.success {
            return Ok(true);
        }

        let err = AirliftError::CommandFailed {
            program: self.kind.program().to_string(),
            args: a.join(" "),
            status: output.status,
            stderr: output.stderr,
        };
        if err.is_transient() {
            return Err(err);
        }
        debug!("{} not present: {}", image, err);
        Ok(false)
    }

    #[instrument(skip(self, credentials))]
    async fn login(&self, registry: &str, credentials: &Credentials) -> Result<()> {
        process::run_checked(
            self.kind.program(),
            &self.login_args(registry, &credentials.username),
            Some(&credentials.password),
        )
        .await?;
        info!("Logged in to {}", registry);
        Ok(())
    }
}
