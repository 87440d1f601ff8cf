// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! External tool collaborators: the container engine and the chart installer.

pub mod container;
pub mod helm;
pub mod process;

use crate::error::Result;
use crate::types::ImageReference;
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;

pub use container::{CliEngine, EngineKind};
pub use helm::HelmCli;

/// Registry credentials. The password never shows up in `Debug` output.
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// Container engine operations used to move images across the air gap
#[async_trait]
pub trait ContainerEngine: Send + Sync {
    async fn pull(&self, image: &ImageReference) -> Result<()>;

    /// Save several local images into one engine-native archive
    async fn save(&self, images: &[ImageReference], archive: &Path) -> Result<()>;

    /// Load every image of an archive into the local store
    async fn load(&self, archive: &Path) -> Result<()>;

    async fn tag(&self, source: &ImageReference, destination: &ImageReference) -> Result<()>;

    async fn push(&self, image: &ImageReference) -> Result<()>;

    /// Whether the reference resolves in its registry (a metadata-only check)
    async fn image_exists(&self, image: &ImageReference) -> Result<bool>;

    async fn login(&self, registry: &str, credentials: &Credentials) -> Result<()>;
}

/// Chart installation. Installs are synchronous from the caller's view.
#[async_trait]
pub trait ChartInstaller: Send + Sync {
    async fn install_or_upgrade(
        &self,
        release: &str,
        chart: &Path,
        namespace: &str,
        values: &BTreeMap<String, String>,
    ) -> Result<()>;

    /// Remove a release. Returns `false` when it was not installed.
    async fn uninstall(&self, release: &str, namespace: &str) -> Result<bool>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_credentials_debug_redacts_password() {
        let creds = Credentials {
            username: "admin".to_string(),
            password: "hunter2".to_string(),
        };
        let printed = format!("{:?}", creds);
        assert!(printed.contains("admin"));
        assert!(!printed.contains("hunter2"));
    }
}
