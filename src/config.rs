// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0
use crate::constants::{env, polling};
use crate::engine::{Credentials, EngineKind};
use crate::error::AirliftError;
use crate::reconcile::SequencerSettings;
use crate::types::{ImageMapping, ImageReference};
use anyhow::{Context, Result};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Orchestrator configuration, loaded from a YAML file and a few environment
/// overrides. Registry credentials only ever come from the environment.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Config {
    /// Private registry location, `host[:port][/prefix]`
    pub private_registry_url: String,
    #[serde(default)]
    pub insecure_registry: bool,
    #[serde(default)]
    pub engine: EngineKind,
    pub images: Vec<ImageEntry>,
    #[serde(default = "default_archive")]
    pub image_archive: PathBuf,
    #[serde(default = "default_pull_secret")]
    pub pull_secret_name: String,
    #[serde(default = "default_knative_marker")]
    pub knative_version_file: PathBuf,
    #[serde(default = "default_envoy_marker")]
    pub envoy_version_file: PathBuf,
    /// Versions written into the markers by `prepare`
    #[serde(default)]
    pub knative_version: Option<String>,
    #[serde(default)]
    pub envoy_version: Option<String>,
    pub operator: OperatorConfig,
    pub serving: ServingConfig,
    #[serde(default)]
    pub verify: VerifyConfig,
    #[serde(default)]
    pub patch: PatchConfig,
    #[serde(default)]
    pub continue_on_timeout: bool,
    #[serde(default = "default_push_concurrency")]
    pub push_concurrency: usize,
    #[serde(default = "default_helm")]
    pub helm_binary: String,
    #[serde(skip)]
    pub credentials: Option<Credentials>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ImageEntry {
    pub source: ImageReference,
    #[serde(default)]
    pub destination: Option<ImageReference>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OperatorConfig {
    pub chart: PathBuf,
    #[serde(default = "default_operator_name")]
    pub release: String,
    #[serde(default = "default_operator_name")]
    pub namespace: String,
    /// Helm `--set` overrides; values may use manifest placeholders
    #[serde(default)]
    pub values: BTreeMap<String, String>,
    #[serde(default = "default_operator_accounts")]
    pub service_accounts: Vec<String>,
    #[serde(default)]
    pub cluster_role_bindings: Vec<BindingConfig>,
    #[serde(default)]
    pub wait: WaitConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BindingConfig {
    pub name: String,
    pub cluster_role: String,
    pub service_account: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServingConfig {
    /// KnativeServing manifest template
    pub manifest: PathBuf,
    #[serde(default = "default_serving_name")]
    pub namespace: String,
    /// Name of the KnativeServing resource
    #[serde(default = "default_serving_name")]
    pub name: String,
    #[serde(default = "default_serving_accounts")]
    pub service_accounts: Vec<String>,
    #[serde(default = "default_migration_job")]
    pub migration_job: String,
    /// Further namespaces that get the pull secret and are verified, e.g. the ingress
    #[serde(default)]
    pub extra_namespaces: Vec<String>,
    #[serde(default)]
    pub wait: WaitConfig,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VerifyConfig {
    #[serde(default)]
    pub wait: WaitConfig,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WaitConfig {
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,
    #[serde(default = "default_interval")]
    pub interval_secs: u64,
}

impl Default for WaitConfig {
    fn default() -> Self {
        Self {
            timeout_secs: polling::TIMEOUT_SECS,
            interval_secs: polling::INTERVAL_SECS,
        }
    }
}

impl WaitConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PatchConfig {
    #[serde(default = "default_patch_attempts")]
    pub attempts: u32,
    #[serde(default = "default_patch_backoff")]
    pub backoff_secs: u64,
    #[serde(default = "default_patch_max_backoff")]
    pub max_backoff_secs: u64,
}

impl Default for PatchConfig {
    fn default() -> Self {
        Self {
            attempts: polling::PATCH_ATTEMPTS,
            backoff_secs: polling::PATCH_BACKOFF_SECS,
            max_backoff_secs: polling::PATCH_MAX_BACKOFF_SECS,
        }
    }
}

fn default_archive() -> PathBuf {
    PathBuf::from("images.tar")
}
fn default_pull_secret() -> String {
    "airgap-registry".to_string()
}
fn default_knative_marker() -> PathBuf {
    PathBuf::from("knative-version")
}
fn default_envoy_marker() -> PathBuf {
    PathBuf::from("envoy-version")
}
fn default_push_concurrency() -> usize {
    1
}
fn default_helm() -> String {
    "helm".to_string()
}
fn default_operator_name() -> String {
    "knative-operator".to_string()
}
fn default_serving_name() -> String {
    "knative-serving".to_string()
}
fn default_migration_job() -> String {
    "storage-version-migration-serving".to_string()
}
fn default_operator_accounts() -> Vec<String> {
    ["knative-operator", "operator-webhook", "default"]
        .map(String::from)
        .to_vec()
}
fn default_serving_accounts() -> Vec<String> {
    ["controller", "default"].map(String::from).to_vec()
}
fn default_timeout() -> u64 {
    polling::TIMEOUT_SECS
}
fn default_interval() -> u64 {
    polling::INTERVAL_SECS
}
fn default_patch_attempts() -> u32 {
    polling::PATCH_ATTEMPTS
}
fn default_patch_backoff() -> u64 {
    polling::PATCH_BACKOFF_SECS
}
fn default_patch_max_backoff() -> u64 {
    polling::PATCH_MAX_BACKOFF_SECS
}

impl Config {
    /// Load the YAML file at `path` and apply the process environment
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config file {}", path.display()))?;
        let mut config = Self::from_yaml(&content)
            .with_context(|| format!("invalid config file {}", path.display()))?;
        config.apply_overrides(|key| std::env::var(key).ok())?;
        let base = path.parent().unwrap_or_else(|| Path::new("."));
        config.resolve_paths(base);
        Ok(config)
    }

    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let config: Config = serde_yaml::from_str(yaml).context("failed to parse config")?;
        Ok(config)
    }

    /// Apply environment overrides through `lookup`
    pub fn apply_overrides<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        let set = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(url) = set(env::PRIVATE_REGISTRY_URL) {
            self.private_registry_url = url;
        }
        if let Some(engine) = set(env::CONTAINER_ENGINE) {
            self.engine = engine
                .parse()
                .with_context(|| format!("invalid {}", env::CONTAINER_ENGINE))?;
        }
        if let Some(file) = set(env::KNATIVE_VERSION_FILE) {
            self.knative_version_file = PathBuf::from(file);
        }
        match (set(env::REGISTRY_USERNAME), set(env::REGISTRY_PASSWORD)) {
            (Some(username), Some(password)) => {
                self.credentials = Some(Credentials { username, password })
            }
            (None, None) => {}
            _ => {
                return Err(AirliftError::ConfigError(format!(
                    "{} and {} must be set together",
                    env::REGISTRY_USERNAME,
                    env::REGISTRY_PASSWORD
                ))
                .into())
            }
        }
        Ok(())
    }

    fn resolve_paths(&mut self, base: &Path) {
        let resolve = |p: &mut PathBuf| {
            if p.is_relative() {
                *p = base.join(&*p);
            }
        };
        resolve(&mut self.image_archive);
        resolve(&mut self.knative_version_file);
        resolve(&mut self.envoy_version_file);
        resolve(&mut self.operator.chart);
        resolve(&mut self.serving.manifest);
    }

    /// Registry location without scheme or trailing slash
    pub fn registry_location(&self) -> &str {
        let url = self.private_registry_url.trim();
        let url = url
            .strip_prefix("https://")
            .or_else(|| url.strip_prefix("http://"))
            .unwrap_or(url);
        url.trim_end_matches('/')
    }

    /// Registry host (and port), as used for logins and pull secrets
    pub fn registry_host(&self) -> &str {
        let location = self.registry_location();
        location.split('/').next().unwrap_or(location)
    }

    /// Build the image mappings, checking the private-registry invariants
    pub fn mappings(&self) -> crate::error::Result<Vec<ImageMapping>> {
        let registry = self.registry_location();
        if registry.is_empty() {
            return Err(AirliftError::ConfigError(format!(
                "privateRegistryUrl (or {}) is required",
                env::PRIVATE_REGISTRY_URL
            )));
        }
        self.images
            .iter()
            .map(|entry| match &entry.destination {
                Some(destination) => {
                    ImageMapping::new(entry.source.clone(), destination.clone(), registry)
                }
                None => ImageMapping::derive(entry.source.clone(), registry),
            })
            .collect()
    }

    /// Destination repositories (registry-relative), in configuration order
    pub fn destination_repositories(&self) -> crate::error::Result<Vec<String>> {
        let mut repositories: Vec<String> = Vec::new();
        for mapping in self.mappings()? {
            let repository = mapping.destination().repository.clone();
            if !repositories.contains(&repository) {
                repositories.push(repository);
            }
        }
        Ok(repositories)
    }

    pub fn sequencer_settings(&self) -> SequencerSettings {
        SequencerSettings {
            patch_attempts: self.patch.attempts,
            patch_backoff: Duration::from_secs(self.patch.backoff_secs),
            patch_max_backoff: Duration::from_secs(self.patch.max_backoff_secs),
            continue_on_timeout: self.continue_on_timeout,
        }
    }

    /// Fail before any side effect when a required file is missing
    pub fn require_file(path: &Path, what: &str) -> crate::error::Result<()> {
        if path.is_file() {
            Ok(())
        } else {
            Err(AirliftError::ConfigError(format!(
                "{} {} does not exist",
                what,
                path.display()
            )))
        }
    }
}
