// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! The Knative install pipeline: operator, serving, verification.

use crate::config::{Config, WaitConfig};
use crate::engine::ChartInstaller;
use crate::error::{AirliftError, Result};
use crate::knative::migration::MissingEnvRule;
use crate::knative::probes::{DeploymentsAvailable, PodsReady, ServingReady};
use crate::kubernetes::{render_template, ClusterApi, TemplateVars};
use crate::reconcile::{
    HelmInstall, ManifestApply, ReadinessCheck, ReadinessProbe, Stage, WaitPhase,
};
use crate::types::ReconcileTarget;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::info;

pub const OPERATOR_STAGE: &str = "knative-operator";
pub const SERVING_STAGE: &str = "knative-serving";
pub const VERIFY_STAGE: &str = "verify";

pub struct Pipeline<'a> {
    pub config: &'a Config,
    pub cluster: Arc<dyn ClusterApi>,
    pub installer: Arc<dyn ChartInstaller>,
    pub vars: TemplateVars,
}

fn wait(probe: impl ReadinessProbe + 'static, config: &WaitConfig) -> ReadinessCheck {
    ReadinessCheck::new(Box::new(probe), config.timeout(), config.interval())
}

impl Pipeline<'_> {
    /// Build all three stages. Every input file is read here, so a missing
    /// chart or manifest fails before anything touches the cluster.
    pub fn stages(&self) -> Result<Vec<Stage>> {
        Ok(vec![self.operator_stage()?, self.serving_stage()?, self.verify_stage()])
    }

    /// Namespace plus, when credentials are configured, the pull secret
    fn namespace_targets(&self, namespace: &str) -> Result<Vec<ReconcileTarget>> {
        let mut targets = vec![ReconcileTarget::namespace(namespace)?];
        if let Some(credentials) = &self.config.credentials {
            targets.push(ReconcileTarget::pull_secret(
                namespace,
                &self.config.pull_secret_name,
                self.config.registry_host(),
                &credentials.username,
                &credentials.password,
            )?);
        }
        Ok(targets)
    }

    fn account_patches(&self, namespace: &str, accounts: &[String]) -> Vec<ReconcileTarget> {
        if self.config.credentials.is_none() {
            return Vec::new();
        }
        accounts
            .iter()
            .map(|account| {
                ReconcileTarget::service_account_pull_secret(
                    namespace,
                    account,
                    &self.config.pull_secret_name,
                )
            })
            .collect()
    }

    fn operator_stage(&self) -> Result<Stage> {
        let operator = &self.config.operator;
        Config::require_file(&operator.chart, "operator chart")?;

        let values: BTreeMap<String, String> = operator
            .values
            .iter()
            .map(|(k, v)| (k.clone(), render_template(v, &self.vars)))
            .collect();

        let mut post_patch = self.account_patches(&operator.namespace, &operator.service_accounts);
        for binding in &operator.cluster_role_bindings {
            post_patch.push(ReconcileTarget::cluster_role_binding(
                &binding.name,
                &binding.cluster_role,
                &operator.namespace,
                &binding.service_account,
            )?);
        }

        Ok(Stage {
            name: OPERATOR_STAGE.to_string(),
            preconditions: self.namespace_targets(&operator.namespace)?,
            install: Some(Box::new(HelmInstall {
                installer: self.installer.clone(),
                release: operator.release.clone(),
                chart: operator.chart.clone(),
                namespace: operator.namespace.clone(),
                values,
            })),
            post_patch,
            restart_namespaces: vec![operator.namespace.clone()],
            wait: Some(WaitPhase {
                check: wait(
                    DeploymentsAvailable::new(self.cluster.clone(), &operator.namespace),
                    &operator.wait,
                ),
                remediation: None,
            }),
        })
    }

    fn serving_stage(&self) -> Result<Stage> {
        let serving = &self.config.serving;
        let template = std::fs::read_to_string(&serving.manifest).map_err(|e| {
            AirliftError::ConfigError(format!(
                "cannot read serving manifest {}: {}",
                serving.manifest.display(),
                e
            ))
        })?;
        let manifest = render_template(&template, &self.vars);
        info!("Rendered {} for {}", serving.manifest.display(), self.vars.knative_version);

        let mut preconditions = self.namespace_targets(&serving.namespace)?;
        for namespace in &serving.extra_namespaces {
            preconditions.extend(self.namespace_targets(namespace)?);
        }

        Ok(Stage {
            name: SERVING_STAGE.to_string(),
            preconditions,
            install: Some(Box::new(ManifestApply {
                cluster: self.cluster.clone(),
                name: serving.manifest.display().to_string(),
                manifest,
            })),
            post_patch: self.account_patches(&serving.namespace, &serving.service_accounts),
            restart_namespaces: vec![serving.namespace.clone()],
            wait: Some(WaitPhase {
                check: wait(
                    ServingReady::new(self.cluster.clone(), &serving.namespace, &serving.name),
                    &serving.wait,
                ),
                remediation: Some(Box::new(MissingEnvRule::new(
                    &serving.namespace,
                    &serving.migration_job,
                ))),
            }),
        })
    }

    fn verify_stage(&self) -> Stage {
        let mut namespaces = vec![
            self.config.operator.namespace.clone(),
            self.config.serving.namespace.clone(),
        ];
        namespaces.extend(self.config.serving.extra_namespaces.iter().cloned());

        Stage {
            name: VERIFY_STAGE.to_string(),
            preconditions: Vec::new(),
            install: None,
            post_patch: Vec::new(),
            restart_namespaces: Vec::new(),
            wait: Some(WaitPhase {
                check: wait(
                    PodsReady::new(self.cluster.clone(), namespaces),
                    &self.config.verify.wait,
                ),
                remediation: None,
            }),
        }
    }
}
