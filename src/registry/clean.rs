// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! Removes mirrored images from the private registry.

use crate::cancel::CancelSignal;
use crate::error::Result;
use crate::registry::RegistryApi;
use tracing::{info, warn};

/// One manifest removed (or, in a dry run, selected for removal)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeletedManifest {
    pub repository: String,
    pub digest: String,
    pub tags: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CleanFailure {
    pub repository: String,
    pub reference: String,
    pub reason: String,
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct CleanReport {
    pub dry_run: bool,
    pub deleted: Vec<DeletedManifest>,
    pub failures: Vec<CleanFailure>,
}

impl CleanReport {
    pub fn is_success(&self) -> bool {
        self.failures.is_empty()
    }
}

/// Delete every tagged manifest of the given repositories.
///
/// A digest shared by several tags is deleted once. Failures on one tag or
/// repository are recorded and do not stop the run.
pub async fn clean_registry(
    registry: &dyn RegistryApi,
    repositories: &[String],
    dry_run: bool,
    cancel: &CancelSignal,
) -> Result<CleanReport> {
    let mut report = CleanReport {
        dry_run,
        ..Default::default()
    };

    let mut seen = Vec::new();
    for repository in repositories {
        if seen.contains(repository) {
            continue;
        }
        seen.push(repository.clone());
        cancel.check()?;

        let tags = match registry.list_tags(repository).await {
            Ok(tags) => tags,
            Err(e) => {
                warn!("Failed to list tags of {}: {}", repository, e);
                report.failures.push(CleanFailure {
                    repository: repository.clone(),
                    reference: "tags/list".to_string(),
                    reason: e.to_string(),
                });
                continue;
            }
        };

        // digest -> tags, in first-seen order
        let mut manifests: Vec<(String, Vec<String>)> = Vec::new();
        for tag in tags {
            match registry.get_digest(repository, &tag).await {
                Ok(Some(digest)) => match manifests.iter_mut().find(|(d, _)| *d == digest) {
                    Some((_, tags)) => tags.push(tag),
                    None => manifests.push((digest, vec![tag])),
                },
                Ok(None) => {}
                Err(e) => report.failures.push(CleanFailure {
                    repository: repository.clone(),
                    reference: tag,
                    reason: e.to_string(),
                }),
            }
        }

        for (digest, tags) in manifests {
            cancel.check()?;
            if dry_run {
                info!("Would delete {}@{} ({})", repository, digest, tags.join(", "));
            } else if let Err(e) = registry.delete_manifest(repository, &digest).await {
                warn!("Failed to delete {}@{}: {}", repository, digest, e);
                report.failures.push(CleanFailure {
                    repository: repository.clone(),
                    reference: digest,
                    reason: e.to_string(),
                });
                continue;
            }
            report.deleted.push(DeletedManifest {
                repository: repository.clone(),
                digest,
                tags,
            });
        }
    }

    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::FakeRegistry;

    fn repos(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    #[tokio::test]
    async fn test_deletes_shared_digest_once() {
        let registry = FakeRegistry::new()
            .with_tag("knative/operator", "v1.16.0", "sha256:aaa")
            .with_tag("knative/operator", "latest", "sha256:aaa")
            .with_tag("knative/operator", "v1.15.0", "sha256:bbb");

        let report = clean_registry(
            &registry,
            &repos(&["knative/operator"]),
            false,
            &CancelSignal::new(),
        )
        .await
        .unwrap();

        assert!(report.is_success());
        assert_eq!(report.deleted.len(), 2);
        assert_eq!(
            registry.deleted(),
            vec![
                ("knative/operator".to_string(), "sha256:aaa".to_string()),
                ("knative/operator".to_string(), "sha256:bbb".to_string()),
            ]
        );
        assert_eq!(report.deleted[0].tags, vec!["v1.16.0", "latest"]);
    }

    #[tokio::test]
    async fn test_dry_run_deletes_nothing() {
        let registry = FakeRegistry::new().with_tag("a", "v1", "sha256:aaa");

        let report = clean_registry(&registry, &repos(&["a", "a"]), true, &CancelSignal::new())
            .await
            .unwrap();

        assert!(report.dry_run);
        assert_eq!(report.deleted.len(), 1);
        assert!(registry.deleted().is_empty());
    }

    #[tokio::test]
    async fn test_failure_does_not_abort_other_repositories() {
        let registry = FakeRegistry::new()
            .with_tag("a", "v1", "sha256:aaa")
            .with_tag("b", "v1", "sha256:bbb")
            .failing_deletes_for("a");

        let report = clean_registry(&registry, &repos(&["a", "b"]), false, &CancelSignal::new())
            .await
            .unwrap();

        assert_eq!(report.failures.len(), 1);
        assert_eq!(report.failures[0].repository, "a");
        assert_eq!(
            registry.deleted(),
            vec![("b".to_string(), "sha256:bbb".to_string())]
        );
    }

    #[tokio::test]
    async fn test_cancelled_before_start() {
        let registry = FakeRegistry::new().with_tag("a", "v1", "sha256:aaa");
        let cancel = CancelSignal::new();
        cancel.cancel();

        let result = clean_registry(&registry, &repos(&["a"]), false, &cancel).await;

        assert!(result.is_err());
        assert!(registry.deleted().is_empty());
    }
}
