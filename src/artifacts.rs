// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! Version marker files carried across the air gap next to the image archive.

use crate::error::{AirliftError, Result};
use std::path::Path;
use tracing::debug;

/// `MAJOR.MINOR.PATCH` with an optional `v` prefix and optional
/// `-prerelease` / `+build` suffixes
fn is_semver(version: &str) -> bool {
    let version = version.strip_prefix('v').unwrap_or(version);
    let (core, suffix) = match version.find(['-', '+']) {
        Some(i) => (&version[..i], Some(&version[i + 1..])),
        None => (version, None),
    };
    if suffix == Some("") {
        return false;
    }
    let parts: Vec<&str> = core.split('.').collect();
    parts.len() == 3
        && parts
            .iter()
            .all(|p| !p.is_empty() && p.chars().all(|c| c.is_ascii_digit()))
}

/// Read a single-line plain text marker, trimmed
pub async fn read_text_marker(path: &Path) -> Result<String> {
    let content = tokio::fs::read_to_string(path).await.map_err(|e| {
        AirliftError::ConfigError(format!("cannot read marker {}: {}", path.display(), e))
    })?;
    let value = content.trim();
    if value.is_empty() || value.lines().count() != 1 {
        return Err(AirliftError::ConfigError(format!(
            "marker {} must hold exactly one non-empty line",
            path.display()
        )));
    }
    debug!("Read {} from {}", value, path.display());
    Ok(value.to_string())
}

/// Read a single-line version marker and check it is a semantic version
pub async fn read_version_marker(path: &Path) -> Result<String> {
    let version = read_text_marker(path).await?;
    if !is_semver(&version) {
        return Err(AirliftError::ConfigError(format!(
            "version marker {} does not hold a semantic version: '{}'",
            path.display(),
            version
        )));
    }
    Ok(version)
}

/// Write a one-line marker, replacing the file atomically
pub async fn write_text_marker(path: &Path, value: &str) -> Result<()> {
    let value = value.trim();
    if value.is_empty() || value.contains('\n') {
        return Err(AirliftError::ConfigError(format!(
            "'{}' cannot be written as a one-line marker",
            value
        )));
    }
    let dir = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };
    tokio::fs::create_dir_all(dir).await?;
    let file = tempfile::NamedTempFile::new_in(dir)?;
    tokio::fs::write(file.path(), format!("{}\n", value)).await?;
    file.persist(path).map_err(|e| AirliftError::IoError(e.error))?;
    Ok(())
}

/// Write a version marker after checking it is a semantic version
pub async fn write_version_marker(path: &Path, version: &str) -> Result<()> {
    if !is_semver(version) {
        return Err(AirliftError::ConfigError(format!(
            "'{}' is not a semantic version",
            version
        )));
    }
    write_text_marker(path, version).await
}
