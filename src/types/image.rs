// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! Image references and source/destination mappings.

use crate::error::{AirliftError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// A container image reference: `[registry/]repository[:tag|@digest]`
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ImageReference {
    pub registry: Option<String>,
    pub repository: String,
    pub tag: Option<String>,
    pub digest: Option<String>,
}

impl ImageReference {
    pub fn parse(reference: &str) -> Result<Self> {
        let invalid = |reason: &str| AirliftError::InvalidReference {
            reference: reference.to_string(),
            reason: reason.to_string(),
        };

        if reference.is_empty() || reference.chars().any(char::is_whitespace) {
            return Err(invalid("must be non-empty and contain no whitespace"));
        }

        let (name, digest) = match reference.split_once('@') {
            Some((name, digest)) => {
                if !digest.contains(':') {
                    return Err(invalid("digest must be of the form algorithm:hex"));
                }
                (name, Some(digest.to_string()))
            }
            None => (reference, None),
        };

        let last_slash = name.rfind('/').map(|i| i + 1).unwrap_or(0);
        let (name, tag) = match name[last_slash..].rfind(':') {
            Some(i) => {
                let split = last_slash + i;
                (&name[..split], Some(name[split + 1..].to_string()))
            }
            None => (name, None),
        };

        if tag.is_some() && digest.is_some() {
            return Err(invalid("tag and digest are mutually exclusive"));
        }
        if tag.as_deref() == Some("") {
            return Err(invalid("empty tag"));
        }

        let (registry, repository) = match name.split_once('/') {
            Some((first, rest))
                if first.contains('.') || first.contains(':') || first == "localhost" =>
            {
                (Some(first.to_string()), rest.to_string())
            }
            _ => (None, name.to_string()),
        };

        if repository.is_empty() || repository.split('/').any(str::is_empty) {
            return Err(invalid("empty repository path"));
        }

        Ok(ImageReference {
            registry,
            repository,
            tag,
            digest,
        })
    }

    /// Repository path including the registry host, without tag or digest
    pub fn name(&self) -> String {
        match &self.registry {
            Some(registry) => format!("{}/{}", registry, self.repository),
            None => self.repository.clone(),
        }
    }

    /// The tag, or the digest when the reference is pinned
    pub fn version(&self) -> &str {
        self.tag
            .as_deref()
            .or(self.digest.as_deref())
            .unwrap_or("latest")
    }

    /// Whether this reference lives under the given `host[/prefix]` location
    pub fn is_under(&self, location: &str) -> bool {
        let location = location.trim_end_matches('/');
        self.name().starts_with(&format!("{}/", location))
    }
}

impl fmt::Display for ImageReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())?;
        if let Some(tag) = &self.tag {
            write!(f, ":{}", tag)?;
        }
        if let Some(digest) = &self.digest {
            write!(f, "@{}", digest)?;
        }
        Ok(())
    }
}

impl FromStr for ImageReference {
    type Err = AirliftError;

    fn from_str(s: &str) -> Result<Self> {
        ImageReference::parse(s)
    }
}

impl TryFrom<String> for ImageReference {
    type Error = AirliftError;

    fn try_from(value: String) -> Result<Self> {
        ImageReference::parse(&value)
    }
}

impl From<ImageReference> for String {
    fn from(value: ImageReference) -> Self {
        value.to_string()
    }
}

/// A source image and where it must land in the private registry.
///
/// The destination always lives under the private registry and the source
/// never does. Both are fixed once constructed.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ImageMapping {
    source: ImageReference,
    destination: ImageReference,
}

impl ImageMapping {
    pub fn new(
        source: ImageReference,
        destination: ImageReference,
        private_registry: &str,
    ) -> Result<Self> {
        if source.is_under(private_registry) {
            return Err(AirliftError::ConfigError(format!(
                "source image {} must not point at the private registry {}",
                source, private_registry
            )));
        }
        if !destination.is_under(private_registry) {
            return Err(AirliftError::ConfigError(format!(
                "destination image {} is not in the private registry {}",
                destination, private_registry
            )));
        }
        if destination.digest.is_some() {
            return Err(AirliftError::ConfigError(format!(
                "destination image {} must be tagged, not pinned to a digest",
                destination
            )));
        }
        Ok(Self {
            source,
            destination,
        })
    }

    /// Map a source into the private registry, keeping its repository path and tag
    pub fn derive(source: ImageReference, private_registry: &str) -> Result<Self> {
        let Some(tag) = source.tag.clone() else {
            return Err(AirliftError::ConfigError(format!(
                "image {} has no tag; give it an explicit destination",
                source
            )));
        };
        let destination = ImageReference::parse(&format!(
            "{}/{}:{}",
            private_registry.trim_end_matches('/'),
            source.repository,
            tag
        ))?;
        Self::new(source, destination, private_registry)
    }

    pub fn source(&self) -> &ImageReference {
        &self.source
    }

    pub fn destination(&self) -> &ImageReference {
        &self.destination
    }
}

impl fmt::Display for ImageMapping {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} -> {}", self.source, self.destination)
    }
}
