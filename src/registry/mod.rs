// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! Registry metadata access over the Docker Registry HTTP API v2.

pub mod clean;

use crate::engine::Credentials;
use crate::error::{AirliftError, Result};
use async_trait::async_trait;
use reqwest::{header, StatusCode};
use serde::Deserialize;
use tracing::{debug, info, instrument};
use url::Url;

pub use clean::{clean_registry, CleanReport};

/// Media types accepted when resolving a tag to its digest
const MANIFEST_MEDIA_TYPES: &str = "application/vnd.oci.image.index.v1+json, \
application/vnd.oci.image.manifest.v1+json, \
application/vnd.docker.distribution.manifest.list.v2+json, \
application/vnd.docker.distribution.manifest.v2+json";

const DIGEST_HEADER: &str = "Docker-Content-Digest";

#[async_trait]
pub trait RegistryApi: Send + Sync {
    /// Tags of a repository; empty when the repository does not exist
    async fn list_tags(&self, repository: &str) -> Result<Vec<String>>;

    /// Content digest a tag points at; `None` when the tag does not exist
    async fn get_digest(&self, repository: &str, tag: &str) -> Result<Option<String>>;

    /// Delete a manifest by digest. Returns `false` when it was already gone.
    async fn delete_manifest(&self, repository: &str, digest: &str) -> Result<bool>;
}

#[derive(Debug, Deserialize)]
struct TagList {
    #[allow(dead_code)]
    name: String,
    tags: Option<Vec<String>>,
}

pub struct HttpRegistry {
    client: reqwest::Client,
    base: Url,
    credentials: Option<Credentials>,
}

impl HttpRegistry {
    /// `host` is the registry host (with optional port); plain HTTP when `insecure`
    pub fn new(host: &str, insecure: bool, credentials: Option<Credentials>) -> Result<Self> {
        let scheme = if insecure { "http" } else { "https" };
        let base = Url::parse(&format!("{}://{}/", scheme, host)).map_err(|e| {
            AirliftError::ConfigError(format!("invalid registry host '{}': {}", host, e))
        })?;
        let client = reqwest::Client::builder()
            .build()
            .map_err(|e| AirliftError::RegistryError(format!("failed to build client: {}", e)))?;
        Ok(Self {
            client,
            base,
            credentials,
        })
    }

    fn url(&self, path: &str) -> Result<Url> {
        self.base
            .join(path)
            .map_err(|e| AirliftError::RegistryError(format!("invalid URL path {}: {}", path, e)))
    }

    fn request(&self, method: reqwest::Method, url: Url) -> reqwest::RequestBuilder {
        let builder = self.client.request(method, url);
        match &self.credentials {
            Some(c) => builder.basic_auth(&c.username, Some(&c.password)),
            None => builder,
        }
    }
}

fn tags_path(repository: &str) -> String {
    format!("v2/{}/tags/list", repository)
}

fn manifest_path(repository: &str, reference: &str) -> String {
    format!("v2/{}/manifests/{}", repository, reference)
}

fn transport_error(error: reqwest::Error) -> AirliftError {
    if error.is_connect() || error.is_timeout() {
        AirliftError::Transient(format!("registry unreachable: {}", error))
    } else {
        AirliftError::RegistryError(error.to_string())
    }
}

fn status_error(what: &str, status: StatusCode) -> AirliftError {
    if status.is_server_error() || status == StatusCode::TOO_MANY_REQUESTS {
        AirliftError::Transient(format!("{}: registry answered {}", what, status))
    } else {
        AirliftError::RegistryError(format!("{}: registry answered {}", what, status))
    }
}

#[async_trait]
impl RegistryApi for HttpRegistry {
    #[instrument(skip(self))]
    async fn list_tags(&self, repository: &str) -> Result<Vec<String>> {
        let response = self
            .request(reqwest::Method::GET, self.url(&tags_path(repository))?)
            .send()
            .await
            .map_err(transport_error)?;

        match response.status() {
            StatusCode::NOT_FOUND => Ok(Vec::new()),
            status if status.is_success() => {
                let list: TagList = response.json().await.map_err(transport_error)?;
                Ok(list.tags.unwrap_or_default())
            }
            status => Err(status_error(&format!("listing tags of {}", repository), status)),
        }
    }

    #[instrument(skip(self))]
    async fn get_digest(&self, repository: &str, tag: &str) -> Result<Option<String>> {
        let response = self
            .request(reqwest::Method::HEAD, self.url(&manifest_path(repository, tag))?)
            .header(header::ACCEPT, MANIFEST_MEDIA_TYPES)
            .send()
            .await
            .map_err(transport_error)?;

        match response.status() {
            StatusCode::NOT_FOUND => Ok(None),
            status if status.is_success() => {
                let digest = response
                    .headers()
                    .get(DIGEST_HEADER)
                    .and_then(|v| v.to_str().ok())
                    .map(str::to_string)
                    .ok_or_else(|| {
                        AirliftError::RegistryError(format!(
                            "no {} header for {}:{}",
                            DIGEST_HEADER, repository, tag
                        ))
                    })?;
                debug!("{}:{} resolves to {}", repository, tag, digest);
                Ok(Some(digest))
            }
            status => Err(status_error(
                &format!("resolving {}:{}", repository, tag),
                status,
            )),
        }
    }

    #[instrument(skip(self))]
    async fn delete_manifest(&self, repository: &str, digest: &str) -> Result<bool> {
        let response = self
            .request(reqwest::Method::DELETE, self.url(&manifest_path(repository, digest))?)
            .send()
            .await
            .map_err(transport_error)?;

        match response.status() {
            StatusCode::NOT_FOUND => Ok(false),
            StatusCode::METHOD_NOT_ALLOWED => Err(AirliftError::Unrecoverable(format!(
                "registry refuses deletes; enable storage.delete to remove {}@{}",
                repository, digest
            ))),
            status if status.is_success() => {
                info!("Deleted {}@{}", repository, digest);
                Ok(true)
            }
            status => Err(status_error(
                &format!("deleting {}@{}", repository, digest),
                status,
            )),
        }
    }
}
