// Copyright (c) 2026 sysreg contributors
// SPDX-License-Identifier: MIT

//! OCI distribution client for module repositories.
//!
//! Speaks the subset of the distribution API the watcher needs: tag listing,
//! manifest and blob fetches. Authentication follows the registry's
//! `WWW-Authenticate` challenge (bearer token or basic).

use super::client::{Image, Layer, RegistryClient};
use super::docker_config::Credentials;
use crate::checksum::sha256_hex;
use crate::constants::HTTP_REQUEST_TIMEOUT_SECS;
use crate::errors::RegistryClientError;
use reqwest::header::{HeaderMap, ACCEPT, AUTHORIZATION, LINK, WWW_AUTHENTICATE};
use reqwest::{Client as HttpClient, Method, Response, StatusCode};
use serde::Deserialize;
use std::collections::HashMap;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::debug;

const MANIFEST_MEDIA_TYPES: &str = "application/vnd.oci.image.manifest.v1+json, \
application/vnd.docker.distribution.manifest.v2+json, \
application/vnd.oci.image.index.v1+json, \
application/vnd.docker.distribution.manifest.list.v2+json";

const DOCKER_CONTENT_DIGEST: &str = "docker-content-digest";

/// Connection options shared by all registries of a watcher.
#[derive(Clone, Debug, Default)]
pub struct OciClientOptions {
    /// Use plain HTTP instead of HTTPS
    pub insecure_http: bool,
    /// Accept any TLS certificate
    pub tls_skip_verify: bool,
}

/// Build the shared HTTP client.
///
/// # Errors
///
/// Returns an error if the TLS backend cannot be initialized.
pub fn build_http_client(options: &OciClientOptions) -> Result<HttpClient, reqwest::Error> {
    HttpClient::builder()
        .timeout(Duration::from_secs(HTTP_REQUEST_TIMEOUT_SECS))
        .danger_accept_invalid_certs(options.tls_skip_verify)
        .build()
}

#[derive(Deserialize)]
struct TagList {
    #[serde(default)]
    tags: Option<Vec<String>>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct Descriptor {
    #[serde(default)]
    media_type: String,
    digest: String,
}

#[derive(Deserialize)]
struct Manifest {
    #[serde(default)]
    manifests: Option<Vec<Descriptor>>,
    #[serde(default)]
    layers: Vec<Descriptor>,
}

#[derive(Deserialize)]
struct TokenResponse {
    #[serde(default)]
    token: Option<String>,
    #[serde(default)]
    access_token: Option<String>,
}

/// Parsed `WWW-Authenticate` header.
#[derive(Clone, Debug, PartialEq, Eq)]
enum Challenge {
    Bearer {
        realm: String,
        service: Option<String>,
        scope: Option<String>,
    },
    Basic,
}

fn parse_challenge(header: &str) -> Option<Challenge> {
    let (scheme, params) = header.trim().split_once(' ').unwrap_or((header.trim(), ""));
    if scheme.eq_ignore_ascii_case("basic") {
        return Some(Challenge::Basic);
    }
    if !scheme.eq_ignore_ascii_case("bearer") {
        return None;
    }

    let mut values: HashMap<String, String> = HashMap::new();
    let mut rest = params.trim();
    while !rest.is_empty() {
        let (key, after) = rest.split_once('=')?;
        let after = after.trim_start();
        let (value, remaining) = if let Some(quoted) = after.strip_prefix('"') {
            let end = quoted.find('"')?;
            (&quoted[..end], &quoted[end + 1..])
        } else {
            after.split_once(',').unwrap_or((after, ""))
        };
        values.insert(key.trim().to_ascii_lowercase(), value.to_string());
        rest = remaining.trim_start_matches([',', ' ']);
    }

    Some(Challenge::Bearer {
        realm: values.remove("realm")?,
        service: values.remove("service"),
        scope: values.remove("scope"),
    })
}

fn next_link(headers: &HeaderMap) -> Option<String> {
    let link = headers.get(LINK)?.to_str().ok()?;
    if !link.contains("rel=\"next\"") {
        return None;
    }
    let start = link.find('<')? + 1;
    let end = link.find('>')?;
    link.get(start..end).map(str::to_string)
}

/// Registry client for one modules repository, e.g. `registry.example.com/deckhouse/modules`.
pub struct OciRegistryClient {
    http: HttpClient,
    name: String,
    base_url: String,
    repository: String,
    credentials: Option<Credentials>,
    tokens: Mutex<HashMap<String, String>>,
}

impl OciRegistryClient {
    /// Client for `repository` (`host[:port]/path`).
    #[must_use]
    pub fn new(
        http: HttpClient,
        repository: &str,
        credentials: Option<Credentials>,
        options: &OciClientOptions,
    ) -> Self {
        let repository = repository.trim_end_matches('/');
        let (host, path) = repository.split_once('/').unwrap_or((repository, ""));
        let scheme = if options.insecure_http { "http" } else { "https" };
        Self {
            http,
            name: repository.to_string(),
            base_url: format!("{scheme}://{host}"),
            repository: path.to_string(),
            credentials,
            tokens: Mutex::new(HashMap::new()),
        }
    }

    fn repository_path(&self, suffix: &str) -> String {
        match (self.repository.is_empty(), suffix.is_empty()) {
            (true, _) => suffix.to_string(),
            (false, true) => self.repository.clone(),
            (false, false) => format!("{}/{suffix}", self.repository),
        }
    }

    fn transport(&self, e: &reqwest::Error) -> RegistryClientError {
        RegistryClientError::Transport {
            registry: self.name.clone(),
            reason: e.to_string(),
        }
    }

    fn invalid(&self, reason: impl Into<String>) -> RegistryClientError {
        RegistryClientError::InvalidResponse {
            registry: self.name.clone(),
            reason: reason.into(),
        }
    }

    fn basic_request(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.credentials {
            Some(creds) => request.basic_auth(&creds.username, Some(&creds.password)),
            None => request,
        }
    }

    async fn fetch_token(
        &self,
        realm: &str,
        service: Option<&str>,
        scope: &str,
    ) -> Result<String, RegistryClientError> {
        let mut query: Vec<(&str, &str)> = vec![("scope", scope)];
        if let Some(service) = service {
            query.push(("service", service));
        }
        let url = url::Url::parse_with_params(realm, &query).map_err(|e| {
            RegistryClientError::Auth {
                registry: self.name.clone(),
                reason: format!("invalid token realm {realm}: {e}"),
            }
        })?;
        let request = self.basic_request(self.http.get(url));
        let response = request.send().await.map_err(|e| self.transport(&e))?;
        if !response.status().is_success() {
            return Err(RegistryClientError::Auth {
                registry: self.name.clone(),
                reason: format!("token endpoint returned HTTP {}", response.status().as_u16()),
            });
        }
        let body: TokenResponse = response
            .json()
            .await
            .map_err(|e| self.invalid(format!("token response: {e}")))?;
        body.token
            .or(body.access_token)
            .filter(|t| !t.is_empty())
            .ok_or_else(|| RegistryClientError::Auth {
                registry: self.name.clone(),
                reason: "token endpoint returned no token".to_string(),
            })
    }

    /// Send a request, answering an authentication challenge once.
    async fn send(
        &self,
        method: Method,
        url: &str,
        accept: Option<&str>,
        repo_path: &str,
    ) -> Result<Response, RegistryClientError> {
        let scope = format!("repository:{repo_path}:pull");
        let build = |auth: Option<String>| {
            let mut request = self.http.request(method.clone(), url);
            if let Some(accept) = accept {
                request = request.header(ACCEPT, accept);
            }
            if let Some(auth) = auth {
                request = request.header(AUTHORIZATION, auth);
            }
            request
        };

        let cached = self.tokens.lock().await.get(&scope).cloned();
        let response = build(cached.map(|t| format!("Bearer {t}")))
            .send()
            .await
            .map_err(|e| self.transport(&e))?;
        if response.status() != StatusCode::UNAUTHORIZED {
            return Ok(response);
        }

        let challenge = response
            .headers()
            .get(WWW_AUTHENTICATE)
            .and_then(|h| h.to_str().ok())
            .and_then(parse_challenge)
            .ok_or_else(|| RegistryClientError::Auth {
                registry: self.name.clone(),
                reason: format!("unsupported authentication challenge for {url}"),
            })?;

        let retried = match challenge {
            Challenge::Bearer {
                realm,
                service,
                scope: challenge_scope,
            } => {
                let scope = challenge_scope.unwrap_or(scope);
                debug!(registry = %self.name, %realm, %scope, "Requesting registry token");
                let token = self.fetch_token(&realm, service.as_deref(), &scope).await?;
                self.tokens.lock().await.insert(
                    format!("repository:{repo_path}:pull"),
                    token.clone(),
                );
                build(Some(format!("Bearer {token}")))
            }
            Challenge::Basic => {
                if self.credentials.is_none() {
                    return Err(RegistryClientError::Auth {
                        registry: self.name.clone(),
                        reason: "registry requires credentials".to_string(),
                    });
                }
                self.basic_request(build(None))
            }
        };

        let response = retried.send().await.map_err(|e| self.transport(&e))?;
        if response.status() == StatusCode::UNAUTHORIZED {
            return Err(RegistryClientError::Auth {
                registry: self.name.clone(),
                reason: format!("credentials rejected for {url}"),
            });
        }
        Ok(response)
    }

    async fn get_ok(
        &self,
        method: Method,
        url: &str,
        accept: Option<&str>,
        repo_path: &str,
    ) -> Result<Response, RegistryClientError> {
        let response = self.send(method, url, accept, repo_path).await?;
        if !response.status().is_success() {
            return Err(RegistryClientError::UnexpectedStatus {
                registry: self.name.clone(),
                url: url.to_string(),
                status: response.status().as_u16(),
            });
        }
        Ok(response)
    }

    async fn tags(&self, repo_path: &str) -> Result<Vec<String>, RegistryClientError> {
        let mut url = format!("{}/v2/{repo_path}/tags/list", self.base_url);
        let mut tags = Vec::new();
        loop {
            let response = self.get_ok(Method::GET, &url, None, repo_path).await?;
            let next = next_link(response.headers());
            let page: TagList = response
                .json()
                .await
                .map_err(|e| self.invalid(format!("tag list: {e}")))?;
            tags.extend(page.tags.unwrap_or_default());
            match next {
                Some(link) if link.starts_with('/') => url = format!("{}{link}", self.base_url),
                Some(link) => url = link,
                None => return Ok(tags),
            }
        }
    }

    async fn manifest_digest(
        &self,
        repo_path: &str,
        reference: &str,
    ) -> Result<String, RegistryClientError> {
        let url = format!("{}/v2/{repo_path}/manifests/{reference}", self.base_url);
        let response = self
            .get_ok(Method::HEAD, &url, Some(MANIFEST_MEDIA_TYPES), repo_path)
            .await?;
        if let Some(digest) = response
            .headers()
            .get(DOCKER_CONTENT_DIGEST)
            .and_then(|h| h.to_str().ok())
        {
            return Ok(digest.to_string());
        }

        let response = self
            .get_ok(Method::GET, &url, Some(MANIFEST_MEDIA_TYPES), repo_path)
            .await?;
        let body = response.bytes().await.map_err(|e| self.transport(&e))?;
        Ok(format!("sha256:{}", sha256_hex(&body)))
    }

    async fn manifest(
        &self,
        repo_path: &str,
        reference: &str,
    ) -> Result<(String, Manifest), RegistryClientError> {
        let url = format!("{}/v2/{repo_path}/manifests/{reference}", self.base_url);
        let response = self
            .get_ok(Method::GET, &url, Some(MANIFEST_MEDIA_TYPES), repo_path)
            .await?;
        let header_digest = response
            .headers()
            .get(DOCKER_CONTENT_DIGEST)
            .and_then(|h| h.to_str().ok())
            .map(str::to_string);
        let body = response.bytes().await.map_err(|e| self.transport(&e))?;
        let digest = header_digest.unwrap_or_else(|| format!("sha256:{}", sha256_hex(&body)));
        let manifest: Manifest = serde_json::from_slice(&body)
            .map_err(|e| self.invalid(format!("manifest {reference}: {e}")))?;
        Ok((digest, manifest))
    }

    async fn blob(&self, repo_path: &str, digest: &str) -> Result<Vec<u8>, RegistryClientError> {
        let url = format!("{}/v2/{repo_path}/blobs/{digest}", self.base_url);
        let response = self.get_ok(Method::GET, &url, None, repo_path).await?;
        let body = response.bytes().await.map_err(|e| self.transport(&e))?;
        if let Some(expected) = digest.strip_prefix("sha256:") {
            if sha256_hex(&body) != expected {
                return Err(self.invalid(format!("blob {digest} does not match its digest")));
            }
        }
        Ok(body.to_vec())
    }

    async fn pull(&self, repo_path: &str, reference: &str) -> Result<Image, RegistryClientError> {
        let (mut digest, mut manifest) = self.manifest(repo_path, reference).await?;
        if let Some(first) = manifest.manifests.as_ref().and_then(|m| m.first()) {
            let child = first.digest.clone();
            let (child_digest, child_manifest) = self.manifest(repo_path, &child).await?;
            digest = child_digest;
            manifest = child_manifest;
        }

        let mut layers = Vec::with_capacity(manifest.layers.len());
        for descriptor in &manifest.layers {
            layers.push(Layer {
                media_type: descriptor.media_type.clone(),
                data: self.blob(repo_path, &descriptor.digest).await?,
            });
        }
        Ok(Image { digest, layers })
    }
}

#[async_trait::async_trait]
impl RegistryClient for OciRegistryClient {
    fn name(&self) -> &str {
        &self.name
    }

    async fn modules(&self) -> Result<Vec<String>, RegistryClientError> {
        self.tags(&self.repository_path("")).await
    }

    async fn list_tags(&self, module: &str) -> Result<Vec<String>, RegistryClientError> {
        self.tags(&self.repository_path(&format!("{module}/release")))
            .await
    }

    async fn release_digest(
        &self,
        module: &str,
        channel: &str,
    ) -> Result<String, RegistryClientError> {
        self.manifest_digest(&self.repository_path(&format!("{module}/release")), channel)
            .await
    }

    async fn release_image(
        &self,
        module: &str,
        channel: &str,
    ) -> Result<Image, RegistryClientError> {
        self.pull(&self.repository_path(&format!("{module}/release")), channel)
            .await
    }

    async fn image(&self, module: &str, version: &str) -> Result<Image, RegistryClientError> {
        self.pull(&self.repository_path(module), version).await
    }
}

#[cfg(test)]
#[path = "oci_tests.rs"]
mod oci_tests;
