// Copyright (c) 2026 sysreg contributors
// SPDX-License-Identifier: MIT

//! Registry credentials from docker config JSON.
//!
//! Both layouts are accepted:
//!
//! - `.dockerconfigjson`: `{"auths": {"<host>": {...}}}`
//! - legacy `.dockercfg`: `{"<host>": {...}}`
//!
//! An entry carries either `auth` (base64 of `user:password`) or explicit
//! `username` and `password`; explicit fields win.

use anyhow::{Context as _, Result};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use serde::Deserialize;
use std::collections::BTreeMap;

/// Username and password for one registry host.
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

#[derive(Deserialize, Default)]
struct AuthEntry {
    #[serde(default)]
    auth: Option<String>,
    #[serde(default)]
    username: Option<String>,
    #[serde(default)]
    password: Option<String>,
}

impl AuthEntry {
    fn credentials(&self) -> Option<Credentials> {
        if let (Some(username), Some(password)) = (&self.username, &self.password) {
            return Some(Credentials {
                username: username.clone(),
                password: password.clone(),
            });
        }
        let decoded = BASE64.decode(self.auth.as_deref()?.trim()).ok()?;
        let decoded = String::from_utf8(decoded).ok()?;
        let (username, password) = decoded.split_once(':')?;
        Some(Credentials {
            username: username.to_string(),
            password: password.to_string(),
        })
    }
}

#[derive(Deserialize)]
struct DockerConfigJson {
    auths: BTreeMap<String, AuthEntry>,
}

/// Credentials keyed by registry host.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct DockerConfig {
    hosts: BTreeMap<String, Credentials>,
}

fn normalize_host(host: &str) -> &str {
    let host = host
        .strip_prefix("https://")
        .or_else(|| host.strip_prefix("http://"))
        .unwrap_or(host);
    host.split('/').next().unwrap_or(host)
}

impl DockerConfig {
    /// Parse either docker config layout.
    ///
    /// # Errors
    ///
    /// Returns an error if `bytes` is not a JSON object of either layout.
    pub fn parse(bytes: &[u8]) -> Result<Self> {
        let entries: BTreeMap<String, AuthEntry> =
            match serde_json::from_slice::<DockerConfigJson>(bytes) {
                Ok(config) => config.auths,
                Err(_) => serde_json::from_slice(bytes)
                    .context("Docker config is neither .dockerconfigjson nor .dockercfg")?,
            };

        let hosts = entries
            .into_iter()
            .filter_map(|(host, entry)| {
                entry
                    .credentials()
                    .map(|creds| (normalize_host(&host).to_string(), creds))
            })
            .collect();
        Ok(Self { hosts })
    }

    /// Credentials for the host of `repository` (e.g. `registry.example.com/deckhouse/modules`).
    #[must_use]
    pub fn credentials_for(&self, repository: &str) -> Option<&Credentials> {
        self.hosts.get(normalize_host(repository))
    }
}
