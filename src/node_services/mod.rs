// Copyright (c) 2026 sysreg contributors
// SPDX-License-Identifier: MIT

//! Node services configuration.
//!
//! [`NodeServicesConfig`] is the payload the orchestrator publishes per master
//! node and the node agent materializes. Local and proxy mode are variants of
//! [`ModeConfig`], so a payload can never carry both or neither.

pub mod desired;
pub mod manifest;

use crate::checksum::sha256_hex;
use crate::crd::RegistryMode;
use crate::errors::NodeServicesError;
use crate::pki::CertKey;
use crate::settings::ProxyEnvs;
use crate::users::RegistryUser;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// PKI file names written by the node agent.
pub mod files {
    pub const CA_CERT: &str = "ca.crt";
    pub const AUTH_CERT: &str = "auth.crt";
    pub const AUTH_KEY: &str = "auth.key";
    pub const TOKEN_CERT: &str = "token.crt";
    pub const TOKEN_KEY: &str = "token.key";
    pub const DISTRIBUTION_CERT: &str = "distribution.crt";
    pub const DISTRIBUTION_KEY: &str = "distribution.key";
    pub const INGRESS_CLIENT_CA_CERT: &str = "ingress-client-ca.crt";
    pub const UPSTREAM_REGISTRY_CA_CERT: &str = "upstream-registry-ca.crt";
}

/// Container images of the registry static pod.
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Images {
    pub distribution: String,
    pub auth: String,
    pub mirrorer: String,
}

/// Local mode: the registry serves images pushed into the cluster.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct LocalModeConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ingress_client_ca: Option<String>,
    pub user_rw: RegistryUser,
    pub user_puller: RegistryUser,
    pub user_pusher: RegistryUser,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub upstream_mirrors: Vec<String>,
}

/// Upstream registry of the proxy mode.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Upstream {
    pub scheme: String,
    pub host: String,
    pub path: String,
    pub user: String,
    pub password: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ttl: Option<String>,
}

impl Upstream {
    /// `<scheme>://<host>`
    #[must_use]
    pub fn remote_url(&self) -> String {
        format!("{}://{}", self.scheme, self.host)
    }
}

/// Proxy mode: the registry caches an upstream registry.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ProxyModeConfig {
    pub upstream: Upstream,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub upstream_ca: Option<String>,
    #[serde(default)]
    pub proxy_envs: ProxyEnvs,
}

/// Exactly one registry mode, tagged by `type: Local|Proxy`.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type")]
pub enum ModeConfig {
    Local(LocalModeConfig),
    Proxy(ProxyModeConfig),
}

/// Full per-node payload.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct NodeServicesConfig {
    pub node_name: String,
    pub node_ip: String,
    pub images: Images,
    pub ca: String,
    pub auth: CertKey,
    pub distribution: CertKey,
    pub token: CertKey,
    pub http_secret: String,
    pub user_ro: RegistryUser,
    pub mode: ModeConfig,
}

impl NodeServicesConfig {
    #[must_use]
    pub fn registry_mode(&self) -> RegistryMode {
        match self.mode {
            ModeConfig::Local(_) => RegistryMode::Local,
            ModeConfig::Proxy(_) => RegistryMode::Proxy,
        }
    }

    /// YAML payload stored in the node services secret.
    ///
    /// # Errors
    ///
    /// Returns the serialization error.
    pub fn to_payload(&self) -> Result<String, serde_yaml::Error> {
        serde_yaml::to_string(self)
    }

    /// Parse a payload written by [`NodeServicesConfig::to_payload`].
    ///
    /// # Errors
    ///
    /// Returns the deserialization error.
    pub fn from_payload(payload: &str) -> Result<Self, serde_yaml::Error> {
        serde_yaml::from_str(payload)
    }

    /// SHA-256 of the payload; the agent re-applies when it changes.
    ///
    /// # Errors
    ///
    /// Returns the serialization error.
    pub fn version(&self) -> Result<String, serde_yaml::Error> {
        Ok(sha256_hex(self.to_payload()?.as_bytes()))
    }

    /// PKI files the agent writes, keyed by file name.
    #[must_use]
    pub fn pki_files(&self) -> BTreeMap<&'static str, String> {
        let mut out = BTreeMap::from([
            (files::CA_CERT, self.ca.clone()),
            (files::AUTH_CERT, self.auth.cert_pem.clone()),
            (files::AUTH_KEY, self.auth.key_pem.clone()),
            (files::TOKEN_CERT, self.token.cert_pem.clone()),
            (files::TOKEN_KEY, self.token.key_pem.clone()),
            (files::DISTRIBUTION_CERT, self.distribution.cert_pem.clone()),
            (files::DISTRIBUTION_KEY, self.distribution.key_pem.clone()),
        ]);
        match &self.mode {
            ModeConfig::Local(local) => {
                if let Some(ca) = local.ingress_client_ca.as_ref().filter(|ca| !ca.is_empty()) {
                    out.insert(files::INGRESS_CLIENT_CA_CERT, ca.clone());
                }
            }
            ModeConfig::Proxy(proxy) => {
                if let Some(ca) = proxy.upstream_ca.as_ref().filter(|ca| !ca.is_empty()) {
                    out.insert(files::UPSTREAM_REGISTRY_CA_CERT, ca.clone());
                }
            }
        }
        out
    }
}

/// Validate a proxy environment.
///
/// `noProxy` alone is meaningless: when `http` and `https` are both empty,
/// `noProxy` must be empty too.
///
/// # Errors
///
/// Returns [`NodeServicesError::NoProxyWithoutProxy`].
pub fn validate_proxy_envs(envs: &ProxyEnvs) -> Result<(), NodeServicesError> {
    if envs.http.is_empty() && envs.https.is_empty() && !envs.no_proxy.is_empty() {
        return Err(NodeServicesError::NoProxyWithoutProxy);
    }
    Ok(())
}
