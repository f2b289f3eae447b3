// Copyright (c) 2026 sysreg contributors
// SPDX-License-Identifier: MIT

//! Narrowing of `ModuleConfig/system-registry` settings.
//!
//! `spec.settings` arrives as an opaque JSON tree. [`RegistrySettings::from_value`]
//! projects it into typed values in a single pass. Keys this crate does not know
//! about are kept in `extra` maps so a round-trip through [`RegistrySettings::to_value`]
//! preserves them; `imagesOverride` is the one key that is always dropped.

use crate::constants::IMAGES_OVERRIDE_KEY;
use crate::crd::ModuleConfig;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Upstream registry the proxy mode pulls from.
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct UpstreamSettings {
    /// `https` or `http`
    #[serde(default = "default_scheme")]
    pub scheme: String,

    #[serde(default)]
    pub host: String,

    /// Repository path, e.g. `/deckhouse/ee`
    #[serde(default)]
    pub path: String,

    #[serde(default)]
    pub user: String,

    #[serde(default)]
    pub password: String,

    /// Cache TTL as a duration string, e.g. `72h`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ttl: Option<String>,

    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

fn default_scheme() -> String {
    "https".to_string()
}

/// `localMode` settings subtree.
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct LocalModeSettings {
    /// Upstream registries the mirrorer copies images from
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub upstream_mirrors: Vec<String>,

    /// CA that signs client certificates of the ingress
    #[serde(
        default,
        rename = "ingressClientCA",
        skip_serializing_if = "Option::is_none"
    )]
    pub ingress_client_ca: Option<String>,

    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl LocalModeSettings {
    /// Whether the subtree carries no setting at all.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.upstream_mirrors.is_empty() && self.ingress_client_ca.is_none() && self.extra.is_empty()
    }
}

/// `proxyMode` settings subtree.
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ProxyModeSettings {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub upstream: Option<UpstreamSettings>,

    /// CA of the upstream registry
    #[serde(default, rename = "upstreamCA", skip_serializing_if = "Option::is_none")]
    pub upstream_ca: Option<String>,

    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Proxy environment handed to the registry static pod.
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ProxyEnvs {
    #[serde(default)]
    pub http: String,

    #[serde(default)]
    pub https: String,

    #[serde(default)]
    pub no_proxy: String,
}

impl ProxyEnvs {
    /// Whether no variable is set.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.http.is_empty() && self.https.is_empty() && self.no_proxy.is_empty()
    }
}

/// Narrowed registry settings.
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct RegistrySettings {
    /// Mode hint as written by the user; subtree presence decides the mode
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mode: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub local_mode: Option<LocalModeSettings>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub proxy_mode: Option<ProxyModeSettings>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub proxy_envs: Option<ProxyEnvs>,

    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl RegistrySettings {
    /// Narrow an opaque settings tree, dropping `imagesOverride`.
    ///
    /// A missing or `null` tree yields the default settings.
    ///
    /// # Errors
    ///
    /// Returns the deserialization error when a known key has the wrong shape.
    pub fn from_value(settings: Option<&Value>) -> Result<Self, serde_json::Error> {
        let mut tree = match settings {
            Some(Value::Null) | None => return Ok(Self::default()),
            Some(value) => value.clone(),
        };
        if let Value::Object(map) = &mut tree {
            map.remove(IMAGES_OVERRIDE_KEY);
        }
        serde_json::from_value(tree)
    }

    /// Narrow the settings of a `ModuleConfig`.
    ///
    /// # Errors
    ///
    /// See [`RegistrySettings::from_value`].
    pub fn from_module_config(mc: &ModuleConfig) -> Result<Self, serde_json::Error> {
        Self::from_value(mc.spec.settings.as_ref())
    }

    /// Serialize back into an opaque tree, unknown keys included.
    #[must_use]
    pub fn to_value(&self) -> Value {
        serde_json::to_value(self).unwrap_or(Value::Null)
    }

    /// `localMode` subtree is present and non-empty.
    #[must_use]
    pub fn local_defined(&self) -> bool {
        self.local_mode.as_ref().is_some_and(|local| !local.is_empty())
    }

    /// `proxyMode.upstream.host` is set.
    #[must_use]
    pub fn proxy_defined(&self) -> bool {
        self.proxy_mode
            .as_ref()
            .and_then(|proxy| proxy.upstream.as_ref())
            .is_some_and(|upstream| !upstream.host.is_empty())
    }

    /// Proxy environment, empty when not configured.
    #[must_use]
    pub fn proxy_envs(&self) -> ProxyEnvs {
        self.proxy_envs.clone().unwrap_or_default()
    }
}

/// Whether a `ModuleConfig` enables its module.
#[must_use]
pub fn is_enabled(mc: Option<&ModuleConfig>) -> bool {
    mc.and_then(|mc| mc.spec.enabled).unwrap_or(false)
}

#[cfg(test)]
#[path = "settings_tests.rs"]
mod settings_tests;
