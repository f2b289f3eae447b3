// Copyright (c) 2026 sysreg contributors
// SPDX-License-Identifier: MIT

//! Desired state of one master node.
//!
//! [`build_desired`] is a pure function of the control-plane secrets, the node
//! identity and, when the registry module is enabled, the narrowed settings and a
//! snapshot of the registry mirror. The orchestrator patches the cluster only when
//! its result differs from what is stored.

use super::{
    validate_proxy_envs, Images, LocalModeConfig, ModeConfig, NodeServicesConfig,
    ProxyModeConfig, Upstream,
};
use crate::checksum::{component_checksum, hot_reload_checksum, pki_checksum, SecretData};
use crate::constants::CONTROL_PLANE_COMPONENTS;
use crate::crd::{ComponentChecksums, ControlPlaneNodeSpec, NodeServicesRef};
use crate::errors::{ChecksumError, NodeServicesError};
use crate::registry::{node_services_secret_name, EmbeddedRegistry};
use crate::settings::RegistrySettings;
use crate::users::{RegistryUser, UserRole};

/// Control-plane secrets feeding the checksums.
#[derive(Clone, Copy, Debug)]
pub struct ControlPlaneInputs<'a> {
    pub config: &'a SecretData,
    pub config_resource_version: &'a str,
    pub pki: &'a SecretData,
    pub pki_resource_version: &'a str,
}

/// Registry inputs, present only when the registry module is enabled.
#[derive(Clone, Copy, Debug)]
pub struct RegistryInputs<'a> {
    pub settings: &'a RegistrySettings,
    pub registry: &'a EmbeddedRegistry,
    pub images: &'a Images,
}

/// Desired `ControlPlaneNode` spec plus the node services payload it references.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DesiredNode {
    pub spec: ControlPlaneNodeSpec,
    pub node_services: Option<NodeServicesConfig>,
}

/// `"<configResourceVersion>.<pkiResourceVersion>"`
#[must_use]
pub fn config_version(config_resource_version: &str, pki_resource_version: &str) -> String {
    format!("{config_resource_version}.{pki_resource_version}")
}

fn invalid(node: &str) -> impl Fn(ChecksumError) -> NodeServicesError + '_ {
    move |e| NodeServicesError::InvalidConfiguration {
        node: node.to_string(),
        reason: e.to_string(),
    }
}

/// Build the desired state of `node_name`.
///
/// # Errors
///
/// Returns a [`NodeServicesError`] when an input is missing or the registry
/// settings are invalid. These errors are terminal for the reconcile.
pub fn build_desired(
    node_name: &str,
    node_ip: &str,
    control_plane: &ControlPlaneInputs<'_>,
    registry: Option<&RegistryInputs<'_>>,
) -> Result<DesiredNode, NodeServicesError> {
    let pki_checksum = pki_checksum(control_plane.pki).map_err(invalid(node_name))?;

    let mut components = ComponentChecksums::default();
    for component in CONTROL_PLANE_COMPONENTS {
        let checksum =
            component_checksum(control_plane.config, component).map_err(invalid(node_name))?;
        components.set(component, checksum);
    }

    let node_services = registry
        .map(|inputs| build_node_services(node_name, node_ip, inputs))
        .transpose()?;
    let node_services_ref = node_services
        .as_ref()
        .map(|config| {
            config.version().map(|version| NodeServicesRef {
                mode: config.registry_mode(),
                version,
                secret_name: node_services_secret_name(node_name),
            })
        })
        .transpose()
        .map_err(|e| NodeServicesError::InvalidConfiguration {
            node: node_name.to_string(),
            reason: e.to_string(),
        })?;

    Ok(DesiredNode {
        spec: ControlPlaneNodeSpec {
            pki_checksum,
            config_version: config_version(
                control_plane.config_resource_version,
                control_plane.pki_resource_version,
            ),
            hot_reload_checksum: hot_reload_checksum(control_plane.config),
            components,
            node_services: node_services_ref,
        },
        node_services,
    })
}

fn require_user(
    registry: &EmbeddedRegistry,
    node: &str,
    role: UserRole,
) -> Result<RegistryUser, NodeServicesError> {
    registry
        .user(role)
        .cloned()
        .ok_or_else(|| NodeServicesError::MissingInput {
            node: node.to_string(),
            input: format!("registry user {}", role.as_str()),
        })
}

/// Build the node services payload of `node_name`.
///
/// # Errors
///
/// - [`NodeServicesError::NoProxyWithoutProxy`] for an invalid proxy environment
/// - [`NodeServicesError::ModeAmbiguous`] / [`NodeServicesError::ModeUndefined`]
///   when not exactly one mode is configured
/// - [`NodeServicesError::MissingInput`] when the mirror lacks material for the node
pub fn build_node_services(
    node_name: &str,
    node_ip: &str,
    inputs: &RegistryInputs<'_>,
) -> Result<NodeServicesConfig, NodeServicesError> {
    let settings = inputs.settings;
    let registry = inputs.registry;

    let proxy_envs = settings.proxy_envs();
    validate_proxy_envs(&proxy_envs)?;

    let missing = |input: &str| NodeServicesError::MissingInput {
        node: node_name.to_string(),
        input: input.to_string(),
    };

    let mode = match (settings.local_defined(), settings.proxy_defined()) {
        (true, true) => return Err(NodeServicesError::ModeAmbiguous),
        (false, false) => return Err(NodeServicesError::ModeUndefined),
        (true, false) => {
            let local = settings.local_mode.clone().unwrap_or_default();
            ModeConfig::Local(LocalModeConfig {
                ingress_client_ca: local.ingress_client_ca,
                user_rw: require_user(registry, node_name, UserRole::ReadWrite)?,
                user_puller: require_user(registry, node_name, UserRole::MirrorPuller)?,
                user_pusher: require_user(registry, node_name, UserRole::MirrorPusher)?,
                upstream_mirrors: local.upstream_mirrors,
            })
        }
        (false, true) => {
            let proxy = settings.proxy_mode.clone().unwrap_or_default();
            let upstream = proxy.upstream.unwrap_or_default();
            ModeConfig::Proxy(ProxyModeConfig {
                upstream: Upstream {
                    scheme: upstream.scheme,
                    host: upstream.host,
                    path: upstream.path,
                    user: upstream.user,
                    password: upstream.password,
                    ttl: upstream.ttl,
                },
                upstream_ca: proxy.upstream_ca,
                proxy_envs,
            })
        }
    };

    let ca = registry.ca.as_ref().ok_or_else(|| missing("registry CA"))?;
    let node = registry
        .nodes
        .get(node_name)
        .ok_or_else(|| missing("node PKI"))?;
    let http_secret = registry
        .http_secret
        .clone()
        .ok_or_else(|| missing("HTTP secret"))?;

    Ok(NodeServicesConfig {
        node_name: node_name.to_string(),
        node_ip: node_ip.to_string(),
        images: inputs.images.clone(),
        ca: ca.ca.cert_pem.clone(),
        auth: node.pki.auth.clone(),
        distribution: node.pki.distribution.clone(),
        token: ca.token.clone(),
        http_secret,
        user_ro: require_user(registry, node_name, UserRole::ReadOnly)?,
        mode,
    })
}

#[cfg(test)]
#[path = "desired_tests.rs"]
mod desired_tests;
