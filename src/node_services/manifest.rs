// Copyright (c) 2026 sysreg contributors
// SPDX-License-Identifier: MIT

//! Static pod rendering for the registry node services.
//!
//! The registry runs as a kubelet static pod with up to three containers:
//!
//! - **distribution** - the registry itself, TLS with the node distribution certificate
//! - **auth** - token service, TLS with the node auth certificate
//! - **mirrorer** - local mode only, when upstream mirrors are configured
//!
//! Proxy environment variables are set on the distribution container in proxy
//! mode only. The pod carries the node services version as an annotation so the
//! kubelet restarts it whenever the payload changes.

use super::{files, LocalModeConfig, ModeConfig, NodeServicesConfig};
use crate::constants::{
    AUTH_CONFIG_FILE, AUTH_PORT, CONFIG_MOUNT_PATH, DATA_MOUNT_PATH, DEFAULT_REGISTRY_NAMESPACE,
    DISTRIBUTION_CONFIG_FILE, DISTRIBUTION_PORT, MIRRORER_CONFIG_FILE,
    NODE_SERVICES_VERSION_ANNOTATION, PKI_MOUNT_PATH, REGISTRY_DATA_HOST_DIR, STATIC_POD_NAME,
    TOKEN_EXPIRATION_SECS, TOKEN_ISSUER, TOKEN_SERVICE,
};
use crate::users::RegistryUser;
use k8s_openapi::api::core::v1::{
    Container, ContainerPort, EnvVar, HostPathVolumeSource, Pod, PodSpec, Volume, VolumeMount,
};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use serde_json::{json, Value};
use std::collections::BTreeMap;

const CONTAINER_DISTRIBUTION: &str = "distribution";
const CONTAINER_AUTH: &str = "auth";
const CONTAINER_MIRRORER: &str = "mirrorer";
const VOLUME_PKI: &str = "pki";
const VOLUME_CONFIG: &str = "config";
const VOLUME_DATA: &str = "data";

/// Host directories mounted into the static pod.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct HostPaths {
    /// Absolute host path of the PKI directory
    pub pki_dir: String,
    /// Absolute host path of the services configuration directory
    pub config_dir: String,
}

/// Everything the node agent writes for one payload.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RenderedServices {
    /// Static pod manifest (YAML)
    pub manifest: String,
    /// Service configuration files keyed by file name
    pub config_files: BTreeMap<&'static str, String>,
}

/// Render the static pod manifest and the service configuration files.
///
/// # Errors
///
/// Returns the YAML serialization error.
pub fn render(
    config: &NodeServicesConfig,
    version: &str,
    paths: &HostPaths,
) -> Result<RenderedServices, serde_yaml::Error> {
    let mut config_files = BTreeMap::from([
        (
            DISTRIBUTION_CONFIG_FILE,
            serde_yaml::to_string(&build_distribution_config(config))?,
        ),
        (
            AUTH_CONFIG_FILE,
            serde_yaml::to_string(&build_auth_config(config))?,
        ),
    ]);
    if let Some(local) = mirrorer_enabled(config) {
        config_files.insert(
            MIRRORER_CONFIG_FILE,
            serde_yaml::to_string(&build_mirrorer_config(config, local))?,
        );
    }
    Ok(RenderedServices {
        manifest: serde_yaml::to_string(&build_static_pod(config, version, paths))?,
        config_files,
    })
}

fn mirrorer_enabled(config: &NodeServicesConfig) -> Option<&LocalModeConfig> {
    match &config.mode {
        ModeConfig::Local(local) if !local.upstream_mirrors.is_empty() => Some(local),
        _ => None,
    }
}

fn pki_path(file: &str) -> String {
    format!("{PKI_MOUNT_PATH}/{file}")
}

fn config_path(file: &str) -> String {
    format!("{CONFIG_MOUNT_PATH}/{file}")
}

/// Distribution configuration.
#[must_use]
pub fn build_distribution_config(config: &NodeServicesConfig) -> Value {
    let mut value = json!({
        "version": 0.1,
        "log": {"level": "info"},
        "storage": {
            "filesystem": {"rootdirectory": DATA_MOUNT_PATH},
            "delete": {"enabled": true},
        },
        "http": {
            "addr": format!("{}:{DISTRIBUTION_PORT}", config.node_ip),
            "prefix": "/",
            "secret": config.http_secret,
            "tls": {
                "certificate": pki_path(files::DISTRIBUTION_CERT),
                "key": pki_path(files::DISTRIBUTION_KEY),
            },
        },
        "auth": {
            "token": {
                "realm": format!("https://{}:{AUTH_PORT}/auth", config.node_ip),
                "service": TOKEN_SERVICE,
                "issuer": TOKEN_ISSUER,
                "rootcertbundle": pki_path(files::TOKEN_CERT),
                "autoredirect": false,
            },
        },
    });
    if let ModeConfig::Proxy(proxy) = &config.mode {
        let mut remote = json!({
            "remoteurl": proxy.upstream.remote_url(),
            "username": proxy.upstream.user,
            "password": proxy.upstream.password,
        });
        if let Some(ttl) = &proxy.upstream.ttl {
            remote["ttl"] = json!(ttl);
        }
        value["proxy"] = remote;
    }
    value
}

fn acl_entry(user: &RegistryUser, actions: &[&str]) -> Value {
    json!({"match": {"account": user.name}, "actions": actions})
}

/// Auth service configuration: users with bcrypt hashes and their ACL.
#[must_use]
pub fn build_auth_config(config: &NodeServicesConfig) -> Value {
    let mut users = serde_json::Map::new();
    let mut acl = vec![acl_entry(&config.user_ro, &["pull"])];
    users.insert(
        config.user_ro.name.clone(),
        json!({"password": config.user_ro.password_hash}),
    );
    if let ModeConfig::Local(local) = &config.mode {
        for (user, actions) in [
            (&local.user_rw, &["*"][..]),
            (&local.user_puller, &["pull"][..]),
            (&local.user_pusher, &["pull", "push"][..]),
        ] {
            users.insert(user.name.clone(), json!({"password": user.password_hash}));
            acl.push(acl_entry(user, actions));
        }
    }
    json!({
        "server": {
            "addr": format!("{}:{AUTH_PORT}", config.node_ip),
            "certificate": pki_path(files::AUTH_CERT),
            "key": pki_path(files::AUTH_KEY),
        },
        "token": {
            "issuer": TOKEN_ISSUER,
            "expiration": TOKEN_EXPIRATION_SECS,
            "certificate": pki_path(files::TOKEN_CERT),
            "key": pki_path(files::TOKEN_KEY),
        },
        "users": users,
        "acl": acl,
    })
}

/// Mirrorer configuration (local mode).
#[must_use]
pub fn build_mirrorer_config(config: &NodeServicesConfig, local: &LocalModeConfig) -> Value {
    json!({
        "local": {
            "address": format!("{}:{DISTRIBUTION_PORT}", config.node_ip),
            "ca": pki_path(files::CA_CERT),
        },
        "users": {
            "puller": {"name": local.user_puller.name, "password": local.user_puller.password},
            "pusher": {"name": local.user_pusher.name, "password": local.user_pusher.password},
        },
        "sources": local.upstream_mirrors,
    })
}

fn env(name: &str, value: &str) -> EnvVar {
    EnvVar {
        name: name.into(),
        value: Some(value.into()),
        ..Default::default()
    }
}

fn proxy_env(config: &NodeServicesConfig) -> Option<Vec<EnvVar>> {
    let ModeConfig::Proxy(proxy) = &config.mode else {
        return None;
    };
    let envs = &proxy.proxy_envs;
    let mut out = Vec::new();
    for (names, value) in [
        (["HTTP_PROXY", "http_proxy"], &envs.http),
        (["HTTPS_PROXY", "https_proxy"], &envs.https),
        (["NO_PROXY", "no_proxy"], &envs.no_proxy),
    ] {
        if !value.is_empty() {
            out.extend(names.iter().map(|name| env(name, value)));
        }
    }
    (!out.is_empty()).then_some(out)
}

fn pki_mount() -> VolumeMount {
    VolumeMount {
        name: VOLUME_PKI.into(),
        mount_path: PKI_MOUNT_PATH.into(),
        read_only: Some(true),
        ..Default::default()
    }
}

fn config_mount() -> VolumeMount {
    VolumeMount {
        name: VOLUME_CONFIG.into(),
        mount_path: CONFIG_MOUNT_PATH.into(),
        read_only: Some(true),
        ..Default::default()
    }
}

fn host_volume(name: &str, path: &str, kind: &str) -> Volume {
    Volume {
        name: name.into(),
        host_path: Some(HostPathVolumeSource {
            path: path.into(),
            type_: Some(kind.into()),
        }),
        ..Default::default()
    }
}

fn build_containers(config: &NodeServicesConfig) -> Vec<Container> {
    let distribution = Container {
        name: CONTAINER_DISTRIBUTION.into(),
        image: Some(config.images.distribution.clone()),
        image_pull_policy: Some("IfNotPresent".into()),
        args: Some(vec![
            "serve".into(),
            config_path(DISTRIBUTION_CONFIG_FILE),
        ]),
        ports: Some(vec![ContainerPort {
            name: Some("distribution".into()),
            container_port: i32::from(DISTRIBUTION_PORT),
            protocol: Some("TCP".into()),
            ..Default::default()
        }]),
        env: proxy_env(config),
        volume_mounts: Some(vec![
            pki_mount(),
            config_mount(),
            VolumeMount {
                name: VOLUME_DATA.into(),
                mount_path: DATA_MOUNT_PATH.into(),
                ..Default::default()
            },
        ]),
        ..Default::default()
    };

    let auth = Container {
        name: CONTAINER_AUTH.into(),
        image: Some(config.images.auth.clone()),
        image_pull_policy: Some("IfNotPresent".into()),
        args: Some(vec!["-logtostderr".into(), config_path(AUTH_CONFIG_FILE)]),
        ports: Some(vec![ContainerPort {
            name: Some("auth".into()),
            container_port: i32::from(AUTH_PORT),
            protocol: Some("TCP".into()),
            ..Default::default()
        }]),
        volume_mounts: Some(vec![pki_mount(), config_mount()]),
        ..Default::default()
    };

    let mut containers = vec![distribution, auth];
    if mirrorer_enabled(config).is_some() {
        containers.push(Container {
            name: CONTAINER_MIRRORER.into(),
            image: Some(config.images.mirrorer.clone()),
            image_pull_policy: Some("IfNotPresent".into()),
            args: Some(vec![
                "--config".into(),
                config_path(MIRRORER_CONFIG_FILE),
            ]),
            volume_mounts: Some(vec![pki_mount(), config_mount()]),
            ..Default::default()
        });
    }
    containers
}

/// Build the registry static pod.
#[must_use]
pub fn build_static_pod(config: &NodeServicesConfig, version: &str, paths: &HostPaths) -> Pod {
    Pod {
        metadata: ObjectMeta {
            name: Some(STATIC_POD_NAME.into()),
            namespace: Some(DEFAULT_REGISTRY_NAMESPACE.into()),
            labels: Some(BTreeMap::from([
                ("component".to_string(), STATIC_POD_NAME.to_string()),
                ("tier".to_string(), "control-plane".to_string()),
            ])),
            annotations: Some(BTreeMap::from([(
                NODE_SERVICES_VERSION_ANNOTATION.to_string(),
                version.to_string(),
            )])),
            ..Default::default()
        },
        spec: Some(PodSpec {
            containers: build_containers(config),
            host_network: Some(true),
            dns_policy: Some("ClusterFirstWithHostNet".into()),
            priority_class_name: Some("system-node-critical".into()),
            volumes: Some(vec![
                host_volume(VOLUME_PKI, &paths.pki_dir, "Directory"),
                host_volume(VOLUME_CONFIG, &paths.config_dir, "Directory"),
                host_volume(VOLUME_DATA, REGISTRY_DATA_HOST_DIR, "DirectoryOrCreate"),
            ]),
            ..Default::default()
        }),
        ..Default::default()
    }
}

#[cfg(test)]
#[path = "manifest_tests.rs"]
mod manifest_tests;
