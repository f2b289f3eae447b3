// Copyright (c) 2026 sysreg contributors
// SPDX-License-Identifier: MIT

//! Command-line arguments shared by the binaries and Kubernetes client loading.

use anyhow::{Context as _, Result};
use clap::Args;
use kube::config::{KubeConfigOptions, Kubeconfig};
use kube::{Client, Config};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};

/// Kubernetes connection options.
#[derive(Args, Clone, Debug, Default)]
pub struct KubeArgs {
    /// Path to a kubeconfig file; in-cluster or default config when unset
    #[arg(long = "kube.config", env = "KUBECONFIG")]
    pub kube_config: Option<PathBuf>,
}

/// Logging and metrics options.
#[derive(Args, Clone, Debug)]
pub struct ServerArgs {
    /// Address of the Prometheus metrics endpoint
    #[arg(
        long = "server.exporter-address",
        env = "SERVER_EXPORTER_ADDRESS",
        default_value = crate::constants::DEFAULT_METRICS_ADDRESS
    )]
    pub exporter_address: SocketAddr,

    /// Default log filter when `RUST_LOG` is unset
    #[arg(long = "server.log-level", env = "SERVER_LOG_LEVEL")]
    pub log_level: Option<String>,
}

/// Build a Kubernetes client from `kubeconfig`, or from the environment.
///
/// # Errors
///
/// Returns an error when the kubeconfig cannot be read or no configuration
/// is available.
pub async fn kube_client(kubeconfig: Option<&Path>) -> Result<Client> {
    let Some(path) = kubeconfig else {
        return Client::try_default()
            .await
            .context("Failed to create Kubernetes client");
    };

    let kubeconfig = Kubeconfig::read_from(path)
        .with_context(|| format!("Failed to read kubeconfig {}", path.display()))?;
    let config = Config::from_custom_kubeconfig(kubeconfig, &KubeConfigOptions::default())
        .await
        .with_context(|| format!("Invalid kubeconfig {}", path.display()))?;
    Client::try_from(config).context("Failed to create Kubernetes client")
}

/// Value of a required environment variable.
///
/// # Errors
///
/// Returns an error when the variable is unset or empty.
pub fn required_env(name: &str) -> Result<String> {
    std::env::var(name)
        .ok()
        .filter(|value| !value.is_empty())
        .with_context(|| format!("Environment variable {name} must be set"))
}
