// Copyright (c) 2026 sysreg contributors
// SPDX-License-Identifier: MIT

//! Node-local agent of the embedded registry.
//!
//! Runs as a DaemonSet on control-plane nodes with the host filesystem mounted
//! at `--root-dir`.

use anyhow::Result;
use clap::Parser;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use sysreg::agent::files::NodePaths;
use sysreg::agent::{self, AgentSettings};
use sysreg::cli::{kube_client, required_env, KubeArgs, ServerArgs};
use sysreg::constants::{
    DEFAULT_AGENT_HEALTH_ADDRESS, DEFAULT_CONFIG_SECRET, DEFAULT_MANIFESTS_DIR, DEFAULT_PKI_DIR,
    DEFAULT_REGISTRY_NAMESPACE, SHUTDOWN_GRACE_SECS,
};
use sysreg::server::{health_router, metrics_router, serve, Readiness};
use sysreg::telemetry::init_logging;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

/// Embedded registry node agent.
#[derive(Parser, Debug)]
#[command(name = "sysreg-node-agent", version, about)]
struct Cli {
    /// Mount point of the host root filesystem
    #[arg(long, env = "ROOT_DIR", default_value = "/")]
    root_dir: PathBuf,

    /// PKI directory below the root
    #[arg(long, env = "PKI_DIR", default_value = DEFAULT_PKI_DIR)]
    pki_dir: PathBuf,

    /// Kubelet static pod manifest directory below the root
    #[arg(long, env = "MANIFESTS_DIR", default_value = DEFAULT_MANIFESTS_DIR)]
    manifests_dir: PathBuf,

    /// Namespace of the registry secrets
    #[arg(long, env = "REGISTRY_NAMESPACE", default_value = DEFAULT_REGISTRY_NAMESPACE)]
    registry_namespace: String,

    /// Namespace of the control-plane config secret
    #[arg(long, env = "CONTROL_PLANE_NAMESPACE", default_value = DEFAULT_REGISTRY_NAMESPACE)]
    control_plane_namespace: String,

    /// Control-plane config secret
    #[arg(long, env = "CONFIG_SECRET", default_value = DEFAULT_CONFIG_SECRET)]
    config_secret: String,

    /// Address of `/healthz` and `/readyz`
    #[arg(long = "server.health-address", env = "SERVER_HEALTH_ADDRESS", default_value = DEFAULT_AGENT_HEALTH_ADDRESS)]
    health_address: SocketAddr,

    #[command(flatten)]
    kube: KubeArgs,

    #[command(flatten)]
    server: ServerArgs,
}

impl Cli {
    fn paths(&self) -> NodePaths {
        NodePaths {
            pki_dir: self.pki_dir.clone(),
            manifests_dir: self.manifests_dir.clone(),
            ..NodePaths::new(&self.root_dir)
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.server.log_level.as_deref());

    let node_name = required_env("NODE_NAME")?;
    let pod_name = required_env("POD_NAME")?;
    let pod_namespace = required_env("POD_NAMESPACE")?;
    info!(node = %node_name, pod = %pod_name, namespace = %pod_namespace, "Starting node agent");

    let client = kube_client(cli.kube.kube_config.as_deref()).await?;
    let shutdown = CancellationToken::new();
    let signal_token = shutdown.clone();
    tokio::spawn(async move {
        let _ = tokio::signal::ctrl_c().await;
        info!("Received shutdown signal, stopping");
        signal_token.cancel();
    });
    #[cfg(unix)]
    {
        let signal_token = shutdown.clone();
        tokio::spawn(async move {
            use tokio::signal::unix::{signal, SignalKind};
            if let Ok(mut terminate) = signal(SignalKind::terminate()) {
                terminate.recv().await;
                info!("Received SIGTERM, stopping");
                signal_token.cancel();
            }
        });
    }

    let readiness = Readiness::new();
    let health = tokio::spawn(serve(
        cli.health_address,
        health_router(readiness.clone()),
        shutdown.clone(),
    ));
    let exporter = tokio::spawn(serve(
        cli.server.exporter_address,
        metrics_router(),
        shutdown.clone(),
    ));

    let settings = Arc::new(AgentSettings {
        node_name,
        control_plane_namespace: cli.control_plane_namespace.clone(),
        registry_namespace: cli.registry_namespace.clone(),
        config_secret: cli.config_secret.clone(),
        paths: cli.paths(),
    });

    let result = agent::run(client, settings, readiness, shutdown.clone()).await;
    if let Err(e) = &result {
        error!("CRITICAL: node agent stopped: {e:#}");
    }
    shutdown.cancel();

    let grace = Duration::from_secs(SHUTDOWN_GRACE_SECS);
    if tokio::time::timeout(grace, async {
        let _ = health.await;
        let _ = exporter.await;
    })
    .await
    .is_err()
    {
        warn!("HTTP servers did not stop within the grace period");
    }

    result
}
