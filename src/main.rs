// Copyright (c) 2026 sysreg contributors
// SPDX-License-Identifier: MIT

use anyhow::Result;
use clap::Parser;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use sysreg::{
    cli::{kube_client, KubeArgs, ServerArgs},
    constants::{
        DEFAULT_CONFIG_SECRET, DEFAULT_HEALTH_ADDRESS, DEFAULT_LEASE_NAME, DEFAULT_PKI_SECRET,
        DEFAULT_REGISTRY_NAMESPACE, SHUTDOWN_GRACE_SECS, TOKIO_WORKER_THREADS,
    },
    context::{Context, OperatorSettings},
    controllers::{run_control_plane_node_controller, run_registry_controller, start_reflectors},
    leader::{run_leader_elected, LeaderElectionConfig},
    migrations::migrate_standard_field,
    node_services::Images,
    reconcilers::retry::RateLimiter,
    registry::EmbeddedRegistry,
    server::{health_router, metrics_router, serve, Readiness},
    telemetry::init_logging,
};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Embedded registry control plane operator.
#[derive(Parser, Debug)]
#[command(name = "sysreg", version, about)]
struct Cli {
    /// Namespace of the registry secrets
    #[arg(long, env = "REGISTRY_NAMESPACE", default_value = DEFAULT_REGISTRY_NAMESPACE)]
    registry_namespace: String,

    /// Namespace of the control-plane config and PKI secrets
    #[arg(long, env = "CONTROL_PLANE_NAMESPACE", default_value = DEFAULT_REGISTRY_NAMESPACE)]
    control_plane_namespace: String,

    /// Control-plane config secret
    #[arg(long, env = "CONFIG_SECRET", default_value = DEFAULT_CONFIG_SECRET)]
    config_secret: String,

    /// Control-plane PKI secret
    #[arg(long, env = "PKI_SECRET", default_value = DEFAULT_PKI_SECRET)]
    pki_secret: String,

    /// Address of `/healthz` and `/readyz`
    #[arg(long = "server.health-address", env = "SERVER_HEALTH_ADDRESS", default_value = DEFAULT_HEALTH_ADDRESS)]
    health_address: SocketAddr,

    /// Namespace of the leader election lease; defaults to the pod namespace
    #[arg(long, env = "POD_NAMESPACE", default_value = DEFAULT_REGISTRY_NAMESPACE)]
    leader_election_namespace: String,

    /// Name of the leader election lease
    #[arg(long, env = "LEASE_NAME", default_value = DEFAULT_LEASE_NAME)]
    lease_name: String,

    /// Leader election identity
    #[arg(long, env = "POD_NAME")]
    pod_name: Option<String>,

    /// Module whose cluster configuration secret gets the `standard:` migration
    #[arg(long, env = "CLUSTER_CONFIGURATION_MODULE")]
    cluster_configuration_module: Option<String>,

    /// Hoist the legacy `standard:` section of the cluster configuration
    #[arg(long, env = "MIGRATE_STANDARD_FIELD", default_value_t = true, action = clap::ArgAction::Set)]
    migrate_standard_field: bool,

    /// Distribution image of the registry static pod
    #[arg(long, env = "IMAGE_DISTRIBUTION", default_value = "")]
    image_distribution: String,

    /// Auth image of the registry static pod
    #[arg(long, env = "IMAGE_AUTH", default_value = "")]
    image_auth: String,

    /// Mirrorer image of the registry static pod
    #[arg(long, env = "IMAGE_MIRRORER", default_value = "")]
    image_mirrorer: String,

    #[command(flatten)]
    kube: KubeArgs,

    #[command(flatten)]
    server: ServerArgs,
}

impl Cli {
    fn operator_settings(&self) -> OperatorSettings {
        OperatorSettings {
            registry_namespace: self.registry_namespace.clone(),
            control_plane_namespace: self.control_plane_namespace.clone(),
            config_secret: self.config_secret.clone(),
            pki_secret: self.pki_secret.clone(),
            images: Images {
                distribution: self.image_distribution.clone(),
                auth: self.image_auth.clone(),
                mirrorer: self.image_mirrorer.clone(),
            },
        }
    }

    fn identity(&self) -> String {
        self.pod_name
            .clone()
            .unwrap_or_else(|| format!("sysreg-{}", sysreg::users::random_string(8)))
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .worker_threads(TOKIO_WORKER_THREADS)
        .thread_name("sysreg-operator")
        .enable_all()
        .build()?;

    runtime.block_on(async_main(cli))
}

async fn async_main(cli: Cli) -> Result<()> {
    init_logging(cli.server.log_level.as_deref());

    info!("Starting embedded registry operator");
    debug!(?cli, "Parsed command line");

    let client = kube_client(cli.kube.kube_config.as_deref()).await?;
    let shutdown = CancellationToken::new();
    spawn_signal_handler(shutdown.clone());

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

    let stores = match start_reflectors(client.clone(), shutdown.clone()).await {
        Ok(stores) => stores,
        Err(e) => {
            error!("CRITICAL: {e:#}");
            shutdown.cancel();
            return Err(e);
        }
    };
    readiness.set_ready(true);

    let context = Arc::new(Context {
        client: client.clone(),
        stores,
        settings: cli.operator_settings(),
        registry: EmbeddedRegistry::shared(),
        rate_limiter: Arc::new(RateLimiter::default()),
    });

    let election = LeaderElectionConfig {
        lease_name: cli.lease_name.clone(),
        ..LeaderElectionConfig::new(&cli.leader_election_namespace, &cli.identity())
    };
    let migration = cli
        .migrate_standard_field
        .then(|| cli.cluster_configuration_module.clone())
        .flatten();

    let result = run_leader_elected(client.clone(), election, shutdown.clone(), |token| {
        run_as_leader(context, migration, token)
    })
    .await;

    if let Err(e) = &result {
        error!("CRITICAL: operator stopped: {e:#}");
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

    info!("Operator stopped");
    result
}

/// Work of the elected leader: the one-shot migration, then both controllers.
async fn run_as_leader(
    context: Arc<Context>,
    migration_module: Option<String>,
    shutdown: CancellationToken,
) -> Result<()> {
    if let Some(module) = migration_module {
        if let Err(e) = migrate_standard_field(&context.client, &module).await {
            warn!(module = %module, "Cluster configuration migration failed: {e:#}");
        }
    }

    let orchestrator_context = Arc::new(context.with_own_rate_limiter());

    let stopped_by_shutdown = tokio::select! {
        result = run_registry_controller(context, shutdown.clone()) => {
            result?;
            shutdown.is_cancelled()
        }
        result = run_control_plane_node_controller(orchestrator_context, shutdown.clone()) => {
            result?;
            shutdown.is_cancelled()
        }
    };
    shutdown.cancel();

    if stopped_by_shutdown {
        Ok(())
    } else {
        anyhow::bail!("Controller exited unexpectedly")
    }
}

fn spawn_signal_handler(shutdown: CancellationToken) {
    tokio::spawn(async move {
        wait_for_signal().await;
        info!("Received shutdown signal, stopping");
        shutdown.cancel();
    });
}

#[cfg(unix)]
async fn wait_for_signal() {
    use tokio::signal::unix::{signal, SignalKind};

    let Ok(mut terminate) = signal(SignalKind::terminate()) else {
        let _ = tokio::signal::ctrl_c().await;
        return;
    };
    tokio::select! {
        _ = tokio::signal::ctrl_c() => {}
        _ = terminate.recv() => {}
    }
}

#[cfg(not(unix))]
async fn wait_for_signal() {
    let _ = tokio::signal::ctrl_c().await;
}
