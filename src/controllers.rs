// Copyright (c) 2026 sysreg contributors
// SPDX-License-Identifier: MIT

//! Controller wiring of the operator.
//!
//! - [`start_reflectors`] fills the shared `Node` and `ControlPlaneNode` stores;
//!   it runs on every replica so caches stay warm before leadership
//! - [`run_registry_controller`] drives [`reconcile_registry`], keyed on
//!   `ModuleConfig/system-registry`
//! - [`run_control_plane_node_controller`] drives
//!   [`reconcile_control_plane_node`], keyed on `Node`

use crate::constants::{
    CACHE_SYNC_TIMEOUT_SECS, CONTROLLER_DEBOUNCE_SECS, KIND_CONTROL_PLANE_NODE,
    KIND_MODULE_CONFIG, MAX_CONCURRENT_RECONCILES, REGISTRY_MODULE_CONFIG_NAME,
};
use crate::context::{Context, Stores};
use crate::crd::{ControlPlaneNode, ModuleConfig};
use crate::labels::REGISTRY_SECRETS_SELECTOR;
use crate::metrics;
use crate::reconcilers::control_plane_node::{all_master_nodes, nodes_for_secret};
use crate::reconcilers::{
    reconcile_control_plane_node, reconcile_registry, requeue_after_error, reset_backoff,
    ReconcileError,
};
use anyhow::{Context as _, Result};
use futures::StreamExt;
use k8s_openapi::api::core::v1::{Node, Secret};
use kube::runtime::controller::{self, Action};
use kube::runtime::reflector::{self, ObjectRef};
use kube::runtime::{watcher, Controller, WatchStreamExt};
use kube::{Api, Client, ResourceExt};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

fn controller_config() -> controller::Config {
    controller::Config::default()
        .concurrency(MAX_CONCURRENT_RECONCILES)
        .debounce(Duration::from_secs(CONTROLLER_DEBOUNCE_SECS))
}

/// Spawn reflectors for nodes and control-plane nodes and wait for their first sync.
///
/// # Errors
///
/// Returns an error if the caches do not sync within the cache sync timeout.
pub async fn start_reflectors(client: Client, shutdown: CancellationToken) -> Result<Stores> {
    let (nodes, node_writer) = reflector::store::<Node>();
    let node_stream = reflector::reflector(
        node_writer,
        watcher(Api::<Node>::all(client.clone()), watcher::Config::default()),
    )
    .default_backoff()
    .touched_objects()
    .for_each(|_| futures::future::ready(()));

    let (control_plane_nodes, cpn_writer) = reflector::store::<ControlPlaneNode>();
    let cpn_stream = reflector::reflector(
        cpn_writer,
        watcher(
            Api::<ControlPlaneNode>::all(client.clone()),
            watcher::Config::default(),
        ),
    )
    .default_backoff()
    .touched_objects()
    .for_each(|_| futures::future::ready(()));

    let token = shutdown.clone();
    tokio::spawn(async move {
        tokio::select! {
            () = node_stream => {}
            () = token.cancelled() => {}
        }
    });
    let token = shutdown;
    tokio::spawn(async move {
        tokio::select! {
            () = cpn_stream => {}
            () = token.cancelled() => {}
        }
    });

    let timeout = Duration::from_secs(CACHE_SYNC_TIMEOUT_SECS);
    let start = Instant::now();
    tokio::time::timeout(timeout, async {
        nodes.wait_until_ready().await?;
        control_plane_nodes.wait_until_ready().await
    })
    .await
    .context("Timed out waiting for caches to sync")?
    .context("Reflector stopped before caches synced")?;
    info!(elapsed_ms = start.elapsed().as_millis(), "Caches synced");

    Ok(Stores {
        nodes,
        control_plane_nodes,
    })
}

/// Run the registry controller until `shutdown` fires.
///
/// # Errors
///
/// Currently never fails; errors are requeued per key.
pub async fn run_registry_controller(ctx: Arc<Context>, shutdown: CancellationToken) -> Result<()> {
    info!("Starting registry controller");

    let client = ctx.client.clone();
    let settings = &ctx.settings;
    let module_configs = Api::<ModuleConfig>::all(client.clone());
    let secrets = Api::<Secret>::namespaced(client.clone(), &settings.registry_namespace);
    let nodes = Api::<Node>::all(client);
    let registry_key = || vec![ObjectRef::<ModuleConfig>::new(REGISTRY_MODULE_CONFIG_NAME)];

    Controller::new(
        module_configs,
        watcher::Config::default()
            .fields(&format!("metadata.name={REGISTRY_MODULE_CONFIG_NAME}")),
    )
    .with_config(controller_config())
    .watches(
        secrets,
        watcher::Config::default().labels(REGISTRY_SECRETS_SELECTOR),
        move |_secret| registry_key(),
    )
    .watches(nodes, watcher::Config::default(), move |_node| registry_key())
    .graceful_shutdown_on(shutdown.cancelled_owned())
    .run(reconcile_registry_wrapper, error_policy_registry, ctx)
    .for_each(|_| futures::future::ready(()))
    .await;

    info!("Registry controller stopped");
    Ok(())
}

/// Run the node services orchestrator until `shutdown` fires.
///
/// # Errors
///
/// Currently never fails; errors are requeued per key.
pub async fn run_control_plane_node_controller(
    ctx: Arc<Context>,
    shutdown: CancellationToken,
) -> Result<()> {
    info!("Starting ControlPlaneNode controller");

    let client = ctx.client.clone();
    let settings = ctx.settings.clone();
    let nodes = Api::<Node>::all(client.clone());
    let module_configs = Api::<ModuleConfig>::all(client.clone());
    let control_plane_nodes = Api::<ControlPlaneNode>::all(client.clone());

    let mut controller = Controller::new(nodes, watcher::Config::default())
        .with_config(controller_config());

    let mut secret_namespaces = vec![settings.control_plane_namespace.clone()];
    if settings.registry_namespace != settings.control_plane_namespace {
        secret_namespaces.push(settings.registry_namespace.clone());
    }
    for namespace in secret_namespaces {
        let secrets = Api::<Secret>::namespaced(client.clone(), &namespace);
        let stores = ctx.stores.clone();
        let settings = settings.clone();
        controller = controller.watches(secrets, watcher::Config::default(), move |secret| {
            nodes_for_secret(&secret, &settings, &stores)
        });
    }

    let stores = ctx.stores.clone();
    controller = controller.watches(
        module_configs,
        watcher::Config::default()
            .fields(&format!("metadata.name={REGISTRY_MODULE_CONFIG_NAME}")),
        move |_mc| all_master_nodes(&stores),
    );
    let stores = ctx.stores.clone();
    controller = controller.watches(
        control_plane_nodes,
        watcher::Config::default(),
        move |_cpn| all_master_nodes(&stores),
    );

    controller
        .graceful_shutdown_on(shutdown.cancelled_owned())
        .run(
            reconcile_control_plane_node_wrapper,
            error_policy_control_plane_node,
            ctx,
        )
        .for_each(|_| futures::future::ready(()))
        .await;

    info!("ControlPlaneNode controller stopped");
    Ok(())
}

/// Reconcile wrapper for `ModuleConfig/system-registry`
async fn reconcile_registry_wrapper(
    mc: Arc<ModuleConfig>,
    ctx: Arc<Context>,
) -> Result<Action, ReconcileError> {
    let start = Instant::now();
    let key = mc.name_any();
    debug!(module_config = %key, "Reconcile wrapper called for ModuleConfig");

    let result = reconcile_registry(ctx.clone(), mc).await;
    let duration = start.elapsed();

    match result {
        Ok(action) => {
            info!(module_config = %key, "Successfully reconciled registry");
            metrics::record_reconciliation_success(KIND_MODULE_CONFIG, duration);
            reset_backoff(&ctx, &key);
            Ok(action)
        }
        Err(e) => {
            error!(module_config = %key, "Failed to reconcile registry: {e:#}");
            metrics::record_reconciliation_error(KIND_MODULE_CONFIG, duration);
            metrics::record_error(KIND_MODULE_CONFIG, "reconcile");
            Err(e.into())
        }
    }
}

/// Reconcile wrapper for `Node`
async fn reconcile_control_plane_node_wrapper(
    node: Arc<Node>,
    ctx: Arc<Context>,
) -> Result<Action, ReconcileError> {
    let start = Instant::now();
    let key = node.name_any();

    let result = reconcile_control_plane_node(ctx.clone(), node).await;
    let duration = start.elapsed();

    match result {
        Ok(action) => {
            debug!(node = %key, "Successfully reconciled ControlPlaneNode");
            metrics::record_reconciliation_success(KIND_CONTROL_PLANE_NODE, duration);
            reset_backoff(&ctx, &key);
            Ok(action)
        }
        Err(e) => {
            error!(node = %key, "Failed to reconcile ControlPlaneNode: {e:#}");
            metrics::record_reconciliation_error(KIND_CONTROL_PLANE_NODE, duration);
            metrics::record_error(KIND_CONTROL_PLANE_NODE, "reconcile");
            Err(e.into())
        }
    }
}

/// Error policy for the registry controller
fn error_policy_registry(
    mc: Arc<ModuleConfig>,
    err: &ReconcileError,
    ctx: Arc<Context>,
) -> Action {
    requeue_after_error(&ctx, KIND_MODULE_CONFIG, &mc.name_any(), err)
}

/// Error policy for the ControlPlaneNode controller
fn error_policy_control_plane_node(
    node: Arc<Node>,
    err: &ReconcileError,
    ctx: Arc<Context>,
) -> Action {
    requeue_after_error(&ctx, KIND_CONTROL_PLANE_NODE, &node.name_any(), err)
}
