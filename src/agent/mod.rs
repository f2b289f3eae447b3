// Copyright (c) 2026 sysreg contributors
// SPDX-License-Identifier: MIT

//! Node-local agent.
//!
//! Runs on every control-plane node, watches the node's own `ControlPlaneNode`
//! and applies it whenever `configVersion` or the node services version moves:
//!
//! 1. sync the control-plane config secret into `etc/kubernetes/deckhouse`
//! 2. write the registry PKI, service configuration and static pod, or remove
//!    them when the registry is disabled
//! 3. report the `Ready` condition and the observed versions in the status
//!
//! A failed apply is retried on a fixed interval until it succeeds or the spec
//! moves on.

pub mod files;

use crate::checksum::sha256_hex;
use crate::constants::{AGENT_RETRY_INTERVAL_SECS, NODE_SERVICES_PAYLOAD_KEY};
use crate::crd::{ControlPlaneNode, ControlPlaneNodeSpec, NodeServicesRef};
use crate::errors::AgentError;
use crate::node_services::NodeServicesConfig;
use crate::reconcilers::resources::{get_secret, secret_data};
use crate::reconcilers::status::ControlPlaneNodeStatusUpdater;
use crate::server::Readiness;
use crate::status_reasons::{
    CONDITION_TYPE_READY, REASON_APPLIED, REASON_APPLY_FAILED, STATUS_FALSE, STATUS_TRUE,
};
use anyhow::{Context as _, Result};
use files::{FileChanges, NodePaths};
use futures::StreamExt;
use k8s_openapi::api::core::v1::Secret;
use kube::runtime::{watcher, WatchStreamExt};
use kube::{Api, Client};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Agent configuration.
#[derive(Clone, Debug)]
pub struct AgentSettings {
    pub node_name: String,
    pub control_plane_namespace: String,
    pub registry_namespace: String,
    pub config_secret: String,
    pub paths: NodePaths,
}

/// Versions of the last successful apply.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct AppliedVersions {
    pub config_version: Option<String>,
    pub services_version: Option<String>,
}

impl AppliedVersions {
    #[must_use]
    pub fn from_spec(spec: &ControlPlaneNodeSpec) -> Self {
        Self {
            config_version: Some(spec.config_version.clone()),
            services_version: spec.node_services.as_ref().map(|s| s.version.clone()),
        }
    }

    /// Whether `spec` is already applied.
    #[must_use]
    pub fn matches(&self, spec: &ControlPlaneNodeSpec) -> bool {
        *self == Self::from_spec(spec)
    }
}

/// Decode and verify the node services payload published for `node`.
///
/// # Errors
///
/// Returns [`AgentError::InvalidPayload`] when the payload is missing, lags
/// behind `reference.version`, or belongs to another node.
pub fn decode_payload(
    secret: &Secret,
    reference: &NodeServicesRef,
    node: &str,
) -> Result<NodeServicesConfig, AgentError> {
    let invalid = |reason: String| AgentError::InvalidPayload { reason };

    let payload = secret
        .data
        .as_ref()
        .and_then(|data| data.get(NODE_SERVICES_PAYLOAD_KEY))
        .ok_or_else(|| {
            invalid(format!(
                "secret {} has no key {NODE_SERVICES_PAYLOAD_KEY}",
                reference.secret_name
            ))
        })?;

    let version = sha256_hex(&payload.0);
    if version != reference.version {
        return Err(invalid(format!(
            "secret {} is at version {version}, expected {}",
            reference.secret_name, reference.version
        )));
    }

    let payload = std::str::from_utf8(&payload.0).map_err(|e| invalid(e.to_string()))?;
    let config = NodeServicesConfig::from_payload(payload).map_err(|e| invalid(e.to_string()))?;
    if config.node_name != node {
        return Err(invalid(format!(
            "payload belongs to node {}, not {node}",
            config.node_name
        )));
    }
    Ok(config)
}

async fn blocking<F>(task: F) -> Result<FileChanges>
where
    F: FnOnce() -> Result<FileChanges, AgentError> + Send + 'static,
{
    let changes = tokio::task::spawn_blocking(task)
        .await
        .context("File task panicked")??;
    Ok(changes)
}

/// Apply `cpn` to the local filesystem.
///
/// # Errors
///
/// Returns an error when an input secret is missing or invalid, or a file
/// operation fails.
pub async fn apply_control_plane_node(
    client: &Client,
    settings: &AgentSettings,
    cpn: &ControlPlaneNode,
) -> Result<FileChanges> {
    let config_secret = get_secret(
        client,
        &settings.control_plane_namespace,
        &settings.config_secret,
    )
    .await?
    .with_context(|| {
        format!(
            "Config secret {}/{} not found",
            settings.control_plane_namespace, settings.config_secret
        )
    })?;
    let data = secret_data(&config_secret);
    let paths = settings.paths.clone();
    let mut changes = blocking(move || files::sync_control_plane_config(&paths, &data)).await?;

    let paths = settings.paths.clone();
    let services = match &cpn.spec.node_services {
        Some(reference) => {
            let secret = get_secret(client, &settings.registry_namespace, &reference.secret_name)
                .await?
                .with_context(|| {
                    format!(
                        "Node services secret {}/{} not found",
                        settings.registry_namespace, reference.secret_name
                    )
                })?;
            let config = decode_payload(&secret, reference, &settings.node_name)?;
            let version = reference.version.clone();
            blocking(move || files::apply_node_services(&paths, &config, &version)).await?
        }
        None => blocking(move || files::remove_node_services(&paths)).await?,
    };
    changes.written.extend(services.written);
    changes.removed.extend(services.removed);

    Ok(changes)
}

fn applied_message(spec: &ControlPlaneNodeSpec) -> String {
    match &spec.node_services {
        Some(services) => format!(
            "Applied configuration {} with {} registry",
            spec.config_version, services.mode
        ),
        None => format!(
            "Applied configuration {} without registry",
            spec.config_version
        ),
    }
}

async fn report_applied(client: &Client, cpn: &ControlPlaneNode) -> Result<()> {
    let mut updater = ControlPlaneNodeStatusUpdater::new(cpn);
    updater.set_applied(
        &cpn.spec.config_version,
        cpn.spec.node_services.as_ref().map(|s| s.version.as_str()),
    );
    updater.set_condition(
        CONDITION_TYPE_READY,
        STATUS_TRUE,
        REASON_APPLIED,
        &applied_message(&cpn.spec),
    );
    updater.apply(client).await
}

async fn report_failure(client: &Client, cpn: &ControlPlaneNode, err: &anyhow::Error) -> Result<()> {
    let mut updater = ControlPlaneNodeStatusUpdater::new(cpn);
    updater.set_not_ready();
    updater.set_condition(
        CONDITION_TYPE_READY,
        STATUS_FALSE,
        REASON_APPLY_FAILED,
        &format!("{err:#}"),
    );
    updater.apply(client).await
}

/// Watch the node's `ControlPlaneNode` and apply it until `shutdown` fires.
///
/// `readiness` turns true after the first successful apply.
///
/// # Errors
///
/// Returns an error if the watch stream ends.
pub async fn run(
    client: Client,
    settings: Arc<AgentSettings>,
    readiness: Readiness,
    shutdown: CancellationToken,
) -> Result<()> {
    info!(node = %settings.node_name, "Starting node agent");

    let api: Api<ControlPlaneNode> = Api::all(client.clone());
    let config =
        watcher::Config::default().fields(&format!("metadata.name={}", settings.node_name));
    let mut events = watcher(api, config)
        .default_backoff()
        .applied_objects()
        .boxed();

    let mut applied = AppliedVersions::default();
    let mut pending: Option<ControlPlaneNode> = None;
    let mut retry = tokio::time::interval(Duration::from_secs(AGENT_RETRY_INTERVAL_SECS));
    retry.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            () = shutdown.cancelled() => break,
            event = events.next() => match event {
                Some(Ok(cpn)) => pending = Some(cpn),
                Some(Err(e)) => {
                    warn!(node = %settings.node_name, "ControlPlaneNode watch error: {e}");
                    continue;
                }
                None => anyhow::bail!("ControlPlaneNode watch ended"),
            },
            _ = retry.tick() => {}
        }

        let Some(cpn) = pending.take() else {
            continue;
        };

        if applied.matches(&cpn.spec) {
            debug!(node = %settings.node_name, "ControlPlaneNode already applied");
            if let Err(e) = report_applied(&client, &cpn).await {
                warn!(node = %settings.node_name, "Failed to report status: {e:#}");
            }
            continue;
        }

        match apply_control_plane_node(&client, &settings, &cpn).await {
            Ok(changes) => {
                info!(
                    node = %settings.node_name,
                    config_version = %cpn.spec.config_version,
                    written = changes.written.len(),
                    removed = changes.removed.len(),
                    "Applied ControlPlaneNode"
                );
                applied = AppliedVersions::from_spec(&cpn.spec);
                readiness.set_ready(true);
                if let Err(e) = report_applied(&client, &cpn).await {
                    warn!(node = %settings.node_name, "Failed to report status: {e:#}");
                }
            }
            Err(e) => {
                warn!(
                    node = %settings.node_name,
                    config_version = %cpn.spec.config_version,
                    "Failed to apply ControlPlaneNode: {e:#}"
                );
                if let Err(e) = report_failure(&client, &cpn, &e).await {
                    warn!(node = %settings.node_name, "Failed to report status: {e:#}");
                }
                pending = Some(cpn);
            }
        }
    }

    info!(node = %settings.node_name, "Node agent stopped");
    Ok(())
}
