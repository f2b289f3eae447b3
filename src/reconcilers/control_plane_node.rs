// Copyright (c) 2026 sysreg contributors
// SPDX-License-Identifier: MIT

//! Node services orchestrator.
//!
//! Keyed on `Node`. For every master node it builds the desired
//! `ControlPlaneNode` spec from the control-plane secrets and, when the registry
//! module is enabled, from the registry mirror. It publishes the node services
//! payload as `registry-node-<node>-services` and patches the `ControlPlaneNode`
//! only when the spec differs semantically.
//!
//! Spec changes roll out one node at a time: an update is held back while
//! another master's agent is still applying a newer spec. A node that is
//! itself mid-rollout is never held back.
//!
//! `ControlPlaneNode`s of nodes that are gone or no longer masters are deleted
//! in every reconcile, driven by the reflector store so absent objects are not
//! deleted again.

use crate::checksum::SecretData;
use crate::constants::{
    FIELD_MANAGER, KIND_CONTROL_PLANE_NODE, MISSING_INPUT_REQUEUE_SECS, NODE_SERVICES_PAYLOAD_KEY,
    NOT_READY_REQUEUE_SECS, READY_REQUEUE_SECS, REGISTRY_MODULE_CONFIG_NAME,
};
use crate::context::{is_master, node_internal_ip, Context, OperatorSettings, Stores};
use crate::crd::{ControlPlaneNode, ControlPlaneNodeSpec, ModuleConfig};
use crate::errors::NodeServicesError;
use crate::labels::{
    K8S_MANAGED_BY, MANAGED_BY_SYSREG, MODULE, MODULE_SYSTEM_REGISTRY,
    TYPE_NODE_SERVICES_SECRET,
};
use crate::metrics;
use crate::node_services::desired::{build_desired, ControlPlaneInputs, DesiredNode, RegistryInputs};
use crate::node_services::NodeServicesConfig;
use crate::reconcilers::events::{
    self, EVENT_TYPE_NORMAL, EVENT_TYPE_WARNING, REASON_CONTROL_PLANE_NODE_CREATED,
    REASON_CONTROL_PLANE_NODE_DELETED, REASON_CONTROL_PLANE_NODE_UPDATED,
    REASON_VALIDATION_FAILED,
};
use crate::reconcilers::resources::{
    build_secret, delete_ignore_not_found, delete_secret, ensure_secret, secret_data,
};
use crate::reconcilers::status::ControlPlaneNodeStatusUpdater;
use crate::registry::{
    node_from_pki_secret_name, node_from_services_secret_name, node_services_secret_name,
};
use crate::settings::{is_enabled, RegistrySettings};
use crate::status_reasons::{
    CONDITION_TYPE_CONFIGURED, REASON_DESIRED_STATE_BUILT, REASON_ERROR, REASON_INPUTS_MISSING,
    REASON_WAITING_FOR_ROLLOUT, STATUS_FALSE, STATUS_TRUE, STATUS_UNKNOWN,
};
use anyhow::{Context as _, Result};
use k8s_openapi::api::core::v1::{Node, Secret};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use kube::api::{Patch, PatchParams, PostParams};
use kube::runtime::controller::Action;
use kube::runtime::reflector::ObjectRef;
use kube::{Api, ResourceExt};
use serde_json::{json, Value};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Reconcile the `ControlPlaneNode` of one `Node`.
///
/// # Errors
///
/// Returns an error for API failures. Validation failures are recorded on the
/// resource; only missing inputs requeue.
pub async fn reconcile_control_plane_node(ctx: Arc<Context>, node: Arc<Node>) -> Result<Action> {
    let name = node.name_any();

    sweep_orphans(&ctx).await?;

    if !is_master(&node) {
        debug!(node = %name, "Node is not a control-plane node");
        return Ok(Action::await_change());
    }

    let Some(internal_ip) = node_internal_ip(&node) else {
        info!(node = %name, "Node has no internal IP yet");
        return Ok(Action::await_change());
    };

    let api: Api<ControlPlaneNode> = Api::all(ctx.client.clone());
    let current = api
        .get_opt(&name)
        .await
        .with_context(|| format!("Failed to get ControlPlaneNode {name}"))?;

    let (config, pki) = match load_control_plane_secrets(&ctx).await? {
        Ok(secrets) => secrets,
        Err(missing) => {
            let message = format!("Waiting for secret {missing}");
            info!(node = %name, secret = %missing, "Control-plane input is missing");
            if let Some(cpn) = &current {
                set_configured(&ctx, cpn, STATUS_FALSE, REASON_INPUTS_MISSING, &message).await?;
            }
            metrics::record_reconciliation_requeue(KIND_CONTROL_PLANE_NODE, REASON_INPUTS_MISSING);
            return Ok(Action::requeue(Duration::from_secs(
                MISSING_INPUT_REQUEUE_SECS,
            )));
        }
    };

    let module_config = Api::<ModuleConfig>::all(ctx.client.clone())
        .get_opt(REGISTRY_MODULE_CONFIG_NAME)
        .await
        .context("Failed to get registry ModuleConfig")?;

    let config_data = secret_data(&config);
    let pki_data = secret_data(&pki);
    let config_rv = config.resource_version().unwrap_or_default();
    let pki_rv = pki.resource_version().unwrap_or_default();
    let inputs = ControlPlaneInputs {
        config: &config_data,
        config_resource_version: &config_rv,
        pki: &pki_data,
        pki_resource_version: &pki_rv,
    };

    let desired = {
        let registry = ctx.registry.read().await;
        narrow_settings(&name, module_config.as_ref()).and_then(|settings| {
            let registry_inputs = settings.as_ref().map(|settings| RegistryInputs {
                settings,
                registry: &*registry,
                images: &ctx.settings.images,
            });
            build_desired(&name, &internal_ip, &inputs, registry_inputs.as_ref())
        })
    };

    let desired = match desired {
        Ok(desired) => desired,
        Err(e @ NodeServicesError::MissingInput { .. }) => {
            info!(node = %name, error = %e, "Node services input is missing");
            if let Some(cpn) = &current {
                set_configured(&ctx, cpn, STATUS_FALSE, REASON_INPUTS_MISSING, &e.to_string())
                    .await?;
            }
            metrics::record_reconciliation_requeue(KIND_CONTROL_PLANE_NODE, REASON_INPUTS_MISSING);
            return Ok(invalid_desired_action(&e));
        }
        Err(e) => {
            record_validation_failure(&ctx, &node, current.as_ref(), &e).await?;
            return Ok(invalid_desired_action(&e));
        }
    };

    let cpn = match current {
        None => {
            publish_node_services(&ctx, &name, desired.node_services.as_ref()).await?;
            create_control_plane_node(&ctx, &name, &desired.spec).await?
        }
        Some(current) if current.spec == desired.spec => {
            debug!(node = %name, "ControlPlaneNode spec unchanged");
            publish_node_services(&ctx, &name, desired.node_services.as_ref()).await?;
            current
        }
        Some(current) => {
            if let Some(blocker) = rollout_blocker(&ctx.stores, &name) {
                let message = format!("Waiting for node {blocker} to apply its configuration");
                info!(node = %name, blocker = %blocker, "Holding back spec update");
                set_configured(
                    &ctx,
                    &current,
                    STATUS_UNKNOWN,
                    REASON_WAITING_FOR_ROLLOUT,
                    &message,
                )
                .await?;
                metrics::record_reconciliation_requeue(
                    KIND_CONTROL_PLANE_NODE,
                    REASON_WAITING_FOR_ROLLOUT,
                );
                return Ok(Action::requeue(Duration::from_secs(NOT_READY_REQUEUE_SECS)));
            }
            publish_node_services(&ctx, &name, desired.node_services.as_ref()).await?;
            update_control_plane_node(&ctx, &current, &desired).await?
        }
    };

    set_configured(
        &ctx,
        &cpn,
        STATUS_TRUE,
        REASON_DESIRED_STATE_BUILT,
        &format!("Config version {}", desired.spec.config_version),
    )
    .await?;

    if cpn.is_ready() {
        Ok(Action::requeue(Duration::from_secs(READY_REQUEUE_SECS)))
    } else {
        debug!(node = %name, "Waiting for the node agent to apply the spec");
        Ok(Action::requeue(Duration::from_secs(NOT_READY_REQUEUE_SECS)))
    }
}

/// Fetch the config and PKI secrets; `Err` carries the name of a missing one.
async fn load_control_plane_secrets(
    ctx: &Context,
) -> Result<std::result::Result<(Secret, Secret), String>> {
    let settings = &ctx.settings;
    let api: Api<Secret> = Api::namespaced(ctx.client.clone(), &settings.control_plane_namespace);

    let Some(config) = api
        .get_opt(&settings.config_secret)
        .await
        .with_context(|| format!("Failed to get secret {}", settings.config_secret))?
    else {
        return Ok(Err(settings.config_secret.clone()));
    };
    let Some(pki) = api
        .get_opt(&settings.pki_secret)
        .await
        .with_context(|| format!("Failed to get secret {}", settings.pki_secret))?
    else {
        return Ok(Err(settings.pki_secret.clone()));
    };
    Ok(Ok((config, pki)))
}

/// Narrow the registry settings; `None` when the module is disabled.
///
/// # Errors
///
/// Returns [`NodeServicesError::InvalidConfiguration`] when the settings tree
/// does not match the expected shape.
pub fn narrow_settings(
    node: &str,
    module_config: Option<&ModuleConfig>,
) -> Result<Option<RegistrySettings>, NodeServicesError> {
    let Some(mc) = module_config.filter(|mc| is_enabled(Some(mc))) else {
        return Ok(None);
    };
    RegistrySettings::from_module_config(mc)
        .map(Some)
        .map_err(|e| NodeServicesError::InvalidConfiguration {
            node: node.to_string(),
            reason: format!("invalid system-registry settings: {e}"),
        })
}

/// Requeue policy after the desired state could not be built.
///
/// Missing inputs appear once the registry state catches up and are polled;
/// other failures wait for a change of the inputs.
#[must_use]
pub fn invalid_desired_action(error: &NodeServicesError) -> Action {
    match error {
        NodeServicesError::MissingInput { .. } => {
            Action::requeue(Duration::from_secs(MISSING_INPUT_REQUEUE_SECS))
        }
        _ => Action::await_change(),
    }
}

/// The master whose in-flight rollout holds back an update of `node`.
///
/// In flight means the agent reported a status but has not applied the spec
/// versions yet. A node that is itself not ready is never held back, so two
/// failing masters cannot wait on each other. The lowest name wins when
/// several peers are in flight.
#[must_use]
pub fn rollout_blocker(stores: &Stores, node: &str) -> Option<String> {
    if stores
        .get_control_plane_node(node)
        .is_some_and(|own| own.status.is_some() && !own.is_ready())
    {
        return None;
    }

    let masters = stores.master_node_names();
    let mut in_flight: Vec<String> = stores
        .control_plane_nodes
        .state()
        .iter()
        .filter(|cpn| cpn.name_any() != node)
        .filter(|cpn| masters.contains(&cpn.name_any()))
        .filter(|cpn| cpn.has_unapplied_spec())
        .map(|cpn| cpn.name_any())
        .collect();
    in_flight.sort();
    in_flight.into_iter().next()
}

/// New `ControlPlaneNode` object for `name`.
#[must_use]
pub fn build_control_plane_node(name: &str, spec: &ControlPlaneNodeSpec) -> ControlPlaneNode {
    let mut cpn = ControlPlaneNode::new(name, spec.clone());
    cpn.metadata = ObjectMeta {
        name: Some(name.to_string()),
        labels: Some(BTreeMap::from([(
            K8S_MANAGED_BY.to_string(),
            MANAGED_BY_SYSREG.to_string(),
        )])),
        ..Default::default()
    };
    cpn
}

/// Merge patch body replacing the spec; a cleared `nodeServices` is sent as null.
///
/// # Errors
///
/// Returns an error if the spec cannot be serialized.
pub fn spec_patch(spec: &ControlPlaneNodeSpec) -> Result<Value> {
    let mut value = serde_json::to_value(spec)?;
    if spec.node_services.is_none() {
        if let Value::Object(map) = &mut value {
            map.insert("nodeServices".to_string(), Value::Null);
        }
    }
    Ok(json!({ "spec": value }))
}

async fn create_control_plane_node(
    ctx: &Context,
    name: &str,
    spec: &ControlPlaneNodeSpec,
) -> Result<ControlPlaneNode> {
    let api: Api<ControlPlaneNode> = Api::all(ctx.client.clone());
    let created = api
        .create(
            &PostParams {
                field_manager: Some(FIELD_MANAGER.to_string()),
                ..Default::default()
            },
            &build_control_plane_node(name, spec),
        )
        .await
        .with_context(|| format!("Failed to create ControlPlaneNode {name}"))?;

    info!(node = %name, config_version = %spec.config_version, "Created ControlPlaneNode");
    metrics::record_resource_created(KIND_CONTROL_PLANE_NODE);
    events::publish_for(
        &ctx.client,
        &created,
        EVENT_TYPE_NORMAL,
        REASON_CONTROL_PLANE_NODE_CREATED,
        &format!("Created with config version {}", spec.config_version),
    )
    .await;
    Ok(created)
}

async fn update_control_plane_node(
    ctx: &Context,
    current: &ControlPlaneNode,
    desired: &DesiredNode,
) -> Result<ControlPlaneNode> {
    let name = current.name_any();
    let api: Api<ControlPlaneNode> = Api::all(ctx.client.clone());
    let patch = spec_patch(&desired.spec)?;
    let updated = api
        .patch(
            &name,
            &PatchParams {
                field_manager: Some(FIELD_MANAGER.to_string()),
                ..Default::default()
            },
            &Patch::Merge(&patch),
        )
        .await
        .with_context(|| format!("Failed to patch ControlPlaneNode {name}"))?;

    info!(
        node = %name,
        from = %current.spec.config_version,
        to = %desired.spec.config_version,
        "Updated ControlPlaneNode spec"
    );
    metrics::record_resource_updated(KIND_CONTROL_PLANE_NODE);
    events::publish_for(
        &ctx.client,
        &updated,
        EVENT_TYPE_NORMAL,
        REASON_CONTROL_PLANE_NODE_UPDATED,
        &format!("Spec updated to config version {}", desired.spec.config_version),
    )
    .await;
    Ok(updated)
}

/// Write the node services payload secret, or delete it when the registry is disabled.
async fn publish_node_services(
    ctx: &Context,
    node: &str,
    config: Option<&NodeServicesConfig>,
) -> Result<()> {
    let namespace = &ctx.settings.registry_namespace;
    let secret_name = node_services_secret_name(node);
    let Some(config) = config else {
        delete_secret(&ctx.client, namespace, &secret_name).await?;
        return Ok(());
    };

    let payload = config
        .to_payload()
        .with_context(|| format!("Failed to serialize node services of {node}"))?;
    let data: SecretData = BTreeMap::from([(
        NODE_SERVICES_PAYLOAD_KEY.to_string(),
        k8s_openapi::ByteString(payload.into_bytes()),
    )]);
    let secret = build_secret(namespace, &secret_name, TYPE_NODE_SERVICES_SECRET, data);
    ensure_secret(&ctx.client, &secret).await?;
    Ok(())
}

async fn set_configured(
    ctx: &Context,
    cpn: &ControlPlaneNode,
    status: &str,
    reason: &str,
    message: &str,
) -> Result<()> {
    let mut updater = ControlPlaneNodeStatusUpdater::new(cpn);
    updater.set_condition(CONDITION_TYPE_CONFIGURED, status, reason, message);
    updater
        .apply(&ctx.client)
        .await
        .with_context(|| format!("Failed to update status of ControlPlaneNode {}", cpn.name_any()))
}

async fn record_validation_failure(
    ctx: &Context,
    node: &Node,
    current: Option<&ControlPlaneNode>,
    error: &NodeServicesError,
) -> Result<()> {
    let name = node.name_any();
    warn!(node = %name, reason = %error.status_reason(), error = %error, "Desired state is invalid");
    metrics::record_error(KIND_CONTROL_PLANE_NODE, error.status_reason());

    let message = format!("{}: {error}", error.status_reason());
    match current {
        Some(cpn) => {
            events::publish_for(
                &ctx.client,
                cpn,
                EVENT_TYPE_WARNING,
                REASON_VALIDATION_FAILED,
                &message,
            )
            .await;
            set_configured(ctx, cpn, STATUS_FALSE, REASON_ERROR, &message).await
        }
        None => {
            events::publish_for(
                &ctx.client,
                node,
                EVENT_TYPE_WARNING,
                REASON_VALIDATION_FAILED,
                &message,
            )
            .await;
            Ok(())
        }
    }
}

/// Delete the `ControlPlaneNode` of `name` and its payload secret.
async fn delete_control_plane_node(ctx: &Context, name: &str) -> Result<()> {
    let api: Api<ControlPlaneNode> = Api::all(ctx.client.clone());
    let existing = ctx.stores.get_control_plane_node(name);
    if delete_ignore_not_found(&api, name).await? {
        if let Some(cpn) = existing {
            events::publish_for(
                &ctx.client,
                cpn.as_ref(),
                EVENT_TYPE_NORMAL,
                REASON_CONTROL_PLANE_NODE_DELETED,
                "Node is gone or no longer a control-plane node",
            )
            .await;
        }
    }
    delete_secret(
        &ctx.client,
        &ctx.settings.registry_namespace,
        &node_services_secret_name(name),
    )
    .await?;
    Ok(())
}

async fn sweep_orphans(ctx: &Context) -> Result<()> {
    for orphan in ctx.stores.orphan_control_plane_nodes() {
        info!(node = %orphan, "Deleting orphaned ControlPlaneNode");
        delete_control_plane_node(ctx, &orphan).await?;
    }
    Ok(())
}

// ============================================================================
// Watch mappers
// ============================================================================

fn node_refs(names: impl IntoIterator<Item = String>) -> Vec<ObjectRef<Node>> {
    names.into_iter().map(|name| ObjectRef::new(&name)).collect()
}

/// Nodes affected by a change of `secret`.
///
/// - control-plane config or PKI secret: every master
/// - node certificate or payload secret: its node
/// - other registry secrets: every master
#[must_use]
pub fn nodes_for_secret(
    secret: &Secret,
    settings: &OperatorSettings,
    stores: &Stores,
) -> Vec<ObjectRef<Node>> {
    let name = secret.name_any();
    let namespace = secret.namespace().unwrap_or_default();

    if namespace == settings.control_plane_namespace
        && (name == settings.config_secret || name == settings.pki_secret)
    {
        return node_refs(stores.master_node_names());
    }

    let is_registry_secret = namespace == settings.registry_namespace
        && secret
            .labels()
            .get(MODULE)
            .is_some_and(|module| module == MODULE_SYSTEM_REGISTRY);
    if !is_registry_secret {
        return Vec::new();
    }

    match node_from_pki_secret_name(&name).or_else(|| node_from_services_secret_name(&name)) {
        Some(node) => node_refs([node.to_string()]),
        None => node_refs(stores.master_node_names()),
    }
}

/// Every master node; used for `ModuleConfig` and `ControlPlaneNode` changes.
#[must_use]
pub fn all_master_nodes(stores: &Stores) -> Vec<ObjectRef<Node>> {
    node_refs(stores.master_node_names())
}

#[cfg(test)]
#[path = "control_plane_node_tests.rs"]
mod control_plane_node_tests;
