// Copyright (c) 2026 sysreg contributors
// SPDX-License-Identifier: MIT

//! Registry reconciler.
//!
//! Converges the embedded registry secrets in the registry namespace:
//!
//! - `registry-pki`: CA and auth-token key pairs
//! - `registry-user-<role>`: one credential triplet per role
//! - `registry-secrets`: the HTTP shared secret
//! - `registry-node-<node>-pki`: auth and distribution certificates per master node
//!
//! The reconciler holds the mirror write lock for the whole run. A CA change
//! deletes every node certificate secret before new ones are issued, so no node
//! secret signed by an obsolete CA survives the reconcile.

use crate::checksum::SecretData;
use crate::constants::{
    HTTP_SECRET_LENGTH, REGISTRY_CA_CN, REGISTRY_PKI_SECRET, REGISTRY_SECRETS_SECRET,
};
use crate::context::{Context, MasterNodeAddress};
use crate::crd::ModuleConfig;
use crate::labels::{
    TYPE_CA_SECRET, TYPE_NODE_PKI_SECRET, TYPE_SHARED_SECRET, TYPE_USER_SECRET,
};
use crate::pki::{generate_node_pki, CaBundle};
use crate::reconcilers::events::{
    self, secret_reference, EVENT_TYPE_NORMAL, EVENT_TYPE_WARNING, REASON_NODE_PKI_DELETED,
    REASON_NODE_PKI_GENERATED, REASON_PKI_GENERATED, REASON_PKI_RESTORED, REASON_PKI_ROTATED,
    REASON_USER_GENERATED, REASON_USER_RESTORED,
};
use crate::reconcilers::resources::{
    build_secret, delete_secret, ensure_secret, get_secret, secret_data,
};
use crate::registry::plan::{
    is_ca_rotation, plan_ca, plan_http_secret, plan_node_pki, plan_user, Plan,
};
use crate::registry::{
    ca_bundle_to_secret, http_secret_to_secret, node_from_pki_secret_name, node_pki_secret_name,
    node_pki_to_secret, EmbeddedRegistry, MasterNode,
};
use crate::settings::is_enabled;
use crate::users::{random_string, RegistryUser, UserRole};
use anyhow::{Context as _, Result};
use k8s_openapi::api::core::v1::Secret;
use kube::api::ListParams;
use kube::runtime::controller::Action;
use kube::{Api, ResourceExt};
use std::collections::BTreeSet;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Reconcile the registry secrets for `ModuleConfig/system-registry`.
///
/// A disabled module leaves every secret untouched until the config changes.
///
/// # Errors
///
/// Returns an error when an API call fails or key material cannot be generated;
/// the controller requeues with backoff.
pub async fn reconcile_registry(ctx: Arc<Context>, mc: Arc<ModuleConfig>) -> Result<Action> {
    if !is_enabled(Some(&mc)) {
        info!(module_config = %mc.name_any(), "Registry module is disabled, skipping reconcile");
        return Ok(Action::await_change());
    }

    let mut registry = ctx.registry.write().await;

    let rotated = ensure_ca(&ctx, &mut registry).await?;
    if rotated {
        delete_stale_node_pki(&ctx, NodePkiCleanup::CaRotated).await?;
        registry.forget_nodes();
    }

    for role in UserRole::ALL {
        ensure_user(&ctx, &mut registry, role).await?;
    }

    ensure_http_secret(&ctx, &mut registry).await?;

    let masters = ctx.stores.master_nodes();
    for node in &masters {
        ensure_node_pki(&ctx, &mut registry, node).await?;
    }

    let master_names: BTreeSet<String> = ctx.stores.master_node_names().into_iter().collect();
    delete_stale_node_pki(&ctx, NodePkiCleanup::FormerMasters(&master_names)).await?;
    registry.nodes.retain(|name, _| master_names.contains(name));

    debug!(
        users = registry.users.len(),
        nodes = registry.nodes.len(),
        "Registry reconcile finished"
    );

    Ok(Action::await_change())
}

/// Write `data` to the managed secret `name`; no-op when nothing differs.
async fn persist(ctx: &Context, name: &str, secret_type: &str, data: SecretData) -> Result<()> {
    let desired = build_secret(&ctx.settings.registry_namespace, name, secret_type, data);
    ensure_secret(&ctx.client, &desired).await?;
    Ok(())
}

async fn existing_data(ctx: &Context, name: &str) -> Result<Option<SecretData>> {
    Ok(get_secret(&ctx.client, &ctx.settings.registry_namespace, name)
        .await?
        .map(|secret| secret_data(&secret)))
}

/// Converge `registry-pki`. Returns whether the CA changed and node
/// certificates must be reissued.
async fn ensure_ca(ctx: &Context, registry: &mut EmbeddedRegistry) -> Result<bool> {
    let namespace = &ctx.settings.registry_namespace;
    let existing = existing_data(ctx, REGISTRY_PKI_SECRET).await?;
    let plan = plan_ca(REGISTRY_PKI_SECRET, existing.as_ref(), registry.ca.as_ref());
    let writes = plan.writes();

    let (bundle, rotated) = match plan {
        Plan::Keep(bundle) => (bundle, false),
        Plan::Adopt(bundle) => {
            let rotated = is_ca_rotation(registry.ca.as_ref(), &bundle);
            if rotated {
                warn!(secret = %REGISTRY_PKI_SECRET, "Registry CA changed, node certificates will be reissued");
                events::publish(
                    &ctx.client,
                    secret_reference(namespace, REGISTRY_PKI_SECRET),
                    EVENT_TYPE_WARNING,
                    REASON_PKI_ROTATED,
                    "Registry CA changed; node certificates are reissued",
                )
                .await;
            } else {
                info!(secret = %REGISTRY_PKI_SECRET, "Adopted registry CA from cluster");
            }
            (bundle, rotated)
        }
        Plan::Restore(bundle) | Plan::Repair(bundle) => {
            info!(secret = %REGISTRY_PKI_SECRET, "Restoring registry CA from memory");
            events::publish(
                &ctx.client,
                secret_reference(namespace, REGISTRY_PKI_SECRET),
                EVENT_TYPE_NORMAL,
                REASON_PKI_RESTORED,
                "Registry CA restored from memory",
            )
            .await;
            (bundle, false)
        }
        Plan::Generate => {
            info!(secret = %REGISTRY_PKI_SECRET, "Generating registry CA");
            let bundle = CaBundle::generate(REGISTRY_CA_CN)
                .context("Failed to generate registry CA")?;
            events::publish(
                &ctx.client,
                secret_reference(namespace, REGISTRY_PKI_SECRET),
                EVENT_TYPE_NORMAL,
                REASON_PKI_GENERATED,
                "Registry CA generated",
            )
            .await;
            (bundle, true)
        }
    };

    let data = match existing {
        Some(data) if !writes => data,
        _ => ca_bundle_to_secret(&bundle),
    };
    persist(ctx, REGISTRY_PKI_SECRET, TYPE_CA_SECRET, data).await?;

    registry.ca = Some(bundle);
    Ok(rotated)
}

/// Converge `registry-user-<role>`.
async fn ensure_user(ctx: &Context, registry: &mut EmbeddedRegistry, role: UserRole) -> Result<()> {
    let namespace = &ctx.settings.registry_namespace;
    let secret_name = role.secret_name();
    let existing = existing_data(ctx, &secret_name).await?;
    let plan = plan_user(&secret_name, existing.as_ref(), registry.user(role));
    let writes = plan.writes();

    let user = match plan {
        Plan::Keep(user) => user,
        Plan::Adopt(user) => {
            info!(secret = %secret_name, "Adopted registry user from cluster");
            user
        }
        Plan::Repair(user) => {
            info!(secret = %secret_name, "Password hash does not match, rehashing");
            user.rehashed()
                .with_context(|| format!("Failed to rehash user {}", user.name))?
        }
        Plan::Restore(user) => {
            info!(secret = %secret_name, "Restoring registry user from memory");
            events::publish(
                &ctx.client,
                secret_reference(namespace, &secret_name),
                EVENT_TYPE_NORMAL,
                REASON_USER_RESTORED,
                &format!("Registry user {} restored from memory", user.name),
            )
            .await;
            user
        }
        Plan::Generate => {
            let user = RegistryUser::generate(&role.user_name())
                .with_context(|| format!("Failed to generate registry user {}", role.as_str()))?;
            info!(secret = %secret_name, user = %user.name, "Generated registry user");
            events::publish(
                &ctx.client,
                secret_reference(namespace, &secret_name),
                EVENT_TYPE_NORMAL,
                REASON_USER_GENERATED,
                &format!("Registry user {} generated", user.name),
            )
            .await;
            user
        }
    };

    let data = match existing {
        Some(data) if !writes => data,
        _ => user.to_secret_data(),
    };
    persist(ctx, &secret_name, TYPE_USER_SECRET, data).await?;

    registry.users.insert(role, user);
    Ok(())
}

/// Converge the HTTP shared secret in `registry-secrets`.
async fn ensure_http_secret(ctx: &Context, registry: &mut EmbeddedRegistry) -> Result<()> {
    let existing = existing_data(ctx, REGISTRY_SECRETS_SECRET).await?;
    let plan = plan_http_secret(existing.as_ref(), registry.http_secret.as_deref());
    let writes = plan.writes();

    let value = match plan {
        Plan::Keep(value) | Plan::Adopt(value) | Plan::Restore(value) | Plan::Repair(value) => {
            value
        }
        Plan::Generate => {
            info!(secret = %REGISTRY_SECRETS_SECRET, "Generating HTTP shared secret");
            random_string(HTTP_SECRET_LENGTH)
        }
    };

    let data = match existing {
        Some(data) if !writes => data,
        _ => http_secret_to_secret(&value),
    };
    persist(ctx, REGISTRY_SECRETS_SECRET, TYPE_SHARED_SECRET, data).await?;

    registry.http_secret = Some(value);
    Ok(())
}

/// Converge `registry-node-<node>-pki` for one master node.
async fn ensure_node_pki(
    ctx: &Context,
    registry: &mut EmbeddedRegistry,
    node: &MasterNodeAddress,
) -> Result<()> {
    let Some(ca) = registry.ca.as_ref().map(|bundle| bundle.ca.clone()) else {
        anyhow::bail!("Registry CA is not initialised");
    };
    let secret_name = node_pki_secret_name(&node.name);
    let existing = existing_data(ctx, &secret_name).await?;
    let memory = registry
        .nodes
        .get(&node.name)
        .filter(|known| known.internal_ip == node.internal_ip)
        .map(|known| &known.pki);
    let plan = plan_node_pki(&secret_name, existing.as_ref(), memory, &ca, &node.internal_ip);
    let writes = plan.writes();

    let pki = match plan {
        Plan::Keep(pki) | Plan::Adopt(pki) | Plan::Restore(pki) | Plan::Repair(pki) => pki,
        Plan::Generate => {
            let pki = generate_node_pki(&ca, &node.internal_ip).with_context(|| {
                format!("Failed to issue certificates for node {}", node.name)
            })?;
            info!(node = %node.name, ip = %node.internal_ip, "Issued node certificates");
            events::publish(
                &ctx.client,
                secret_reference(&ctx.settings.registry_namespace, &secret_name),
                EVENT_TYPE_NORMAL,
                REASON_NODE_PKI_GENERATED,
                &format!("Certificates issued for node {}", node.name),
            )
            .await;
            pki
        }
    };

    let data = match existing {
        Some(data) if !writes => data,
        _ => node_pki_to_secret(&pki),
    };
    persist(ctx, &secret_name, TYPE_NODE_PKI_SECRET, data).await?;

    registry.nodes.insert(
        node.name.clone(),
        MasterNode {
            name: node.name.clone(),
            internal_ip: node.internal_ip.clone(),
            pki,
        },
    );
    Ok(())
}

/// Names of every `registry-node-<node>-pki` secret in the registry namespace.
async fn list_node_pki_secrets(ctx: &Context) -> Result<Vec<String>> {
    let api: Api<Secret> = Api::namespaced(ctx.client.clone(), &ctx.settings.registry_namespace);
    let secrets = api
        .list_metadata(&ListParams::default())
        .await
        .context("Failed to list registry secrets")?;
    Ok(node_pki_secret_names(
        secrets.items.iter().map(ResourceExt::name_any),
    ))
}

/// Filter secret names down to node certificate secrets, sorted.
fn node_pki_secret_names(names: impl Iterator<Item = String>) -> Vec<String> {
    let mut names: Vec<String> = names
        .filter(|name| node_from_pki_secret_name(name).is_some())
        .collect();
    names.sort();
    names
}

/// Node certificate secrets whose node is not a current master.
fn orphan_node_pki_secrets(secrets: &[String], masters: &BTreeSet<String>) -> Vec<String> {
    secrets
        .iter()
        .filter(|secret| {
            node_from_pki_secret_name(secret).is_some_and(|node| !masters.contains(node))
        })
        .cloned()
        .collect()
}

async fn delete_node_pki(ctx: &Context, secret: &str, message: &str) -> Result<()> {
    let namespace = &ctx.settings.registry_namespace;
    if delete_secret(&ctx.client, namespace, secret).await? {
        events::publish(
            &ctx.client,
            secret_reference(namespace, secret),
            EVENT_TYPE_NORMAL,
            REASON_NODE_PKI_DELETED,
            message,
        )
        .await;
    }
    Ok(())
}

/// Which node certificate secrets have gone stale.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum NodePkiCleanup<'a> {
    /// The registry CA changed; every node certificate was signed by the old one
    CaRotated,
    /// Certificates of nodes outside the current master set
    FormerMasters(&'a BTreeSet<String>),
}

impl NodePkiCleanup<'_> {
    /// Stale secrets among the listed node certificate secrets.
    fn select(self, secrets: &[String]) -> Vec<String> {
        match self {
            Self::CaRotated => secrets.to_vec(),
            Self::FormerMasters(masters) => orphan_node_pki_secrets(secrets, masters),
        }
    }

    fn event_message(self) -> &'static str {
        match self {
            Self::CaRotated => "Registry CA changed",
            Self::FormerMasters(_) => "Node is no longer a control-plane node",
        }
    }
}

/// Delete the node certificate secrets `cleanup` selects.
async fn delete_stale_node_pki(ctx: &Context, cleanup: NodePkiCleanup<'_>) -> Result<()> {
    let stale = cleanup.select(&list_node_pki_secrets(ctx).await?);
    if stale.is_empty() {
        return Ok(());
    }
    info!(count = stale.len(), reason = cleanup.event_message(), "Deleting stale node certificates");
    for secret in &stale {
        delete_node_pki(ctx, secret, cleanup.event_message()).await?;
    }
    Ok(())
}

#[cfg(test)]
#[path = "registry_tests.rs"]
mod registry_tests;
