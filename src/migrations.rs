// Copyright (c) 2026 sysreg contributors
// SPDX-License-Identifier: MIT

//! One-shot migration of the legacy `standard:` section of a provider
//! cluster configuration.
//!
//! Keys of `standard` move to the top level unless already set there, then
//! `standard` is removed. Running it twice is a no-op.

use crate::constants::{FIELD_MANAGER, KEY_CLUSTER_CONFIGURATION, KUBE_SYSTEM_NAMESPACE};
use anyhow::{Context as _, Result};
use k8s_openapi::api::core::v1::Secret;
use k8s_openapi::ByteString;
use kube::api::{Patch, PatchParams};
use kube::{Api, Client};
use serde_json::json;
use serde_yaml::{Mapping, Value};
use tracing::{debug, info};

const STANDARD_FIELD: &str = "standard";

/// Name of the cluster configuration secret of `module`.
#[must_use]
pub fn cluster_configuration_secret_name(module: &str) -> String {
    format!("d8-{module}-cluster-configuration")
}

/// Hoist the keys of a top-level `standard` mapping.
///
/// Returns `None` when there is nothing to migrate.
///
/// # Errors
///
/// Returns an error if `yaml` is not a mapping or `standard` is not a mapping.
pub fn hoist_standard(yaml: &str) -> Result<Option<String>> {
    let mut document: Mapping =
        serde_yaml::from_str(yaml).context("Cluster configuration is not a YAML mapping")?;

    let key = Value::String(STANDARD_FIELD.to_string());
    let Some(standard) = document.remove(&key) else {
        return Ok(None);
    };

    match standard {
        Value::Mapping(fields) => {
            for (field, value) in fields {
                if !document.contains_key(&field) {
                    document.insert(field, value);
                }
            }
        }
        Value::Null => {}
        other => anyhow::bail!("Field 'standard' must be a mapping, got {other:?}"),
    }

    Ok(Some(serde_yaml::to_string(&document)?))
}

/// Migrate `kube-system/d8-<module>-cluster-configuration`.
///
/// Returns whether the secret was changed.
///
/// # Errors
///
/// Returns an error if the secret cannot be read, parsed or patched.
pub async fn migrate_standard_field(client: &Client, module: &str) -> Result<bool> {
    let name = cluster_configuration_secret_name(module);
    let api: Api<Secret> = Api::namespaced(client.clone(), KUBE_SYSTEM_NAMESPACE);

    let Some(secret) = api.get_opt(&name).await? else {
        debug!(secret = %name, "Cluster configuration secret not found, nothing to migrate");
        return Ok(false);
    };
    let Some(current) = secret
        .data
        .as_ref()
        .and_then(|data| data.get(KEY_CLUSTER_CONFIGURATION))
    else {
        debug!(secret = %name, "Cluster configuration key absent, nothing to migrate");
        return Ok(false);
    };

    let current = String::from_utf8(current.0.clone())
        .with_context(|| format!("Secret {name} holds non UTF-8 cluster configuration"))?;
    let Some(migrated) =
        hoist_standard(&current).with_context(|| format!("Failed to migrate secret {name}"))?
    else {
        return Ok(false);
    };

    let patch = json!({
        "data": {
            KEY_CLUSTER_CONFIGURATION: ByteString(migrated.into_bytes()),
        }
    });
    let params = PatchParams {
        field_manager: Some(FIELD_MANAGER.to_string()),
        ..PatchParams::default()
    };
    api.patch(&name, &params, &Patch::Merge(&patch)).await?;

    info!(secret = %name, "Moved 'standard' section to the top level of cluster configuration");
    Ok(true)
}
