// Copyright (c) 2026 sysreg contributors
// SPDX-License-Identifier: MIT

//! Secret creation, update and deletion helpers shared by the reconcilers.
//!
//! Writes happen only on semantic difference:
//! - data differs: the secret is replaced (refetch and retry on conflict)
//! - only labels differ: labels are merge-patched
//! - otherwise nothing is written
//!
//! # Example
//!
//! ```rust,no_run
//! use sysreg::labels::TYPE_SHARED_SECRET;
//! use sysreg::reconcilers::resources::{build_secret, ensure_secret};
//! use std::collections::BTreeMap;
//! use kube::Client;
//! use anyhow::Result;
//!
//! async fn example(client: &Client) -> Result<()> {
//!     let secret = build_secret("d8-system", "registry-secrets", TYPE_SHARED_SECRET, BTreeMap::new());
//!     ensure_secret(client, &secret).await?;
//!     Ok(())
//! }
//! ```

use crate::checksum::SecretData;
use crate::errors::is_not_found;
use crate::labels::registry_secret_labels;
use crate::metrics;
use crate::reconcilers::retry::retry_on_conflict;
use anyhow::{Context as _, Result};
use k8s_openapi::api::core::v1::Secret;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use kube::api::{DeleteParams, Patch, PatchParams, PostParams};
use kube::{Api, Client, Resource, ResourceExt};
use serde_json::json;
use std::collections::BTreeMap;
use tracing::{debug, info};

const KIND_SECRET: &str = "Secret";

/// Outcome of [`ensure_secret`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SecretWrite {
    Created,
    Updated,
    LabelsPatched,
    Unchanged,
}

/// Build a managed registry secret with the standard label set.
#[must_use]
pub fn build_secret(namespace: &str, name: &str, secret_type: &str, data: SecretData) -> Secret {
    Secret {
        metadata: ObjectMeta {
            name: Some(name.to_string()),
            namespace: Some(namespace.to_string()),
            labels: Some(registry_secret_labels(secret_type)),
            ..Default::default()
        },
        data: Some(data),
        ..Default::default()
    }
}

/// Data of a secret, empty when unset.
#[must_use]
pub fn secret_data(secret: &Secret) -> SecretData {
    secret.data.clone().unwrap_or_default()
}

/// Whether every desired label is present with the desired value.
#[must_use]
pub fn labels_match(
    existing: Option<&BTreeMap<String, String>>,
    desired: Option<&BTreeMap<String, String>>,
) -> bool {
    let Some(desired) = desired else {
        return true;
    };
    let empty = BTreeMap::new();
    let existing = existing.unwrap_or(&empty);
    desired
        .iter()
        .all(|(key, value)| existing.get(key) == Some(value))
}

/// Decide which write turns `existing` into `desired`.
#[must_use]
pub fn plan_secret_write(existing: Option<&Secret>, desired: &Secret) -> SecretWrite {
    let Some(existing) = existing else {
        return SecretWrite::Created;
    };
    if secret_data(existing) != secret_data(desired) {
        return SecretWrite::Updated;
    }
    if !labels_match(existing.meta().labels.as_ref(), desired.meta().labels.as_ref()) {
        return SecretWrite::LabelsPatched;
    }
    SecretWrite::Unchanged
}

/// Create or update a secret so that its data and labels match `desired`.
///
/// # Errors
///
/// Returns an error if the secret has no name or namespace, or the API calls fail.
pub async fn ensure_secret(client: &Client, desired: &Secret) -> Result<SecretWrite> {
    let name = desired
        .meta()
        .name
        .clone()
        .ok_or_else(|| anyhow::anyhow!("Secret must have a name"))?;
    let namespace = desired
        .meta()
        .namespace
        .clone()
        .ok_or_else(|| anyhow::anyhow!("Secret {name} must have a namespace"))?;
    let api: Api<Secret> = Api::namespaced(client.clone(), &namespace);

    let outcome = retry_on_conflict(
        || {
            let api = api.clone();
            let name = name.clone();
            async move {
                let existing = api.get_opt(&name).await?;
                let outcome = plan_secret_write(existing.as_ref(), desired);
                match (outcome, existing) {
                    (SecretWrite::Created, _) => {
                        api.create(&PostParams::default(), desired).await?;
                    }
                    (SecretWrite::Updated, Some(existing)) => {
                        let mut updated = existing;
                        updated.data = desired.data.clone();
                        let labels = updated.labels_mut();
                        for (key, value) in desired.labels() {
                            labels.insert(key.clone(), value.clone());
                        }
                        api.replace(&name, &PostParams::default(), &updated).await?;
                    }
                    (SecretWrite::LabelsPatched, _) => {
                        let patch = json!({ "metadata": { "labels": desired.labels() } });
                        api.patch(&name, &PatchParams::default(), &Patch::Merge(&patch))
                            .await?;
                    }
                    _ => {}
                }
                Ok(outcome)
            }
        },
        "ensure_secret",
    )
    .await
    .with_context(|| format!("Failed to write secret {namespace}/{name}"))?;

    match outcome {
        SecretWrite::Created => {
            info!(namespace = %namespace, name = %name, "Created secret");
            metrics::record_resource_created(KIND_SECRET);
        }
        SecretWrite::Updated => {
            info!(namespace = %namespace, name = %name, "Updated secret");
            metrics::record_resource_updated(KIND_SECRET);
        }
        SecretWrite::LabelsPatched => {
            debug!(namespace = %namespace, name = %name, "Patched secret labels");
            metrics::record_resource_updated(KIND_SECRET);
        }
        SecretWrite::Unchanged => {
            debug!(namespace = %namespace, name = %name, "Secret unchanged");
        }
    }

    Ok(outcome)
}

/// Fetch a secret, `None` when absent.
///
/// # Errors
///
/// Returns an error for every API failure except Not-Found.
pub async fn get_secret(client: &Client, namespace: &str, name: &str) -> Result<Option<Secret>> {
    let api: Api<Secret> = Api::namespaced(client.clone(), namespace);
    api.get_opt(name)
        .await
        .with_context(|| format!("Failed to get secret {namespace}/{name}"))
}

/// Delete a resource, treating Not-Found as success.
///
/// Returns whether the resource existed.
///
/// # Errors
///
/// Returns an error for every API failure except Not-Found.
pub async fn delete_ignore_not_found<K>(api: &Api<K>, name: &str) -> Result<bool>
where
    K: Resource<DynamicType = ()> + Clone + std::fmt::Debug + serde::de::DeserializeOwned,
{
    match api.delete(name, &DeleteParams::default()).await {
        Ok(_) => {
            info!(kind = %K::kind(&()), name = %name, "Deleted resource");
            metrics::record_resource_deleted(&K::kind(&()));
            Ok(true)
        }
        Err(e) if is_not_found(&e) => {
            debug!(kind = %K::kind(&()), name = %name, "Resource already gone");
            Ok(false)
        }
        Err(e) => Err(anyhow::Error::new(e).context(format!("Failed to delete {name}"))),
    }
}

/// Delete a secret, treating Not-Found as success.
///
/// # Errors
///
/// Returns an error for every API failure except Not-Found.
pub async fn delete_secret(client: &Client, namespace: &str, name: &str) -> Result<bool> {
    let api: Api<Secret> = Api::namespaced(client.clone(), namespace);
    delete_ignore_not_found(&api, name).await
}

#[cfg(test)]
#[path = "resources_tests.rs"]
mod resources_tests;
