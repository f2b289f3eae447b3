// Copyright (c) 2026 sysreg contributors
// SPDX-License-Identifier: MIT

//! Pure decisions of the registry reconciler.
//!
//! Each planner compares what the cluster holds with what the in-memory mirror
//! remembers and returns a [`Plan`]. The reconciler executes the plan; nothing
//! here performs I/O.

use super::{ca_bundle_from_secret, http_secret_from_secret, node_pki_from_secret};
use crate::checksum::SecretData;
use crate::pki::{validate_node_pki, CaBundle, CertKey, NodePki};
use crate::users::RegistryUser;
use tracing::warn;

/// What to do with one managed secret.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Plan<T> {
    /// Cluster and mirror agree
    Keep(T),
    /// Cluster holds valid material the mirror does not know; take it
    Adopt(T),
    /// Cluster material is missing or unusable; write the mirror back
    Restore(T),
    /// Cluster material is usable after recomputing derived fields
    Repair(T),
    /// Nothing usable anywhere; create fresh material
    Generate,
}

impl<T> Plan<T> {
    /// Whether executing the plan writes to the cluster.
    #[must_use]
    pub fn writes(&self) -> bool {
        matches!(self, Self::Restore(_) | Self::Repair(_) | Self::Generate)
    }
}

/// Decide how to converge `registry-pki`.
///
/// A valid bundle in the cluster always wins; the caller fans out node PKI
/// deletion when the adopted CA differs from the remembered one.
#[must_use]
pub fn plan_ca(
    secret: &str,
    existing: Option<&SecretData>,
    memory: Option<&CaBundle>,
) -> Plan<CaBundle> {
    let decoded = existing.map(|data| ca_bundle_from_secret(secret, data));
    match (decoded, memory) {
        (Some(Ok(bundle)), Some(known)) if &bundle == known => Plan::Keep(bundle),
        (Some(Ok(bundle)), _) => Plan::Adopt(bundle),
        (Some(Err(e)), memory) => {
            warn!(secret = %secret, error = %e, "Registry CA secret is unusable");
            memory.map_or(Plan::Generate, |known| Plan::Restore(known.clone()))
        }
        (None, Some(known)) => Plan::Restore(known.clone()),
        (None, None) => Plan::Generate,
    }
}

/// Whether adopting `next` replaces a CA the mirror already trusted.
#[must_use]
pub fn is_ca_rotation(memory: Option<&CaBundle>, next: &CaBundle) -> bool {
    memory.is_some_and(|known| known.ca != next.ca)
}

/// Decide how to converge a `registry-user-<role>` secret.
///
/// External edits are authoritative: a complete triplet is adopted, and a
/// triplet whose hash no longer matches its password is rehashed rather than
/// regenerated.
#[must_use]
pub fn plan_user(
    secret: &str,
    existing: Option<&SecretData>,
    memory: Option<&RegistryUser>,
) -> Plan<RegistryUser> {
    let restore_or_generate = || memory.map_or(Plan::Generate, |known| Plan::Restore(known.clone()));

    let Some(data) = existing else {
        return restore_or_generate();
    };
    match RegistryUser::from_secret_data(secret, data) {
        Ok(user) if user.is_valid() => {
            if memory == Some(&user) {
                Plan::Keep(user)
            } else {
                Plan::Adopt(user)
            }
        }
        Ok(user) if !user.name.is_empty() && !user.password.is_empty() => Plan::Repair(user),
        Ok(_) => restore_or_generate(),
        Err(e) => {
            warn!(secret = %secret, error = %e, "Registry user secret is unusable");
            restore_or_generate()
        }
    }
}

/// Decide how to converge `registry-node-<node>-pki`.
///
/// Certificates are kept only when they chain to `ca` and carry every SAN the
/// node needs.
#[must_use]
pub fn plan_node_pki(
    secret: &str,
    existing: Option<&SecretData>,
    memory: Option<&NodePki>,
    ca: &CertKey,
    node_ip: &str,
) -> Plan<NodePki> {
    if let Some(data) = existing {
        match node_pki_from_secret(secret, data)
            .and_then(|pki| validate_node_pki(&pki, ca, node_ip).map(|()| pki))
        {
            Ok(pki) if memory == Some(&pki) => return Plan::Keep(pki),
            Ok(pki) => return Plan::Adopt(pki),
            Err(e) => {
                warn!(secret = %secret, error = %e, "Node PKI is invalid, it will be reissued");
            }
        }
    }
    match memory {
        Some(known) if validate_node_pki(known, ca, node_ip).is_ok() => Plan::Restore(known.clone()),
        _ => Plan::Generate,
    }
}

/// Decide how to converge the HTTP shared secret.
#[must_use]
pub fn plan_http_secret(existing: Option<&SecretData>, memory: Option<&str>) -> Plan<String> {
    match (existing.and_then(http_secret_from_secret), memory) {
        (Some(value), Some(known)) if value == known => Plan::Keep(value),
        (Some(value), _) => Plan::Adopt(value),
        (None, Some(known)) => Plan::Restore(known.to_string()),
        (None, None) => Plan::Generate,
    }
}

#[cfg(test)]
#[path = "plan_tests.rs"]
mod plan_tests;
