// Copyright (c) 2026 sysreg contributors
// SPDX-License-Identifier: MIT

//! In-memory mirror of the embedded registry state.
//!
//! The cluster is the source of truth; [`EmbeddedRegistry`] caches the CA, users,
//! HTTP secret and per-node certificates the registry reconciler last observed or
//! wrote. It is shared as [`SharedRegistry`]: the registry reconciler holds the
//! write lock for a whole reconcile, the orchestrator takes read snapshots.
//!
//! Secret data codecs for the managed secrets live here too.

pub mod plan;

use crate::checksum::SecretData;
use crate::constants::{
    KEY_AUTH_TOKEN_CERT, KEY_AUTH_TOKEN_KEY, KEY_HTTP_SECRET, KEY_NODE_AUTH_CERT,
    KEY_NODE_AUTH_KEY, KEY_NODE_DISTRIBUTION_CERT, KEY_NODE_DISTRIBUTION_KEY,
    KEY_REGISTRY_CA_CERT, KEY_REGISTRY_CA_KEY, REGISTRY_NODE_PKI_SUFFIX,
    REGISTRY_NODE_SECRET_PREFIX, REGISTRY_NODE_SERVICES_SUFFIX,
};
use crate::errors::PkiError;
use crate::pki::{CaBundle, CertKey, NodePki};
use crate::users::{RegistryUser, UserRole};
use k8s_openapi::ByteString;
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::RwLock;

/// A control-plane node known to the registry reconciler.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MasterNode {
    pub name: String,
    pub internal_ip: String,
    pub pki: NodePki,
}

/// Mirror of the registry secrets.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct EmbeddedRegistry {
    pub ca: Option<CaBundle>,
    pub users: BTreeMap<UserRole, RegistryUser>,
    pub http_secret: Option<String>,
    pub nodes: BTreeMap<String, MasterNode>,
}

/// Registry mirror shared between reconcilers.
pub type SharedRegistry = Arc<RwLock<EmbeddedRegistry>>;

impl EmbeddedRegistry {
    /// Empty mirror wrapped for sharing.
    #[must_use]
    pub fn shared() -> SharedRegistry {
        Arc::new(RwLock::new(Self::default()))
    }

    #[must_use]
    pub fn user(&self, role: UserRole) -> Option<&RegistryUser> {
        self.users.get(&role)
    }

    /// Drop every per-node entry; used when the CA changes.
    pub fn forget_nodes(&mut self) {
        self.nodes.clear();
    }
}

/// `registry-node-<node>-pki`
#[must_use]
pub fn node_pki_secret_name(node: &str) -> String {
    format!("{REGISTRY_NODE_SECRET_PREFIX}{node}{REGISTRY_NODE_PKI_SUFFIX}")
}

/// `registry-node-<node>-services`
#[must_use]
pub fn node_services_secret_name(node: &str) -> String {
    format!("{REGISTRY_NODE_SECRET_PREFIX}{node}{REGISTRY_NODE_SERVICES_SUFFIX}")
}

/// Node name of a `registry-node-<node>-pki` secret.
#[must_use]
pub fn node_from_pki_secret_name(secret: &str) -> Option<&str> {
    secret
        .strip_prefix(REGISTRY_NODE_SECRET_PREFIX)?
        .strip_suffix(REGISTRY_NODE_PKI_SUFFIX)
        .filter(|node| !node.is_empty())
}

/// Node name of a `registry-node-<node>-services` secret.
#[must_use]
pub fn node_from_services_secret_name(secret: &str) -> Option<&str> {
    secret
        .strip_prefix(REGISTRY_NODE_SECRET_PREFIX)?
        .strip_suffix(REGISTRY_NODE_SERVICES_SUFFIX)
        .filter(|node| !node.is_empty())
}

fn bytes(value: &str) -> ByteString {
    ByteString(value.as_bytes().to_vec())
}

fn pair_from(
    data: &SecretData,
    secret: &str,
    cert_key: &str,
    key_key: &str,
) -> Result<CertKey, PkiError> {
    let field = |key: &str| {
        data.get(key)
            .filter(|value| !value.0.is_empty())
            .ok_or_else(|| PkiError::MissingKey {
                secret: secret.to_string(),
                key: key.to_string(),
            })
    };
    CertKey::from_pem_bytes(&field(cert_key)?.0, &field(key_key)?.0, cert_key)
}

/// Decode and validate `registry-pki` data.
///
/// # Errors
///
/// Returns a [`PkiError`] when a key is missing or the bundle is inconsistent.
pub fn ca_bundle_from_secret(secret: &str, data: &SecretData) -> Result<CaBundle, PkiError> {
    let bundle = CaBundle {
        ca: pair_from(data, secret, KEY_REGISTRY_CA_CERT, KEY_REGISTRY_CA_KEY)?,
        token: pair_from(data, secret, KEY_AUTH_TOKEN_CERT, KEY_AUTH_TOKEN_KEY)?,
    };
    bundle.validate()?;
    Ok(bundle)
}

#[must_use]
pub fn ca_bundle_to_secret(bundle: &CaBundle) -> SecretData {
    BTreeMap::from([
        (KEY_REGISTRY_CA_CERT.to_string(), bytes(&bundle.ca.cert_pem)),
        (KEY_REGISTRY_CA_KEY.to_string(), bytes(&bundle.ca.key_pem)),
        (KEY_AUTH_TOKEN_CERT.to_string(), bytes(&bundle.token.cert_pem)),
        (KEY_AUTH_TOKEN_KEY.to_string(), bytes(&bundle.token.key_pem)),
    ])
}

/// Decode `registry-node-<node>-pki` data. Chain and SAN checks are separate.
///
/// # Errors
///
/// Returns a [`PkiError`] when a key is missing or a pair does not match.
pub fn node_pki_from_secret(secret: &str, data: &SecretData) -> Result<NodePki, PkiError> {
    Ok(NodePki {
        auth: pair_from(data, secret, KEY_NODE_AUTH_CERT, KEY_NODE_AUTH_KEY)?,
        distribution: pair_from(
            data,
            secret,
            KEY_NODE_DISTRIBUTION_CERT,
            KEY_NODE_DISTRIBUTION_KEY,
        )?,
    })
}

#[must_use]
pub fn node_pki_to_secret(pki: &NodePki) -> SecretData {
    BTreeMap::from([
        (KEY_NODE_AUTH_CERT.to_string(), bytes(&pki.auth.cert_pem)),
        (KEY_NODE_AUTH_KEY.to_string(), bytes(&pki.auth.key_pem)),
        (
            KEY_NODE_DISTRIBUTION_CERT.to_string(),
            bytes(&pki.distribution.cert_pem),
        ),
        (
            KEY_NODE_DISTRIBUTION_KEY.to_string(),
            bytes(&pki.distribution.key_pem),
        ),
    ])
}

/// HTTP shared secret stored in `registry-secrets`, if present and non-empty.
#[must_use]
pub fn http_secret_from_secret(data: &SecretData) -> Option<String> {
    data.get(KEY_HTTP_SECRET)
        .and_then(|value| String::from_utf8(value.0.clone()).ok())
        .filter(|value| !value.is_empty())
}

#[must_use]
pub fn http_secret_to_secret(value: &str) -> SecretData {
    BTreeMap::from([(KEY_HTTP_SECRET.to_string(), bytes(value))])
}
