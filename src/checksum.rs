// Copyright (c) 2026 sysreg contributors
// SPDX-License-Identifier: MIT

//! Control-plane checksums.
//!
//! All checksums are lowercase hex SHA-256 digests over secret data:
//!
//! - [`pki_checksum`] covers every key of the PKI secret, keys sorted.
//! - [`component_checksum`] covers a component's manifest template and every file
//!   the manifest references through an `=/etc/kubernetes/<path>` argument.
//! - [`hot_reload_checksum`] covers the `extra-file-*` entries no component references.
//!
//! Together they give the stability guarantees the node agent relies on: editing a
//! file referenced by one component only moves that component's checksum.

use crate::constants::{
    CONTROL_PLANE_COMPONENTS, EXTRA_FILE_PREFIX, KUBERNETES_FILE_REFERENCE,
    MANIFEST_TEMPLATE_SUFFIX,
};
use crate::errors::ChecksumError;
use k8s_openapi::ByteString;
use sha2::{Digest, Sha256};
use std::collections::{BTreeMap, BTreeSet};

/// Secret data as returned by the API server.
pub type SecretData = BTreeMap<String, ByteString>;

/// SHA-256 over the PKI secret data; each key contributes `key ‖ value`.
///
/// # Errors
///
/// Returns [`ChecksumError::EmptyPki`] when the secret has no data.
pub fn pki_checksum(data: &SecretData) -> Result<String, ChecksumError> {
    if data.is_empty() {
        return Err(ChecksumError::EmptyPki);
    }
    let mut hasher = Sha256::new();
    // BTreeMap iterates in key order
    for (key, value) in data {
        hasher.update(key.as_bytes());
        hasher.update(&value.0);
    }
    Ok(hex::encode(hasher.finalize()))
}

/// Data key holding the manifest template of `component`.
#[must_use]
pub fn manifest_key(component: &str) -> String {
    format!("{component}{MANIFEST_TEMPLATE_SUFFIX}")
}

/// Data key a referenced `/etc/kubernetes/...` path maps to.
#[must_use]
pub fn extra_file_key(path: &str) -> String {
    let basename = path.rsplit('/').next().unwrap_or(path);
    format!("{EXTRA_FILE_PREFIX}{basename}")
}

/// Paths referenced by `=/etc/kubernetes/<path>` arguments, sorted and deduplicated.
#[must_use]
pub fn referenced_files(manifest: &str) -> BTreeSet<String> {
    let mut files = BTreeSet::new();
    let mut rest = manifest;
    while let Some(position) = rest.find(KUBERNETES_FILE_REFERENCE) {
        // skip the leading '='
        let start = position + 1;
        let tail = &rest[start..];
        let end = tail
            .find(|c: char| c.is_whitespace() || matches!(c, '"' | '\'' | ',' | ']'))
            .unwrap_or(tail.len());
        let path = &tail[..end];
        if path.len() > KUBERNETES_FILE_REFERENCE.len() - 1 {
            files.insert(path.to_string());
        }
        rest = &tail[end..];
    }
    files
}

/// SHA-256 over a component's manifest template and the files it references.
///
/// The manifest key and bytes come first. Referenced files follow in sorted path
/// order; each contributes its path and, when the config secret carries it, the
/// content of the matching `extra-file-<basename>` key.
///
/// # Errors
///
/// Returns [`ChecksumError::MissingManifest`] when the template is absent.
pub fn component_checksum(data: &SecretData, component: &str) -> Result<String, ChecksumError> {
    let key = manifest_key(component);
    let manifest = data
        .get(&key)
        .ok_or_else(|| ChecksumError::MissingManifest {
            component: component.to_string(),
            key: key.clone(),
        })?;

    let mut hasher = Sha256::new();
    hasher.update(key.as_bytes());
    hasher.update(&manifest.0);

    let text = String::from_utf8_lossy(&manifest.0);
    for path in referenced_files(&text) {
        hasher.update(path.as_bytes());
        if let Some(content) = data.get(&extra_file_key(&path)) {
            hasher.update(&content.0);
        }
    }
    Ok(hex::encode(hasher.finalize()))
}

/// `extra-file-*` keys referenced by at least one component manifest.
#[must_use]
pub fn referenced_extra_file_keys(data: &SecretData) -> BTreeSet<String> {
    CONTROL_PLANE_COMPONENTS
        .iter()
        .filter_map(|component| data.get(&manifest_key(component)))
        .flat_map(|manifest| referenced_files(&String::from_utf8_lossy(&manifest.0)))
        .map(|path| extra_file_key(&path))
        .collect()
}

/// SHA-256 over the `extra-file-*` entries that no component references.
///
/// These are the files the node agent applies without restarting a pod.
#[must_use]
pub fn hot_reload_checksum(data: &SecretData) -> String {
    let referenced = referenced_extra_file_keys(data);
    let mut hasher = Sha256::new();
    for (key, value) in data {
        if key.starts_with(EXTRA_FILE_PREFIX) && !referenced.contains(key) {
            hasher.update(key.as_bytes());
            hasher.update(&value.0);
        }
    }
    hex::encode(hasher.finalize())
}

/// SHA-256 (hex) of arbitrary bytes.
#[must_use]
pub fn sha256_hex(bytes: &[u8]) -> String {
    hex::encode(Sha256::digest(bytes))
}

#[cfg(test)]
#[path = "checksum_tests.rs"]
mod checksum_tests;
