// Copyright (c) 2026 sysreg contributors
// SPDX-License-Identifier: MIT

//! Error types for the registry control plane.
//!
//! This module provides specialized error types for:
//! - PKI generation, decoding and chain validation
//! - Registry user credentials
//! - Control-plane checksums
//! - Node services configuration validation
//! - Upstream registry access and scanning in the modules watcher
//! - Documentation backend delivery
//! - Node-local file materialization
//!
//! Reconcilers convert these into `anyhow::Error` at their boundary; the
//! `status_reason` helpers give the CamelCase reason used on conditions and events.

use thiserror::Error;

/// Errors raised by PKI utilities.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PkiError {
    /// Certificate or key generation failed
    #[error("Failed to generate {what}: {reason}")]
    Generation {
        /// What was being generated (e.g. "CA certificate")
        what: String,
        /// Underlying failure
        reason: String,
    },

    /// PEM or DER material could not be decoded
    #[error("Failed to decode {what}: {reason}")]
    Decode {
        /// What was being decoded (e.g. "auth.crt")
        what: String,
        /// Underlying failure
        reason: String,
    },

    /// A required secret key is missing or empty
    #[error("Missing key '{key}' in secret '{secret}'")]
    MissingKey {
        /// Secret name
        secret: String,
        /// Data key
        key: String,
    },

    /// Private key does not belong to the certificate
    #[error("Private key does not match certificate {what}")]
    KeyMismatch {
        /// Certificate name
        what: String,
    },

    /// Certificate is not signed by the expected CA
    #[error("Certificate {what} is not signed by the registry CA: {reason}")]
    ChainInvalid {
        /// Certificate name
        what: String,
        /// Verification failure
        reason: String,
    },

    /// Certificate lacks a required subject alternative name
    #[error("Certificate {what} is missing required SAN '{host}'")]
    MissingSan {
        /// Certificate name
        what: String,
        /// Host name or IP that is missing
        host: String,
    },

    /// Certificate is outside its validity window
    #[error("Certificate {what} is expired or not yet valid")]
    Expired {
        /// Certificate name
        what: String,
    },
}

/// Errors raised by the credential store.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CredentialError {
    /// Hashing the password failed
    #[error("Failed to hash password for user '{user}': {reason}")]
    Hash {
        /// User name
        user: String,
        /// Underlying failure
        reason: String,
    },

    /// Stored triplet is incomplete
    #[error("User secret '{secret}' is incomplete: missing '{key}'")]
    Incomplete {
        /// Secret name
        secret: String,
        /// Missing key
        key: String,
    },
}

/// Errors raised while computing control-plane checksums.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ChecksumError {
    /// The PKI secret carries no data
    #[error("PKI secret has no data")]
    EmptyPki,

    /// A component manifest template is missing from the config secret
    #[error("Manifest '{key}' for component {component} not found in config secret")]
    MissingManifest {
        /// Component name (e.g. `kube-apiserver`)
        component: String,
        /// Expected data key
        key: String,
    },
}

/// Validation failures of the node services desired state.
///
/// These are terminal for a reconcile: they are recorded as a `Configured=False`
/// condition and a `Warning` event instead of being retried.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum NodeServicesError {
    /// Proxy environment combination is not allowed
    #[error("NoProxy should be empty when HTTP and HTTPS are empty")]
    NoProxyWithoutProxy,

    /// Neither local nor proxy mode settings are present
    #[error("Node services mode is undefined: neither localMode nor proxyMode.upstream.host is set")]
    ModeUndefined,

    /// Both local and proxy mode settings are present
    #[error("Node services mode is ambiguous: both localMode and proxyMode are set")]
    ModeAmbiguous,

    /// A required input for the node is missing from the registry state
    #[error("Node services input '{input}' is missing for node '{node}'")]
    MissingInput {
        /// Node name
        node: String,
        /// Missing input (e.g. "registry CA")
        input: String,
    },

    /// A required control-plane input is missing
    #[error("Control-plane configuration for node '{node}' is invalid: {reason}")]
    InvalidConfiguration {
        /// Node name
        node: String,
        /// Reason
        reason: String,
    },
}

impl NodeServicesError {
    /// Returns the Kubernetes status reason code for this error.
    #[must_use]
    pub fn status_reason(&self) -> &'static str {
        match self {
            Self::NoProxyWithoutProxy => "InvalidProxyEnvs",
            Self::ModeUndefined => "ModeUndefined",
            Self::ModeAmbiguous => "ModeAmbiguous",
            Self::MissingInput { .. } => "MissingInput",
            Self::InvalidConfiguration { .. } => "InvalidConfiguration",
        }
    }
}

/// Errors raised by upstream registry clients.
#[derive(Error, Debug, Clone)]
pub enum RegistryClientError {
    /// Transport level failure
    #[error("Request to registry {registry} failed: {reason}")]
    Transport {
        /// Registry repository path
        registry: String,
        /// Underlying failure
        reason: String,
    },

    /// Unexpected HTTP status
    #[error("Registry {registry} returned HTTP {status} for {url}")]
    UnexpectedStatus {
        /// Registry repository path
        registry: String,
        /// Requested URL
        url: String,
        /// HTTP status code
        status: u16,
    },

    /// Authentication challenge could not be satisfied
    #[error("Authentication to registry {registry} failed: {reason}")]
    Auth {
        /// Registry repository path
        registry: String,
        /// Reason
        reason: String,
    },

    /// Manifest or response body could not be decoded
    #[error("Invalid response from registry {registry}: {reason}")]
    InvalidResponse {
        /// Registry repository path
        registry: String,
        /// Reason
        reason: String,
    },
}

/// Errors raised while extracting data from images in the modules watcher.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ScanError {
    /// `version.json` not present as a regular file
    #[error("{file} not found in release image")]
    VersionFileMissing {
        /// File name
        file: String,
    },

    /// `version.json` present but unusable
    #[error("Invalid {file}: {reason}")]
    VersionInvalid {
        /// File name
        file: String,
        /// Reason
        reason: String,
    },

    /// Reading a layer failed
    #[error("Failed to read image layer: {reason}")]
    Layer {
        /// Reason
        reason: String,
    },

    /// Extraction panicked and was recovered
    #[error("Image extraction panicked for {object}: {reason}")]
    ExtractionPanic {
        /// `registry/module:channel` being processed
        object: String,
        /// Panic payload
        reason: String,
    },
}

/// Errors raised while delivering documentation tasks.
#[derive(Error, Debug, Clone)]
pub enum SenderError {
    /// Backend answered with a non-success status
    #[error("Documentation backend {backend} returned HTTP {status} for {path}")]
    UnexpectedStatus {
        /// Backend address
        backend: String,
        /// Request path
        path: String,
        /// HTTP status code
        status: u16,
    },

    /// Request could not be sent
    #[error("Documentation backend {backend} unreachable: {reason}")]
    Transport {
        /// Backend address
        backend: String,
        /// Reason
        reason: String,
    },

    /// Retry budget exhausted
    #[error("Giving up on {path} at {backend} after {attempts} attempts")]
    RetriesExhausted {
        /// Backend address
        backend: String,
        /// Request path
        path: String,
        /// Number of attempts
        attempts: u32,
    },

    /// Shutdown interrupted the delivery
    #[error("Delivery of {path} to {backend} cancelled by shutdown")]
    Cancelled {
        /// Backend address
        backend: String,
        /// Request path
        path: String,
    },
}

/// Errors raised by the node-local agent while materializing files.
#[derive(Error, Debug)]
pub enum AgentError {
    /// Filesystem write failed
    #[error("Failed to write {path}: {source}")]
    Write {
        /// Target path
        path: String,
        /// Underlying I/O error
        #[source]
        source: std::io::Error,
    },

    /// Filesystem removal failed
    #[error("Failed to remove {path}: {source}")]
    Remove {
        /// Target path
        path: String,
        /// Underlying I/O error
        #[source]
        source: std::io::Error,
    },

    /// Payload could not be decoded
    #[error("Invalid node services payload: {reason}")]
    InvalidPayload {
        /// Reason
        reason: String,
    },
}

/// Whether a Kubernetes error is an HTTP 404.
#[must_use]
pub fn is_not_found(err: &kube::Error) -> bool {
    matches!(err, kube::Error::Api(api_err) if api_err.code == 404)
}

/// Whether a Kubernetes error is an HTTP 409 optimistic concurrency conflict.
#[must_use]
pub fn is_conflict(err: &kube::Error) -> bool {
    matches!(err, kube::Error::Api(api_err) if api_err.code == 409)
}

/// Truncate an error message to at most `max_runes` characters for use as a metric label.
#[must_use]
pub fn truncate_label(message: &str, max_runes: usize) -> String {
    message.chars().take(max_runes).collect()
}
