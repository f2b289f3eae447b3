// Copyright (c) 2026 sysreg contributors
// SPDX-License-Identifier: MIT

//! PKI utilities for the embedded registry.
//!
//! Certificates are generated with `rcgen` and inspected with `x509-parser`.
//! All material is exchanged as PEM strings so it can be stored verbatim in
//! Kubernetes secrets and written to node-local files.
//!
//! # Material
//!
//! - **Registry CA** - self-signed, signs every other certificate
//! - **Auth token** - signed by the CA, used by the auth service to sign tokens
//! - **Node auth / distribution** - per node leaves whose SANs cover
//!   `127.0.0.1`, `localhost`, the node IP and the registry service DNS name
//!
//! # Example
//!
//! ```rust,no_run
//! use sysreg::pki::{generate_ca, generate_leaf, node_hosts, validate_leaf};
//!
//! let ca = generate_ca("embedded-registry-ca").unwrap();
//! let hosts = node_hosts("10.0.0.5");
//! let leaf = generate_leaf(&ca, "embedded-registry-auth", &hosts).unwrap();
//! validate_leaf(&leaf, &ca, &hosts, "auth.crt").unwrap();
//! ```

use crate::constants::{
    AUTH_TOKEN_CN, CA_VALIDITY_DAYS, LEAF_VALIDITY_DAYS, REGISTRY_SERVICE_DNS,
};
use crate::errors::PkiError;
use rcgen::{
    BasicConstraints, CertificateParams, DnType, DnValue, ExtendedKeyUsagePurpose, IsCa,
    KeyPair, KeyUsagePurpose,
};
use std::net::IpAddr;
use x509_parser::extensions::GeneralName;
use x509_parser::pem::parse_x509_pem;

/// A PEM-encoded certificate together with its PEM-encoded private key.
#[derive(Clone, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct CertKey {
    /// PEM-encoded X.509 certificate
    #[serde(rename = "cert")]
    pub cert_pem: String,
    /// PEM-encoded private key (PKCS#8)
    #[serde(rename = "key")]
    pub key_pem: String,
}

impl CertKey {
    /// Decode a certificate and key from raw secret bytes, checking that the key
    /// belongs to the certificate.
    ///
    /// # Errors
    ///
    /// Returns [`PkiError::Decode`] if either side is not valid PEM, or
    /// [`PkiError::KeyMismatch`] if the key does not match the certificate.
    pub fn from_pem_bytes(cert: &[u8], key: &[u8], what: &str) -> Result<Self, PkiError> {
        let cert_pem = String::from_utf8(cert.to_vec()).map_err(|e| PkiError::Decode {
            what: what.to_string(),
            reason: e.to_string(),
        })?;
        let key_pem = String::from_utf8(key.to_vec()).map_err(|e| PkiError::Decode {
            what: what.to_string(),
            reason: e.to_string(),
        })?;
        let pair = Self { cert_pem, key_pem };
        validate_key_pair(&pair, what)?;
        Ok(pair)
    }
}

/// Registry CA plus the auth token key pair.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CaBundle {
    /// Registry CA
    pub ca: CertKey,
    /// Auth token certificate, signed by the CA
    pub token: CertKey,
}

impl CaBundle {
    /// Generate a fresh CA and a token certificate signed by it.
    ///
    /// # Errors
    ///
    /// Returns [`PkiError::Generation`] if key or certificate generation fails.
    pub fn generate(ca_cn: &str) -> Result<Self, PkiError> {
        let ca = generate_ca(ca_cn)?;
        let token = generate_leaf(&ca, AUTH_TOKEN_CN, &[])?;
        Ok(Self { ca, token })
    }

    /// Validate internal consistency: both key pairs match and the token chains to the CA.
    ///
    /// # Errors
    ///
    /// Returns the first [`PkiError`] found.
    pub fn validate(&self) -> Result<(), PkiError> {
        validate_key_pair(&self.ca, "registry CA")?;
        validate_key_pair(&self.token, "auth token")?;
        validate_chain(&self.token, &self.ca, "auth token")
    }
}

/// Per-node auth and distribution certificates.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NodePki {
    /// Certificate of the auth service on the node
    pub auth: CertKey,
    /// Certificate of the distribution (registry) service on the node
    pub distribution: CertKey,
}

/// Hosts every per-node certificate must carry as SANs.
#[must_use]
pub fn node_hosts(node_ip: &str) -> Vec<String> {
    let mut hosts = vec!["127.0.0.1".to_string(), "localhost".to_string()];
    if !node_ip.is_empty() && !hosts.iter().any(|h| h == node_ip) {
        hosts.push(node_ip.to_string());
    }
    hosts.push(REGISTRY_SERVICE_DNS.to_string());
    hosts
}

fn generation_error(what: &str, err: &rcgen::Error) -> PkiError {
    PkiError::Generation {
        what: what.to_string(),
        reason: err.to_string(),
    }
}

fn validity_window(days: i64) -> (time::OffsetDateTime, time::OffsetDateTime) {
    let now = time::OffsetDateTime::now_utc();
    // backdate slightly so freshly issued material validates on nodes with clock skew
    (now - time::Duration::hours(1), now + time::Duration::days(days))
}

/// Generate a self-signed CA certificate and key.
///
/// # Errors
///
/// Returns [`PkiError::Generation`] if key or certificate generation fails.
pub fn generate_ca(common_name: &str) -> Result<CertKey, PkiError> {
    let key = KeyPair::generate().map_err(|e| generation_error("CA key", &e))?;

    let mut params = CertificateParams::default();
    let (not_before, not_after) = validity_window(CA_VALIDITY_DAYS);
    params.not_before = not_before;
    params.not_after = not_after;
    params.distinguished_name.push(
        DnType::CommonName,
        DnValue::Utf8String(common_name.to_string()),
    );
    params.is_ca = IsCa::Ca(BasicConstraints::Unconstrained);
    params.key_usages = vec![
        KeyUsagePurpose::KeyCertSign,
        KeyUsagePurpose::CrlSign,
        KeyUsagePurpose::DigitalSignature,
    ];

    let cert = params
        .self_signed(&key)
        .map_err(|e| generation_error("CA certificate", &e))?;

    Ok(CertKey {
        cert_pem: cert.pem(),
        key_pem: key.serialize_pem(),
    })
}

/// Generate a leaf certificate signed by `ca` with the given SANs.
///
/// IP literals in `hosts` become IP SANs; everything else becomes a DNS SAN.
///
/// # Errors
///
/// Returns [`PkiError::Decode`] if the CA cannot be loaded, or
/// [`PkiError::Generation`] if signing fails.
pub fn generate_leaf(ca: &CertKey, common_name: &str, hosts: &[String]) -> Result<CertKey, PkiError> {
    let ca_key = KeyPair::from_pem(&ca.key_pem).map_err(|e| PkiError::Decode {
        what: "CA key".to_string(),
        reason: e.to_string(),
    })?;
    let ca_params = CertificateParams::from_ca_cert_pem(&ca.cert_pem).map_err(|e| PkiError::Decode {
        what: "CA certificate".to_string(),
        reason: e.to_string(),
    })?;
    let ca_cert = ca_params
        .self_signed(&ca_key)
        .map_err(|e| generation_error("CA issuer", &e))?;

    let leaf_key = KeyPair::generate().map_err(|e| generation_error("leaf key", &e))?;

    let mut params =
        CertificateParams::new(hosts.to_vec()).map_err(|e| generation_error(common_name, &e))?;
    let (not_before, not_after) = validity_window(LEAF_VALIDITY_DAYS);
    params.not_before = not_before;
    params.not_after = not_after;
    params.distinguished_name.push(
        DnType::CommonName,
        DnValue::Utf8String(common_name.to_string()),
    );
    params.is_ca = IsCa::ExplicitNoCa;
    params.key_usages = vec![
        KeyUsagePurpose::DigitalSignature,
        KeyUsagePurpose::KeyEncipherment,
    ];
    params.extended_key_usages = vec![
        ExtendedKeyUsagePurpose::ServerAuth,
        ExtendedKeyUsagePurpose::ClientAuth,
    ];
    params.use_authority_key_identifier_extension = true;

    let cert = params
        .signed_by(&leaf_key, &ca_cert, &ca_key)
        .map_err(|e| generation_error(common_name, &e))?;

    Ok(CertKey {
        cert_pem: cert.pem(),
        key_pem: leaf_key.serialize_pem(),
    })
}

/// Generate the auth and distribution certificates of a node.
///
/// # Errors
///
/// Propagates [`generate_leaf`] failures.
pub fn generate_node_pki(ca: &CertKey, node_ip: &str) -> Result<NodePki, PkiError> {
    let hosts = node_hosts(node_ip);
    Ok(NodePki {
        auth: generate_leaf(ca, crate::constants::NODE_AUTH_CERT_CN, &hosts)?,
        distribution: generate_leaf(ca, crate::constants::NODE_DISTRIBUTION_CERT_CN, &hosts)?,
    })
}

/// Check that the private key belongs to the certificate.
///
/// # Errors
///
/// Returns [`PkiError::Decode`] or [`PkiError::KeyMismatch`].
pub fn validate_key_pair(pair: &CertKey, what: &str) -> Result<(), PkiError> {
    let key = KeyPair::from_pem(&pair.key_pem).map_err(|e| PkiError::Decode {
        what: format!("{what} key"),
        reason: e.to_string(),
    })?;

    let (_, pem) = parse_x509_pem(pair.cert_pem.as_bytes()).map_err(|e| PkiError::Decode {
        what: what.to_string(),
        reason: e.to_string(),
    })?;
    let cert = pem.parse_x509().map_err(|e| PkiError::Decode {
        what: what.to_string(),
        reason: e.to_string(),
    })?;

    let cert_public: &[u8] = &cert.public_key().subject_public_key.data;
    if key.public_key_raw() != cert_public {
        return Err(PkiError::KeyMismatch {
            what: what.to_string(),
        });
    }
    Ok(())
}

/// Check that `leaf` is signed by `ca` and currently valid.
///
/// # Errors
///
/// Returns [`PkiError::Decode`], [`PkiError::ChainInvalid`] or [`PkiError::Expired`].
pub fn validate_chain(leaf: &CertKey, ca: &CertKey, what: &str) -> Result<(), PkiError> {
    let (_, ca_pem) = parse_x509_pem(ca.cert_pem.as_bytes()).map_err(|e| PkiError::Decode {
        what: "registry CA".to_string(),
        reason: e.to_string(),
    })?;
    let ca_cert = ca_pem.parse_x509().map_err(|e| PkiError::Decode {
        what: "registry CA".to_string(),
        reason: e.to_string(),
    })?;

    let (_, leaf_pem) = parse_x509_pem(leaf.cert_pem.as_bytes()).map_err(|e| PkiError::Decode {
        what: what.to_string(),
        reason: e.to_string(),
    })?;
    let leaf_cert = leaf_pem.parse_x509().map_err(|e| PkiError::Decode {
        what: what.to_string(),
        reason: e.to_string(),
    })?;

    if leaf_cert.issuer().to_string() != ca_cert.subject().to_string() {
        return Err(PkiError::ChainInvalid {
            what: what.to_string(),
            reason: "issuer does not match CA subject".to_string(),
        });
    }

    leaf_cert
        .verify_signature(Some(ca_cert.public_key()))
        .map_err(|e| PkiError::ChainInvalid {
            what: what.to_string(),
            reason: e.to_string(),
        })?;

    if !leaf_cert.validity().is_valid() {
        return Err(PkiError::Expired {
            what: what.to_string(),
        });
    }
    Ok(())
}

/// Check that every host in `hosts` appears among the certificate SANs.
///
/// # Errors
///
/// Returns [`PkiError::Decode`] or [`PkiError::MissingSan`] naming the first missing host.
pub fn validate_hosts(leaf: &CertKey, hosts: &[String], what: &str) -> Result<(), PkiError> {
    let (_, pem) = parse_x509_pem(leaf.cert_pem.as_bytes()).map_err(|e| PkiError::Decode {
        what: what.to_string(),
        reason: e.to_string(),
    })?;
    let cert = pem.parse_x509().map_err(|e| PkiError::Decode {
        what: what.to_string(),
        reason: e.to_string(),
    })?;

    let mut dns_names: Vec<String> = Vec::new();
    let mut ips: Vec<IpAddr> = Vec::new();
    if let Ok(Some(san)) = cert.subject_alternative_name() {
        for name in &san.value.general_names {
            match name {
                GeneralName::DNSName(dns) => dns_names.push(dns.to_ascii_lowercase()),
                GeneralName::IPAddress(bytes) => {
                    if let Some(ip) = ip_from_bytes(bytes) {
                        ips.push(ip);
                    }
                }
                _ => {}
            }
        }
    }

    for host in hosts {
        let present = match host.parse::<IpAddr>() {
            Ok(ip) => ips.contains(&ip),
            Err(_) => dns_names.contains(&host.to_ascii_lowercase()),
        };
        if !present {
            return Err(PkiError::MissingSan {
                what: what.to_string(),
                host: host.clone(),
            });
        }
    }
    Ok(())
}

fn ip_from_bytes(bytes: &[u8]) -> Option<IpAddr> {
    match bytes.len() {
        4 => {
            let octets: [u8; 4] = bytes.try_into().ok()?;
            Some(IpAddr::from(octets))
        }
        16 => {
            let octets: [u8; 16] = bytes.try_into().ok()?;
            Some(IpAddr::from(octets))
        }
        _ => None,
    }
}

/// Full leaf validation: key pair, chain to `ca`, and required SANs.
///
/// # Errors
///
/// Returns the first [`PkiError`] found.
pub fn validate_leaf(
    leaf: &CertKey,
    ca: &CertKey,
    hosts: &[String],
    what: &str,
) -> Result<(), PkiError> {
    validate_key_pair(leaf, what)?;
    validate_chain(leaf, ca, what)?;
    validate_hosts(leaf, hosts, what)
}

/// Validate both certificates of a node against the CA and the node's hosts.
///
/// # Errors
///
/// Returns the first [`PkiError`] found.
pub fn validate_node_pki(pki: &NodePki, ca: &CertKey, node_ip: &str) -> Result<(), PkiError> {
    let hosts = node_hosts(node_ip);
    validate_leaf(&pki.auth, ca, &hosts, "auth.crt")?;
    validate_leaf(&pki.distribution, ca, &hosts, "distribution.crt")
}

#[cfg(test)]
#[path = "pki_tests.rs"]
mod pki_tests;
