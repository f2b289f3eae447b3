// Copyright (c) 2026 sysreg contributors
// SPDX-License-Identifier: MIT

//! Common label and annotation constants used across all reconcilers.
//!
//! This module defines standard Kubernetes labels and registry-specific labels
//! to ensure consistency across all resources created by the controller.

use std::collections::BTreeMap;

// ============================================================================
// Kubernetes Standard Labels
// https://kubernetes.io/docs/concepts/overview/working-with-objects/common-labels/
// ============================================================================

/// Standard label for the tool being used to manage the operation of an application
pub const K8S_MANAGED_BY: &str = "app.kubernetes.io/managed-by";

/// Label selecting control-plane (master) nodes
pub const CONTROL_PLANE_NODE_ROLE: &str = "node-role.kubernetes.io/control-plane";

// ============================================================================
// Platform Labels
// ============================================================================

/// Owning platform label
pub const HERITAGE: &str = "heritage";

/// Owning module label
pub const MODULE: &str = "module";

/// Secret purpose label
pub const SECRET_TYPE: &str = "type";

// ============================================================================
// Label Values
// ============================================================================

/// Value for `heritage`
pub const HERITAGE_DECKHOUSE: &str = "deckhouse";

/// Value for `module`
pub const MODULE_SYSTEM_REGISTRY: &str = "system-registry";

/// Value for `app.kubernetes.io/managed-by`
pub const MANAGED_BY_SYSREG: &str = "sysreg";

/// `type` of the registry CA secret
pub const TYPE_CA_SECRET: &str = "ca-secret";

/// `type` of registry user secrets
pub const TYPE_USER_SECRET: &str = "user-secret";

/// `type` of per-node PKI secrets
pub const TYPE_NODE_PKI_SECRET: &str = "node-pki-secret";

/// `type` of per-node services payload secrets
pub const TYPE_NODE_SERVICES_SECRET: &str = "node-services-secret";

/// `type` of the shared registry secrets
pub const TYPE_SHARED_SECRET: &str = "shared-secret";

/// Label selector matching every secret managed by the registry reconciler
pub const REGISTRY_SECRETS_SELECTOR: &str = "module=system-registry";

/// Build the label set carried by every managed registry secret.
#[must_use]
pub fn registry_secret_labels(secret_type: &str) -> BTreeMap<String, String> {
    BTreeMap::from([
        (HERITAGE.to_string(), HERITAGE_DECKHOUSE.to_string()),
        (MODULE.to_string(), MODULE_SYSTEM_REGISTRY.to_string()),
        (K8S_MANAGED_BY.to_string(), MANAGED_BY_SYSREG.to_string()),
        (SECRET_TYPE.to_string(), secret_type.to_string()),
    ])
}

/// Whether a node label set marks a control-plane node.
#[must_use]
pub fn is_control_plane(labels: &BTreeMap<String, String>) -> bool {
    labels.contains_key(CONTROL_PLANE_NODE_ROLE)
}
