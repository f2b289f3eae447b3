// Copyright (c) 2026 sysreg contributors
// SPDX-License-Identifier: MIT

//! Custom Resource Definitions used by the registry control plane.
//!
//! # Resource Types
//!
//! ## Produced
//!
//! - [`ControlPlaneNode`] - per master node rollout record carrying the PKI checksum,
//!   the configuration version, per-component checksums and the node services reference
//!
//! ## Consumed
//!
//! - [`ModuleConfig`] - platform module toggle and opaque settings tree
//!
//! # Example: A ControlPlaneNode spec
//!
//! ```rust,no_run
//! use sysreg::crd::{ComponentChecksum, ComponentChecksums, ControlPlaneNodeSpec};
//!
//! let spec = ControlPlaneNodeSpec {
//!     pki_checksum: "ab12".to_string(),
//!     config_version: "1001.2002".to_string(),
//!     hot_reload_checksum: "cd34".to_string(),
//!     components: ComponentChecksums::default(),
//!     node_services: None,
//! };
//! ```

use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Standard Kubernetes condition.
#[derive(Clone, Debug, Serialize, Deserialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Condition {
    /// Type of condition: `Configured` (orchestrator) or `Ready` (node agent).
    pub r#type: String,

    /// Status of the condition: True, False, or Unknown.
    pub status: String,

    /// Brief CamelCase reason for the condition's last transition.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,

    /// Human-readable message indicating details about the transition.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,

    /// Last time the condition transitioned from one status to another (RFC3339 format).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_transition_time: Option<String>,
}

/// Registry operating mode. Exactly one mode is active for a configured node.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, JsonSchema, PartialEq, Eq, Hash)]
pub enum RegistryMode {
    /// Registry serves images pushed into the cluster, optionally mirroring upstreams
    Local,
    /// Registry proxies and caches an upstream registry
    Proxy,
}

impl std::fmt::Display for RegistryMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Local => write!(f, "Local"),
            Self::Proxy => write!(f, "Proxy"),
        }
    }
}

/// Checksum of a single control-plane component.
#[derive(Clone, Debug, Default, Serialize, Deserialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ComponentChecksum {
    /// SHA-256 (hex) over the manifest and every file it references
    pub checksum: String,
}

/// Checksums of the four control-plane components.
#[derive(Clone, Debug, Default, Serialize, Deserialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ComponentChecksums {
    pub etcd: ComponentChecksum,
    pub kube_api_server: ComponentChecksum,
    pub kube_controller_manager: ComponentChecksum,
    pub kube_scheduler: ComponentChecksum,
}

impl ComponentChecksums {
    /// Set the checksum of a component by its manifest name (e.g. `kube-apiserver`).
    ///
    /// Returns `false` for unknown component names.
    pub fn set(&mut self, component: &str, checksum: String) -> bool {
        let slot = match component {
            "etcd" => &mut self.etcd,
            "kube-apiserver" => &mut self.kube_api_server,
            "kube-controller-manager" => &mut self.kube_controller_manager,
            "kube-scheduler" => &mut self.kube_scheduler,
            _ => return false,
        };
        slot.checksum = checksum;
        true
    }

    /// Get the checksum of a component by its manifest name.
    #[must_use]
    pub fn get(&self, component: &str) -> Option<&str> {
        match component {
            "etcd" => Some(&self.etcd.checksum),
            "kube-apiserver" => Some(&self.kube_api_server.checksum),
            "kube-controller-manager" => Some(&self.kube_controller_manager.checksum),
            "kube-scheduler" => Some(&self.kube_scheduler.checksum),
            _ => None,
        }
    }
}

/// Reference to the node services payload published for a node.
#[derive(Clone, Debug, Serialize, Deserialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct NodeServicesRef {
    /// Active registry mode
    pub mode: RegistryMode,

    /// SHA-256 (hex) of the serialized payload; the agent applies on change
    pub version: String,

    /// Secret in the registry namespace holding the payload
    pub secret_name: String,
}

/// `ControlPlaneNode` describes the desired configuration of one master node.
///
/// It is created for every node carrying the `node-role.kubernetes.io/control-plane`
/// label and deleted when the node disappears or loses the label. The node-local
/// agent watches its own `ControlPlaneNode` and reports readiness in the status.
///
/// # Example
///
/// ```yaml
/// apiVersion: control-plane.deckhouse.io/v1alpha1
/// kind: ControlPlaneNode
/// metadata:
///   name: master-1
/// spec:
///   pkiChecksum: 5f1c...
///   configVersion: "1001.2002"
///   hotReloadChecksum: 9a0b...
///   components:
///     etcd: {checksum: 11aa...}
///     kubeApiServer: {checksum: 22bb...}
///     kubeControllerManager: {checksum: 33cc...}
///     kubeScheduler: {checksum: 44dd...}
///   nodeServices:
///     mode: Local
///     version: 77ee...
///     secretName: registry-node-master-1-services
/// ```
#[derive(CustomResource, Clone, Debug, Serialize, Deserialize, JsonSchema, PartialEq, Eq)]
#[kube(
    group = "control-plane.deckhouse.io",
    version = "v1alpha1",
    kind = "ControlPlaneNode",
    doc = "ControlPlaneNode carries the desired configuration checksums of one control-plane node. The node-local agent applies it and reports readiness.",
    printcolumn = r#"{"name":"ConfigVersion","type":"string","jsonPath":".spec.configVersion"}"#,
    printcolumn = r#"{"name":"Ready","type":"boolean","jsonPath":".status.ready"}"#
)]
#[kube(status = "ControlPlaneNodeStatus")]
#[serde(rename_all = "camelCase")]
pub struct ControlPlaneNodeSpec {
    /// SHA-256 (hex) over the PKI secret data, keys sorted
    pub pki_checksum: String,

    /// `<configSecretResourceVersion>.<pkiSecretResourceVersion>`
    pub config_version: String,

    /// SHA-256 (hex) over the files applied without a pod restart
    pub hot_reload_checksum: String,

    /// Per-component checksums
    pub components: ComponentChecksums,

    /// Node services payload reference; absent when the registry is disabled
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub node_services: Option<NodeServicesRef>,
}

/// `ControlPlaneNode` status, written by the node agent (readiness) and the
/// orchestrator (`Configured` condition).
#[derive(Clone, Debug, Default, Serialize, Deserialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ControlPlaneNodeStatus {
    /// Whether the agent applied the current spec
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ready: Option<bool>,

    /// Last `configVersion` applied by the agent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub observed_config_version: Option<String>,

    /// Last node services version applied by the agent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub observed_node_services_version: Option<String>,

    #[serde(default)]
    pub conditions: Vec<Condition>,
}

impl ControlPlaneNode {
    /// Whether the agent reports the current spec as applied.
    ///
    /// Used as the rollout gate before progressing to the next node.
    #[must_use]
    pub fn is_ready(&self) -> bool {
        let Some(status) = self.status.as_ref() else {
            return false;
        };
        let services_version = self.spec.node_services.as_ref().map(|s| s.version.clone());
        status.ready == Some(true)
            && status.observed_config_version.as_deref() == Some(self.spec.config_version.as_str())
            && status.observed_node_services_version == services_version
    }

    /// Whether the agent reported a status that lags behind the spec versions.
    #[must_use]
    pub fn has_unapplied_spec(&self) -> bool {
        let Some(status) = self.status.as_ref() else {
            return false;
        };
        let services_version = self.spec.node_services.as_ref().map(|s| s.version.clone());
        status.observed_config_version.as_deref() != Some(self.spec.config_version.as_str())
            || status.observed_node_services_version != services_version
    }
}

/// Platform module configuration (`deckhouse.io/v1alpha1`), consumed read-only.
///
/// `settings` is an opaque tree; [`crate::settings::RegistrySettings`] narrows it.
#[derive(CustomResource, Clone, Debug, Default, Serialize, Deserialize, JsonSchema, PartialEq)]
#[kube(
    group = "deckhouse.io",
    version = "v1alpha1",
    kind = "ModuleConfig",
    doc = "ModuleConfig enables a platform module and carries its settings."
)]
#[serde(rename_all = "camelCase")]
pub struct ModuleConfigSpec {
    /// Whether the module is enabled
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub enabled: Option<bool>,

    /// Settings schema version
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<i64>,

    /// Opaque settings tree
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub settings: Option<serde_json::Value>,
}
