// Copyright (c) 2026 sysreg contributors
// SPDX-License-Identifier: MIT

//! Status condition helpers for `ControlPlaneNode` resources.
//!
//! Conditions follow the standard Kubernetes format:
//! - `type`: the aspect being reported (`Configured`, `Ready`)
//! - `status`: "True", "False", or "Unknown"
//! - `reason`: a programmatic identifier (CamelCase)
//! - `message`: a human-readable explanation
//! - `lastTransitionTime`: RFC3339 timestamp of the last status change
//!
//! # Example
//!
//! ```rust,no_run
//! use sysreg::reconcilers::status::create_condition;
//!
//! let condition = create_condition(
//!     "Configured",
//!     "True",
//!     "DesiredStateBuilt",
//!     "Desired state published"
//! );
//! ```

use crate::crd::{Condition, ControlPlaneNode, ControlPlaneNodeStatus};
use anyhow::Result;
use chrono::Utc;
use kube::api::{Patch, PatchParams};
use kube::{Api, Client, ResourceExt};
use serde_json::json;
use tracing::debug;

/// Create a new condition with the current timestamp.
#[must_use]
pub fn create_condition(
    condition_type: &str,
    status: &str,
    reason: &str,
    message: &str,
) -> Condition {
    Condition {
        r#type: condition_type.to_string(),
        status: status.to_string(),
        reason: Some(reason.to_string()),
        message: Some(message.to_string()),
        last_transition_time: Some(Utc::now().to_rfc3339()),
    }
}

/// Check if a condition has changed compared to the existing one.
///
/// Type, status and message are compared; reason and `lastTransitionTime` are not.
#[must_use]
pub fn condition_changed(existing: &Option<Condition>, new_condition: &Condition) -> bool {
    if let Some(current) = existing {
        current.r#type != new_condition.r#type
            || current.status != new_condition.status
            || current.message != new_condition.message
    } else {
        true
    }
}

/// Find a condition by type.
#[must_use]
pub fn find_condition<'a>(
    conditions: &'a [Condition],
    condition_type: &str,
) -> Option<&'a Condition> {
    conditions.iter().find(|c| c.r#type == condition_type)
}

/// Update or add a condition in a conditions list (in-memory, no API call).
///
/// `lastTransitionTime` is preserved when the status does not change.
/// Conditions of other types are left untouched.
pub fn update_condition_in_memory(
    conditions: &mut Vec<Condition>,
    condition_type: &str,
    status: &str,
    reason: &str,
    message: &str,
) {
    if let Some(existing) = conditions.iter_mut().find(|c| c.r#type == condition_type) {
        let last_transition_time = if existing.status == status {
            existing
                .last_transition_time
                .clone()
                .unwrap_or_else(|| Utc::now().to_rfc3339())
        } else {
            Utc::now().to_rfc3339()
        };

        existing.status = status.to_string();
        existing.reason = Some(reason.to_string());
        existing.message = Some(message.to_string());
        existing.last_transition_time = Some(last_transition_time);
    } else {
        conditions.push(create_condition(condition_type, status, reason, message));
    }
}

/// Compare two condition lists ignoring `lastTransitionTime`.
#[must_use]
pub fn conditions_equal(current: &[Condition], new: &[Condition]) -> bool {
    if current.len() != new.len() {
        return false;
    }

    new.iter().all(|new_cond| {
        current.iter().any(|curr| {
            curr.r#type == new_cond.r#type
                && curr.status == new_cond.status
                && curr.reason == new_cond.reason
                && curr.message == new_cond.message
        })
    })
}

/// Collects status changes of a `ControlPlaneNode` and applies them in a single patch.
///
/// Each writer only touches its own condition type and fields; everything else is
/// carried over from the observed status.
pub struct ControlPlaneNodeStatusUpdater {
    name: String,
    current_status: Option<ControlPlaneNodeStatus>,
    new_status: ControlPlaneNodeStatus,
}

impl ControlPlaneNodeStatusUpdater {
    #[must_use]
    pub fn new(node: &ControlPlaneNode) -> Self {
        let current_status = node.status.clone();
        let new_status = current_status.clone().unwrap_or_default();

        Self {
            name: node.name_any(),
            current_status,
            new_status,
        }
    }

    /// Update or add a condition (in-memory only).
    pub fn set_condition(
        &mut self,
        condition_type: &str,
        status: &str,
        reason: &str,
        message: &str,
    ) {
        update_condition_in_memory(
            &mut self.new_status.conditions,
            condition_type,
            status,
            reason,
            message,
        );
    }

    /// Record that the agent applied `config_version` and `services_version`.
    pub fn set_applied(&mut self, config_version: &str, services_version: Option<&str>) {
        self.new_status.ready = Some(true);
        self.new_status.observed_config_version = Some(config_version.to_string());
        self.new_status.observed_node_services_version = services_version.map(str::to_string);
    }

    /// Mark the node as not ready, keeping the last observed versions.
    pub fn set_not_ready(&mut self) {
        self.new_status.ready = Some(false);
    }

    #[must_use]
    pub fn status(&self) -> &ControlPlaneNodeStatus {
        &self.new_status
    }

    /// Whether the collected status differs semantically from the observed one.
    #[must_use]
    pub fn has_changes(&self) -> bool {
        match &self.current_status {
            None => true,
            Some(current) => {
                current.ready != self.new_status.ready
                    || current.observed_config_version != self.new_status.observed_config_version
                    || current.observed_node_services_version
                        != self.new_status.observed_node_services_version
                    || !conditions_equal(&current.conditions, &self.new_status.conditions)
            }
        }
    }

    /// Apply the collected changes with one merge patch; skipped when unchanged.
    ///
    /// # Errors
    ///
    /// Returns an error if the Kubernetes API call fails.
    pub async fn apply(&self, client: &Client) -> Result<()> {
        if !self.has_changes() {
            debug!(node = %self.name, "ControlPlaneNode status unchanged, skipping update");
            return Ok(());
        }

        let api: Api<ControlPlaneNode> = Api::all(client.clone());

        // Explicit nulls so that cleared fields are removed by the merge patch.
        let patch = json!({
            "status": {
                "ready": self.new_status.ready,
                "observedConfigVersion": self.new_status.observed_config_version,
                "observedNodeServicesVersion": self.new_status.observed_node_services_version,
                "conditions": self.new_status.conditions,
            }
        });

        api.patch_status(&self.name, &PatchParams::default(), &Patch::Merge(&patch))
            .await?;

        debug!(
            node = %self.name,
            conditions = self.new_status.conditions.len(),
            "Updated ControlPlaneNode status"
        );

        Ok(())
    }
}

#[cfg(test)]
#[path = "status_tests.rs"]
mod status_tests;
