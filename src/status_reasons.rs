// Copyright (c) 2026 sysreg contributors
// SPDX-License-Identifier: MIT

//! Status condition types and reasons for `ControlPlaneNode` resources.
//!
//! Two writers share the status of a `ControlPlaneNode`, each owning one
//! condition type:
//!
//! - **Orchestrator** → `Configured`: whether a desired state could be built
//!   for the node
//! - **Node agent** → `Ready`: whether the node applied the current spec
//!
//! # Example Status
//!
//! ```yaml
//! status:
//!   ready: true
//!   observedConfigVersion: "1001.2002"
//!   conditions:
//!     - type: Configured
//!       status: "True"
//!       reason: DesiredStateBuilt
//!     - type: Ready
//!       status: "True"
//!       reason: Applied
//!       message: "Applied config version 1001.2002"
//! ```

// ============================================================================
// Condition Types
// ============================================================================

/// Condition owned by the orchestrator.
pub const CONDITION_TYPE_CONFIGURED: &str = "Configured";

/// Condition owned by the node agent.
pub const CONDITION_TYPE_READY: &str = "Ready";

// ============================================================================
// Condition Status Values
// ============================================================================

pub const STATUS_TRUE: &str = "True";
pub const STATUS_FALSE: &str = "False";
pub const STATUS_UNKNOWN: &str = "Unknown";

// ============================================================================
// Orchestrator Reasons
// ============================================================================

/// Desired state was built and published.
pub const REASON_DESIRED_STATE_BUILT: &str = "DesiredStateBuilt";

/// Generic validation failure.
///
/// Specific failures use [`crate::errors::NodeServicesError::status_reason`].
pub const REASON_ERROR: &str = "Error";

/// Config or PKI secret is not available yet.
pub const REASON_INPUTS_MISSING: &str = "InputsMissing";

/// Spec change held back until another node finished applying its own.
pub const REASON_WAITING_FOR_ROLLOUT: &str = "WaitingForRollout";

// ============================================================================
// Node Agent Reasons
// ============================================================================

/// Current spec applied on the node.
pub const REASON_APPLIED: &str = "Applied";

/// Applying the spec failed; the agent retries.
pub const REASON_APPLY_FAILED: &str = "ApplyFailed";

/// Spec changed and is being applied.
pub const REASON_PROGRESSING: &str = "Progressing";

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_condition_types_are_distinct() {
        assert_ne!(CONDITION_TYPE_CONFIGURED, CONDITION_TYPE_READY);
    }

    #[test]
    fn test_reasons_are_camel_case() {
        for reason in [
            REASON_DESIRED_STATE_BUILT,
            REASON_ERROR,
            REASON_INPUTS_MISSING,
            REASON_APPLIED,
            REASON_APPLY_FAILED,
            REASON_PROGRESSING,
        ] {
            assert!(reason.chars().next().is_some_and(char::is_uppercase));
            assert!(!reason.contains(' '));
        }
    }
}
