// Copyright (c) 2026 sysreg contributors
// SPDX-License-Identifier: MIT

//! Kubernetes reconciliation controllers for the embedded registry.
//!
//! # Available Reconcilers
//!
//! - [`reconcile_registry`] - converges the registry CA, users, HTTP secret and
//!   per-node certificate secrets; keyed on `ModuleConfig/system-registry`
//! - [`reconcile_control_plane_node`] - builds and publishes the desired
//!   `ControlPlaneNode` of each master node; keyed on `Node`
//!
//! Both run with one reconcile at a time and share the in-memory registry mirror
//! held in [`crate::context::Context`]. Failures are requeued through the
//! per-controller [`retry::RateLimiter`].

pub mod control_plane_node;
pub mod events;
pub mod registry;
pub mod resources;
pub mod retry;
pub mod status;

pub use control_plane_node::reconcile_control_plane_node;
pub use registry::reconcile_registry;

use crate::context::Context;
use crate::metrics;
use kube::runtime::controller::Action;
use tracing::warn;

/// Error type handed to `kube::runtime::Controller`.
#[derive(Debug, thiserror::Error)]
#[error(transparent)]
pub struct ReconcileError(#[from] anyhow::Error);

/// Requeue action for a failed reconcile of `key`.
///
/// The delay comes from the controller's rate limiter: exponential per key,
/// bounded by the global token bucket.
pub fn requeue_after_error(ctx: &Context, kind: &str, key: &str, error: &ReconcileError) -> Action {
    let delay = ctx.rate_limiter.when(key);
    warn!(
        kind = %kind,
        key = %key,
        failures = ctx.rate_limiter.failures(key),
        delay_ms = delay.as_millis(),
        error = %error,
        "Reconcile failed, requeueing"
    );
    metrics::record_reconciliation_requeue(kind, "error");
    Action::requeue(delay)
}

/// Reset the failure count of `key` after a successful reconcile.
pub fn reset_backoff(ctx: &Context, key: &str) {
    ctx.rate_limiter.forget(key);
}
