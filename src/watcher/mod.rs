// Copyright (c) 2026 sysreg contributors
// SPDX-License-Identifier: MIT

//! Registry modules watcher.
//!
//! Periodically scans upstream registries for module release channels and
//! turns changes into documentation tasks:
//!
//! - [`scanner`] walks registries, modules and release channels
//! - [`cache`] remembers release digests and documentation bundles, and diffs
//!   scans into tasks
//! - [`client`] and [`oci`] talk to registries; [`docker_config`] supplies credentials
//! - [`extract`] reads `version.json`, `module.yaml` and documentation from image layers
//! - [`sender`] delivers tasks to the documentation backends

pub mod cache;
pub mod client;
pub mod docker_config;
pub mod extract;
pub mod oci;
pub mod scanner;
pub mod sender;

use std::fmt;

/// One release channel of one module as seen in a scan.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct VersionData {
    pub registry: String,
    pub module: String,
    pub release_channel: String,
    /// Digest of the release image; the cheap change detector
    pub release_digest: String,
    pub version: String,
    /// Repackaged documentation bundle
    pub tar_file: Vec<u8>,
    /// Module image the bundle was extracted from
    pub image_ref: String,
}

/// Reference of the module image `version` in `registry`.
#[must_use]
pub fn image_reference(registry: &str, module: &str, version: &str) -> String {
    format!("{registry}/{module}:{version}")
}

/// What a documentation task asks the backend to do.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum TaskKind {
    Create,
    Delete,
}

impl fmt::Display for TaskKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Create => write!(f, "create"),
            Self::Delete => write!(f, "delete"),
        }
    }
}

/// Publish or unpublish documentation of one module version in some channels.
#[derive(Clone, PartialEq, Eq)]
pub struct DocumentationTask {
    pub registry: String,
    pub module: String,
    pub version: String,
    /// Sorted release channels
    pub release_channels: Vec<String>,
    /// Bundle to publish; empty for deletes
    pub tar_file: Vec<u8>,
    pub kind: TaskKind,
}

impl fmt::Debug for DocumentationTask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DocumentationTask")
            .field("registry", &self.registry)
            .field("module", &self.module)
            .field("version", &self.version)
            .field("release_channels", &self.release_channels)
            .field("tar_len", &self.tar_file.len())
            .field("kind", &self.kind)
            .finish()
    }
}

/// Scan immediately, then every `interval`, delivering tasks to `backends`.
///
/// Cancellation stops the ticker and aborts an in-flight scan or delivery.
/// An aborted scan leaves the cache untouched.
pub async fn run(
    scanner: &scanner::Scanner,
    sender: &sender::DocsSender,
    backends: &[String],
    interval: std::time::Duration,
    shutdown: tokio_util::sync::CancellationToken,
) {
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            () = shutdown.cancelled() => {
                tracing::info!("Modules watcher stopped");
                return;
            }
            _ = ticker.tick() => {}
        }

        let tasks = scanner.scan(&shutdown).await;
        if shutdown.is_cancelled() {
            tracing::info!("Modules watcher stopped");
            return;
        }
        if let Err(e) = sender.send(backends, &tasks, &shutdown).await {
            tracing::warn!(error = %e, "Some documentation tasks were not delivered");
        }
    }
}
