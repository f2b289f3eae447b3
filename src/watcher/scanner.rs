// Copyright (c) 2026 sysreg contributors
// SPDX-License-Identifier: MIT

//! Registry scanner.
//!
//! One scan walks every registry, module and release channel sequentially.
//! The release digest is always queried; the release and module images are
//! only pulled when the digest differs from the cached one.
//!
//! Extraction panics are counted per release channel. The count is cleared
//! only once the channel's version and documentation were both extracted.

use super::cache::{Cache, ReleaseKey, ScanOutcome};
use super::client::{Image, RegistryClient};
use super::extract::{extract_documentation, read_module_definition, read_version};
use super::{image_reference, DocumentationTask, TaskKind, VersionData};
use crate::constants::{EXTRACTION_PANIC_THRESHOLD, RELEASE_CHANNELS};
use crate::errors::ScanError;
use crate::metrics::{
    record_extraction_panic, record_registry_scan, record_scan_duration, record_tasks_emitted,
    record_watcher_error,
};
use anyhow::Result;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Called with the object name once extraction keeps panicking for it.
pub type FatalHandler = Arc<dyn Fn(&str) + Send + Sync>;

/// Counts consecutive extraction panics per object.
pub struct PanicTracker {
    counts: Mutex<HashMap<String, u32>>,
    threshold: u32,
    on_fatal: FatalHandler,
}

impl PanicTracker {
    #[must_use]
    pub fn new(threshold: u32, on_fatal: FatalHandler) -> Self {
        Self {
            counts: Mutex::new(HashMap::new()),
            threshold,
            on_fatal,
        }
    }

    fn record_panic(&self, object: &str) {
        record_extraction_panic();
        let count = {
            let mut counts = self.counts.lock().unwrap_or_else(PoisonError::into_inner);
            let count = counts.entry(object.to_string()).or_insert(0);
            *count += 1;
            *count
        };
        if count >= self.threshold {
            error!(object = %object, panics = count, "Extraction keeps panicking");
            (self.on_fatal)(object);
        }
    }

    fn record_success(&self, object: &str) {
        self.counts
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(object);
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}

/// Panic accounting key of one release channel.
#[must_use]
pub fn extraction_object(registry: &str, module: &str, channel: &str) -> String {
    format!("{registry}/{module}:{channel}")
}

/// Keep recognized release channels, in canonical order.
#[must_use]
pub fn release_channels(tags: &[String]) -> Vec<String> {
    RELEASE_CHANNELS
        .iter()
        .filter(|channel| tags.iter().any(|tag| tag == *channel))
        .map(|channel| (*channel).to_string())
        .collect()
}

/// Scans registries and diffs the result against the cache.
pub struct Scanner {
    clients: Vec<Arc<dyn RegistryClient>>,
    cache: Arc<Cache>,
    panics: PanicTracker,
}

impl Scanner {
    #[must_use]
    pub fn new(
        clients: Vec<Arc<dyn RegistryClient>>,
        cache: Arc<Cache>,
        on_fatal: FatalHandler,
    ) -> Self {
        Self {
            clients,
            cache,
            panics: PanicTracker::new(EXTRACTION_PANIC_THRESHOLD, on_fatal),
        }
    }

    #[must_use]
    pub fn cache(&self) -> &Arc<Cache> {
        &self.cache
    }

    /// Run one scan and return the tasks it produced.
    ///
    /// Cancelling `shutdown` abandons the scan without touching the cache.
    pub async fn scan(&self, shutdown: &CancellationToken) -> Vec<DocumentationTask> {
        let start = Instant::now();
        let mut outcome = ScanOutcome::default();

        for client in &self.clients {
            let registry = client.name().to_string();
            let result = tokio::select! {
                biased;
                () = shutdown.cancelled() => {
                    info!(registry = %registry, "Scan cancelled, discarding partial results");
                    return Vec::new();
                }
                result = self.scan_registry(client.as_ref(), &mut outcome) => result,
            };
            match result {
                Ok(versions) => {
                    debug!(registry = %registry, versions = versions.len(), "Registry scanned");
                    outcome.versions.extend(versions);
                    record_registry_scan(&registry, true);
                }
                Err(e) => {
                    warn!(registry = %registry, error = %e, "Registry scan failed, keeping previous state");
                    record_registry_scan(&registry, false);
                    record_watcher_error(&registry, "", &e.to_string());
                    outcome.failed_registries.insert(registry);
                }
            }
        }

        let tasks = self.cache.sync(&outcome);
        let deletes = tasks.iter().filter(|t| t.kind == TaskKind::Delete).count();
        record_tasks_emitted("delete", deletes);
        record_tasks_emitted("create", tasks.len() - deletes);
        record_scan_duration(outcome.failed_registries.is_empty(), start.elapsed());

        info!(
            creates = tasks.len() - deletes,
            deletes = deletes,
            failed_registries = outcome.failed_registries.len(),
            elapsed = ?start.elapsed(),
            "Scan finished"
        );
        tasks
    }

    async fn scan_registry(
        &self,
        client: &dyn RegistryClient,
        outcome: &mut ScanOutcome,
    ) -> Result<Vec<VersionData>> {
        let registry = client.name();
        let modules = client.modules().await?;
        let mut versions = Vec::new();

        for module in modules {
            let tags = match client.list_tags(&module).await {
                Ok(tags) => tags,
                Err(e) => {
                    warn!(registry = %registry, module = %module, error = %e, "Failed to list release channels");
                    record_watcher_error(registry, &module, &e.to_string());
                    outcome
                        .failed_modules
                        .insert((registry.to_string(), module.clone()));
                    continue;
                }
            };

            for channel in release_channels(&tags) {
                match self.scan_channel(client, &module, &channel).await {
                    Ok(data) => versions.push(data),
                    Err(e) => {
                        warn!(
                            registry = %registry,
                            module = %module,
                            channel = %channel,
                            error = %e,
                            "Skipping release channel"
                        );
                        record_watcher_error(registry, &module, &e.to_string());
                        outcome
                            .failed_channels
                            .insert(ReleaseKey::new(registry, &module, &channel));
                    }
                }
            }
        }

        Ok(versions)
    }

    async fn scan_channel(
        &self,
        client: &dyn RegistryClient,
        module: &str,
        channel: &str,
    ) -> Result<VersionData> {
        let registry = client.name();
        let digest = client.release_digest(module, channel).await?;
        let key = ReleaseKey::new(registry, module, channel);

        let (version, tar_file) = match self.cache.cached_release(&key, &digest) {
            Some(cached) => cached,
            None => {
                let object = extraction_object(registry, module, channel);
                let release = client.release_image(module, channel).await?;
                let version = self
                    .guarded(&object, move || read_version(&release))
                    .await?;

                let image = client.image(module, &version).await?;
                let (definition, tar_file) = self
                    .guarded(&object, move || documentation(&image))
                    .await?;
                self.panics.record_success(&object);
                info!(
                    registry = %registry,
                    module = %module,
                    channel = %channel,
                    version = %version,
                    image = %image_reference(registry, module, &version),
                    module_definition_found = definition.is_some(),
                    critical = definition.as_ref().is_some_and(|d| d.critical),
                    "Fetched module documentation"
                );
                (version, tar_file)
            }
        };

        Ok(VersionData {
            registry: registry.to_string(),
            module: module.to_string(),
            release_channel: channel.to_string(),
            release_digest: digest,
            image_ref: image_reference(registry, module, &version),
            version,
            tar_file,
        })
    }

    /// Run an extraction step off the runtime, turning panics into errors.
    ///
    /// A panic counts against `object`; success does not reset the count.
    ///
    /// # Errors
    ///
    /// Returns the step's error, or [`ScanError::ExtractionPanic`] when it panicked.
    pub async fn guarded<T, F>(&self, object: &str, task: F) -> Result<T, ScanError>
    where
        T: Send + 'static,
        F: FnOnce() -> Result<T, ScanError> + Send + 'static,
    {
        match tokio::task::spawn_blocking(task).await {
            Ok(result) => result,
            Err(join_error) => {
                let reason = if join_error.is_panic() {
                    panic_message(join_error.into_panic().as_ref())
                } else {
                    join_error.to_string()
                };
                self.panics.record_panic(object);
                Err(ScanError::ExtractionPanic {
                    object: object.to_string(),
                    reason,
                })
            }
        }
    }
}

type Documentation = (Option<super::extract::ModuleDefinition>, Vec<u8>);

fn documentation(image: &Image) -> Result<Documentation, ScanError> {
    Ok((read_module_definition(image)?, extract_documentation(image)?))
}

#[cfg(test)]
#[path = "scanner_tests.rs"]
mod scanner_tests;
