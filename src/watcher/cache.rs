// Copyright (c) 2026 sysreg contributors
// SPDX-License-Identifier: MIT

//! Watcher cache.
//!
//! Holds what the previous scan published: the release digest and version of
//! every `(registry, module, channel)`, and the documentation bundle and
//! channel set of every `(registry, module, version)`. [`Cache::sync`]
//! replaces that state with a new scan and returns the documentation tasks
//! that move the backends from the old state to the new one.

use super::{DocumentationTask, TaskKind, VersionData};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::{PoisonError, RwLock};

/// `(registry, module, channel)`
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ReleaseKey {
    pub registry: String,
    pub module: String,
    pub channel: String,
}

impl ReleaseKey {
    #[must_use]
    pub fn new(registry: &str, module: &str, channel: &str) -> Self {
        Self {
            registry: registry.to_string(),
            module: module.to_string(),
            channel: channel.to_string(),
        }
    }
}

/// `(registry, module, version)`
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct VersionKey {
    pub registry: String,
    pub module: String,
    pub version: String,
}

#[derive(Clone, Debug, PartialEq, Eq)]
struct ReleaseEntry {
    digest: String,
    version: String,
}

/// Bundle and channel set of one module version.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct VersionEntry {
    pub tar_file: Vec<u8>,
    pub release_channels: BTreeSet<String>,
}

#[derive(Clone, Debug, Default)]
struct State {
    releases: BTreeMap<ReleaseKey, ReleaseEntry>,
    versions: BTreeMap<VersionKey, VersionEntry>,
}

/// Result of one scan as handed to [`Cache::sync`].
///
/// Failed scopes keep their previous state so a transient registry error
/// never unpublishes documentation.
#[derive(Clone, Debug, Default)]
pub struct ScanOutcome {
    pub versions: Vec<VersionData>,
    pub failed_registries: BTreeSet<String>,
    /// `(registry, module)`
    pub failed_modules: BTreeSet<(String, String)>,
    pub failed_channels: BTreeSet<ReleaseKey>,
}

impl ScanOutcome {
    fn is_failed(&self, key: &ReleaseKey) -> bool {
        self.failed_registries.contains(&key.registry)
            || self
                .failed_modules
                .contains(&(key.registry.clone(), key.module.clone()))
            || self.failed_channels.contains(key)
    }
}

/// Tar-less copy of the cache for inspection.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct CacheSnapshot {
    /// Release digest per channel
    pub digests: BTreeMap<ReleaseKey, String>,
    /// Channel set and bundle size per version
    pub versions: BTreeMap<VersionKey, (BTreeSet<String>, usize)>,
}

/// Internally synchronized watcher cache.
#[derive(Debug, Default)]
pub struct Cache {
    state: RwLock<State>,
}

impl Cache {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Release digest seen for `key` in the previous scan.
    #[must_use]
    pub fn release_digest(&self, key: &ReleaseKey) -> Option<String> {
        let state = self.state.read().unwrap_or_else(PoisonError::into_inner);
        state.releases.get(key).map(|entry| entry.digest.clone())
    }

    /// Version and bundle of `key` if the previous scan saw the same `digest`.
    #[must_use]
    pub fn cached_release(&self, key: &ReleaseKey, digest: &str) -> Option<(String, Vec<u8>)> {
        let state = self.state.read().unwrap_or_else(PoisonError::into_inner);
        let release = state.releases.get(key).filter(|r| r.digest == digest)?;
        let entry = state.versions.get(&VersionKey {
            registry: key.registry.clone(),
            module: key.module.clone(),
            version: release.version.clone(),
        })?;
        Some((release.version.clone(), entry.tar_file.clone()))
    }

    /// Replace the cached state with `outcome` and return the tasks needed to
    /// move from the old state to the new one.
    ///
    /// Deletes come before creates; within each kind tasks are sorted by
    /// `(registry, module, version)`.
    pub fn sync(&self, outcome: &ScanOutcome) -> Vec<DocumentationTask> {
        let mut state = self.state.write().unwrap_or_else(PoisonError::into_inner);

        let mut releases: BTreeMap<ReleaseKey, ReleaseEntry> = BTreeMap::new();
        let mut tars: BTreeMap<VersionKey, Vec<u8>> = BTreeMap::new();
        for data in &outcome.versions {
            let key = ReleaseKey::new(&data.registry, &data.module, &data.release_channel);
            releases.insert(
                key,
                ReleaseEntry {
                    digest: data.release_digest.clone(),
                    version: data.version.clone(),
                },
            );
            tars.insert(
                VersionKey {
                    registry: data.registry.clone(),
                    module: data.module.clone(),
                    version: data.version.clone(),
                },
                data.tar_file.clone(),
            );
        }

        for (key, entry) in &state.releases {
            if outcome.is_failed(key) && !releases.contains_key(key) {
                releases.insert(key.clone(), entry.clone());
            }
        }

        let mut versions: BTreeMap<VersionKey, VersionEntry> = BTreeMap::new();
        for (key, release) in &releases {
            let version_key = VersionKey {
                registry: key.registry.clone(),
                module: key.module.clone(),
                version: release.version.clone(),
            };
            let tar_file = tars
                .get(&version_key)
                .or_else(|| state.versions.get(&version_key).map(|v| &v.tar_file))
                .cloned()
                .unwrap_or_default();
            let entry = versions.entry(version_key).or_insert_with(|| VersionEntry {
                tar_file,
                release_channels: BTreeSet::new(),
            });
            entry.release_channels.insert(key.channel.clone());
        }

        let tasks = diff(&state.versions, &versions);
        *state = State { releases, versions };
        tasks
    }

    /// Copy of the cache without bundles.
    #[must_use]
    pub fn snapshot(&self) -> CacheSnapshot {
        let state = self.state.read().unwrap_or_else(PoisonError::into_inner);
        CacheSnapshot {
            digests: state
                .releases
                .iter()
                .map(|(k, r)| (k.clone(), r.digest.clone()))
                .collect(),
            versions: state
                .versions
                .iter()
                .map(|(k, v)| (k.clone(), (v.release_channels.clone(), v.tar_file.len())))
                .collect(),
        }
    }
}

fn task(
    key: &VersionKey,
    channels: &BTreeSet<String>,
    tar_file: Vec<u8>,
    kind: TaskKind,
) -> DocumentationTask {
    DocumentationTask {
        registry: key.registry.clone(),
        module: key.module.clone(),
        version: key.version.clone(),
        release_channels: channels.iter().cloned().collect(),
        tar_file,
        kind,
    }
}

/// Tasks turning `old` into `new`.
fn diff(
    old: &BTreeMap<VersionKey, VersionEntry>,
    new: &BTreeMap<VersionKey, VersionEntry>,
) -> Vec<DocumentationTask> {
    let mut deletes = Vec::new();
    let mut creates = Vec::new();

    for (key, before) in old {
        let removed: BTreeSet<String> = match new.get(key) {
            Some(after) => before
                .release_channels
                .difference(&after.release_channels)
                .cloned()
                .collect(),
            None => before.release_channels.clone(),
        };
        if !removed.is_empty() {
            deletes.push(task(key, &removed, Vec::new(), TaskKind::Delete));
        }
    }

    for (key, after) in new {
        let added: BTreeSet<String> = match old.get(key) {
            Some(before) => after
                .release_channels
                .difference(&before.release_channels)
                .cloned()
                .collect(),
            None => after.release_channels.clone(),
        };
        if !added.is_empty() {
            creates.push(task(key, &added, after.tar_file.clone(), TaskKind::Create));
        }
    }

    deletes.extend(creates);
    deletes
}

#[cfg(test)]
mod tests {
    use super::*;

    fn data(
        registry: &str,
        module: &str,
        channel: &str,
        digest: &str,
        version: &str,
    ) -> VersionData {
        VersionData {
            registry: registry.to_string(),
            module: module.to_string(),
            release_channel: channel.to_string(),
            release_digest: digest.to_string(),
            version: version.to_string(),
            tar_file: format!("{module}-{version}").into_bytes(),
            image_ref: crate::watcher::image_reference(registry, module, version),
        }
    }

    fn outcome(versions: Vec<VersionData>) -> ScanOutcome {
        ScanOutcome {
            versions,
            ..ScanOutcome::default()
        }
    }

    #[test]
    fn test_first_sync_creates_one_task_per_version() {
        let cache = Cache::new();
        let tasks = cache.sync(&outcome(vec![
            data("r1", "parca", "rock-solid", "d1", "4.5.6"),
            data("r1", "parca", "stable", "d2", "4.5.6"),
            data("r1", "console", "alpha", "d3", "1.0.0"),
        ]));

        assert_eq!(tasks.len(), 2);
        assert!(tasks.iter().all(|t| t.kind == TaskKind::Create));
        assert_eq!(tasks[0].module, "console");
        assert_eq!(tasks[1].release_channels, vec!["rock-solid", "stable"]);
        assert_eq!(tasks[1].tar_file, b"parca-4.5.6");
    }

    #[test]
    fn test_unchanged_sync_is_empty() {
        let cache = Cache::new();
        let scan = outcome(vec![data("r1", "console", "alpha", "d1", "1.0.0")]);
        cache.sync(&scan);
        assert!(cache.sync(&scan).is_empty());
    }

    #[test]
    fn test_channel_move_deletes_old_channel_and_creates_new_version() {
        let cache = Cache::new();
        cache.sync(&outcome(vec![
            data("r1", "parca", "rock-solid", "d1", "4.5.6"),
            data("r1", "parca", "stable", "d1", "4.5.6"),
        ]));

        let tasks = cache.sync(&outcome(vec![
            data("r1", "parca", "rock-solid", "d1", "4.5.6"),
            data("r1", "parca", "stable", "d2", "4.6.0"),
        ]));

        assert_eq!(tasks.len(), 2);
        assert_eq!(tasks[0].kind, TaskKind::Delete);
        assert_eq!(tasks[0].version, "4.5.6");
        assert_eq!(tasks[0].release_channels, vec!["stable"]);
        assert!(tasks[0].tar_file.is_empty());
        assert_eq!(tasks[1].kind, TaskKind::Create);
        assert_eq!(tasks[1].version, "4.6.0");
        assert_eq!(tasks[1].release_channels, vec!["stable"]);
    }

    #[test]
    fn test_vanished_module_is_deleted() {
        let cache = Cache::new();
        cache.sync(&outcome(vec![data("r1", "console", "alpha", "d1", "1.0.0")]));

        let tasks = cache.sync(&outcome(Vec::new()));
        assert_eq!(tasks.len(), 1);
        assert_eq!(tasks[0].kind, TaskKind::Delete);
        assert_eq!(tasks[0].release_channels, vec!["alpha"]);
    }

    #[test]
    fn test_failed_registry_keeps_previous_state() {
        let cache = Cache::new();
        cache.sync(&outcome(vec![
            data("r1", "console", "alpha", "d1", "1.0.0"),
            data("r2", "console", "alpha", "d2", "1.0.0"),
        ]));

        let mut failed = outcome(vec![data("r2", "console", "alpha", "d2", "1.0.0")]);
        failed.failed_registries.insert("r1".to_string());
        assert!(cache.sync(&failed).is_empty());

        let key = ReleaseKey::new("r1", "console", "alpha");
        assert_eq!(
            cache.cached_release(&key, "d1"),
            Some(("1.0.0".to_string(), b"console-1.0.0".to_vec()))
        );
    }

    #[test]
    fn test_failed_channel_keeps_previous_state() {
        let cache = Cache::new();
        cache.sync(&outcome(vec![
            data("r1", "console", "alpha", "d1", "1.0.0"),
            data("r1", "console", "beta", "d2", "1.1.0"),
        ]));

        let mut partial = outcome(vec![data("r1", "console", "alpha", "d1", "1.0.0")]);
        partial
            .failed_channels
            .insert(ReleaseKey::new("r1", "console", "beta"));
        assert!(cache.sync(&partial).is_empty());
    }

    #[test]
    fn test_cached_release_requires_matching_digest() {
        let cache = Cache::new();
        cache.sync(&outcome(vec![data("r1", "console", "alpha", "d1", "1.0.0")]));

        let key = ReleaseKey::new("r1", "console", "alpha");
        assert_eq!(cache.release_digest(&key).as_deref(), Some("d1"));
        assert!(cache.cached_release(&key, "d9").is_none());
        assert!(cache
            .cached_release(&ReleaseKey::new("r1", "console", "beta"), "d1")
            .is_none());
    }

    #[test]
    fn test_diff_then_resync_is_empty() {
        let cache = Cache::new();
        cache.sync(&outcome(vec![
            data("r1", "console", "alpha", "d1", "1.0.0"),
            data("r1", "console", "beta", "d2", "1.0.0"),
        ]));
        let next = outcome(vec![
            data("r1", "console", "alpha", "d3", "1.1.0"),
            data("r1", "parca", "stable", "d4", "2.0.0"),
        ]);
        assert!(!cache.sync(&next).is_empty());
        assert!(cache.sync(&next).is_empty());
    }

    #[test]
    fn test_snapshot_omits_bundles() {
        let cache = Cache::new();
        cache.sync(&outcome(vec![data("r1", "console", "alpha", "d1", "1.0.0")]));

        let snapshot = cache.snapshot();
        let key = VersionKey {
            registry: "r1".to_string(),
            module: "console".to_string(),
            version: "1.0.0".to_string(),
        };
        let (channels, tar_len) = &snapshot.versions[&key];
        assert!(channels.contains("alpha"));
        assert_eq!(*tar_len, "console-1.0.0".len());
    }
}
