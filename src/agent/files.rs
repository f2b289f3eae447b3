// Copyright (c) 2026 sysreg contributors
// SPDX-License-Identifier: MIT

//! Node-local file materialization.
//!
//! Every file is written to a hidden temporary sibling and renamed into place,
//! so readers (kubelet, registry containers) never observe partial content.
//! Unchanged files are not rewritten.

use crate::checksum::SecretData;
use crate::constants::{
    CONFIG_FILE_MODE, DECKHOUSE_CONFIG_DIR, DEFAULT_MANIFESTS_DIR, DEFAULT_PKI_DIR,
    DEFAULT_SERVICES_CONFIG_DIR, EXTRA_FILE_PREFIX, KEY_KUBEADM_CONFIG, MANIFEST_TEMPLATE_SUFFIX,
    PKI_DIR_MODE, PKI_FILE_MODE, STATIC_POD_MANIFEST_FILE,
};
use crate::errors::AgentError;
use crate::node_services::manifest::{self, HostPaths};
use crate::node_services::NodeServicesConfig;
use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

const CONFIG_DIR_MODE: u32 = 0o755;
const KUBEADM_DIR: &str = "kubeadm";
const KUBEADM_CONFIG_FILE: &str = "config.yaml";
const PATCHES_DIR: &str = "patches";
const EXTRA_FILES_DIR: &str = "extra-files";

/// Files written or removed by one apply.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct FileChanges {
    pub written: Vec<PathBuf>,
    pub removed: Vec<PathBuf>,
}

impl FileChanges {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.written.is_empty() && self.removed.is_empty()
    }

    fn extend(&mut self, other: FileChanges) {
        self.written.extend(other.written);
        self.removed.extend(other.removed);
    }
}

/// Directory layout of the node agent.
///
/// `root` is where the host filesystem is mounted in the agent container; the
/// other paths are relative to it and equal the host paths below `/`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NodePaths {
    pub root: PathBuf,
    pub pki_dir: PathBuf,
    pub manifests_dir: PathBuf,
    pub services_config_dir: PathBuf,
    pub deckhouse_dir: PathBuf,
}

impl NodePaths {
    #[must_use]
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            pki_dir: PathBuf::from(DEFAULT_PKI_DIR),
            manifests_dir: PathBuf::from(DEFAULT_MANIFESTS_DIR),
            services_config_dir: PathBuf::from(DEFAULT_SERVICES_CONFIG_DIR),
            deckhouse_dir: PathBuf::from(DECKHOUSE_CONFIG_DIR),
        }
    }

    fn local(&self, relative: &Path) -> PathBuf {
        self.root
            .join(relative.strip_prefix("/").unwrap_or(relative))
    }

    fn host(relative: &Path) -> String {
        let relative = relative.strip_prefix("/").unwrap_or(relative);
        format!("/{}", relative.display())
    }

    #[must_use]
    pub fn local_pki_dir(&self) -> PathBuf {
        self.local(&self.pki_dir)
    }

    #[must_use]
    pub fn local_services_config_dir(&self) -> PathBuf {
        self.local(&self.services_config_dir)
    }

    #[must_use]
    pub fn local_manifest_path(&self) -> PathBuf {
        self.local(&self.manifests_dir).join(STATIC_POD_MANIFEST_FILE)
    }

    #[must_use]
    pub fn local_deckhouse_dir(&self) -> PathBuf {
        self.local(&self.deckhouse_dir)
    }

    /// Host directories mounted into the registry static pod.
    #[must_use]
    pub fn host_paths(&self) -> HostPaths {
        HostPaths {
            pki_dir: Self::host(&self.pki_dir),
            config_dir: Self::host(&self.services_config_dir),
        }
    }
}

fn write_error(path: &Path, source: io::Error) -> AgentError {
    AgentError::Write {
        path: path.display().to_string(),
        source,
    }
}

fn remove_error(path: &Path, source: io::Error) -> AgentError {
    AgentError::Remove {
        path: path.display().to_string(),
        source,
    }
}

#[cfg(unix)]
fn set_mode(path: &Path, mode: u32) -> io::Result<()> {
    use std::os::unix::fs::PermissionsExt;
    fs::set_permissions(path, fs::Permissions::from_mode(mode))
}

#[cfg(not(unix))]
fn set_mode(_path: &Path, _mode: u32) -> io::Result<()> {
    Ok(())
}

#[cfg(unix)]
fn has_mode(path: &Path, mode: u32) -> bool {
    use std::os::unix::fs::PermissionsExt;
    fs::metadata(path).is_ok_and(|meta| meta.permissions().mode() & 0o777 == mode)
}

#[cfg(not(unix))]
fn has_mode(_path: &Path, _mode: u32) -> bool {
    true
}

/// Create `dir` and its parents; apply `mode` to `dir` itself when given.
///
/// # Errors
///
/// Returns [`AgentError::Write`] on I/O failure.
pub fn ensure_dir(dir: &Path, mode: Option<u32>) -> Result<(), AgentError> {
    fs::create_dir_all(dir).map_err(|e| write_error(dir, e))?;
    if let Some(mode) = mode {
        if !has_mode(dir, mode) {
            set_mode(dir, mode).map_err(|e| write_error(dir, e))?;
        }
    }
    Ok(())
}

/// Atomically replace `path` with `contents` and `mode`.
///
/// Returns `false` when the file already had this content and mode.
///
/// # Errors
///
/// Returns [`AgentError::Write`] on I/O failure.
pub fn write_atomic(path: &Path, contents: &[u8], mode: u32) -> Result<bool, AgentError> {
    if fs::read(path).is_ok_and(|existing| existing == contents) && has_mode(path, mode) {
        return Ok(false);
    }

    let (Some(dir), Some(name)) = (path.parent(), path.file_name()) else {
        return Err(write_error(
            path,
            io::Error::new(io::ErrorKind::InvalidInput, "path has no parent directory"),
        ));
    };
    let tmp = dir.join(format!(".{}.tmp", name.to_string_lossy()));

    let result = fs::write(&tmp, contents)
        .and_then(|()| set_mode(&tmp, mode))
        .and_then(|()| fs::rename(&tmp, path));
    if let Err(e) = result {
        let _ = fs::remove_file(&tmp);
        return Err(write_error(path, e));
    }
    Ok(true)
}

/// Remove `path`; `false` when it did not exist.
///
/// # Errors
///
/// Returns [`AgentError::Remove`] on I/O failure.
pub fn remove_file(path: &Path) -> Result<bool, AgentError> {
    match fs::remove_file(path) {
        Ok(()) => Ok(true),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
        Err(e) => Err(remove_error(path, e)),
    }
}

/// Make the regular files of `dir` exactly `desired`.
///
/// Files not in `desired` are removed; subdirectories are left alone. A
/// missing `dir` with nothing desired stays missing.
///
/// # Errors
///
/// Returns [`AgentError`] on I/O failure.
pub fn sync_dir(
    dir: &Path,
    desired: &BTreeMap<String, Vec<u8>>,
    file_mode: u32,
    dir_mode: u32,
) -> Result<FileChanges, AgentError> {
    let mut changes = FileChanges::default();

    if desired.is_empty() && !dir.exists() {
        return Ok(changes);
    }
    ensure_dir(dir, Some(dir_mode))?;

    for (name, contents) in desired {
        let path = dir.join(name);
        if write_atomic(&path, contents, file_mode)? {
            changes.written.push(path);
        }
    }

    let entries = fs::read_dir(dir).map_err(|e| remove_error(dir, e))?;
    for entry in entries {
        let entry = entry.map_err(|e| remove_error(dir, e))?;
        let is_file = entry.file_type().is_ok_and(|t| t.is_file());
        let name = entry.file_name().to_string_lossy().into_owned();
        if is_file && !desired.contains_key(&name) {
            let path = entry.path();
            if remove_file(&path)? {
                changes.removed.push(path);
            }
        }
    }

    changes.removed.sort();
    Ok(changes)
}

fn to_bytes<K: ToString>(files: BTreeMap<K, String>) -> BTreeMap<String, Vec<u8>> {
    files
        .into_iter()
        .map(|(name, contents)| (name.to_string(), contents.into_bytes()))
        .collect()
}

/// Write the PKI, service configuration and static pod of `config`.
///
/// The static pod manifest is written last so the kubelet only starts the pod
/// once its inputs are in place.
///
/// # Errors
///
/// Returns [`AgentError`] on I/O failure or when rendering fails.
pub fn apply_node_services(
    paths: &NodePaths,
    config: &NodeServicesConfig,
    version: &str,
) -> Result<FileChanges, AgentError> {
    let rendered = manifest::render(config, version, &paths.host_paths()).map_err(|e| {
        AgentError::InvalidPayload {
            reason: e.to_string(),
        }
    })?;

    let mut changes = sync_dir(
        &paths.local_pki_dir(),
        &to_bytes(config.pki_files()),
        PKI_FILE_MODE,
        PKI_DIR_MODE,
    )?;
    changes.extend(sync_dir(
        &paths.local_services_config_dir(),
        &to_bytes(rendered.config_files),
        CONFIG_FILE_MODE,
        CONFIG_DIR_MODE,
    )?);

    let manifest_path = paths.local_manifest_path();
    if let Some(dir) = manifest_path.parent() {
        ensure_dir(dir, None)?;
    }
    if write_atomic(&manifest_path, rendered.manifest.as_bytes(), CONFIG_FILE_MODE)? {
        changes.written.push(manifest_path);
    }

    Ok(changes)
}

/// Remove the static pod first, then its configuration and PKI.
///
/// # Errors
///
/// Returns [`AgentError`] on I/O failure.
pub fn remove_node_services(paths: &NodePaths) -> Result<FileChanges, AgentError> {
    let mut changes = FileChanges::default();

    let manifest_path = paths.local_manifest_path();
    if remove_file(&manifest_path)? {
        changes.removed.push(manifest_path);
    }
    let nothing = BTreeMap::new();
    changes.extend(sync_dir(
        &paths.local_services_config_dir(),
        &nothing,
        CONFIG_FILE_MODE,
        CONFIG_DIR_MODE,
    )?);
    changes.extend(sync_dir(
        &paths.local_pki_dir(),
        &nothing,
        PKI_FILE_MODE,
        PKI_DIR_MODE,
    )?);

    Ok(changes)
}

fn is_plain_file_name(name: &str) -> bool {
    !name.is_empty() && name != "." && name != ".." && !name.contains('/')
}

/// Split the control-plane config secret into `kubeadm`, `patches` and
/// `extra-files` directory contents.
#[must_use]
pub fn control_plane_files(data: &SecretData) -> BTreeMap<&'static str, BTreeMap<String, Vec<u8>>> {
    let mut out: BTreeMap<&'static str, BTreeMap<String, Vec<u8>>> = [
        (KUBEADM_DIR, BTreeMap::new()),
        (PATCHES_DIR, BTreeMap::new()),
        (EXTRA_FILES_DIR, BTreeMap::new()),
    ]
    .into_iter()
    .collect();

    for (key, value) in data {
        let (dir, name) = if key == KEY_KUBEADM_CONFIG {
            (KUBEADM_DIR, KUBEADM_CONFIG_FILE)
        } else if key.ends_with(MANIFEST_TEMPLATE_SUFFIX) {
            (PATCHES_DIR, key.as_str())
        } else if let Some(name) = key.strip_prefix(EXTRA_FILE_PREFIX) {
            (EXTRA_FILES_DIR, name)
        } else {
            continue;
        };
        if !is_plain_file_name(name) {
            continue;
        }
        if let Some(files) = out.get_mut(dir) {
            files.insert(name.to_string(), value.0.clone());
        }
    }
    out
}

/// Sync the control-plane config secret into the deckhouse config directory.
///
/// # Errors
///
/// Returns [`AgentError`] on I/O failure.
pub fn sync_control_plane_config(
    paths: &NodePaths,
    data: &SecretData,
) -> Result<FileChanges, AgentError> {
    let base = paths.local_deckhouse_dir();
    let mut changes = FileChanges::default();
    for (dir, files) in control_plane_files(data) {
        changes.extend(sync_dir(&base.join(dir), &files, PKI_FILE_MODE, PKI_DIR_MODE)?);
    }
    Ok(changes)
}

#[cfg(test)]
#[path = "files_tests.rs"]
mod files_tests;
