// Copyright (c) 2026 sysreg contributors
// SPDX-License-Identifier: MIT

//! Reading module images.
//!
//! Layers are tar archives, optionally gzip compressed. Later layers shadow
//! earlier ones for single-file lookups.

use super::client::{Image, Layer};
use crate::constants::{DOCS_DIRECTORIES, MODULE_DEFINITION_FILE, VERSION_FILE};
use crate::errors::ScanError;
use flate2::read::GzDecoder;
use serde::Deserialize;
use std::io::Read;
use tar::{Archive, Builder, EntryType, Header};

const GZIP_MAGIC: [u8; 2] = [0x1f, 0x8b];
const DOCS_FILE_MODE: u32 = 0o644;
const DOCS_DIR_MODE: u32 = 0o755;

/// Metadata from `module.yaml`.
#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize)]
pub struct ModuleDefinition {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub critical: bool,
}

fn layer_reader(layer: &Layer) -> Box<dyn Read + '_> {
    if layer.data.starts_with(&GZIP_MAGIC) {
        Box::new(GzDecoder::new(layer.data.as_slice()))
    } else {
        Box::new(layer.data.as_slice())
    }
}

fn layer_error(e: &std::io::Error) -> ScanError {
    ScanError::Layer {
        reason: e.to_string(),
    }
}

fn normalize(path: &str) -> &str {
    path.trim_start_matches("./").trim_start_matches('/')
}

enum Found {
    Regular(Vec<u8>),
    NotRegular,
}

/// Last occurrence of `name` across all layers.
fn find_file(image: &Image, name: &str) -> Result<Option<Found>, ScanError> {
    for layer in image.layers.iter().rev() {
        let mut archive = Archive::new(layer_reader(layer));
        let entries = archive.entries().map_err(|e| layer_error(&e))?;
        let mut found = None;
        for entry in entries {
            let mut entry = entry.map_err(|e| layer_error(&e))?;
            let path = entry.path().map_err(|e| layer_error(&e))?;
            if normalize(&path.to_string_lossy()) != name {
                continue;
            }
            found = Some(if entry.header().entry_type().is_file() {
                let mut contents = Vec::new();
                entry
                    .read_to_end(&mut contents)
                    .map_err(|e| layer_error(&e))?;
                Found::Regular(contents)
            } else {
                Found::NotRegular
            });
        }
        if found.is_some() {
            return Ok(found);
        }
    }
    Ok(None)
}

#[derive(Deserialize)]
struct VersionFile {
    #[serde(default)]
    version: String,
}

/// Module version from `version.json` of a release image.
///
/// # Errors
///
/// Returns [`ScanError::VersionFileMissing`] when the file is absent or not a
/// regular file, [`ScanError::VersionInvalid`] when it does not carry a
/// non-empty `version`.
pub fn read_version(image: &Image) -> Result<String, ScanError> {
    let contents = match find_file(image, VERSION_FILE)? {
        Some(Found::Regular(contents)) => contents,
        Some(Found::NotRegular) | None => {
            return Err(ScanError::VersionFileMissing {
                file: VERSION_FILE.to_string(),
            })
        }
    };

    let parsed: VersionFile =
        serde_json::from_slice(&contents).map_err(|e| ScanError::VersionInvalid {
            file: VERSION_FILE.to_string(),
            reason: e.to_string(),
        })?;
    let version = parsed.version.trim().to_string();
    if version.is_empty() {
        return Err(ScanError::VersionInvalid {
            file: VERSION_FILE.to_string(),
            reason: "version is empty".to_string(),
        });
    }
    Ok(version)
}

/// Module definition of a module image, `None` when the image has none.
///
/// # Errors
///
/// Returns an error only when a layer cannot be read; an unparsable
/// definition is treated as absent.
pub fn read_module_definition(image: &Image) -> Result<Option<ModuleDefinition>, ScanError> {
    match find_file(image, MODULE_DEFINITION_FILE)? {
        Some(Found::Regular(contents)) => Ok(serde_yaml::from_slice(&contents).ok()),
        Some(Found::NotRegular) | None => Ok(None),
    }
}

fn is_documentation(path: &str) -> bool {
    DOCS_DIRECTORIES.iter().any(|dir| path.contains(dir))
}

/// Repackage the documentation of a module image into a plain tar.
///
/// The bundle starts with the documentation directories, followed by every
/// regular file whose path contains one of them, in layer order.
///
/// # Errors
///
/// Returns [`ScanError::Layer`] when a layer cannot be read or the bundle
/// cannot be written.
pub fn extract_documentation(image: &Image) -> Result<Vec<u8>, ScanError> {
    let mut builder = Builder::new(Vec::new());

    for dir in DOCS_DIRECTORIES {
        let mut header = Header::new_gnu();
        header.set_entry_type(EntryType::Directory);
        header.set_mode(DOCS_DIR_MODE);
        header.set_size(0);
        builder
            .append_data(&mut header, dir, std::io::empty())
            .map_err(|e| layer_error(&e))?;
    }

    for layer in &image.layers {
        let mut archive = Archive::new(layer_reader(layer));
        for entry in archive.entries().map_err(|e| layer_error(&e))? {
            let mut entry = entry.map_err(|e| layer_error(&e))?;
            if !entry.header().entry_type().is_file() {
                continue;
            }
            let path = entry
                .path()
                .map_err(|e| layer_error(&e))?
                .to_string_lossy()
                .into_owned();
            let path = normalize(&path).to_string();
            if !is_documentation(&path) {
                continue;
            }

            let mut contents = Vec::new();
            entry
                .read_to_end(&mut contents)
                .map_err(|e| layer_error(&e))?;
            let mut header = Header::new_gnu();
            header.set_entry_type(EntryType::Regular);
            header.set_mode(DOCS_FILE_MODE);
            header.set_size(contents.len() as u64);
            builder
                .append_data(&mut header, &path, contents.as_slice())
                .map_err(|e| layer_error(&e))?;
        }
    }

    builder.into_inner().map_err(|e| layer_error(&e))
}

#[cfg(test)]
#[path = "extract_tests.rs"]
mod extract_tests;
