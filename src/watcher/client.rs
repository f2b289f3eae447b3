// Copyright (c) 2026 sysreg contributors
// SPDX-License-Identifier: MIT

//! Registry client abstraction used by the scanner.

use crate::errors::RegistryClientError;

/// A single image layer blob.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Layer {
    pub media_type: String,
    pub data: Vec<u8>,
}

/// A pulled image: its manifest digest and layer blobs in manifest order.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Image {
    pub digest: String,
    pub layers: Vec<Layer>,
}

/// Read access to one modules repository.
///
/// Modules are tags of the repository itself, release channels are tags of
/// `<module>/release`, module versions are tags of `<module>`.
#[async_trait::async_trait]
pub trait RegistryClient: Send + Sync {
    /// Repository path identifying this registry in tasks and the cache
    fn name(&self) -> &str;

    /// Module names published in the repository.
    async fn modules(&self) -> Result<Vec<String>, RegistryClientError>;

    /// Tags of the release image of `module`.
    async fn list_tags(&self, module: &str) -> Result<Vec<String>, RegistryClientError>;

    /// Manifest digest of `module/release:channel`, without pulling it.
    async fn release_digest(
        &self,
        module: &str,
        channel: &str,
    ) -> Result<String, RegistryClientError>;

    /// Pull `module/release:channel`.
    async fn release_image(&self, module: &str, channel: &str)
        -> Result<Image, RegistryClientError>;

    /// Pull `module:version`.
    async fn image(&self, module: &str, version: &str) -> Result<Image, RegistryClientError>;
}
