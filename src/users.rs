// Copyright (c) 2026 sysreg contributors
// SPDX-License-Identifier: MIT

//! Credential store for registry users.
//!
//! A registry user is the triplet `(name, password, bcrypt(password))`. The three
//! fields always change together; a triplet is valid when the hash verifies the
//! plaintext password.

use crate::constants::{
    BCRYPT_COST, KEY_USER_NAME, KEY_USER_PASSWORD, KEY_USER_PASSWORD_HASH, PASSWORD_LENGTH,
    REGISTRY_USER_SECRET_PREFIX,
};
use crate::errors::CredentialError;
use k8s_openapi::ByteString;
use rand::distr::Alphanumeric;
use rand::RngExt;
use std::collections::BTreeMap;

/// Registry user roles managed by the reconciler.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum UserRole {
    /// Pull-only user handed to every node
    ReadOnly,
    /// Push-capable user (local mode)
    ReadWrite,
    /// User the mirrorer pulls upstream images with (local mode)
    MirrorPuller,
    /// User the mirrorer pushes mirrored images with (local mode)
    MirrorPusher,
}

impl UserRole {
    /// Every managed role.
    pub const ALL: [UserRole; 4] = [
        UserRole::ReadOnly,
        UserRole::ReadWrite,
        UserRole::MirrorPuller,
        UserRole::MirrorPusher,
    ];

    /// Short role name used in secret and user names.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::ReadOnly => "ro",
            Self::ReadWrite => "rw",
            Self::MirrorPuller => "mirror-puller",
            Self::MirrorPusher => "mirror-pusher",
        }
    }

    /// Name of the secret holding this role's credentials.
    #[must_use]
    pub fn secret_name(self) -> String {
        format!("{REGISTRY_USER_SECRET_PREFIX}{}", self.as_str())
    }

    /// Registry login of this role.
    #[must_use]
    pub fn user_name(self) -> String {
        self.as_str().to_string()
    }
}

/// A registry user triplet.
#[derive(Clone, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegistryUser {
    pub name: String,
    pub password: String,
    pub password_hash: String,
}

impl RegistryUser {
    /// Generate a user with a random password and its bcrypt hash.
    ///
    /// # Errors
    ///
    /// Returns [`CredentialError::Hash`] if hashing fails.
    pub fn generate(name: &str) -> Result<Self, CredentialError> {
        let password = random_string(PASSWORD_LENGTH);
        let password_hash = hash_password(name, &password)?;
        Ok(Self {
            name: name.to_string(),
            password,
            password_hash,
        })
    }

    /// Whether the stored hash verifies the plaintext password.
    #[must_use]
    pub fn is_valid(&self) -> bool {
        !self.name.is_empty()
            && !self.password.is_empty()
            && bcrypt::verify(&self.password, &self.password_hash).unwrap_or(false)
    }

    /// Same name and password with a freshly computed hash.
    ///
    /// # Errors
    ///
    /// Returns [`CredentialError::Hash`] if hashing fails.
    pub fn rehashed(&self) -> Result<Self, CredentialError> {
        Ok(Self {
            name: self.name.clone(),
            password: self.password.clone(),
            password_hash: hash_password(&self.name, &self.password)?,
        })
    }

    /// Decode a triplet from secret data.
    ///
    /// # Errors
    ///
    /// Returns [`CredentialError::Incomplete`] if a key is missing or not UTF-8.
    pub fn from_secret_data(
        secret: &str,
        data: &BTreeMap<String, ByteString>,
    ) -> Result<Self, CredentialError> {
        let field = |key: &str| -> Result<String, CredentialError> {
            data.get(key)
                .and_then(|value| String::from_utf8(value.0.clone()).ok())
                .ok_or_else(|| CredentialError::Incomplete {
                    secret: secret.to_string(),
                    key: key.to_string(),
                })
        };
        Ok(Self {
            name: field(KEY_USER_NAME)?,
            password: field(KEY_USER_PASSWORD)?,
            password_hash: field(KEY_USER_PASSWORD_HASH)?,
        })
    }

    /// Encode the triplet as secret data.
    #[must_use]
    pub fn to_secret_data(&self) -> BTreeMap<String, ByteString> {
        BTreeMap::from([
            (
                KEY_USER_NAME.to_string(),
                ByteString(self.name.clone().into_bytes()),
            ),
            (
                KEY_USER_PASSWORD.to_string(),
                ByteString(self.password.clone().into_bytes()),
            ),
            (
                KEY_USER_PASSWORD_HASH.to_string(),
                ByteString(self.password_hash.clone().into_bytes()),
            ),
        ])
    }
}

fn hash_password(user: &str, password: &str) -> Result<String, CredentialError> {
    bcrypt::hash(password, BCRYPT_COST).map_err(|e| CredentialError::Hash {
        user: user.to_string(),
        reason: e.to_string(),
    })
}

/// Random alphanumeric string of `len` characters.
#[must_use]
pub fn random_string(len: usize) -> String {
    rand::rng()
        .sample_iter(&Alphanumeric)
        .take(len)
        .map(char::from)
        .collect()
}

#[cfg(test)]
#[path = "users_tests.rs"]
mod users_tests;
