//! Secret store backends.
//!
//! A secret store maps a logical name (for example
//! `smsbot/dev/telnyx-public-key`) to a secret string. Stores do no caching
//! and apply no timeout; [`super::KeyCache`] does both.

use std::collections::HashMap;
use std::env;
use std::path::{Component, Path, PathBuf};

use async_trait::async_trait;
use thiserror::Error;

/// Errors returned by a secret store.
#[derive(Debug, Error)]
pub enum SecretError {
    #[error("secret not found: {0}")]
    NotFound(String),

    #[error("invalid secret name: {0}")]
    InvalidName(String),

    #[error("secret store I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("secret store error: {0}")]
    Backend(String),
}

/// External store holding the trusted public key.
#[async_trait]
pub trait SecretStore: Send + Sync {
    /// Fetch the secret stored under `name`.
    async fn get_secret(&self, name: &str) -> Result<String, SecretError>;
}

// =============================================================================
// Environment
// =============================================================================

/// Reads secrets from environment variables.
///
/// `smsbot/dev/telnyx-public-key` is read from `SMSBOT_DEV_TELNYX_PUBLIC_KEY`.
#[derive(Debug, Clone, Default)]
pub struct EnvSecretStore;

impl EnvSecretStore {
    pub fn variable_name(name: &str) -> String {
        name.chars()
            .map(|c| if c.is_ascii_alphanumeric() { c.to_ascii_uppercase() } else { '_' })
            .collect()
    }
}

#[async_trait]
impl SecretStore for EnvSecretStore {
    async fn get_secret(&self, name: &str) -> Result<String, SecretError> {
        let var = Self::variable_name(name);
        env::var(&var).map_err(|_| SecretError::NotFound(var))
    }
}

// =============================================================================
// Files
// =============================================================================

/// Reads secrets from files under a root directory, one file per secret.
///
/// Matches mounted-secret layouts such as `/run/secrets/<name>`.
#[derive(Debug, Clone)]
pub struct FileSecretStore {
    root: PathBuf,
}

impl FileSecretStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Resolve `name` below the root, refusing anything that escapes it.
    fn resolve(&self, name: &str) -> Result<PathBuf, SecretError> {
        let relative = Path::new(name);
        let safe = !name.is_empty()
            && relative
                .components()
                .all(|c| matches!(c, Component::Normal(_)));

        if !safe {
            return Err(SecretError::InvalidName(name.to_string()));
        }

        Ok(self.root.join(relative))
    }
}

#[async_trait]
impl SecretStore for FileSecretStore {
    async fn get_secret(&self, name: &str) -> Result<String, SecretError> {
        let path = self.resolve(name)?;
        match tokio::fs::read_to_string(&path).await {
            Ok(contents) => Ok(contents),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(SecretError::NotFound(name.to_string()))
            }
            Err(e) => Err(SecretError::Io(e)),
        }
    }
}

// =============================================================================
// Memory
// =============================================================================

/// In-process secret map.
#[derive(Debug, Clone, Default)]
pub struct MemorySecretStore {
    secrets: HashMap<String, String>,
}

impl MemorySecretStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_secret(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.secrets.insert(name.into(), value.into());
        self
    }
}

#[async_trait]
impl SecretStore for MemorySecretStore {
    async fn get_secret(&self, name: &str) -> Result<String, SecretError> {
        self.secrets
            .get(name)
            .cloned()
            .ok_or_else(|| SecretError::NotFound(name.to_string()))
    }
}
