//! Trusted key retrieval.
//!
//! The verifier never embeds key material. It asks a [`KeyCache`], which reads
//! the key from a [`SecretStore`] by logical name.

pub mod cache;
pub mod store;

use std::sync::Arc;

pub use cache::{KeyCache, KeyError, TrustedKey};
pub use store::{EnvSecretStore, FileSecretStore, MemorySecretStore, SecretError, SecretStore};

use crate::config::{Config, SecretBackend};

/// Build the key cache described by the configuration.
pub fn key_cache_from_config(config: &Config) -> KeyCache {
    let store: Arc<dyn SecretStore> = match config.secret_store {
        SecretBackend::Env => Arc::new(EnvSecretStore),
        SecretBackend::File => Arc::new(FileSecretStore::new(&config.secrets_dir)),
    };

    KeyCache::new(store, &config.public_key_secret, config.secret_fetch_timeout())
        .with_encoding(config.public_key_encoding)
        .with_ttl(config.public_key_cache_ttl())
}
