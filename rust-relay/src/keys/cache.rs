//! Process-wide cache for the trusted verification key.
//!
//! The key is fetched on first use and kept until [`KeyCache::invalidate`] is
//! called or the optional TTL expires. Failed fetches are never cached, so a
//! recovered secret store is picked up on the next request.

use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};

use ed25519_dalek::VerifyingKey;
use sha2::{Digest, Sha256};
use thiserror::Error;
use tokio::sync::RwLock;
use tracing::{info, warn};

use super::store::{SecretError, SecretStore};
use crate::verify::{decode_bytes, SignatureEncoding};

/// Why the trusted key could not be produced.
#[derive(Debug, Error)]
pub enum KeyError {
    #[error("secret store did not answer within {0:?}")]
    Timeout(Duration),

    #[error(transparent)]
    Store(#[from] SecretError),

    #[error("malformed public key: {0}")]
    Malformed(&'static str),
}

/// An Ed25519 public key trusted to sign webhooks.
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct TrustedKey(VerifyingKey);

impl TrustedKey {
    /// Decode a stored key. Surrounding whitespace is ignored.
    pub fn decode(raw: &str, encoding: SignatureEncoding) -> Result<Self, KeyError> {
        let bytes = decode_bytes(encoding, raw.trim()).ok_or(KeyError::Malformed("undecodable"))?;
        let bytes: [u8; 32] = bytes
            .try_into()
            .map_err(|_| KeyError::Malformed("expected 32 bytes"))?;
        let key = VerifyingKey::from_bytes(&bytes).map_err(|_| KeyError::Malformed("not a curve point"))?;
        Ok(Self(key))
    }

    pub fn verifying_key(&self) -> &VerifyingKey {
        &self.0
    }

    /// Short SHA-256 fingerprint, safe to log.
    pub fn fingerprint(&self) -> String {
        let digest = Sha256::digest(self.0.as_bytes());
        hex::encode(&digest[..8])
    }
}

impl From<VerifyingKey> for TrustedKey {
    fn from(key: VerifyingKey) -> Self {
        Self(key)
    }
}

impl fmt::Debug for TrustedKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("TrustedKey").field(&self.fingerprint()).finish()
    }
}

/// Shared, lazily populated trusted key.
#[derive(Clone)]
pub struct KeyCache {
    inner: Arc<KeyCacheInner>,
}

struct KeyCacheInner {
    store: Arc<dyn SecretStore>,
    name: String,
    encoding: SignatureEncoding,
    timeout: Duration,
    ttl: Option<Duration>,
    cached: RwLock<Option<CachedKey>>,
}

#[derive(Clone, Copy)]
struct CachedKey {
    key: TrustedKey,
    fetched_at: Instant,
}

impl KeyCache {
    /// Create a cache reading `name` from `store`, each fetch bounded by `timeout`.
    pub fn new(store: Arc<dyn SecretStore>, name: impl Into<String>, timeout: Duration) -> Self {
        Self {
            inner: Arc::new(KeyCacheInner {
                store,
                name: name.into(),
                encoding: SignatureEncoding::Base64,
                timeout,
                ttl: None,
                cached: RwLock::new(None),
            }),
        }
    }

    /// Set the stored key encoding. Call before sharing the cache.
    pub fn with_encoding(self, encoding: SignatureEncoding) -> Self {
        self.rebuild(|inner| inner.encoding = encoding)
    }

    /// Refetch the key once it is older than `ttl`. Call before sharing the cache.
    pub fn with_ttl(self, ttl: Option<Duration>) -> Self {
        self.rebuild(|inner| inner.ttl = ttl)
    }

    fn rebuild(self, apply: impl FnOnce(&mut KeyCacheInner)) -> Self {
        let mut inner = match Arc::try_unwrap(self.inner) {
            Ok(inner) => inner,
            Err(shared) => KeyCacheInner {
                store: shared.store.clone(),
                name: shared.name.clone(),
                encoding: shared.encoding,
                timeout: shared.timeout,
                ttl: shared.ttl,
                cached: RwLock::new(None),
            },
        };
        apply(&mut inner);
        Self { inner: Arc::new(inner) }
    }

    pub fn secret_name(&self) -> &str {
        &self.inner.name
    }

    /// Return the trusted key, fetching it if needed.
    ///
    /// Concurrent first calls share one fetch. The whole call, including the
    /// wait for another caller's fetch, is bounded by the configured timeout.
    pub async fn get_trusted_key(&self) -> Result<TrustedKey, KeyError> {
        match tokio::time::timeout(self.inner.timeout, self.lookup()).await {
            Ok(result) => result,
            Err(_) => {
                warn!(
                    secret_name = %self.inner.name,
                    timeout_ms = self.inner.timeout.as_millis() as u64,
                    "public_key_fetch_timeout"
                );
                Err(KeyError::Timeout(self.inner.timeout))
            }
        }
    }

    async fn lookup(&self) -> Result<TrustedKey, KeyError> {
        {
            let cached = self.inner.cached.read().await;
            if let Some(key) = self.fresh(cached.as_ref()) {
                return Ok(key);
            }
        }

        self.populate().await
    }

    async fn populate(&self) -> Result<TrustedKey, KeyError> {
        let mut cached = self.inner.cached.write().await;

        // Double-check after acquiring write lock
        if let Some(key) = self.fresh(cached.as_ref()) {
            return Ok(key);
        }

        info!(secret_name = %self.inner.name, "public_key_fetching");

        let raw = self.inner.store.get_secret(&self.inner.name).await?;
        let key = TrustedKey::decode(&raw, self.inner.encoding)?;

        info!(
            secret_name = %self.inner.name,
            key_fingerprint = %key.fingerprint(),
            "public_key_cached"
        );

        *cached = Some(CachedKey {
            key,
            fetched_at: Instant::now(),
        });

        Ok(key)
    }

    fn fresh(&self, cached: Option<&CachedKey>) -> Option<TrustedKey> {
        let entry = cached?;
        match self.inner.ttl {
            Some(ttl) if entry.fetched_at.elapsed() >= ttl => None,
            _ => Some(entry.key),
        }
    }

    /// Drop the cached key so the next call refetches it.
    pub async fn invalidate(&self) {
        let mut cached = self.inner.cached.write().await;
        if cached.take().is_some() {
            info!(secret_name = %self.inner.name, "public_key_invalidated");
        }
    }

    pub async fn is_cached(&self) -> bool {
        self.inner.cached.read().await.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::keys::store::MemorySecretStore;
    use async_trait::async_trait;
    use base64::engine::general_purpose::STANDARD;
    use base64::Engine;
    use ed25519_dalek::SigningKey;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    const NAME: &str = "smsbot/test/telnyx-public-key";

    fn encoded_public_key() -> String {
        STANDARD.encode(SigningKey::from_bytes(&[7u8; 32]).verifying_key().as_bytes())
    }

    /// Store that replays scripted answers and counts calls.
    struct ScriptedStore {
        answers: Mutex<Vec<Result<String, SecretError>>>,
        calls: AtomicUsize,
        delay: Duration,
    }

    impl ScriptedStore {
        fn new(answers: Vec<Result<String, SecretError>>) -> Self {
            Self {
                answers: Mutex::new(answers),
                calls: AtomicUsize::new(0),
                delay: Duration::ZERO,
            }
        }

        fn slow(delay: Duration) -> Self {
            Self {
                delay,
                ..Self::new(vec![Ok(encoded_public_key())])
            }
        }
    }

    #[async_trait]
    impl SecretStore for ScriptedStore {
        async fn get_secret(&self, _name: &str) -> Result<String, SecretError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(self.delay).await;
            let mut answers = self.answers.lock().unwrap();
            if answers.len() > 1 {
                answers.remove(0)
            } else {
                match answers.first() {
                    Some(Ok(v)) => Ok(v.clone()),
                    _ => Err(SecretError::Backend("unavailable".to_string())),
                }
            }
        }
    }

    #[test]
    fn test_decode_key() {
        let key = TrustedKey::decode(&format!("  {}\n", encoded_public_key()), SignatureEncoding::Base64).unwrap();
        assert_eq!(key.fingerprint().len(), 16);
    }

    #[test]
    fn test_decode_key_wrong_length() {
        let short = STANDARD.encode([1u8; 16]);
        assert!(matches!(
            TrustedKey::decode(&short, SignatureEncoding::Base64),
            Err(KeyError::Malformed(_))
        ));
        assert!(matches!(
            TrustedKey::decode("%%%", SignatureEncoding::Base64),
            Err(KeyError::Malformed(_))
        ));
    }

    #[test]
    fn test_debug_does_not_print_key_bytes() {
        let key = TrustedKey::decode(&encoded_public_key(), SignatureEncoding::Base64).unwrap();
        let printed = format!("{key:?}");
        assert!(printed.contains(&key.fingerprint()));
        assert!(!printed.contains(&encoded_public_key()));
    }

    #[tokio::test]
    async fn test_success_is_cached() {
        let store = Arc::new(ScriptedStore::new(vec![Ok(encoded_public_key())]));
        let cache = KeyCache::new(store.clone(), NAME, Duration::from_secs(1));

        let first = cache.get_trusted_key().await.unwrap();
        let second = cache.get_trusted_key().await.unwrap();

        assert_eq!(first, second);
        assert_eq!(store.calls.load(Ordering::SeqCst), 1);
        assert!(cache.is_cached().await);
    }

    #[tokio::test]
    async fn test_failure_is_not_cached() {
        let store = Arc::new(ScriptedStore::new(vec![
            Err(SecretError::Backend("throttled".to_string())),
            Ok(encoded_public_key()),
        ]));
        let cache = KeyCache::new(store.clone(), NAME, Duration::from_secs(1));

        assert!(matches!(cache.get_trusted_key().await, Err(KeyError::Store(_))));
        assert!(!cache.is_cached().await);
        assert!(cache.get_trusted_key().await.is_ok());
        assert_eq!(store.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_slow_store_times_out() {
        let store = Arc::new(ScriptedStore::slow(Duration::from_secs(10)));
        let cache = KeyCache::new(store, NAME, Duration::from_millis(50));

        assert!(matches!(cache.get_trusted_key().await, Err(KeyError::Timeout(_))));
        assert!(!cache.is_cached().await);
    }

    #[tokio::test]
    async fn test_waiting_caller_bounded_by_timeout() {
        let store = Arc::new(ScriptedStore::slow(Duration::from_secs(10)));
        let cache = KeyCache::new(store, NAME, Duration::from_millis(200));

        let first = {
            let cache = cache.clone();
            tokio::spawn(async move { cache.get_trusted_key().await })
        };
        tokio::time::sleep(Duration::from_millis(100)).await;

        // Queues behind the first caller's hung fetch.
        let started = Instant::now();
        let second = cache.get_trusted_key().await;
        let waited = started.elapsed();

        assert!(matches!(second, Err(KeyError::Timeout(_))));
        assert!(waited < Duration::from_millis(280), "waited {waited:?}");
        assert!(matches!(first.await.unwrap(), Err(KeyError::Timeout(_))));
    }

    #[tokio::test]
    async fn test_concurrent_first_calls_fetch_once() {
        let store = Arc::new(ScriptedStore {
            delay: Duration::from_millis(20),
            ..ScriptedStore::new(vec![Ok(encoded_public_key())])
        });
        let cache = KeyCache::new(store.clone(), NAME, Duration::from_secs(5));

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let cache = cache.clone();
                tokio::spawn(async move { cache.get_trusted_key().await })
            })
            .collect();

        for handle in handles {
            assert!(handle.await.unwrap().is_ok());
        }
        assert_eq!(store.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_invalidate_forces_refetch() {
        let store = Arc::new(ScriptedStore::new(vec![Ok(encoded_public_key())]));
        let cache = KeyCache::new(store.clone(), NAME, Duration::from_secs(1));

        cache.get_trusted_key().await.unwrap();
        cache.invalidate().await;
        cache.get_trusted_key().await.unwrap();

        assert_eq!(store.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_ttl_expiry_refetches() {
        let store = Arc::new(ScriptedStore::new(vec![Ok(encoded_public_key())]));
        let cache = KeyCache::new(store.clone(), NAME, Duration::from_secs(1)).with_ttl(Some(Duration::ZERO));

        cache.get_trusted_key().await.unwrap();
        cache.get_trusted_key().await.unwrap();

        assert_eq!(store.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_missing_secret() {
        let cache = KeyCache::new(Arc::new(MemorySecretStore::new()), NAME, Duration::from_secs(1));

        assert!(matches!(
            cache.get_trusted_key().await,
            Err(KeyError::Store(SecretError::NotFound(_)))
        ));
    }

    #[tokio::test]
    async fn test_hex_encoded_key() {
        let hex_key = hex::encode(SigningKey::from_bytes(&[7u8; 32]).verifying_key().as_bytes());
        let store = MemorySecretStore::new().with_secret(NAME, hex_key);
        let cache = KeyCache::new(Arc::new(store), NAME, Duration::from_secs(1)).with_encoding(SignatureEncoding::Hex);

        assert!(cache.get_trusted_key().await.is_ok());
    }
}
