//! # Snippet caching
//!
//! Rendered code fragments are kept in a flat key/value store with a per-entry time-to-live. The
//! store is shared by all concurrently running request handlers and can be one of:
//!
//! - [`MemcachedStore`]: a remote memcached server, shared by every instance of the service.
//! - [`MemoryStore`]: an in-process cache, used when no memcached server is configured.
//! - [`NoopStore`]: never stores anything, every read is a miss.
//!
//! A cache is an optimization only. The [`CacheProvider`] bounds every access with a timeout and
//! [`CacheProvider::from_config`] falls back to the [`NoopStore`] when the configured backend
//! cannot be reached, so the cache never prevents the service from starting.
//!
//! ### Metrics
//!
//! - `snippets.cache`: every read, tagged with `result` (`hit`, `miss` or `error`).
//! - `snippets.store`: every write, tagged with `result` (`ok` or `error`).
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

use crate::config::{CacheBackend, CacheConfig};

mod cache_key;
mod memcached;
mod memory;
mod noop;

pub use cache_key::CacheKey;
pub use memcached::MemcachedStore;
pub use memory::MemoryStore;
pub use noop::NoopStore;

/// An error talking to the cache backend.
///
/// A missing entry is not an error, stores report it as `Ok(None)`.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CacheError {
    /// The backend could not be reached.
    #[error("cache connection failed: {0}")]
    ConnectionError(String),
    /// The backend rejected or failed the operation.
    #[error("cache backend error: {0}")]
    BackendError(String),
    /// The operation did not complete in time.
    #[error("cache operation timed out after {0:?}")]
    Timeout(Duration),
}

pub type CacheResult<T> = Result<T, CacheError>;

/// A shared key/value store with a per-entry time-to-live.
///
/// Implementations must be safe for concurrent use by many request handlers.
#[async_trait]
pub trait CacheStore: Send + Sync + fmt::Debug {
    /// Returns `Ok(Some(value))` on a hit and `Ok(None)` on a miss.
    async fn get(&self, key: &str) -> CacheResult<Option<String>>;

    /// Stores `value` under `key`, to be considered absent after `ttl`.
    async fn set(&self, key: &str, value: &str, ttl: Duration) -> CacheResult<()>;

    /// The name of the backend, used in logs and metrics.
    fn provider_name(&self) -> &'static str;
}

/// The cache handle that is injected into the retriever.
///
/// Cheap to clone, all clones share the same store.
#[derive(Clone, Debug)]
pub struct CacheProvider {
    store: Arc<dyn CacheStore>,
    timeout: Duration,
}

impl CacheProvider {
    pub fn new(store: Arc<dyn CacheStore>, timeout: Duration) -> Self {
        Self { store, timeout }
    }

    /// Creates the configured cache backend.
    ///
    /// Falls back to the [`NoopStore`] with a warning if memcached is requested but not
    /// configured or not reachable.
    pub async fn from_config(config: &CacheConfig) -> Self {
        let store: Arc<dyn CacheStore> = match config.backend {
            CacheBackend::None => Arc::new(NoopStore),
            CacheBackend::Memory => Arc::new(MemoryStore::new(config.memory_capacity)),
            CacheBackend::Memcached => match config.memcached_dsn() {
                None => {
                    tracing::warn!("memcached cache enabled without servers, caching disabled");
                    Arc::new(NoopStore)
                }
                Some(dsn) => match MemcachedStore::connect(&dsn, config.pool_size).await {
                    Ok(store) => Arc::new(store),
                    Err(error) => {
                        tracing::warn!(
                            error = &error as &dyn std::error::Error,
                            "failed to connect to memcached, caching disabled"
                        );
                        Arc::new(NoopStore)
                    }
                },
            },
        };

        let provider = Self::new(store, config.timeout);
        tracing::info!(provider = provider.provider_name(), "snippet cache configured");
        provider
    }

    pub fn provider_name(&self) -> &'static str {
        self.store.provider_name()
    }

    pub fn is_enabled(&self) -> bool {
        self.store.provider_name() != NoopStore::NAME
    }

    pub async fn get(&self, key: &CacheKey) -> CacheResult<Option<String>> {
        tokio::time::timeout(self.timeout, self.store.get(key.as_str()))
            .await
            .map_err(|_| CacheError::Timeout(self.timeout))?
    }

    pub async fn set(&self, key: &CacheKey, value: &str, ttl: Duration) -> CacheResult<()> {
        tokio::time::timeout(self.timeout, self.store.set(key.as_str(), value, ttl))
            .await
            .map_err(|_| CacheError::Timeout(self.timeout))?
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use crate::types::{Language, Task};

    /// A store that never answers.
    #[derive(Debug)]
    struct HangingStore;

    #[async_trait]
    impl CacheStore for HangingStore {
        async fn get(&self, _key: &str) -> CacheResult<Option<String>> {
            std::future::pending().await
        }

        async fn set(&self, _key: &str, _value: &str, _ttl: Duration) -> CacheResult<()> {
            std::future::pending().await
        }

        fn provider_name(&self) -> &'static str {
            "hanging"
        }
    }

    fn key() -> CacheKey {
        CacheKey::snippet(&Task::new("loops"), &Language::parse("go").unwrap())
    }

    #[tokio::test(start_paused = true)]
    async fn test_operations_time_out() {
        let timeout = Duration::from_millis(100);
        let cache = CacheProvider::new(Arc::new(HangingStore), timeout);

        assert_eq!(cache.get(&key()).await, Err(CacheError::Timeout(timeout)));
        assert_eq!(
            cache.set(&key(), "x", Duration::from_secs(1)).await,
            Err(CacheError::Timeout(timeout))
        );
    }

    #[tokio::test]
    async fn test_noop_provider() {
        let cache = CacheProvider::new(Arc::new(NoopStore), Duration::from_secs(1));
        assert!(!cache.is_enabled());
        cache.set(&key(), "x", Duration::from_secs(1)).await.unwrap();
        assert_eq!(cache.get(&key()).await, Ok(None));
    }

    #[tokio::test]
    async fn test_from_config_falls_back() {
        let config = CacheConfig {
            backend: CacheBackend::Memcached,
            servers: None,
            ..Default::default()
        };
        let cache = CacheProvider::from_config(&config).await;
        assert_eq!(cache.provider_name(), "noop");

        let config = CacheConfig {
            backend: CacheBackend::Memory,
            ..Default::default()
        };
        let cache = CacheProvider::from_config(&config).await;
        assert_eq!(cache.provider_name(), "memory");
        assert!(cache.is_enabled());
    }

    #[tokio::test]
    async fn test_unreachable_memcached_falls_back() {
        // Nothing listens on the discard port in the test environment.
        let config = CacheConfig {
            backend: CacheBackend::Memcached,
            servers: Some("127.0.0.1:9".into()),
            ..Default::default()
        };
        let cache = CacheProvider::from_config(&config).await;
        assert_eq!(cache.provider_name(), "noop");
    }
}
