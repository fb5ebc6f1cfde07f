use std::time::{Duration, Instant};

use async_trait::async_trait;

use super::{CacheResult, CacheStore};

/// An entry of the in-memory store.
#[derive(Clone, Debug)]
struct MemoryItem {
    /// When to evict this item.
    deadline: Instant,
    value: String,
}

/// A [`moka::Expiry`] that evicts items at their own deadline.
struct ItemExpiration;

fn saturating_duration_since(current_time: Instant, target_time: Instant) -> Option<Duration> {
    Some(
        target_time
            .checked_duration_since(current_time)
            .unwrap_or_default(),
    )
}

impl moka::Expiry<String, MemoryItem> for ItemExpiration {
    fn expire_after_create(
        &self,
        _key: &String,
        value: &MemoryItem,
        current_time: Instant,
    ) -> Option<Duration> {
        saturating_duration_since(current_time, value.deadline)
    }

    fn expire_after_update(
        &self,
        _key: &String,
        value: &MemoryItem,
        current_time: Instant,
        _current_duration: Option<Duration>,
    ) -> Option<Duration> {
        saturating_duration_since(current_time, value.deadline)
    }
}

/// An in-process store backed by a bounded [`moka`] cache.
///
/// Entries are not shared with other instances and are lost on restart.
#[derive(Clone)]
pub struct MemoryStore {
    cache: moka::future::Cache<String, MemoryItem>,
}

impl std::fmt::Debug for MemoryStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryStore")
            .field("entries", &self.cache.entry_count())
            .finish()
    }
}

impl MemoryStore {
    pub fn new(capacity: u64) -> Self {
        let cache = moka::future::Cache::builder()
            .max_capacity(capacity)
            .name("snippets")
            .expire_after(ItemExpiration)
            .build();
        Self { cache }
    }
}

#[async_trait]
impl CacheStore for MemoryStore {
    async fn get(&self, key: &str) -> CacheResult<Option<String>> {
        let item = self.cache.get(key).await;
        // moka evicts lazily, an item past its deadline may still be returned.
        Ok(item
            .filter(|item| item.deadline > Instant::now())
            .map(|item| item.value))
    }

    async fn set(&self, key: &str, value: &str, ttl: Duration) -> CacheResult<()> {
        let item = MemoryItem {
            deadline: Instant::now() + ttl,
            value: value.to_owned(),
        };
        self.cache.insert(key.to_owned(), item).await;
        Ok(())
    }

    fn provider_name(&self) -> &'static str {
        "memory"
    }
}
