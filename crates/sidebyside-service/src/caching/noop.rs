use std::time::Duration;

use async_trait::async_trait;

use super::{CacheResult, CacheStore};

/// A store that keeps nothing: every read misses and every write succeeds.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopStore;

impl NoopStore {
    pub const NAME: &'static str = "noop";
}

#[async_trait]
impl CacheStore for NoopStore {
    async fn get(&self, _key: &str) -> CacheResult<Option<String>> {
        Ok(None)
    }

    async fn set(&self, _key: &str, _value: &str, _ttl: Duration) -> CacheResult<()> {
        Ok(())
    }

    fn provider_name(&self) -> &'static str {
        Self::NAME
    }
}
