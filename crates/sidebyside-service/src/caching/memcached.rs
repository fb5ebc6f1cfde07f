use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_memcached::Client;
use async_trait::async_trait;
use sha2::{Digest, Sha256};
use tokio::sync::Mutex;

use super::{CacheError, CacheResult, CacheStore};

/// Longest key the memcached text protocol accepts.
const MAX_KEY_LEN: usize = 250;

/// A memcached backed store.
///
/// Holds a small pool of connections, each behind its own async mutex, and hands them out round
/// robin. A connection is only put back into its slot after a successful operation, a failed one is
/// reopened on the next use of the slot.
pub struct MemcachedStore {
    dsn: String,
    connections: Box<[Mutex<Option<Client>>]>,
    next: AtomicUsize,
}

impl std::fmt::Debug for MemcachedStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemcachedStore")
            .field("dsn", &self.dsn)
            .field("pool_size", &self.connections.len())
            .finish()
    }
}

async fn open(dsn: &str) -> CacheResult<Client> {
    Client::new(dsn)
        .await
        .map_err(|e| CacheError::ConnectionError(format!("failed to connect to {dsn}: {e}")))
}

impl MemcachedStore {
    /// Connects to the server at `dsn`, e.g. `tcp://127.0.0.1:11211`.
    ///
    /// The first connection is opened eagerly so that an unreachable server is reported here, the
    /// others are opened on first use.
    pub async fn connect(dsn: &str, pool_size: usize) -> CacheResult<Self> {
        let first = open(dsn).await?;
        tracing::debug!(dsn, pool_size, "connected to memcached");

        let mut connections = Vec::with_capacity(pool_size.max(1));
        connections.push(Mutex::new(Some(first)));
        connections.resize_with(pool_size.max(1), || Mutex::new(None));

        Ok(Self {
            dsn: dsn.to_owned(),
            connections: connections.into_boxed_slice(),
            next: AtomicUsize::new(0),
        })
    }

    fn slot(&self) -> &Mutex<Option<Client>> {
        let index = self.next.fetch_add(1, Ordering::Relaxed) % self.connections.len();
        &self.connections[index]
    }
}

/// Maps a cache key to a key the text protocol accepts.
///
/// Keys with whitespace, control characters or more than 250 bytes are replaced by a hash.
fn wire_key(key: &str) -> String {
    let is_valid = key.len() <= MAX_KEY_LEN && key.bytes().all(|b| (0x21..=0x7e).contains(&b));
    if is_valid {
        key.to_owned()
    } else {
        format!("sbs:{:x}", Sha256::digest(key.as_bytes()))
    }
}

#[async_trait]
impl CacheStore for MemcachedStore {
    async fn get(&self, key: &str) -> CacheResult<Option<String>> {
        let key = wire_key(key);
        let mut slot = self.slot().lock().await;
        let mut client = match slot.take() {
            Some(client) => client,
            None => open(&self.dsn).await?,
        };

        let value = client
            .get(&key)
            .await
            .map_err(|e| CacheError::BackendError(format!("memcached GET failed: {e}")))?;
        *slot = Some(client);

        match value {
            Some(value) => String::from_utf8(value.data)
                .map(Some)
                .map_err(|e| CacheError::BackendError(format!("invalid UTF-8 data: {e}"))),
            None => Ok(None),
        }
    }

    async fn set(&self, key: &str, value: &str, ttl: Duration) -> CacheResult<()> {
        let key = wire_key(key);
        let mut slot = self.slot().lock().await;
        let mut client = match slot.take() {
            Some(client) => client,
            None => open(&self.dsn).await?,
        };

        let ttl_seconds = ttl.as_secs() as i64;
        client
            .set(&key, value.as_bytes(), Some(ttl_seconds), None)
            .await
            .map_err(|e| CacheError::BackendError(format!("memcached SET failed: {e}")))?;
        *slot = Some(client);
        Ok(())
    }

    fn provider_name(&self) -> &'static str {
        "memcached"
    }
}

#[cfg(test)]
mod tests {
    use sidebyside_test::{self as test, FakeMemcached};

    use super::*;

    #[test]
    fn test_wire_key() {
        assert_eq!(wire_key("loops::go"), "loops::go");
        assert_eq!(wire_key("Loops/For::python"), "Loops/For::python");

        let hashed = wire_key("Hello world::go");
        assert!(hashed.starts_with("sbs:"));
        assert_eq!(hashed.len(), 4 + 64);
        assert_eq!(hashed, wire_key("Hello world::go"));
        assert_ne!(hashed, wire_key("Hello world::rust"));

        let long = "a".repeat(300);
        assert!(wire_key(&long).len() <= MAX_KEY_LEN);
        assert!(wire_key("Café::go").starts_with("sbs:"));
    }

    #[tokio::test]
    async fn test_set_then_get() {
        test::setup();
        let server = FakeMemcached::start();
        let store = MemcachedStore::connect(&server.dsn(), 1).await.unwrap();

        assert_eq!(store.get("Loops::go").await.unwrap(), None);

        let fragment = r#"<pre><code class="language-go">for {}</code></pre>"#;
        store
            .set("Loops::go", fragment, Duration::from_secs(1_296_000))
            .await
            .unwrap();

        assert_eq!(
            server.entry("Loops::go"),
            Some((fragment.as_bytes().to_vec(), 1_296_000))
        );
        assert_eq!(
            store.get("Loops::go").await.unwrap().as_deref(),
            Some(fragment)
        );

        // keys with spaces travel hashed, both ways
        store
            .set("Hello world::go", "hi", Duration::from_secs(60))
            .await
            .unwrap();
        assert!(server.entry("Hello world::go").is_none());
        assert!(server.entry(&wire_key("Hello world::go")).is_some());
        assert_eq!(
            store.get("Hello world::go").await.unwrap().as_deref(),
            Some("hi")
        );
        assert_eq!(server.connections(), 1);
    }

    #[tokio::test]
    async fn test_invalid_utf8() {
        test::setup();
        let server = FakeMemcached::start();
        server.insert("Loops::go", &[0xff, 0xfe]);
        let store = MemcachedStore::connect(&server.dsn(), 1).await.unwrap();

        let result = store.get("Loops::go").await;
        assert!(matches!(result, Err(CacheError::BackendError(_))));
    }

    #[tokio::test]
    async fn test_reopens_broken_connection() {
        test::setup();
        let server = FakeMemcached::start();
        let store = MemcachedStore::connect(&server.dsn(), 1).await.unwrap();
        store
            .set("Loops::go", "for {}", Duration::from_secs(60))
            .await
            .unwrap();
        assert_eq!(server.connections(), 1);

        server.hang_up_next();
        assert!(store.get("Loops::go").await.is_err());

        // the broken client was not put back, the slot connects again
        assert_eq!(
            store.get("Loops::go").await.unwrap().as_deref(),
            Some("for {}")
        );
        assert_eq!(server.connections(), 2);

        // and keeps the new connection afterwards
        store.get("Loops::go").await.unwrap();
        assert_eq!(server.connections(), 2);
    }

    #[tokio::test]
    async fn test_round_robin_slots() {
        test::setup();
        let server = FakeMemcached::start();
        let store = MemcachedStore::connect(&server.dsn(), 2).await.unwrap();
        assert_eq!(server.connections(), 1);

        // slot 0 is connected eagerly, slot 1 on its first use
        store.get("a").await.unwrap();
        assert_eq!(server.connections(), 1);
        store.get("b").await.unwrap();
        assert_eq!(server.connections(), 2);

        for _ in 0..4 {
            store.get("c").await.unwrap();
        }
        assert_eq!(server.connections(), 2);
    }

    #[tokio::test]
    async fn test_concurrent_access() {
        test::setup();
        let server = FakeMemcached::start();
        let store = MemcachedStore::connect(&server.dsn(), 2).await.unwrap();

        let writes = (0..16).map(|i| {
            let store = &store;
            async move {
                store
                    .set(&format!("task{i}::go"), &format!("code {i}"), Duration::from_secs(60))
                    .await
            }
        });
        for result in futures::future::join_all(writes).await {
            result.unwrap();
        }

        let reads = (0..16).map(|i| {
            let store = &store;
            async move { store.get(&format!("task{i}::go")).await }
        });
        for (i, result) in futures::future::join_all(reads).await.into_iter().enumerate() {
            assert_eq!(result.unwrap(), Some(format!("code {i}")));
        }
        assert_eq!(server.connections(), 2);
    }
}
