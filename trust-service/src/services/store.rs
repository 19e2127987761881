use async_trait::async_trait;
use dashmap::{mapref::entry::Entry, DashMap};
use redis::{aio::ConnectionManager, Client, Script};
use std::time::{Duration, Instant};

/// Shared TTL-capable key/value store backing grants, attempt counters and
/// lockouts.
///
/// Implementations must make `set_with_expiry` and `incr_with_expiry` atomic
/// per key.
#[async_trait]
pub trait EphemeralStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<String>, anyhow::Error>;

    async fn set_with_expiry(
        &self,
        key: &str,
        value: &str,
        expiry_seconds: u64,
    ) -> Result<(), anyhow::Error>;

    /// Increment a counter, starting its expiry on the first increment.
    async fn incr_with_expiry(&self, key: &str, expiry_seconds: u64)
        -> Result<i64, anyhow::Error>;

    /// Returns whether the key existed.
    async fn delete(&self, key: &str) -> Result<bool, anyhow::Error>;

    /// Delete every key starting with `prefix`; returns how many were removed.
    async fn delete_prefix(&self, prefix: &str) -> Result<u64, anyhow::Error>;

    async fn health_check(&self) -> Result<(), anyhow::Error>;
}

const INCR_WITH_EXPIRY: &str = r#"
local count = redis.call('INCR', KEYS[1])
if count == 1 then
    redis.call('EXPIRE', KEYS[1], ARGV[1])
end
return count
"#;

const SCAN_BATCH: usize = 200;

#[derive(Clone)]
pub struct RedisStore {
    _client: Client,
    manager: ConnectionManager,
}

impl RedisStore {
    pub async fn connect(url: &str) -> Result<Self, anyhow::Error> {
        tracing::info!("Connecting to Redis");
        let client = Client::open(url)?;

        let manager = client.get_connection_manager().await.map_err(|e| {
            tracing::error!("Failed to get Redis connection manager: {}", e);
            anyhow::anyhow!("Failed to connect to Redis: {}", e)
        })?;

        tracing::info!("Successfully connected to Redis");

        Ok(Self {
            _client: client,
            manager,
        })
    }

    pub fn connection(&self) -> ConnectionManager {
        self.manager.clone()
    }
}

#[async_trait]
impl EphemeralStore for RedisStore {
    async fn get(&self, key: &str) -> Result<Option<String>, anyhow::Error> {
        let mut conn = self.manager.clone();
        redis::cmd("GET")
            .arg(key)
            .query_async(&mut conn)
            .await
            .map_err(|e| anyhow::anyhow!("Failed to read key: {}", e))
    }

    async fn set_with_expiry(
        &self,
        key: &str,
        value: &str,
        expiry_seconds: u64,
    ) -> Result<(), anyhow::Error> {
        let mut conn = self.manager.clone();
        redis::cmd("SET")
            .arg(key)
            .arg(value)
            .arg("EX")
            .arg(expiry_seconds.max(1))
            .query_async(&mut conn)
            .await
            .map_err(|e| anyhow::anyhow!("Failed to write key: {}", e))
    }

    async fn incr_with_expiry(
        &self,
        key: &str,
        expiry_seconds: u64,
    ) -> Result<i64, anyhow::Error> {
        let mut conn = self.manager.clone();
        Script::new(INCR_WITH_EXPIRY)
            .key(key)
            .arg(expiry_seconds.max(1))
            .invoke_async(&mut conn)
            .await
            .map_err(|e| anyhow::anyhow!("Failed to increment counter: {}", e))
    }

    async fn delete(&self, key: &str) -> Result<bool, anyhow::Error> {
        let mut conn = self.manager.clone();
        let removed: i64 = redis::cmd("DEL")
            .arg(key)
            .query_async(&mut conn)
            .await
            .map_err(|e| anyhow::anyhow!("Failed to delete key: {}", e))?;
        Ok(removed > 0)
    }

    async fn delete_prefix(&self, prefix: &str) -> Result<u64, anyhow::Error> {
        let mut conn = self.manager.clone();
        let pattern = format!("{}*", prefix);
        let mut cursor: u64 = 0;
        let mut removed: u64 = 0;

        loop {
            let (next, keys): (u64, Vec<String>) = redis::cmd("SCAN")
                .arg(cursor)
                .arg("MATCH")
                .arg(&pattern)
                .arg("COUNT")
                .arg(SCAN_BATCH)
                .query_async(&mut conn)
                .await
                .map_err(|e| anyhow::anyhow!("Failed to scan keys: {}", e))?;

            if !keys.is_empty() {
                let count: u64 = redis::cmd("DEL")
                    .arg(&keys)
                    .query_async(&mut conn)
                    .await
                    .map_err(|e| anyhow::anyhow!("Failed to delete keys: {}", e))?;
                removed += count;
            }

            if next == 0 {
                break;
            }
            cursor = next;
        }

        Ok(removed)
    }

    async fn health_check(&self) -> Result<(), anyhow::Error> {
        let mut conn = self.manager.clone();
        redis::cmd("PING")
            .query_async(&mut conn)
            .await
            .map_err(|e| anyhow::anyhow!("Redis health check failed: {}", e))
    }
}

#[derive(Debug, Clone)]
struct StoredValue {
    value: String,
    expires_at: Instant,
}

impl StoredValue {
    fn new(value: String, expiry_seconds: u64) -> Self {
        Self {
            value,
            expires_at: Instant::now() + Duration::from_secs(expiry_seconds),
        }
    }

    fn is_live(&self) -> bool {
        Instant::now() < self.expires_at
    }
}

/// Single-process store. Each operation holds the key's shard lock, so
/// operations on one key are serialized.
#[derive(Debug, Default)]
pub struct InMemoryStore {
    entries: DashMap<String, StoredValue>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of live keys.
    pub fn len(&self) -> usize {
        self.entries.iter().filter(|e| e.value().is_live()).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl EphemeralStore for InMemoryStore {
    async fn get(&self, key: &str) -> Result<Option<String>, anyhow::Error> {
        match self.entries.entry(key.to_string()) {
            Entry::Occupied(entry) if entry.get().is_live() => Ok(Some(entry.get().value.clone())),
            Entry::Occupied(entry) => {
                entry.remove();
                Ok(None)
            }
            Entry::Vacant(_) => Ok(None),
        }
    }

    async fn set_with_expiry(
        &self,
        key: &str,
        value: &str,
        expiry_seconds: u64,
    ) -> Result<(), anyhow::Error> {
        self.entries.insert(
            key.to_string(),
            StoredValue::new(value.to_string(), expiry_seconds),
        );
        Ok(())
    }

    async fn incr_with_expiry(
        &self,
        key: &str,
        expiry_seconds: u64,
    ) -> Result<i64, anyhow::Error> {
        match self.entries.entry(key.to_string()) {
            Entry::Occupied(mut entry) if entry.get().is_live() => {
                let current: i64 = entry
                    .get()
                    .value
                    .parse()
                    .map_err(|_| anyhow::anyhow!("Value at key is not an integer"))?;
                let next = current + 1;
                entry.get_mut().value = next.to_string();
                Ok(next)
            }
            Entry::Occupied(mut entry) => {
                entry.insert(StoredValue::new("1".to_string(), expiry_seconds));
                Ok(1)
            }
            Entry::Vacant(entry) => {
                entry.insert(StoredValue::new("1".to_string(), expiry_seconds));
                Ok(1)
            }
        }
    }

    async fn delete(&self, key: &str) -> Result<bool, anyhow::Error> {
        Ok(self
            .entries
            .remove(key)
            .map(|(_, stored)| stored.is_live())
            .unwrap_or(false))
    }

    async fn delete_prefix(&self, prefix: &str) -> Result<u64, anyhow::Error> {
        let mut removed = 0u64;
        self.entries.retain(|key, stored| {
            if key.starts_with(prefix) {
                if stored.is_live() {
                    removed += 1;
                }
                false
            } else {
                true
            }
        });
        Ok(removed)
    }

    async fn health_check(&self) -> Result<(), anyhow::Error> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[tokio::test]
    async fn test_set_get_and_delete() {
        let store = InMemoryStore::new();
        store.set_with_expiry("k", "v", 60).await.unwrap();

        assert_eq!(store.get("k").await.unwrap(), Some("v".to_string()));
        assert!(store.delete("k").await.unwrap());
        assert!(!store.delete("k").await.unwrap());
        assert_eq!(store.get("k").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_zero_expiry_is_never_visible() {
        let store = InMemoryStore::new();
        store.set_with_expiry("k", "v", 0).await.unwrap();

        assert_eq!(store.get("k").await.unwrap(), None);
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn test_incr_starts_at_one() {
        let store = InMemoryStore::new();

        assert_eq!(store.incr_with_expiry("c", 60).await.unwrap(), 1);
        assert_eq!(store.incr_with_expiry("c", 60).await.unwrap(), 2);
        assert_eq!(store.get("c").await.unwrap(), Some("2".to_string()));
    }

    #[tokio::test]
    async fn test_incr_on_non_integer_fails() {
        let store = InMemoryStore::new();
        store.set_with_expiry("c", "abc", 60).await.unwrap();

        assert!(store.incr_with_expiry("c", 60).await.is_err());
    }

    #[tokio::test]
    async fn test_concurrent_increments_are_not_lost() {
        let store = Arc::new(InMemoryStore::new());
        let mut handles = Vec::new();

        for _ in 0..50 {
            let store = store.clone();
            handles.push(tokio::spawn(async move {
                store.incr_with_expiry("shared", 60).await.unwrap()
            }));
        }

        let mut seen = Vec::new();
        for handle in handles {
            seen.push(handle.await.unwrap());
        }
        seen.sort_unstable();

        assert_eq!(seen, (1..=50).collect::<Vec<i64>>());
    }

    #[tokio::test]
    async fn test_delete_prefix_only_touches_matching_keys() {
        let store = InMemoryStore::new();
        store.set_with_expiry("grant:alice:1", "x", 60).await.unwrap();
        store.set_with_expiry("grant:alice:2", "x", 60).await.unwrap();
        store.set_with_expiry("grant:alicia:1", "x", 60).await.unwrap();

        assert_eq!(store.delete_prefix("grant:alice:").await.unwrap(), 2);
        assert_eq!(store.delete_prefix("grant:alice:").await.unwrap(), 0);
        assert_eq!(store.len(), 1);
    }
}
