//! In-memory TTL cache for computed records.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::RwLock;

#[derive(Debug, Clone)]
struct CacheEntry<V> {
    value: V,
    expires_at: Instant,
}

#[derive(Debug)]
struct CacheInner<V> {
    map: HashMap<String, CacheEntry<V>>,
    ttl: Duration,
}

/// Thread-safe cache keyed by string. A zero TTL disables it.
#[derive(Debug)]
pub struct CacheStore<V> {
    inner: Arc<RwLock<CacheInner<V>>>,
}

impl<V> Clone for CacheStore<V> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<V: Clone> CacheStore<V> {
    pub fn new(ttl: Duration) -> Self {
        Self {
            inner: Arc::new(RwLock::new(CacheInner {
                map: HashMap::new(),
                ttl,
            })),
        }
    }

    pub fn disabled() -> Self {
        Self::new(Duration::ZERO)
    }

    /// Returns the value when present and not expired.
    pub async fn get(&self, key: &str) -> Option<V> {
        let store = self.inner.read().await;
        store
            .map
            .get(key)
            .filter(|entry| Instant::now() <= entry.expires_at)
            .map(|entry| entry.value.clone())
    }

    /// Inserts `value` and drops every entry that has already expired, so the
    /// map only holds live records.
    pub async fn put(&self, key: impl Into<String>, value: V) {
        let mut store = self.inner.write().await;
        if store.ttl.is_zero() {
            return;
        }
        let now = Instant::now();
        store.map.retain(|_, entry| entry.expires_at > now);
        let expires_at = now + store.ttl;
        store.map.insert(key.into(), CacheEntry { value, expires_at });
    }

    /// Entry count, including expired entries not yet swept by a `put`.
    pub async fn len(&self) -> usize {
        self.inner.read().await.map.len()
    }
}
