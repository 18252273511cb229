use std::collections::HashMap;
use std::time::{Duration, Instant};

use tokio::sync::Mutex;

#[derive(Debug)]
struct Entry<V> {
    value: V,
    expires_at: Instant,
}

/// Key/value cache with per-entry expiry. Expired entries are dropped lazily on read.
#[derive(Debug)]
pub struct TtlCache<V> {
    entries: Mutex<HashMap<String, Entry<V>>>,
}

impl<V> Default for TtlCache<V> {
    fn default() -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
        }
    }
}

impl<V: Clone> TtlCache<V> {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn setex(&self, key: impl Into<String>, ttl: Duration, value: V) {
        self.setex_at(key, ttl, value, Instant::now()).await
    }

    pub async fn setex_at(&self, key: impl Into<String>, ttl: Duration, value: V, now: Instant) {
        let entry = Entry {
            value,
            expires_at: now + ttl,
        };
        self.entries.lock().await.insert(key.into(), entry);
    }

    pub async fn get(&self, key: &str) -> Option<V> {
        self.get_at(key, Instant::now()).await
    }

    pub async fn get_at(&self, key: &str, now: Instant) -> Option<V> {
        let mut entries = self.entries.lock().await;
        let expired = match entries.get(key) {
            Some(e) if now <= e.expires_at => return Some(e.value.clone()),
            Some(_) => true,
            None => false,
        };
        if expired {
            entries.remove(key);
        }
        None
    }

    pub async fn del(&self, key: &str) {
        self.entries.lock().await.remove(key);
    }

    /// Whether `key` holds an unexpired value.
    pub async fn exists(&self, key: &str) -> bool {
        let now = Instant::now();
        self.entries
            .lock()
            .await
            .get(key)
            .is_some_and(|e| now <= e.expires_at)
    }
}

/// Cache key of a scan's detail response.
pub fn scan_key(scan_id: &str) -> String {
    format!("scan:{scan_id}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn values_expire_after_ttl() {
        let cache = TtlCache::new();
        let t0 = Instant::now();
        cache.setex_at("k", Duration::from_secs(10), 7u32, t0).await;

        assert_eq!(cache.get_at("k", t0 + Duration::from_secs(10)).await, Some(7));
        assert_eq!(cache.get_at("k", t0 + Duration::from_secs(11)).await, None);
        assert!(!cache.exists("k").await, "expired entry is evicted on read");
    }

    #[tokio::test]
    async fn exists_respects_expiry_without_a_read() {
        let cache = TtlCache::new();
        cache.setex("fresh", Duration::from_secs(60), 1u8).await;
        cache.setex("stale", Duration::ZERO, 2u8).await;
        tokio::time::sleep(Duration::from_millis(5)).await;

        assert!(cache.exists("fresh").await);
        assert!(!cache.exists("stale").await);
        assert!(!cache.exists("missing").await);
    }

    #[tokio::test]
    async fn del_removes_entry() {
        let cache = TtlCache::new();
        cache.setex(scan_key("scan_1_abc"), Duration::from_secs(60), "v".to_string()).await;
        assert!(cache.exists("scan:scan_1_abc").await);

        cache.del("scan:scan_1_abc").await;
        assert_eq!(cache.get("scan:scan_1_abc").await, None);
    }
}
