//! In-memory TTL cache for API responses.

use std::collections::HashMap;
use std::time::Duration;

use tokio::sync::RwLock;
use tokio::time::Instant;

use crate::metrics;

struct Entry {
    stored_at: Instant,
    value: serde_json::Value,
}

/// Responses keyed by request path. Expired entries are replaced on the next
/// store and otherwise ignored.
pub struct ResponseCache {
    ttl: Duration,
    entries: RwLock<HashMap<String, Entry>>,
}

impl ResponseCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            entries: RwLock::new(HashMap::new()),
        }
    }

    pub async fn get(&self, key: &str) -> Option<serde_json::Value> {
        let entries = self.entries.read().await;
        let hit = entries
            .get(key)
            .filter(|entry| entry.stored_at.elapsed() < self.ttl)
            .map(|entry| entry.value.clone());

        let label = if hit.is_some() { "hit" } else { "miss" };
        metrics::LEGISLATIVE_CACHE.with_label_values(&[label]).inc();
        hit
    }

    pub async fn insert(&self, key: impl Into<String>, value: serde_json::Value) {
        let mut entries = self.entries.write().await;
        entries.retain(|_, entry| entry.stored_at.elapsed() < self.ttl);
        entries.insert(
            key.into(),
            Entry {
                stored_at: Instant::now(),
                value,
            },
        );
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_hit_and_miss() {
        let cache = ResponseCache::new(Duration::from_secs(60));
        assert!(cache.get("/bill/118/hr/1").await.is_none());

        cache.insert("/bill/118/hr/1", json!({"bill": {"title": "x"}})).await;
        let value = cache.get("/bill/118/hr/1").await.unwrap();
        assert_eq!(value["bill"]["title"], "x");
    }

    #[tokio::test]
    async fn test_entries_expire() {
        let cache = ResponseCache::new(Duration::from_millis(30));
        cache.insert("k", json!(1)).await;

        tokio::time::sleep(Duration::from_millis(60)).await;
        assert!(cache.get("k").await.is_none());

        cache.insert("other", json!(2)).await;
        assert_eq!(cache.len().await, 1);
    }
}
