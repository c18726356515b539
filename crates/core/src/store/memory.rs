use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::Mutex;

use super::traits::{parse_counter, StateStore, StoreError};

/// Process-local state store. One lock covers every record, which makes each
/// primitive trivially atomic.
#[derive(Debug, Default)]
pub struct InMemoryStateStore {
    records: Mutex<HashMap<String, HashMap<String, String>>>,
}

impl InMemoryStateStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl StateStore for InMemoryStateStore {
    async fn get(&self, key: &str, field: &str) -> Result<Option<String>, StoreError> {
        let records = self.records.lock().await;
        Ok(records.get(key).and_then(|r| r.get(field)).cloned())
    }

    async fn get_all(&self, key: &str) -> Result<HashMap<String, String>, StoreError> {
        let records = self.records.lock().await;
        Ok(records.get(key).cloned().unwrap_or_default())
    }

    async fn set(&self, key: &str, field: &str, value: &str) -> Result<(), StoreError> {
        let mut records = self.records.lock().await;
        records
            .entry(key.to_string())
            .or_default()
            .insert(field.to_string(), value.to_string());
        Ok(())
    }

    async fn set_if_absent(
        &self,
        key: &str,
        field: &str,
        value: &str,
    ) -> Result<bool, StoreError> {
        let mut records = self.records.lock().await;
        let record = records.entry(key.to_string()).or_default();
        if record.contains_key(field) {
            return Ok(false);
        }
        record.insert(field.to_string(), value.to_string());
        Ok(true)
    }

    async fn compare_and_set(
        &self,
        key: &str,
        field: &str,
        expected: Option<&str>,
        new: &str,
    ) -> Result<bool, StoreError> {
        let mut records = self.records.lock().await;
        let record = records.entry(key.to_string()).or_default();
        if record.get(field).map(String::as_str) != expected {
            return Ok(false);
        }
        record.insert(field.to_string(), new.to_string());
        Ok(true)
    }

    async fn increment(&self, key: &str, field: &str, delta: i64) -> Result<i64, StoreError> {
        let mut records = self.records.lock().await;
        let record = records.entry(key.to_string()).or_default();
        let current = match record.get(field) {
            Some(value) => parse_counter(key, field, value)?,
            None => 0,
        };
        let next = current + delta;
        record.insert(field.to_string(), next.to_string());
        Ok(next)
    }

    async fn delete(&self, key: &str) -> Result<(), StoreError> {
        self.records.lock().await.remove(key);
        Ok(())
    }

    async fn ping(&self) -> Result<(), StoreError> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[tokio::test]
    async fn test_set_if_absent_only_first_wins() {
        let store = InMemoryStateStore::new();
        assert!(store.set_if_absent("k", "f", "a").await.unwrap());
        assert!(!store.set_if_absent("k", "f", "b").await.unwrap());
        assert_eq!(store.get("k", "f").await.unwrap().as_deref(), Some("a"));
    }

    #[tokio::test]
    async fn test_compare_and_set() {
        let store = InMemoryStateStore::new();
        // absent expectation
        assert!(store.compare_and_set("k", "f", None, "one").await.unwrap());
        assert!(!store.compare_and_set("k", "f", None, "two").await.unwrap());
        assert!(!store
            .compare_and_set("k", "f", Some("zero"), "two")
            .await
            .unwrap());
        assert!(store
            .compare_and_set("k", "f", Some("one"), "two")
            .await
            .unwrap());
        assert_eq!(store.get("k", "f").await.unwrap().as_deref(), Some("two"));
    }

    #[tokio::test]
    async fn test_increment_and_malformed_counter() {
        let store = InMemoryStateStore::new();
        assert_eq!(store.increment("k", "n", 1).await.unwrap(), 1);
        assert_eq!(store.increment("k", "n", 4).await.unwrap(), 5);

        store.set("k", "text", "abc").await.unwrap();
        let err = store.increment("k", "text", 1).await.unwrap_err();
        assert!(matches!(err, StoreError::Malformed { .. }));
        assert!(!err.is_retryable());
    }

    #[tokio::test]
    async fn test_concurrent_cas_has_one_winner() {
        let store = Arc::new(InMemoryStateStore::new());
        store.set("bill", "status", "not_ready").await.unwrap();

        let mut handles = Vec::new();
        for _ in 0..16 {
            let store = Arc::clone(&store);
            handles.push(tokio::spawn(async move {
                store
                    .compare_and_set("bill", "status", Some("not_ready"), "queued")
                    .await
                    .unwrap()
            }));
        }

        let mut winners = 0;
        for handle in handles {
            if handle.await.unwrap() {
                winners += 1;
            }
        }
        assert_eq!(winners, 1);
    }

    #[tokio::test]
    async fn test_get_all_and_delete() {
        let store = InMemoryStateStore::new();
        store.set("k", "a", "1").await.unwrap();
        store.set("k", "b", "2").await.unwrap();
        assert_eq!(store.get_all("k").await.unwrap().len(), 2);

        store.delete("k").await.unwrap();
        assert!(store.get_all("k").await.unwrap().is_empty());
        assert!(store.get("k", "a").await.unwrap().is_none());
    }
}
