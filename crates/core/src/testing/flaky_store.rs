use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;

use crate::store::{StateStore, StoreError};

/// Wraps a store and fails every call with `Unavailable` while switched off.
pub struct FlakyStateStore {
    inner: Arc<dyn StateStore>,
    down: AtomicBool,
}

impl FlakyStateStore {
    pub fn new(inner: Arc<dyn StateStore>) -> Self {
        Self {
            inner,
            down: AtomicBool::new(false),
        }
    }

    pub fn set_down(&self, down: bool) {
        self.down.store(down, Ordering::SeqCst);
    }

    fn check(&self) -> Result<(), StoreError> {
        if self.down.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("connection refused".to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl StateStore for FlakyStateStore {
    async fn get(&self, key: &str, field: &str) -> Result<Option<String>, StoreError> {
        self.check()?;
        self.inner.get(key, field).await
    }

    async fn get_all(&self, key: &str) -> Result<HashMap<String, String>, StoreError> {
        self.check()?;
        self.inner.get_all(key).await
    }

    async fn set(&self, key: &str, field: &str, value: &str) -> Result<(), StoreError> {
        self.check()?;
        self.inner.set(key, field, value).await
    }

    async fn set_if_absent(&self, key: &str, field: &str, value: &str) -> Result<bool, StoreError> {
        self.check()?;
        self.inner.set_if_absent(key, field, value).await
    }

    async fn compare_and_set(
        &self,
        key: &str,
        field: &str,
        expected: Option<&str>,
        new: &str,
    ) -> Result<bool, StoreError> {
        self.check()?;
        self.inner.compare_and_set(key, field, expected, new).await
    }

    async fn increment(&self, key: &str, field: &str, delta: i64) -> Result<i64, StoreError> {
        self.check()?;
        self.inner.increment(key, field, delta).await
    }

    async fn delete(&self, key: &str) -> Result<(), StoreError> {
        self.check()?;
        self.inner.delete(key).await
    }

    async fn ping(&self) -> Result<(), StoreError> {
        self.check()?;
        self.inner.ping().await
    }
}
