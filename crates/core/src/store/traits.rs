use std::collections::HashMap;

use async_trait::async_trait;
use thiserror::Error;

#[derive(Debug, Clone, Error)]
pub enum StoreError {
    /// Connectivity loss. Always retryable, never fatal to a run.
    #[error("state store unavailable: {0}")]
    Unavailable(String),

    /// A stored value could not be interpreted.
    #[error("malformed value for {key}/{field}: {value:?}")]
    Malformed {
        key: String,
        field: String,
        value: String,
    },

    #[error("database error: {0}")]
    Database(String),
}

impl StoreError {
    pub fn is_retryable(&self) -> bool {
        matches!(self, StoreError::Unavailable(_) | StoreError::Database(_))
    }
}

/// Hash-structured key-value store with atomic primitives.
#[async_trait]
pub trait StateStore: Send + Sync {
    async fn get(&self, key: &str, field: &str) -> Result<Option<String>, StoreError>;

    /// All fields of a record; empty when the key does not exist.
    async fn get_all(&self, key: &str) -> Result<HashMap<String, String>, StoreError>;

    async fn set(&self, key: &str, field: &str, value: &str) -> Result<(), StoreError>;

    /// Write `value` only if the field is absent. Returns whether it was written.
    async fn set_if_absent(&self, key: &str, field: &str, value: &str)
        -> Result<bool, StoreError>;

    /// Replace the field with `new` only if it currently equals `expected`
    /// (`None` meaning absent). Returns whether it was replaced.
    async fn compare_and_set(
        &self,
        key: &str,
        field: &str,
        expected: Option<&str>,
        new: &str,
    ) -> Result<bool, StoreError>;

    /// Add `delta` to an integer field (absent counts as 0) and return the new value.
    async fn increment(&self, key: &str, field: &str, delta: i64) -> Result<i64, StoreError>;

    /// Remove a whole record.
    async fn delete(&self, key: &str) -> Result<(), StoreError>;

    /// Cheap connectivity check.
    async fn ping(&self) -> Result<(), StoreError>;
}

pub(crate) fn parse_counter(key: &str, field: &str, value: &str) -> Result<i64, StoreError> {
    value.parse().map_err(|_| StoreError::Malformed {
        key: key.to_string(),
        field: field.to_string(),
        value: value.to_string(),
    })
}
