//! SQLite-backed state store implementation.

use std::collections::HashMap;
use std::path::Path;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension, TransactionBehavior};

use super::traits::{parse_counter, StateStore, StoreError};

/// SQLite-backed state store. Lets a run be inspected after the process exits
/// and lets several processes on one host share progress.
pub struct SqliteStateStore {
    conn: Mutex<Connection>,
}

fn db_err(e: rusqlite::Error) -> StoreError {
    StoreError::Database(e.to_string())
}

impl SqliteStateStore {
    /// Create a new SQLite state store, creating the database file and table if needed.
    pub fn new(path: &Path) -> Result<Self, StoreError> {
        let conn = Connection::open(path).map_err(db_err)?;
        Self::initialize_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Create an in-memory SQLite state store (useful for testing).
    pub fn in_memory() -> Result<Self, StoreError> {
        let conn = Connection::open_in_memory().map_err(db_err)?;
        Self::initialize_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn initialize_schema(conn: &Connection) -> Result<(), StoreError> {
        conn.busy_timeout(Duration::from_secs(5)).map_err(db_err)?;
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS state (
                key TEXT NOT NULL,
                field TEXT NOT NULL,
                value TEXT NOT NULL,
                updated_at TEXT NOT NULL,
                PRIMARY KEY (key, field)
            );
            "#,
        )
        .map_err(db_err)
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>, StoreError> {
        self.conn
            .lock()
            .map_err(|_| StoreError::Unavailable("connection lock poisoned".to_string()))
    }
}

#[async_trait]
impl StateStore for SqliteStateStore {
    async fn get(&self, key: &str, field: &str) -> Result<Option<String>, StoreError> {
        let conn = self.lock()?;
        conn.query_row(
            "SELECT value FROM state WHERE key = ? AND field = ?",
            params![key, field],
            |row| row.get(0),
        )
        .optional()
        .map_err(db_err)
    }

    async fn get_all(&self, key: &str) -> Result<HashMap<String, String>, StoreError> {
        let conn = self.lock()?;
        let mut stmt = conn
            .prepare("SELECT field, value FROM state WHERE key = ?")
            .map_err(db_err)?;
        let rows = stmt
            .query_map(params![key], |row| {
                Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
            })
            .map_err(db_err)?;

        rows.collect::<Result<HashMap<_, _>, _>>().map_err(db_err)
    }

    async fn set(&self, key: &str, field: &str, value: &str) -> Result<(), StoreError> {
        let conn = self.lock()?;
        conn.execute(
            "INSERT INTO state (key, field, value, updated_at) VALUES (?, ?, ?, ?)
             ON CONFLICT(key, field) DO UPDATE SET value = excluded.value, updated_at = excluded.updated_at",
            params![key, field, value, Utc::now().to_rfc3339()],
        )
        .map_err(db_err)?;
        Ok(())
    }

    async fn set_if_absent(
        &self,
        key: &str,
        field: &str,
        value: &str,
    ) -> Result<bool, StoreError> {
        let conn = self.lock()?;
        let inserted = conn
            .execute(
                "INSERT OR IGNORE INTO state (key, field, value, updated_at) VALUES (?, ?, ?, ?)",
                params![key, field, value, Utc::now().to_rfc3339()],
            )
            .map_err(db_err)?;
        Ok(inserted == 1)
    }

    async fn compare_and_set(
        &self,
        key: &str,
        field: &str,
        expected: Option<&str>,
        new: &str,
    ) -> Result<bool, StoreError> {
        let conn = self.lock()?;
        let now = Utc::now().to_rfc3339();
        let changed = match expected {
            Some(expected) => conn.execute(
                "UPDATE state SET value = ?, updated_at = ? WHERE key = ? AND field = ? AND value = ?",
                params![new, now, key, field, expected],
            ),
            None => conn.execute(
                "INSERT OR IGNORE INTO state (key, field, value, updated_at) VALUES (?, ?, ?, ?)",
                params![key, field, new, now],
            ),
        }
        .map_err(db_err)?;
        Ok(changed == 1)
    }

    async fn increment(&self, key: &str, field: &str, delta: i64) -> Result<i64, StoreError> {
        let mut conn = self.lock()?;
        let tx = conn
            .transaction_with_behavior(TransactionBehavior::Immediate)
            .map_err(db_err)?;

        let current: Option<String> = tx
            .query_row(
                "SELECT value FROM state WHERE key = ? AND field = ?",
                params![key, field],
                |row| row.get(0),
            )
            .optional()
            .map_err(db_err)?;
        let current = match current {
            Some(value) => parse_counter(key, field, &value)?,
            None => 0,
        };
        let next = current + delta;

        tx.execute(
            "INSERT INTO state (key, field, value, updated_at) VALUES (?, ?, ?, ?)
             ON CONFLICT(key, field) DO UPDATE SET value = excluded.value, updated_at = excluded.updated_at",
            params![key, field, next.to_string(), Utc::now().to_rfc3339()],
        )
        .map_err(db_err)?;
        tx.commit().map_err(db_err)?;

        Ok(next)
    }

    async fn delete(&self, key: &str) -> Result<(), StoreError> {
        let conn = self.lock()?;
        conn.execute("DELETE FROM state WHERE key = ?", params![key])
            .map_err(db_err)?;
        Ok(())
    }

    async fn ping(&self) -> Result<(), StoreError> {
        let conn = self.lock()?;
        conn.query_row("SELECT 1", [], |row| row.get::<_, i64>(0))
            .map_err(|e| StoreError::Unavailable(e.to_string()))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn create_test_store() -> SqliteStateStore {
        SqliteStateStore::in_memory().unwrap()
    }

    #[tokio::test]
    async fn test_set_and_get() {
        let store = create_test_store();
        assert!(store.get("bill:H.R.1", "answer:1").await.unwrap().is_none());

        store.set("bill:H.R.1", "answer:1", "text").await.unwrap();
        store.set("bill:H.R.1", "answer:1", "newer").await.unwrap();
        assert_eq!(
            store.get("bill:H.R.1", "answer:1").await.unwrap().as_deref(),
            Some("newer")
        );
    }

    #[tokio::test]
    async fn test_set_if_absent() {
        let store = create_test_store();
        assert!(store.set_if_absent("k", "f", "first").await.unwrap());
        assert!(!store.set_if_absent("k", "f", "second").await.unwrap());
        assert_eq!(store.get("k", "f").await.unwrap().as_deref(), Some("first"));
    }

    #[tokio::test]
    async fn test_compare_and_set() {
        let store = create_test_store();
        assert!(store.compare_and_set("k", "f", None, "a").await.unwrap());
        assert!(!store.compare_and_set("k", "f", None, "b").await.unwrap());
        assert!(!store.compare_and_set("k", "f", Some("x"), "b").await.unwrap());
        assert!(store.compare_and_set("k", "f", Some("a"), "b").await.unwrap());
        assert_eq!(store.get("k", "f").await.unwrap().as_deref(), Some("b"));
    }

    #[tokio::test]
    async fn test_increment() {
        let store = create_test_store();
        assert_eq!(store.increment("run:stats", "done", 1).await.unwrap(), 1);
        assert_eq!(store.increment("run:stats", "done", 2).await.unwrap(), 3);
        assert_eq!(store.increment("run:stats", "done", -1).await.unwrap(), 2);

        store.set("run:stats", "label", "x").await.unwrap();
        assert!(matches!(
            store.increment("run:stats", "label", 1).await,
            Err(StoreError::Malformed { .. })
        ));
    }

    #[tokio::test]
    async fn test_get_all_scoped_to_key_and_delete() {
        let store = create_test_store();
        store.set("a", "x", "1").await.unwrap();
        store.set("a", "y", "2").await.unwrap();
        store.set("b", "x", "3").await.unwrap();

        let all = store.get_all("a").await.unwrap();
        assert_eq!(all.len(), 2);
        assert_eq!(all.get("y").map(String::as_str), Some("2"));

        store.delete("a").await.unwrap();
        assert!(store.get_all("a").await.unwrap().is_empty());
        assert_eq!(store.get_all("b").await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_file_based_store() {
        let temp_dir = tempfile::tempdir().unwrap();
        let db_path = temp_dir.path().join("state.db");

        {
            let store = SqliteStateStore::new(&db_path).unwrap();
            store.set("k", "f", "persisted").await.unwrap();
            store.ping().await.unwrap();
        }
        assert!(db_path.exists());

        let reopened = SqliteStateStore::new(&db_path).unwrap();
        assert_eq!(
            reopened.get("k", "f").await.unwrap().as_deref(),
            Some("persisted")
        );
    }
}
