//! Scalar key/value operations
//!
//! Values are stored as JSON text so any `serde` type can be a scalar:
//! cursors are strings, `repos` is a list, `module_groups` a map.

use serde::de::DeserializeOwned;
use serde::Serialize;

use super::KeyedStore;
use crate::Result;

impl KeyedStore {
    /// Read a scalar value, `None` when the key was never set
    pub async fn get_by_key<T>(&self, key: &str) -> Result<Option<T>>
    where
        T: DeserializeOwned,
    {
        let row: Option<(String,)> = sqlx::query_as("SELECT value FROM runtime_kv WHERE key = ?")
            .bind(key)
            .fetch_optional(&self.pool)
            .await?;

        match row {
            Some((value,)) => Ok(Some(serde_json::from_str(&value)?)),
            None => Ok(None),
        }
    }

    /// Overwrite a scalar value
    pub async fn set_by_key<T>(&self, key: &str, value: &T) -> Result<()>
    where
        T: Serialize + ?Sized,
    {
        let json = serde_json::to_string(value)?;
        let json = json.as_str();
        let pool = &self.pool;
        super::retry_on_lock("set_by_key", self.lock_wait_ms, || async move {
            sqlx::query(
                "INSERT INTO runtime_kv (key, value, updated_at) VALUES (?, ?, strftime('%s','now'))
                 ON CONFLICT(key) DO UPDATE SET value = excluded.value, updated_at = excluded.updated_at",
            )
            .bind(key)
            .bind(json)
            .execute(pool)
            .await?;
            Ok::<(), crate::Error>(())
        })
        .await?;

        tracing::trace!(key, "Stored scalar key");
        Ok(())
    }

    pub async fn delete_by_key(&self, key: &str) -> Result<()> {
        sqlx::query("DELETE FROM runtime_kv WHERE key = ?")
            .bind(key)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[tokio::test]
    async fn test_get_missing_key() {
        let store = KeyedStore::in_memory().await.unwrap();
        let value: Option<String> = store.get_by_key("vcs:nowhere:master").await.unwrap();
        assert_eq!(value, None);
    }

    #[tokio::test]
    async fn test_set_then_overwrite() {
        let store = KeyedStore::in_memory().await.unwrap();

        store.set_by_key("cursor", "abc").await.unwrap();
        store.set_by_key("cursor", "def").await.unwrap();

        let value: Option<String> = store.get_by_key("cursor").await.unwrap();
        assert_eq!(value.as_deref(), Some("def"));

        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM runtime_kv WHERE key = 'cursor'")
            .fetch_one(store.pool())
            .await
            .unwrap();
        assert_eq!(count, 1, "Should have exactly one entry after update");
    }

    #[tokio::test]
    async fn test_structured_value() {
        let store = KeyedStore::in_memory().await.unwrap();
        let mut index = HashMap::new();
        index.insert("deadbeef".to_string(), "havana".to_string());

        store.set_by_key("release_index", &index).await.unwrap();

        let loaded: HashMap<String, String> =
            store.get_by_key("release_index").await.unwrap().unwrap();
        assert_eq!(loaded, index);
    }

    #[tokio::test]
    async fn test_delete_key() {
        let store = KeyedStore::in_memory().await.unwrap();
        store.set_by_key("flag", &true).await.unwrap();
        store.delete_by_key("flag").await.unwrap();
        let value: Option<bool> = store.get_by_key("flag").await.unwrap();
        assert!(value.is_none());
    }
}
