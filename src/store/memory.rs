// Copyright 2025 Cowboy AI, LLC.

//! An in-process reference [`Store`] driver backed by a `HashMap`.
//!
//! This is the default driver for tests and for hosts that don't need the
//! orchestrator's state to survive the process.

use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;

use super::Store;
use crate::error::StoreError;

/// In-memory [`Store`] keyed by `(table, key)`.
#[derive(Debug, Default)]
pub struct InMemoryStore {
    rows: RwLock<HashMap<(String, String), serde_json::Value>>,
}

impl InMemoryStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Store for InMemoryStore {
    async fn set(&self, table: &str, key: &str, value: serde_json::Value) -> Result<(), StoreError> {
        let mut rows = self.rows.write().await;
        rows.insert((table.to_string(), key.to_string()), value);
        Ok(())
    }

    async fn get(&self, table: &str, key: &str) -> Result<Option<serde_json::Value>, StoreError> {
        let rows = self.rows.read().await;
        Ok(rows.get(&(table.to_string(), key.to_string())).cloned())
    }

    async fn list_keys(&self, table: &str) -> Result<Vec<String>, StoreError> {
        let rows = self.rows.read().await;
        Ok(rows
            .keys()
            .filter(|(t, _)| t == table)
            .map(|(_, k)| k.clone())
            .collect())
    }

    async fn multi_get(
        &self,
        table: &str,
        keys: &[String],
    ) -> Result<Vec<Option<serde_json::Value>>, StoreError> {
        if keys.is_empty() {
            return Ok(Vec::new());
        }
        let rows = self.rows.read().await;
        Ok(keys
            .iter()
            .map(|key| rows.get(&(table.to_string(), key.clone())).cloned())
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn set_then_get_round_trips() {
        let store = InMemoryStore::new();
        store
            .set("widgets", "1", serde_json::json!({"name": "bolt"}))
            .await
            .unwrap();
        let got = store.get("widgets", "1").await.unwrap();
        assert_eq!(got, Some(serde_json::json!({"name": "bolt"})));
    }

    #[tokio::test]
    async fn get_missing_is_none() {
        let store = InMemoryStore::new();
        assert_eq!(store.get("widgets", "nope").await.unwrap(), None);
    }

    #[tokio::test]
    async fn list_keys_filters_by_table() {
        let store = InMemoryStore::new();
        store.set("a", "1", serde_json::json!(1)).await.unwrap();
        store.set("b", "1", serde_json::json!(2)).await.unwrap();
        store.set("a", "2", serde_json::json!(3)).await.unwrap();

        let mut keys = store.list_keys("a").await.unwrap();
        keys.sort();
        assert_eq!(keys, vec!["1".to_string(), "2".to_string()]);
    }

    #[tokio::test]
    async fn multi_get_is_positional_and_empty_input_short_circuits() {
        let store = InMemoryStore::new();
        store.set("a", "1", serde_json::json!("x")).await.unwrap();

        let got = store
            .multi_get("a", &["1".to_string(), "missing".to_string()])
            .await
            .unwrap();
        assert_eq!(got, vec![Some(serde_json::json!("x")), None]);

        let empty = store.multi_get("a", &[]).await.unwrap();
        assert!(empty.is_empty());
    }
}
