// Copyright 2025 Cowboy AI, LLC.

//! A [`Store`] driver over NATS JetStream Key/Value buckets: one bucket
//! per table, standing in for the spec's "hash-per-table external KV
//! (e.g. Redis hashes)" reference driver (§6.1).

use std::collections::HashMap;

use async_nats::jetstream::{self, kv};
use async_trait::async_trait;
use tokio::sync::RwLock;

use super::Store;
use crate::error::StoreError;

/// NATS JetStream KV-backed [`Store`]. Each table is lazily materialized
/// as its own bucket named `"<prefix>_<table>"`.
pub struct NatsKvStore {
    context: jetstream::Context,
    prefix: String,
    buckets: RwLock<HashMap<String, kv::Store>>,
    history: i64,
}

impl NatsKvStore {
    /// Wrap a connected NATS client. `prefix` is typically the
    /// orchestrator's namespace and is prepended to every bucket name so
    /// multiple orchestrators can share one NATS account.
    pub fn new(client: async_nats::Client, prefix: impl Into<String>) -> Self {
        Self {
            context: jetstream::new(client),
            prefix: prefix.into(),
            buckets: RwLock::new(HashMap::new()),
            history: 1,
        }
    }

    fn bucket_name(&self, table: &str) -> String {
        format!("{}_{}", self.prefix, table)
    }

    async fn bucket(&self, table: &str) -> Result<kv::Store, StoreError> {
        let name = self.bucket_name(table);

        if let Some(store) = self.buckets.read().await.get(&name) {
            return Ok(store.clone());
        }

        let mut buckets = self.buckets.write().await;
        if let Some(store) = buckets.get(&name) {
            return Ok(store.clone());
        }

        let store = match self.context.get_key_value(&name).await {
            Ok(store) => store,
            Err(_) => self
                .context
                .create_key_value(kv::Config {
                    bucket: name.clone(),
                    history: self.history,
                    ..Default::default()
                })
                .await
                .map_err(|e| StoreError::Backend(format!("create bucket {name}: {e}")))?,
        };

        buckets.insert(name, store.clone());
        Ok(store)
    }
}

#[async_trait]
impl Store for NatsKvStore {
    async fn set(&self, table: &str, key: &str, value: serde_json::Value) -> Result<(), StoreError> {
        let bucket = self.bucket(table).await?;
        let bytes = serde_json::to_vec(&value)
            .map_err(|e| StoreError::Backend(format!("encode {table}/{key}: {e}")))?;
        bucket
            .put(key, bytes.into())
            .await
            .map_err(|e| StoreError::Backend(format!("put {table}/{key}: {e}")))?;
        Ok(())
    }

    async fn get(&self, table: &str, key: &str) -> Result<Option<serde_json::Value>, StoreError> {
        let bucket = self.bucket(table).await?;
        let entry = bucket
            .get(key)
            .await
            .map_err(|e| StoreError::Backend(format!("get {table}/{key}: {e}")))?;
        match entry {
            None => Ok(None),
            Some(bytes) => {
                let value = serde_json::from_slice(&bytes).map_err(|source| StoreError::Corrupt {
                    table: table.to_string(),
                    key: key.to_string(),
                    source,
                })?;
                Ok(Some(value))
            }
        }
    }

    async fn list_keys(&self, table: &str) -> Result<Vec<String>, StoreError> {
        let bucket = self.bucket(table).await?;
        let mut keys = bucket
            .keys()
            .await
            .map_err(|e| StoreError::Backend(format!("keys {table}: {e}")))?;

        let mut out = Vec::new();
        use futures::StreamExt;
        while let Some(key) = keys.next().await {
            match key {
                Ok(key) => out.push(key),
                Err(e) => return Err(StoreError::Backend(format!("keys {table}: {e}"))),
            }
        }
        Ok(out)
    }

    // JetStream KV has no native multi-key fetch; this loops over `get`
    // while preserving the positional-alignment contract. The call count
    // is O(n), a deliberate simplification over a true batch primitive.
    async fn multi_get(
        &self,
        table: &str,
        keys: &[String],
    ) -> Result<Vec<Option<serde_json::Value>>, StoreError> {
        if keys.is_empty() {
            return Ok(Vec::new());
        }
        let mut out = Vec::with_capacity(keys.len());
        for key in keys {
            out.push(self.get(table, key).await?);
        }
        Ok(out)
    }
}
