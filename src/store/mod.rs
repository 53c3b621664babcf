// Copyright 2025 Cowboy AI, LLC.

//! The store contract: a namespaced key/value surface over "tables" of
//! JSON-serializable records.
//!
//! Every operation here is the canonical suspension point of the engine
//! (§5 of the design): nothing above this layer holds a lock across an
//! `.await`, so a slow or unavailable backend degrades latency, not
//! correctness.

pub mod memory;
#[cfg(feature = "nats")]
pub mod nats_kv;

use async_trait::async_trait;

use crate::error::StoreError;

/// Namespaced key/value store over JSON-encoded records, grouped into
/// tables.
///
/// Implementors must preserve JSON round-trip semantics: whatever string
/// is handed to [`Store::set`] is returned byte-for-byte-equivalent (as
/// parsed JSON, not necessarily as raw bytes) from [`Store::get`] and
/// [`Store::multi_get`].
#[async_trait]
pub trait Store: Send + Sync {
    /// Upsert `value` at `table`/`key`.
    async fn set(&self, table: &str, key: &str, value: serde_json::Value) -> Result<(), StoreError>;

    /// Fetch the value at `table`/`key`, or `None` if absent.
    async fn get(&self, table: &str, key: &str) -> Result<Option<serde_json::Value>, StoreError>;

    /// List all keys currently present in `table`, in unspecified order.
    async fn list_keys(&self, table: &str) -> Result<Vec<String>, StoreError>;

    /// Fetch several keys from `table` at once, positionally aligned with
    /// `keys`. An empty `keys` MUST return an empty list without touching
    /// the backend.
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
