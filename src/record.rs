// Copyright 2025 Cowboy AI, LLC.

//! The record layer: per-table monotonic id allocation plus typed
//! create/update/get operations over a [`Store`].
//!
//! `create` and `update` are NOT atomic across the `meta` counter write
//! and the data write (§4.2 of the design) — under a single orchestrator
//! process sharing one [`Store`] handle this is acceptable; a
//! multi-writer deployment must replace the counter with an atomic
//! increment primitive on the store, or a high-entropy generated id.

use std::marker::PhantomData;
use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::error::{OrchestratorError, Result};
use crate::store::Store;

const META_TABLE_SUFFIX: &str = "meta";

/// Typed wrapper over a [`Store`] that allocates ids and performs
/// shallow-merge patches.
pub struct RecordStore<T> {
    store: Arc<dyn Store>,
    namespace: String,
    _marker: PhantomData<T>,
}

impl<T> Clone for RecordStore<T> {
    fn clone(&self) -> Self {
        Self {
            store: self.store.clone(),
            namespace: self.namespace.clone(),
            _marker: PhantomData,
        }
    }
}

impl<T> RecordStore<T>
where
    T: Serialize + DeserializeOwned + Send + Sync,
{
    /// Wrap `store`, namespacing every table this record store touches
    /// under `namespace`.
    pub fn new(store: Arc<dyn Store>, namespace: impl Into<String>) -> Self {
        Self {
            store,
            namespace: namespace.into(),
            _marker: PhantomData,
        }
    }

    fn table(&self, table: &str) -> String {
        format!("{}_{}", self.namespace, table)
    }

    fn meta_table(&self) -> String {
        self.table(META_TABLE_SUFFIX)
    }

    /// Allocate the next id for `table` and persist `record` under it.
    /// `record` is serialized, has `id` merged in, and the stored value
    /// (including `id`) is returned deserialized back into `T`.
    pub async fn create(&self, table: &str, record: T) -> Result<T> {
        let meta_table = self.meta_table();
        let prev: u64 = match self.store.get(&meta_table, table).await? {
            Some(value) => serde_json::from_value(value)?,
            None => 0,
        };
        let next_id = prev + 1;
        self.store
            .set(&meta_table, table, serde_json::json!(next_id))
            .await?;

        let mut value = serde_json::to_value(record)?;
        if let serde_json::Value::Object(map) = &mut value {
            map.insert("id".to_string(), serde_json::json!(next_id.to_string()));
        }

        let full_table = self.table(table);
        self.store
            .set(&full_table, &next_id.to_string(), value.clone())
            .await?;

        Ok(serde_json::from_value(value)?)
    }

    /// Shallow-merge `patch` over the record currently stored at
    /// `table`/`id`, keeping keys not present in `patch` unchanged.
    pub async fn update(&self, table: &str, id: &str, patch: serde_json::Value) -> Result<T> {
        let full_table = self.table(table);
        let current = self
            .store
            .get(&full_table, id)
            .await?
            .ok_or_else(|| OrchestratorError::NotFound {
                entity: "record",
                id: id.to_string(),
                saga_id: String::new(),
            })?;

        let merged = shallow_merge(current, patch);
        self.store.set(&full_table, id, merged.clone()).await?;
        Ok(serde_json::from_value(merged)?)
    }

    /// Fetch the record at `table`/`id`, if any.
    pub async fn get(&self, table: &str, id: &str) -> Result<Option<T>> {
        let full_table = self.table(table);
        match self.store.get(&full_table, id).await? {
            Some(value) => Ok(Some(serde_json::from_value(value)?)),
            None => Ok(None),
        }
    }

    /// List all ids currently present in `table`.
    pub async fn get_ids(&self, table: &str) -> Result<Vec<String>> {
        let full_table = self.table(table);
        Ok(self.store.list_keys(&full_table).await?)
    }

    /// Fetch several records from `table` at once, positionally aligned
    /// with `ids`.
    pub async fn get_multiple(&self, table: &str, ids: &[String]) -> Result<Vec<Option<T>>> {
        let full_table = self.table(table);
        let values = self.store.multi_get(&full_table, ids).await?;
        values
            .into_iter()
            .map(|value| match value {
                Some(value) => Ok(Some(serde_json::from_value(value)?)),
                None => Ok(None),
            })
            .collect()
    }
}

/// One-level object merge: keys present in `patch` override `base`;
/// everything else in `base` is kept as-is.
fn shallow_merge(base: serde_json::Value, patch: serde_json::Value) -> serde_json::Value {
    match (base, patch) {
        (serde_json::Value::Object(mut base), serde_json::Value::Object(patch)) => {
            for (key, value) in patch {
                base.insert(key, value);
            }
            serde_json::Value::Object(base)
        }
        (_, patch) => patch,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::memory::InMemoryStore;
    use pretty_assertions::assert_eq;
    use proptest::prelude::*;
    use serde::Deserialize;

    #[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
    struct Widget {
        #[serde(default)]
        id: String,
        name: String,
        count: u32,
    }

    fn record_store() -> RecordStore<Widget> {
        RecordStore::new(Arc::new(InMemoryStore::new()), "ns")
    }

    proptest! {
        // §4.2: `create` allocates ids 1..=n in order, regardless of how
        // many records are created, since each `create` reads the prior
        // `lastId` before writing its own.
        #[test]
        fn create_allocates_ids_one_through_n(n in 1usize..40) {
            let rt = tokio::runtime::Runtime::new().unwrap();
            let ids = rt.block_on(async {
                let rs = RecordStore::new(Arc::new(InMemoryStore::new()), "ns");
                let mut ids = Vec::with_capacity(n);
                for i in 0..n {
                    let record = rs
                        .create(
                            "widgets",
                            Widget { id: String::new(), name: format!("w{i}"), count: i as u32 },
                        )
                        .await
                        .unwrap();
                    ids.push(record.id);
                }
                ids
            });
            let expected: Vec<String> = (1..=n).map(|i| i.to_string()).collect();
            prop_assert_eq!(ids, expected);
        }
    }

    #[tokio::test]
    async fn create_allocates_sequential_ids() {
        let rs = record_store();
        let a = rs
            .create(
                "widgets",
                Widget {
                    id: String::new(),
                    name: "a".into(),
                    count: 1,
                },
            )
            .await
            .unwrap();
        let b = rs
            .create(
                "widgets",
                Widget {
                    id: String::new(),
                    name: "b".into(),
                    count: 2,
                },
            )
            .await
            .unwrap();
        assert_eq!(a.id, "1");
        assert_eq!(b.id, "2");
    }

    #[tokio::test]
    async fn update_shallow_merges_patch_over_existing() {
        let rs = record_store();
        let created = rs
            .create(
                "widgets",
                Widget {
                    id: String::new(),
                    name: "a".into(),
                    count: 1,
                },
            )
            .await
            .unwrap();

        let updated = rs
            .update("widgets", &created.id, serde_json::json!({"count": 9}))
            .await
            .unwrap();

        assert_eq!(updated.name, "a");
        assert_eq!(updated.count, 9);
    }

    #[tokio::test]
    async fn get_multiple_is_positional() {
        let rs = record_store();
        let a = rs
            .create(
                "widgets",
                Widget {
                    id: String::new(),
                    name: "a".into(),
                    count: 1,
                },
            )
            .await
            .unwrap();

        let got = rs
            .get_multiple("widgets", &[a.id.clone(), "missing".to_string()])
            .await
            .unwrap();
        assert_eq!(got, vec![Some(a), None]);
    }
}
