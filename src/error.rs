// Copyright 2025 Cowboy AI, LLC.

//! Error types for the orchestrator.

use thiserror::Error;

/// Errors surfaced by a [`crate::store::Store`] driver.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The underlying backend rejected or could not complete an operation.
    #[error("store backend error: {0}")]
    Backend(String),

    /// A stored value could not be parsed as the JSON the caller expected.
    #[error("store value corrupt at {table}/{key}: {source}")]
    Corrupt {
        /// Table the bad value was read from.
        table: String,
        /// Key the bad value was read from.
        key: String,
        /// Underlying parse error.
        #[source]
        source: serde_json::Error,
    },
}

/// Errors raised by the saga/step state machines and the dispatcher.
#[derive(Debug, Error)]
pub enum OrchestratorError {
    /// A store operation failed.
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    /// A value handed to `step_finished` or a step's `args` could not be
    /// round-tripped through JSON.
    #[error("encoding error: {0}")]
    Encoding(#[from] serde_json::Error),

    /// An operation was attempted on a saga or step that has not been
    /// persisted yet (no id assigned).
    #[error("uninitialized entity: {0}")]
    UninitializedEntity(String),

    /// The record named does not exist in the store.
    #[error("not found: {entity} {id} in saga {saga_id}")]
    NotFound {
        /// Kind of entity that was looked up ("saga" or "step").
        entity: &'static str,
        /// The id that was looked up.
        id: String,
        /// The saga the lookup was scoped to (empty for saga-level lookups).
        saga_id: String,
    },

    /// `enqueue` was called on a step whose dependencies are not all
    /// satisfied. This indicates a scheduler bug: the saga's `tick` is
    /// expected to only enqueue ready steps.
    #[error("invariant violation: {0}")]
    InvariantViolation(String),

    /// The dispatcher could not resolve a step's `worker_name` to a
    /// registered worker.
    #[error("unknown worker: {0}")]
    UnknownWorker(String),

    /// The caller asked for something the façade won't do, e.g.
    /// registering two workers under the same name.
    #[error("invalid operation: {0}")]
    InvalidOperation(String),
}

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, OrchestratorError>;
