// Copyright 2025 Cowboy AI, LLC.

//! The worker contract: a process-local, name-addressed callable invoked
//! by the dispatcher when a step is ready to run (§6.2).

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use async_trait::async_trait;

use crate::saga::Saga;

/// A named unit of work a saga's steps can be dispatched to.
///
/// Polymorphism here is capability-based, not inheritance-based: any
/// type implementing `run` can be registered under any name via
/// [`WorkerRegistry`].
#[async_trait]
pub trait Worker: Send + Sync {
    /// The name steps reference via `worker_name` to be routed here.
    fn name(&self) -> &str;

    /// Execute the step. `args` are the step's fixed creation-time
    /// arguments; `dependency_args` are the results of `depends_on`
    /// steps, positionally aligned with their declaration order.
    ///
    /// The worker MUST eventually call exactly one of
    /// [`Saga::step_finished`] or [`Saga::step_failed`] for `step_id`.
    /// Failing to do so leaves the step stuck in `Running` forever —
    /// there is no step timeout (§5).
    async fn run(
        &self,
        args: Vec<serde_json::Value>,
        dependency_args: Vec<serde_json::Value>,
        saga: Saga,
        step_id: String,
    );
}

/// The process-local name → worker map shared between the
/// [`crate::orchestrator::Orchestrator`] façade (which populates it) and
/// the [`crate::dispatcher::Dispatcher`] (which resolves `worker_name`
/// against it on every dispatch).
pub type WorkerRegistry = Arc<RwLock<HashMap<String, Arc<dyn Worker>>>>;

/// Construct an empty, shareable worker registry.
pub fn new_worker_registry() -> WorkerRegistry {
    Arc::new(RwLock::new(HashMap::new()))
}
