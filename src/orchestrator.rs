// Copyright 2025 Cowboy AI, LLC.

//! The orchestrator façade (§4.6): lifecycle of the dispatcher, the saga
//! factory, the worker registry, and restart recovery from the store.

use std::sync::Arc;

use crate::config::{DispatcherOptions, OrchestratorOptions};
use crate::dispatcher::Dispatcher;
use crate::error::{OrchestratorError, Result};
use crate::record::RecordStore;
use crate::saga::{Saga, SagaRecord, SagaStatus};
use crate::step::StepRecord;
use crate::store::Store;
use crate::worker::{new_worker_registry, Worker, WorkerRegistry};

const SAGA_TABLE: &str = "saga";

/// The public entry point: owns the store handles, the worker registry,
/// and the dispatcher, and hands out [`Saga`] handles.
pub struct Orchestrator {
    saga_records: RecordStore<SagaRecord>,
    step_records: RecordStore<StepRecord>,
    workers: WorkerRegistry,
    dispatcher: Dispatcher,
}

impl Orchestrator {
    /// Build an orchestrator over `store`, namespacing every table it
    /// touches per `options.namespace`, and start the dispatcher's tick
    /// loop immediately.
    pub fn new(
        store: Arc<dyn Store>,
        options: OrchestratorOptions,
        dispatcher_options: DispatcherOptions,
    ) -> Self {
        let saga_records = RecordStore::new(store.clone(), options.namespace.clone());
        let step_records = RecordStore::new(store.clone(), options.namespace.clone());
        let workers = new_worker_registry();
        let dispatcher = Dispatcher::new(dispatcher_options, workers.clone());
        dispatcher.start();

        Self {
            saga_records,
            step_records,
            workers,
            dispatcher,
        }
    }

    /// Create and persist a new saga, registering it with the
    /// dispatcher.
    #[tracing::instrument(skip(self))]
    pub async fn create_saga(&self) -> Result<Saga> {
        let saga = Saga::create(self.saga_records.clone(), self.step_records.clone()).await?;
        self.dispatcher.register_saga(saga.clone());
        Ok(saga)
    }

    /// Register a worker under its own `name()`. Fails if a worker with
    /// that name is already registered.
    pub fn register_worker(&self, worker: Arc<dyn Worker>) -> Result<()> {
        let mut workers = self.workers.write().expect("worker registry lock poisoned");
        if workers.contains_key(worker.name()) {
            return Err(OrchestratorError::InvalidOperation(format!(
                "worker '{}' is already registered",
                worker.name()
            )));
        }
        workers.insert(worker.name().to_string(), worker);
        Ok(())
    }

    /// Register several workers at once. Rejects (rather than silently
    /// overwriting) any name collision, including collisions within
    /// `workers` itself; registrations before the failing one are kept.
    pub fn register_workers(&self, workers: impl IntoIterator<Item = Arc<dyn Worker>>) -> Result<()> {
        for worker in workers {
            self.register_worker(worker)?;
        }
        Ok(())
    }

    /// Look up a registered saga by id.
    pub fn get_saga(&self, saga_id: &str) -> Option<Saga> {
        self.dispatcher.get_saga(saga_id)
    }

    /// Look up a registered worker by name.
    pub fn get_worker(&self, name: &str) -> Option<Arc<dyn Worker>> {
        self.workers.read().expect("worker registry lock poisoned").get(name).cloned()
    }

    /// Stop the dispatcher's tick loop. Already-dispatched workers keep
    /// running; `Queued` steps remain `Queued` until `start()`.
    pub fn stop(&self) {
        self.dispatcher.stop();
    }

    /// (Re)start the dispatcher's tick loop.
    pub fn start(&self) {
        self.dispatcher.start();
    }

    /// Run one dispatcher tick immediately, ignoring its schedule.
    /// Mainly useful for tests and for hosts driving the dispatcher
    /// deterministically instead of on a timer.
    pub async fn tick_now(&self) {
        self.dispatcher.tick().await;
    }

    /// Enumerate persisted sagas, re-register every one not already in a
    /// terminal status with the dispatcher, and return the restored
    /// handles. Workers must be re-registered by the host before their
    /// steps can progress.
    #[tracing::instrument(skip(self))]
    pub async fn restore_previous_state(&self) -> Result<Vec<Saga>> {
        let ids = self.saga_records.get_ids(SAGA_TABLE).await?;
        let records = self.saga_records.get_multiple(SAGA_TABLE, &ids).await?;

        let mut restored = Vec::new();
        for (id, record) in ids.into_iter().zip(records) {
            let Some(record) = record else { continue };
            if record.status == SagaStatus::Finished || record.status == SagaStatus::Failed {
                continue;
            }
            let saga = Saga::from_parts(self.saga_records.clone(), self.step_records.clone(), id);
            self.dispatcher.register_saga(saga.clone());
            restored.push(saga);
        }
        Ok(restored)
    }
}
