// Copyright 2025 Cowboy AI, LLC.

//! The saga entity: its persisted record, the DAG-readiness scheduling
//! algorithm (`tick`), and the compensation cascade (§4.4).

use std::collections::HashMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;

use crate::error::{OrchestratorError, Result};
use crate::record::RecordStore;
use crate::step::{Step, StepRecord, StepStatus};

const SAGA_TABLE: &str = "saga";

/// Status of a [`SagaRecord`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SagaStatus {
    /// Not yet persisted.
    Uninitialized,
    /// Persisted, no steps have been enqueued yet.
    Created,
    /// `start()` has been called; the scheduling loop is active.
    Running,
    /// Every non-compensator step reached `Finished`. Terminal.
    Finished,
    /// A step reported failure and the compensation cascade ran. Terminal.
    Failed,
}

impl SagaStatus {
    /// Whether this status is one the saga never leaves.
    pub fn is_terminal(self) -> bool {
        matches!(self, SagaStatus::Finished | SagaStatus::Failed)
    }
}

/// The persisted shape of a saga.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SagaRecord {
    /// Id, unique within the namespace. Empty until the first `create`
    /// round-trip assigns it.
    #[serde(default)]
    pub id: String,
    /// Current state-machine status.
    pub status: SagaStatus,
}

struct SagaInner {
    saga_records: RecordStore<SagaRecord>,
    step_records: RecordStore<StepRecord>,
    id: String,
    // Serializes `start`, `step_finished`, `step_failed` and `tick`
    // against each other so two concurrent completion notifications on
    // the same saga can't interleave their `dependencyArgs` computation
    // (§5, "Per-saga serialization").
    lock: Mutex<()>,
}

/// A handle to one persisted saga.
///
/// Cheap to clone (`Arc`-backed); this is the "saga handle" workers and
/// the orchestrator façade pass around.
#[derive(Clone)]
pub struct Saga {
    inner: Arc<SagaInner>,
}

impl Saga {
    /// Persist a new saga in `Created` status.
    pub(crate) async fn create(
        saga_records: RecordStore<SagaRecord>,
        step_records: RecordStore<StepRecord>,
    ) -> Result<Saga> {
        let record = SagaRecord {
            id: String::new(),
            status: SagaStatus::Created,
        };
        let stored = saga_records.create(SAGA_TABLE, record).await?;
        Ok(Self::from_parts(saga_records, step_records, stored.id))
    }

    /// Wrap an already-persisted saga id without creating a new record
    /// (used by `restore_previous_state`).
    pub(crate) fn from_parts(
        saga_records: RecordStore<SagaRecord>,
        step_records: RecordStore<StepRecord>,
        id: String,
    ) -> Saga {
        Saga {
            inner: Arc::new(SagaInner {
                saga_records,
                step_records,
                id,
                lock: Mutex::new(()),
            }),
        }
    }

    /// This saga's id.
    pub fn id(&self) -> &str {
        &self.inner.id
    }

    fn step_table(&self) -> String {
        format!("saga_step_{}", self.inner.id)
    }

    /// Fetch the current persisted saga record.
    pub async fn record(&self) -> Result<SagaRecord> {
        self.inner
            .saga_records
            .get(SAGA_TABLE, &self.inner.id)
            .await?
            .ok_or_else(|| OrchestratorError::NotFound {
                entity: "saga",
                id: self.inner.id.clone(),
                saga_id: String::new(),
            })
    }

    /// Current status, without acquiring the saga's mutation lock — safe
    /// to call from the dispatcher's read path on every tick.
    pub async fn status(&self) -> Result<SagaStatus> {
        Ok(self.record().await?.status)
    }

    async fn set_status(&self, status: SagaStatus) -> Result<()> {
        self.inner
            .saga_records
            .update(SAGA_TABLE, &self.inner.id, serde_json::json!({ "status": status }))
            .await?;
        Ok(())
    }

    /// All of this saga's step records, in unspecified order.
    pub async fn steps(&self) -> Result<Vec<StepRecord>> {
        Ok(self.all_steps().await?.into_iter().map(|(record, _)| record).collect())
    }

    async fn all_steps(&self) -> Result<Vec<(StepRecord, Step)>> {
        let table = self.step_table();
        let ids = self.inner.step_records.get_ids(&table).await?;
        let records = self.inner.step_records.get_multiple(&table, &ids).await?;

        let mut out = Vec::with_capacity(ids.len());
        for (id, record) in ids.into_iter().zip(records) {
            let record = record.ok_or_else(|| OrchestratorError::NotFound {
                entity: "step",
                id: id.clone(),
                saga_id: self.inner.id.clone(),
            })?;
            out.push((record, Step::new(self.inner.step_records.clone(), table.clone(), id)));
        }
        Ok(out)
    }

    fn step_handle(&self, step_id: &str) -> Step {
        Step::new(self.inner.step_records.clone(), self.step_table(), step_id.to_string())
    }

    /// Add a new step in `Created` status. `depends_on` must only name
    /// steps already added to this saga (acyclicity is enforced by
    /// construction, not checked here).
    #[tracing::instrument(skip(self, args, worker_name), fields(saga_id = %self.inner.id))]
    pub async fn add_step(
        &self,
        worker_name: impl Into<String>,
        args: Vec<serde_json::Value>,
        depends_on: Vec<String>,
    ) -> Result<Step> {
        Step::create_from_saga(
            self.inner.step_records.clone(),
            self.step_table(),
            worker_name.into(),
            args,
            depends_on,
            StepStatus::Created,
        )
        .await
    }

    /// Transition to `Running` and run the first `tick`.
    #[tracing::instrument(skip(self), fields(saga_id = %self.inner.id))]
    pub async fn start(&self) -> Result<()> {
        let _guard = self.inner.lock.lock().await;
        self.set_status(SagaStatus::Running).await?;
        self.tick_locked().await
    }

    /// Run the scheduling algorithm: promote every ready `Created` step
    /// to `Queued`, or transition to `Finished` if none remain. A no-op
    /// unless the saga is currently `Running`.
    pub async fn tick(&self) -> Result<()> {
        let _guard = self.inner.lock.lock().await;
        self.tick_locked().await
    }

    #[tracing::instrument(skip(self), fields(saga_id = %self.inner.id))]
    async fn tick_locked(&self) -> Result<()> {
        let saga = self.record().await?;
        if saga.status != SagaStatus::Running {
            return Ok(());
        }

        let steps = self.all_steps().await?;
        let status_by_id: HashMap<&str, StepStatus> =
            steps.iter().map(|(record, _)| (record.id.as_str(), record.status)).collect();

        let unqueued: Vec<&(StepRecord, Step)> =
            steps.iter().filter(|(record, _)| record.status == StepStatus::Created).collect();

        if unqueued.is_empty() {
            self.set_status(SagaStatus::Finished).await?;
            return Ok(());
        }

        let ready: Vec<&Step> = unqueued
            .iter()
            .filter(|(record, _)| {
                record
                    .depends_on
                    .iter()
                    .all(|dep_id| status_by_id.get(dep_id.as_str()) == Some(&StepStatus::Finished))
            })
            .map(|(_, step)| step)
            .collect();

        let results = futures::future::join_all(ready.iter().map(|step| step.enqueue())).await;
        for result in results {
            if let Err(err) = result {
                tracing::error!(saga_id = %self.inner.id, error = %err, "failed to enqueue ready step");
            }
        }
        Ok(())
    }

    /// Called by the dispatcher immediately before handing a `Queued`
    /// step to its worker: transitions the step's persisted status to
    /// `Running`.
    pub(crate) async fn dispatch_step(&self, step_id: &str) -> Result<StepRecord> {
        let _guard = self.inner.lock.lock().await;
        self.step_handle(step_id)
            .records_update_running()
            .await
    }

    /// Record a worker's success. `result`, if present, must be
    /// JSON-encodable or this fails with [`OrchestratorError::Encoding`].
    #[tracing::instrument(skip(self, result), fields(saga_id = %self.inner.id, step_id = %step_id))]
    pub async fn step_finished<T: Serialize>(&self, step_id: &str, result: Option<T>) -> Result<()> {
        let _guard = self.inner.lock.lock().await;
        let result_value = match result {
            Some(value) => Some(serde_json::to_value(value)?),
            None => None,
        };
        self.step_handle(step_id).finished(result_value).await?;
        self.tick_locked().await
    }

    /// Fail `step_id`, transition the saga to `Failed`, and roll back
    /// every `Finished` step (which may enqueue attached compensators).
    /// Siblings that are `Queued`/`Running`, and compensators without a
    /// matching `Finished` parent, are left untouched — failure freezes
    /// the frontier rather than cancelling in-flight work (§4.4).
    #[tracing::instrument(skip(self), fields(saga_id = %self.inner.id, step_id = %step_id))]
    pub async fn step_failed(&self, step_id: &str) -> Result<()> {
        let _guard = self.inner.lock.lock().await;
        self.set_status(SagaStatus::Failed).await?;
        self.step_handle(step_id).fail().await?;

        let steps = self.all_steps().await?;
        let finished: Vec<&Step> = steps
            .iter()
            .filter(|(record, _)| record.status == StepStatus::Finished)
            .map(|(_, step)| step)
            .collect();

        let results = futures::future::join_all(finished.iter().map(|step| step.rollback())).await;
        for result in results {
            if let Err(err) = result {
                tracing::error!(saga_id = %self.inner.id, error = %err, "rollback failed during compensation cascade");
            }
        }
        Ok(())
    }
}
