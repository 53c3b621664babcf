// Copyright 2025 Cowboy AI, LLC.

//! The step entity: its persisted record and the state machine that
//! governs its transitions (§4.3).
//!
//! ```text
//! Uninitialized ──create──▶ Created
//! Created ──enqueue──▶ Queued                       (Saga.tick)
//! Created ──(as compensator)──▶ WaitingForCompensation
//! WaitingForCompensation ──enqueue──▶ Queued        (Step.rollback of parent)
//! Queued ──dispatch──▶ Running                      (Dispatcher)
//! Running ──finished(result)──▶ Finished            (Saga.stepFinished)
//! Running ──fail──▶ Failed                          (Saga.stepFailed, dispatcher)
//! Finished ──rollback──▶ RolledBack                 (Saga.stepFailed cascade)
//! ```

use serde::{Deserialize, Serialize};

use crate::error::{OrchestratorError, Result};
use crate::record::RecordStore;

/// Status of a [`StepRecord`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StepStatus {
    /// Not yet persisted.
    Uninitialized,
    /// Persisted, waiting on its dependencies (if any).
    Created,
    /// A compensator step, persisted but held until its target rolls
    /// back.
    WaitingForCompensation,
    /// Dependencies satisfied, waiting for a dispatcher slot.
    Queued,
    /// Claimed by the dispatcher and handed to a worker.
    Running,
    /// The worker reported success.
    Finished,
    /// The worker reported failure, or the dispatcher could not resolve
    /// the worker. Terminal.
    Failed,
    /// Undone as part of a saga's compensation cascade. Terminal.
    RolledBack,
}

impl StepStatus {
    /// Whether a step's dependency in this status counts as "satisfied"
    /// for the purposes of `enqueue` (§4.3) and saga readiness (§4.4).
    pub fn satisfies_dependency(self) -> bool {
        matches!(self, StepStatus::Finished | StepStatus::RolledBack)
    }
}

/// The persisted shape of a step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepRecord {
    /// Id, unique within the owning saga. Empty until the first
    /// `create` round-trip assigns it.
    #[serde(default)]
    pub id: String,
    /// Name of the worker that will execute this step.
    pub worker_name: String,
    /// Fixed arguments supplied at creation.
    pub args: Vec<serde_json::Value>,
    /// Ids of steps in the same saga this step depends on, in
    /// declaration order.
    #[serde(default)]
    pub depends_on: Vec<String>,
    /// Current state-machine status.
    pub status: StepStatus,
    /// Id of the step acting as this step's compensator, if any.
    #[serde(default)]
    pub compensator_id: Option<String>,
    /// Result produced by the worker on success.
    #[serde(default)]
    pub result: Option<serde_json::Value>,
    /// Results of `depends_on` steps, positionally aligned, captured at
    /// the moment this step was enqueued.
    #[serde(default)]
    pub dependency_args: Vec<serde_json::Value>,
}

/// A handle to one step's row in its saga's step table.
///
/// Cheap to clone: it's a table name and an id over a shared
/// [`RecordStore`].
#[derive(Clone)]
pub struct Step {
    records: RecordStore<StepRecord>,
    table: String,
    /// The step's id within its saga.
    pub id: String,
}

impl Step {
    pub(crate) fn new(records: RecordStore<StepRecord>, table: String, id: String) -> Self {
        Self { records, table, id }
    }

    /// Fetch the current persisted record.
    pub async fn record(&self) -> Result<StepRecord> {
        self.records
            .get(&self.table, &self.id)
            .await?
            .ok_or_else(|| OrchestratorError::NotFound {
                entity: "step",
                id: self.id.clone(),
                saga_id: self.table.clone(),
            })
    }

    /// Create a new step record under `table`, owned by the caller's
    /// saga. `status` is `Created` for an ordinary step or
    /// `WaitingForCompensation` for a compensator.
    pub(crate) async fn create_from_saga(
        records: RecordStore<StepRecord>,
        table: String,
        worker_name: String,
        args: Vec<serde_json::Value>,
        depends_on: Vec<String>,
        status: StepStatus,
    ) -> Result<Step> {
        let record = StepRecord {
            id: String::new(),
            worker_name,
            args,
            depends_on,
            status,
            compensator_id: None,
            result: None,
            dependency_args: Vec::new(),
        };
        let stored = records.create(&table, record).await?;
        Ok(Step::new(records, table, stored.id))
    }

    /// Create a new step that compensates this one: `depends_on =
    /// [self.id]`, initial status `WaitingForCompensation`. Patches this
    /// step's `compensator_id` to point at it.
    pub async fn attach_compensator(
        &self,
        worker_name: impl Into<String>,
        args: Vec<serde_json::Value>,
    ) -> Result<Step> {
        let current = self.record().await?;
        if current.id.is_empty() {
            return Err(OrchestratorError::UninitializedEntity(
                "attach_compensator called on a step with no id".into(),
            ));
        }

        let compensator = Step::create_from_saga(
            self.records.clone(),
            self.table.clone(),
            worker_name.into(),
            args,
            vec![current.id.clone()],
            StepStatus::WaitingForCompensation,
        )
        .await?;

        self.records
            .update(
                &self.table,
                &self.id,
                serde_json::json!({ "compensator_id": compensator.id }),
            )
            .await?;

        Ok(compensator)
    }

    /// Promote this step to `Queued`, collecting its dependencies'
    /// results into `dependency_args` in declaration order.
    ///
    /// Fails with [`OrchestratorError::InvariantViolation`] if any
    /// dependency is not yet `Finished` or `RolledBack` — the saga's
    /// `tick` is expected to only call this on ready steps.
    pub async fn enqueue(&self) -> Result<StepRecord> {
        let current = self.record().await?;

        let dep_records = self
            .records
            .get_multiple(&self.table, &current.depends_on)
            .await?;

        let mut dependency_args = Vec::with_capacity(current.depends_on.len());
        for (dep_id, dep) in current.depends_on.iter().zip(dep_records) {
            let dep = dep.ok_or_else(|| OrchestratorError::NotFound {
                entity: "step",
                id: dep_id.clone(),
                saga_id: self.table.clone(),
            })?;
            if !dep.status.satisfies_dependency() {
                return Err(OrchestratorError::InvariantViolation(format!(
                    "step {} cannot enqueue: dependency {} is {:?}, not Finished/RolledBack",
                    current.id, dep_id, dep.status
                )));
            }
            dependency_args.push(dep.result.clone().unwrap_or(serde_json::Value::Null));
        }

        self.records
            .update(
                &self.table,
                &self.id,
                serde_json::json!({
                    "status": StepStatus::Queued,
                    "dependency_args": dependency_args,
                }),
            )
            .await
    }

    /// Record the worker's successful result and transition to
    /// `Finished`.
    pub async fn finished(&self, result: Option<serde_json::Value>) -> Result<StepRecord> {
        let mut patch = serde_json::json!({ "status": StepStatus::Finished });
        if let Some(result) = result {
            patch["result"] = result;
        }
        self.records.update(&self.table, &self.id, patch).await
    }

    /// Transition a `Queued` step to `Running`. Called by the dispatcher
    /// immediately before handing the step to its worker (§4.5); not
    /// part of the state machine driven by the saga itself.
    pub(crate) async fn records_update_running(&self) -> Result<StepRecord> {
        self.records
            .update(
                &self.table,
                &self.id,
                serde_json::json!({ "status": StepStatus::Running }),
            )
            .await
    }

    /// Transition to `Failed`.
    pub async fn fail(&self) -> Result<StepRecord> {
        self.records
            .update(
                &self.table,
                &self.id,
                serde_json::json!({ "status": StepStatus::Failed }),
            )
            .await
    }

    /// Transition to `RolledBack`. If a compensator is attached, enqueue
    /// it — its sole dependency (this step) is now `RolledBack`, which
    /// satisfies its `enqueue` precondition.
    pub async fn rollback(&self) -> Result<StepRecord> {
        let updated = self
            .records
            .update(
                &self.table,
                &self.id,
                serde_json::json!({ "status": StepStatus::RolledBack }),
            )
            .await?;

        if let Some(compensator_id) = &updated.compensator_id {
            let compensator = Step::new(self.records.clone(), self.table.clone(), compensator_id.clone());
            compensator.enqueue().await?;
        }

        Ok(updated)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::memory::InMemoryStore;
    use pretty_assertions::assert_eq;
    use std::sync::Arc;
    use test_case::test_case;

    fn steps_for(saga_id: &str) -> (RecordStore<StepRecord>, String) {
        let records = RecordStore::new(Arc::new(InMemoryStore::new()), "ns");
        (records, format!("saga_step_{saga_id}"))
    }

    #[test_case(StepStatus::Uninitialized => false)]
    #[test_case(StepStatus::Created => false)]
    #[test_case(StepStatus::WaitingForCompensation => false)]
    #[test_case(StepStatus::Queued => false)]
    #[test_case(StepStatus::Running => false)]
    #[test_case(StepStatus::Finished => true)]
    #[test_case(StepStatus::Failed => false)]
    #[test_case(StepStatus::RolledBack => true)]
    fn satisfies_dependency_matches_the_state_table(status: StepStatus) -> bool {
        status.satisfies_dependency()
    }

    #[tokio::test]
    async fn enqueue_with_no_dependencies_succeeds_immediately() {
        let (records, table) = steps_for("s1");
        let step = Step::create_from_saga(
            records,
            table,
            "W".into(),
            vec![serde_json::json!("x")],
            vec![],
            StepStatus::Created,
        )
        .await
        .unwrap();

        let enqueued = step.enqueue().await.unwrap();
        assert_eq!(enqueued.status, StepStatus::Queued);
        assert!(enqueued.dependency_args.is_empty());
    }

    #[tokio::test]
    async fn enqueue_rejects_unsatisfied_dependency() {
        let (records, table) = steps_for("s1");
        let parent = Step::create_from_saga(
            records.clone(),
            table.clone(),
            "W".into(),
            vec![],
            vec![],
            StepStatus::Created,
        )
        .await
        .unwrap();
        let child = Step::create_from_saga(
            records,
            table,
            "W".into(),
            vec![],
            vec![parent.id.clone()],
            StepStatus::Created,
        )
        .await
        .unwrap();

        let err = child.enqueue().await.unwrap_err();
        assert!(matches!(err, OrchestratorError::InvariantViolation(_)));
    }

    #[tokio::test]
    async fn enqueue_collects_dependency_results_in_order() {
        let (records, table) = steps_for("s1");
        let dep1 = Step::create_from_saga(
            records.clone(),
            table.clone(),
            "W".into(),
            vec![],
            vec![],
            StepStatus::Created,
        )
        .await
        .unwrap();
        let dep2 = Step::create_from_saga(
            records.clone(),
            table.clone(),
            "W".into(),
            vec![],
            vec![],
            StepStatus::Created,
        )
        .await
        .unwrap();
        dep1.finished(Some(serde_json::json!({"a": 1}))).await.unwrap();
        dep2.finished(Some(serde_json::json!({"b": 2}))).await.unwrap();

        let child = Step::create_from_saga(
            records,
            table,
            "W".into(),
            vec![],
            vec![dep1.id.clone(), dep2.id.clone()],
            StepStatus::Created,
        )
        .await
        .unwrap();

        let enqueued = child.enqueue().await.unwrap();
        assert_eq!(
            enqueued.dependency_args,
            vec![serde_json::json!({"a": 1}), serde_json::json!({"b": 2})]
        );
    }

    #[tokio::test]
    async fn rollback_enqueues_attached_compensator_with_parent_result() {
        let (records, table) = steps_for("s1");
        let parent = Step::create_from_saga(
            records.clone(),
            table.clone(),
            "Create".into(),
            vec![],
            vec![],
            StepStatus::Created,
        )
        .await
        .unwrap();
        parent.finished(Some(serde_json::json!({"id": 42}))).await.unwrap();

        let compensator = parent.attach_compensator("Destroy", vec![]).await.unwrap();

        parent.rollback().await.unwrap();

        let compensator_record = compensator.record().await.unwrap();
        assert_eq!(compensator_record.status, StepStatus::Queued);
        assert_eq!(
            compensator_record.dependency_args,
            vec![serde_json::json!({"id": 42})]
        );
    }
}
