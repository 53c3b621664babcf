//! Property-based coverage of the DAG-readiness invariants from the
//! design's testable-properties section: a linear chain of arbitrary
//! depth converges to `Finished` one step at a time, in order, with no
//! step ever promoted ahead of an unfinished dependency.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use proptest::prelude::*;
use sagaflow::config::{DispatcherOptions, OrchestratorOptions};
use sagaflow::orchestrator::Orchestrator;
use sagaflow::saga::{Saga, SagaStatus};
use sagaflow::step::StepStatus;
use sagaflow::store::memory::InMemoryStore;
use sagaflow::worker::Worker;
use tokio::sync::mpsc::{unbounded_channel, UnboundedSender};

struct Dispatched {
    step_id: String,
    saga: Saga,
}

struct ChannelWorker {
    tx: UnboundedSender<Dispatched>,
}

#[async_trait]
impl Worker for ChannelWorker {
    fn name(&self) -> &str {
        "W"
    }

    async fn run(
        &self,
        _args: Vec<serde_json::Value>,
        _dependency_args: Vec<serde_json::Value>,
        saga: Saga,
        step_id: String,
    ) {
        let _ = self.tx.send(Dispatched { step_id, saga });
    }
}

/// Build a depth-`n` linear chain (each step depends on the previous
/// one) and drive it to completion one tick/finish pair at a time,
/// recording the chain's step ids in declaration order alongside the
/// saga's final status.
async fn run_chain(depth: usize) -> (Vec<String>, SagaStatus) {
    let store = Arc::new(InMemoryStore::new());
    let orchestrator = Orchestrator::new(
        store,
        OrchestratorOptions::new("dag-prop"),
        DispatcherOptions::default().with_interval(Duration::from_secs(3600)),
    );
    orchestrator.stop();

    let (tx, mut rx) = unbounded_channel();
    orchestrator.register_worker(Arc::new(ChannelWorker { tx })).unwrap();

    let saga = orchestrator.create_saga().await.unwrap();
    let mut chain = Vec::with_capacity(depth);
    let mut prev: Option<String> = None;
    for _ in 0..depth {
        let depends_on = prev.clone().into_iter().collect();
        let step = saga.add_step("W", vec![], depends_on).await.unwrap();
        prev = Some(step.id.clone());
        chain.push(step.id);
    }
    saga.start().await.unwrap();

    for expected_id in &chain {
        orchestrator.tick_now().await;
        let dispatched = rx.recv().await.expect("chain must progress one step at a time");
        assert_eq!(&dispatched.step_id, expected_id);

        // Every later step in the chain must still be unqueued while an
        // earlier one is outstanding (invariant 1, §8).
        let steps = saga.steps().await.unwrap();
        for id in chain.iter().skip_while(|id| *id != expected_id).skip(1) {
            let record = steps.iter().find(|s| &s.id == id).unwrap();
            assert_eq!(record.status, StepStatus::Created);
        }

        dispatched
            .saga
            .step_finished(&dispatched.step_id, Some(serde_json::json!(true)))
            .await
            .unwrap();
    }
    orchestrator.tick_now().await;

    let status = saga.record().await.unwrap().status;
    (chain, status)
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(16))]

    #[test]
    fn linear_chain_of_any_depth_converges_in_declaration_order(depth in 1usize..12) {
        let rt = tokio::runtime::Runtime::new().unwrap();
        let (chain, status) = rt.block_on(run_chain(depth));
        prop_assert_eq!(chain.len(), depth);
        prop_assert_eq!(status, SagaStatus::Finished);
    }
}
