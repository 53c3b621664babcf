use std::sync::Arc;

use async_trait::async_trait;
use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion};
use sagaflow::config::{DispatcherOptions, OrchestratorOptions};
use sagaflow::orchestrator::Orchestrator;
use sagaflow::saga::Saga;
use sagaflow::store::memory::InMemoryStore;
use sagaflow::worker::Worker;
use tokio::runtime::Runtime;

struct Immediate;

#[async_trait]
impl Worker for Immediate {
    fn name(&self) -> &str {
        "immediate"
    }

    async fn run(
        &self,
        _args: Vec<serde_json::Value>,
        _dependency_args: Vec<serde_json::Value>,
        saga: Saga,
        step_id: String,
    ) {
        let _ = saga
            .step_finished(&step_id, Some(serde_json::json!({"ok": true})))
            .await;
    }
}

fn setup_runtime() -> Runtime {
    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .unwrap()
}

fn bench_fan_out_saga(c: &mut Criterion) {
    let rt = setup_runtime();
    let mut group = c.benchmark_group("saga_fan_out");

    for width in [1usize, 10, 50] {
        group.bench_with_input(BenchmarkId::from_parameter(width), &width, |b, &width| {
            b.to_async(&rt).iter(|| async move {
                let store = Arc::new(InMemoryStore::new());
                let orchestrator = Orchestrator::new(
                    store,
                    OrchestratorOptions::new("bench"),
                    DispatcherOptions::default().with_interval(std::time::Duration::from_millis(5)),
                );
                orchestrator.register_worker(Arc::new(Immediate)).unwrap();

                let saga = orchestrator.create_saga().await.unwrap();
                for i in 0..width {
                    saga.add_step("immediate", vec![serde_json::json!(i)], vec![])
                        .await
                        .unwrap();
                }
                saga.start().await.unwrap();

                // Settle quickly-completing steps without a real sleep loop.
                for _ in 0..5 {
                    tokio::time::sleep(std::time::Duration::from_millis(10)).await;
                    if matches!(
                        saga.record().await.unwrap().status,
                        sagaflow::saga::SagaStatus::Finished
                    ) {
                        break;
                    }
                }
            });
        });
    }

    group.finish();
}

criterion_group!(benches, bench_fan_out_saga);
criterion_main!(benches);
