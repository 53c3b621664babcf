// Copyright 2025 Cowboy AI, LLC.

//! The dispatcher (queue manager, §4.5): a non-reentrant periodic tick
//! that promotes `Queued` steps into a process-wide bounded set of
//! in-flight slots and hands them to their worker.

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, RwLock};

use tokio::sync::Notify;
use tokio::task::JoinHandle;

use crate::config::DispatcherOptions;
use crate::saga::Saga;
use crate::step::StepRecord;
use crate::step::StepStatus;
use crate::worker::WorkerRegistry;

struct DispatcherInner {
    options: DispatcherOptions,
    sagas: RwLock<std::collections::HashMap<String, Saga>>,
    workers: WorkerRegistry,
    // (saga_id, step_id) pairs currently claimed against `capacity`.
    in_flight: Mutex<HashSet<(String, String)>>,
    ticking: AtomicBool,
    notify: Notify,
    task: Mutex<Option<JoinHandle<()>>>,
}

/// The dispatcher. Cheap to clone — every clone shares the same
/// registries and in-flight bookkeeping.
#[derive(Clone)]
pub struct Dispatcher {
    inner: Arc<DispatcherInner>,
}

/// Clears the non-reentrance flag on drop, whether `tick` ran to
/// completion or was cancelled partway through (e.g. the tick task's
/// `JoinHandle` being aborted while suspended on an `.await`).
struct TickGuard<'a> {
    ticking: &'a AtomicBool,
}

impl Drop for TickGuard<'_> {
    fn drop(&mut self) {
        self.ticking.store(false, Ordering::SeqCst);
    }
}

impl Dispatcher {
    /// Build a dispatcher sharing `workers` with whatever façade
    /// populates it. The tick loop is not started until [`Dispatcher::start`].
    pub fn new(options: DispatcherOptions, workers: WorkerRegistry) -> Self {
        Self {
            inner: Arc::new(DispatcherInner {
                options,
                sagas: RwLock::new(std::collections::HashMap::new()),
                workers,
                in_flight: Mutex::new(HashSet::new()),
                ticking: AtomicBool::new(false),
                notify: Notify::new(),
                task: Mutex::new(None),
            }),
        }
    }

    /// Register a saga so future ticks scan its steps.
    pub fn register_saga(&self, saga: Saga) {
        self.inner
            .sagas
            .write()
            .expect("saga registry lock poisoned")
            .insert(saga.id().to_string(), saga);
        self.wake();
    }

    /// Remove a saga from the registry (called once it reaches a
    /// terminal status and has no in-flight steps left).
    pub fn deregister_saga(&self, saga_id: &str) {
        self.inner
            .sagas
            .write()
            .expect("saga registry lock poisoned")
            .remove(saga_id);
    }

    /// Look up a registered saga by id.
    pub fn get_saga(&self, saga_id: &str) -> Option<Saga> {
        self.inner
            .sagas
            .read()
            .expect("saga registry lock poisoned")
            .get(saga_id)
            .cloned()
    }

    /// Number of steps currently claimed against the capacity bound.
    /// Exposed for tests asserting invariant 2 of §8.
    pub fn in_flight_count(&self) -> usize {
        self.inner.in_flight.lock().expect("in-flight lock poisoned").len()
    }

    /// Start the periodic tick loop as a background task. A no-op if
    /// already started.
    pub fn start(&self) {
        let mut task = self.inner.task.lock().expect("task lock poisoned");
        if task.is_some() {
            return;
        }
        let dispatcher = self.clone();
        let interval = self.inner.options.interval;
        *task = Some(tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            loop {
                tokio::select! {
                    _ = ticker.tick() => {}
                    _ = dispatcher.inner.notify.notified() => {}
                }
                dispatcher.tick().await;
            }
        }));
    }

    /// Stop the tick loop. Already-spawned worker tasks are not
    /// cancelled; `Queued` steps remain `Queued` across a stop/start
    /// cycle (§5).
    pub fn stop(&self) {
        if let Some(handle) = self.inner.task.lock().expect("task lock poisoned").take() {
            handle.abort();
        }
    }

    /// Wake the loop early without skipping its next scheduled tick —
    /// this is a pure latency optimization over the polling backstop
    /// (§9). Called by [`Dispatcher::register_saga`] so a freshly
    /// created saga's first tick doesn't wait out the interval; public
    /// so a host could call it after its own same-process completion
    /// notifications too, though `Saga` itself holds no dispatcher
    /// handle and does not call it from `step_finished`/`step_failed`.
    pub fn wake(&self) {
        self.inner.notify.notify_one();
    }

    /// Run one tick now, ignoring the schedule. Exposed for tests; the
    /// background loop calls this internally.
    #[tracing::instrument(skip(self))]
    pub async fn tick(&self) {
        if self
            .inner
            .ticking
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return;
        }
        // Cleared on drop, not just on the happy path, so a tick
        // cancelled mid-`.await` (e.g. `stop()` aborting the loop task
        // while this future is suspended in `join_all` below) still
        // releases the flag instead of wedging the dispatcher forever.
        let _guard = TickGuard { ticking: &self.inner.ticking };

        let sagas: Vec<Saga> = self
            .inner
            .sagas
            .read()
            .expect("saga registry lock poisoned")
            .values()
            .cloned()
            .collect();

        futures::future::join_all(sagas.into_iter().map(|saga| self.tick_saga(saga))).await;
    }

    async fn tick_saga(&self, saga: Saga) {
        let status = match saga.status().await {
            Ok(status) => status,
            Err(err) => {
                tracing::error!(saga_id = %saga.id(), error = %err, "failed to read saga status");
                return;
            }
        };

        let steps = match saga.steps().await {
            Ok(steps) => steps,
            Err(err) => {
                tracing::error!(saga_id = %saga.id(), error = %err, "failed to load saga steps");
                return;
            }
        };

        for step in steps {
            self.tick_step(&saga, step).await;
        }

        if status.is_terminal() && !self.has_in_flight(saga.id()) {
            self.deregister_saga(saga.id());
        }
    }

    async fn tick_step(&self, saga: &Saga, step: StepRecord) {
        let key = (saga.id().to_string(), step.id.clone());
        let was_in_flight = self.inner.in_flight.lock().expect("in-flight lock poisoned").contains(&key);

        if was_in_flight {
            if step.status != StepStatus::Running {
                self.inner.in_flight.lock().expect("in-flight lock poisoned").remove(&key);
            }
            return;
        }

        if step.status != StepStatus::Queued {
            return;
        }

        {
            let mut in_flight = self.inner.in_flight.lock().expect("in-flight lock poisoned");
            if in_flight.len() >= self.inner.options.capacity {
                return;
            }
            in_flight.insert(key.clone());
        }

        self.dispatch(saga, step).await;
    }

    fn has_in_flight(&self, saga_id: &str) -> bool {
        self.inner
            .in_flight
            .lock()
            .expect("in-flight lock poisoned")
            .iter()
            .any(|(sid, _)| sid == saga_id)
    }

    fn release_slot(&self, saga_id: &str, step_id: &str) {
        self.inner
            .in_flight
            .lock()
            .expect("in-flight lock poisoned")
            .remove(&(saga_id.to_string(), step_id.to_string()));
    }

    #[tracing::instrument(skip(self, saga, step), fields(saga_id = %saga.id(), step_id = %step.id, worker_name = %step.worker_name))]
    async fn dispatch(&self, saga: &Saga, step: StepRecord) {
        let worker = self
            .inner
            .workers
            .read()
            .expect("worker registry lock poisoned")
            .get(&step.worker_name)
            .cloned();

        let Some(worker) = worker else {
            if self.inner.options.fail_saga_on_unknown_worker {
                if let Err(err) = saga.step_failed(&step.id).await {
                    tracing::error!(error = %err, "failed to fail saga for unknown worker");
                }
            } else {
                tracing::warn!(worker_name = %step.worker_name, "unknown worker; leaving step Queued");
            }
            self.release_slot(saga.id(), &step.id);
            return;
        };

        if let Err(err) = saga.dispatch_step(&step.id).await {
            tracing::error!(error = %err, "failed to transition step to Running");
            self.release_slot(saga.id(), &step.id);
            return;
        }

        let saga_for_worker = saga.clone();
        let step_id = step.id.clone();
        let args = step.args.clone();
        let dependency_args = step.dependency_args.clone();

        let handle = tokio::spawn(async move {
            worker.run(args, dependency_args, saga_for_worker, step_id).await;
        });

        tokio::spawn(async move {
            if let Err(err) = handle.await {
                tracing::error!(error = %err, "worker task panicked or was cancelled");
            }
        });
    }
}
