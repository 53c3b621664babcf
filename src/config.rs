// Copyright 2025 Cowboy AI, LLC.

//! Option bags for the orchestrator façade and its dispatcher.

use std::time::Duration;

/// Options for the dispatcher's tick loop.
#[derive(Debug, Clone)]
pub struct DispatcherOptions {
    /// How often the dispatcher scans registered sagas for ready work.
    pub interval: Duration,
    /// Maximum number of steps in flight at once, across all sagas.
    pub capacity: usize,
    /// When a step's `worker_name` cannot be resolved, fail the saga via
    /// the compensation cascade rather than leaving the step `Queued`.
    pub fail_saga_on_unknown_worker: bool,
}

impl Default for DispatcherOptions {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(1),
            capacity: 25,
            fail_saga_on_unknown_worker: true,
        }
    }
}

impl DispatcherOptions {
    /// Set the tick interval.
    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    /// Set the process-wide in-flight capacity.
    pub fn with_capacity(mut self, capacity: usize) -> Self {
        self.capacity = capacity;
        self
    }

    /// Toggle the unknown-worker failure policy.
    pub fn with_fail_saga_on_unknown_worker(mut self, enabled: bool) -> Self {
        self.fail_saga_on_unknown_worker = enabled;
        self
    }
}

/// Options for the [`crate::orchestrator::Orchestrator`] façade.
#[derive(Debug, Clone, Default)]
pub struct OrchestratorOptions {
    /// Namespace prefixed onto every table name this orchestrator touches.
    pub namespace: String,
}

impl OrchestratorOptions {
    /// Create options for the given namespace.
    pub fn new(namespace: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
        }
    }
}
