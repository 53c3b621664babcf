// Copyright (c) 2025 - Cowboy AI, LLC.

//! # sagaflow
//!
//! A distributed-workflow orchestrator for **sagas**: long-running
//! business transactions composed of a DAG of steps, each executed by a
//! named worker, with optional per-step compensators that undo a step's
//! effect on failure.
//!
//! The crate persists every saga and step to an external key/value
//! [`store::Store`] so progress survives process restarts, and drives
//! execution with a periodic [`dispatcher::Dispatcher`] tick that
//! advances the saga/step state machines and dispatches ready steps to
//! a bounded local worker pool.
//!
//! ## Building blocks
//! - [`store`]: the namespaced key/value contract, plus an in-memory
//!   reference driver and an optional NATS JetStream KV driver (feature
//!   `nats`)
//! - [`record`]: per-table monotonic id allocation and typed
//!   create/update/get over a `Store`
//! - [`step`]: the step state machine ([`step::StepStatus`]) and its
//!   persisted transitions
//! - [`saga`]: the saga state machine ([`saga::SagaStatus`]), the DAG
//!   readiness algorithm, and the compensation cascade
//! - [`worker`]: the worker contract and its process-local registry
//! - [`dispatcher`]: the non-reentrant tick loop and bounded in-flight
//!   dispatch
//! - [`orchestrator`]: the public façade tying the above together
//!
//! ## Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use async_trait::async_trait;
//! use sagaflow::{
//!     config::{DispatcherOptions, OrchestratorOptions},
//!     orchestrator::Orchestrator,
//!     saga::Saga,
//!     store::memory::InMemoryStore,
//!     worker::Worker,
//! };
//!
//! struct Echo;
//!
//! #[async_trait]
//! impl Worker for Echo {
//!     fn name(&self) -> &str {
//!         "echo"
//!     }
//!
//!     async fn run(
//!         &self,
//!         args: Vec<serde_json::Value>,
//!         _dependency_args: Vec<serde_json::Value>,
//!         saga: Saga,
//!         step_id: String,
//!     ) {
//!         let _ = saga.step_finished(&step_id, args.into_iter().next()).await;
//!     }
//! }
//!
//! # #[tokio::main]
//! # async fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let store = Arc::new(InMemoryStore::new());
//! let orchestrator = Orchestrator::new(
//!     store,
//!     OrchestratorOptions::new("demo"),
//!     DispatcherOptions::default(),
//! );
//! orchestrator.register_worker(Arc::new(Echo))?;
//!
//! let saga = orchestrator.create_saga().await?;
//! saga.add_step("echo", vec![serde_json::json!("hi")], vec![]).await?;
//! saga.start().await?;
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]

pub mod config;
pub mod dispatcher;
pub mod error;
pub mod orchestrator;
pub mod record;
pub mod saga;
pub mod step;
pub mod store;
pub mod worker;

pub use error::{OrchestratorError, Result};
pub use orchestrator::Orchestrator;
pub use saga::Saga;
pub use step::Step;
pub use worker::Worker;
