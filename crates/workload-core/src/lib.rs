//! Lifecycle orchestration for interdependent workloads.
//!
//! [`Orchestrator`] turns "start X" or "stop everything" into a
//! dependency-safe sequence of desired-state writes against a control plane,
//! waits for each write to be observed, and gives up early on crash loops.
//! The control plane is reached only through the traits in [`store`];
//! [`memory::InMemoryControlPlane`] implements all of them for tests and
//! dry runs.

pub mod bulk;
pub mod config;
pub mod error;
pub mod graph;
pub mod io;
pub mod memory;
pub mod orchestrator;
pub mod restart;
pub mod retry;
pub mod store;
pub mod transition;
pub mod types;
pub mod waiter;

pub use config::OrchestratorConfig;
pub use error::{AggregateError, Op, OrchestratorError, Result, StoreError};
pub use graph::DependencyGraph;
pub use orchestrator::Orchestrator;
pub use store::ControlPlane;
pub use types::{DesiredState, WorkloadDescriptor};
pub use waiter::WaitOutcome;
