//! Tandem Engine - Parallel Work Coordination
//!
//! Composes the dependency graph, contract registry, assumption tracker,
//! conflict detector and convergence coordinator behind one
//! `ParallelWorkflowEngine`. Orchestrators start parallel work streams
//! through it, feed contract and artifact changes back in, and batch the
//! resulting conflicts into convergence sessions.
//!
//! ```no_run
//! use std::sync::Arc;
//! use tandem_engine::{MockTaskStore, ParallelWorkflowEngine, TandemConfig};
//!
//! let engine = ParallelWorkflowEngine::new(
//!     TandemConfig::default(),
//!     Arc::new(MockTaskStore::new()),
//! )?;
//! let metrics = engine.get_parallel_execution_metrics("team-a");
//! assert!(metrics.rework_efficiency.is_none());
//! # Ok::<(), tandem_engine::TandemError>(())
//! ```

mod engine;
mod outcomes;
mod streams;
pub mod telemetry;

pub use engine::ParallelWorkflowEngine;
pub use outcomes::{
    AssumptionInvalidationOutcome, ChangeImpact, ContractEvolutionOutcome, EngineSnapshot,
};
pub use streams::{Mvd, StartedStream, WorkStreamManifest, WorkStreamSpec};

pub use tandem_assumptions::{extract_asserted_fields, AssumptionInvalidation};
pub use tandem_conflicts::{ConvergenceCoordinator, ParallelExecutionMetrics};
pub use tandem_core::*;
pub use tandem_storage::{MemberState, MockTaskStore, NewTask, TaskStatus, TaskStore, TeamMember};
