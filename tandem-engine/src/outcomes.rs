//! Result types returned by the engine's composite operations

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};
use tandem_assumptions::AssumptionInvalidation;
use tandem_core::{
    AgentId, ArtifactRef, Assumption, Conflict, Contract, ConvergenceSession, DependencyEdge,
    Timestamp,
};

/// What a change to an artifact would touch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChangeImpact {
    pub artifact: ArtifactRef,
    pub change_description: String,
    pub downstream_dependencies: Vec<DependencyEdge>,
    /// Subset of the downstream edges marked blocking
    pub blocking_dependencies: Vec<DependencyEdge>,
    /// Active assumptions about the artifact
    pub affected_assumptions: Vec<Assumption>,
    /// Agent-typed downstream targets plus assumption authors
    pub affected_agents: BTreeSet<AgentId>,
}

impl ChangeImpact {
    pub fn is_empty(&self) -> bool {
        self.downstream_dependencies.is_empty() && self.affected_assumptions.is_empty()
    }
}

/// A new contract draft plus the breach it caused, if any.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContractEvolutionOutcome {
    pub contract: Contract,
    pub conflict: Option<Conflict>,
}

/// An invalidated assumption plus the conflict raised for its dependents.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssumptionInvalidationOutcome {
    pub invalidation: AssumptionInvalidation,
    pub conflict: Option<Conflict>,
}

/// Every aggregate held by the engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineSnapshot {
    pub taken_at: Timestamp,
    pub edges: Vec<DependencyEdge>,
    pub contracts: Vec<Contract>,
    pub assumptions: Vec<Assumption>,
    pub conflicts: Vec<Conflict>,
    pub sessions: Vec<ConvergenceSession>,
}

impl EngineSnapshot {
    pub fn to_json(&self) -> serde_json::Result<serde_json::Value> {
        serde_json::to_value(self)
    }
}
