//! Entity records and operation inputs
//!
//! Every aggregate is a flat, serde-serializable record. Mutation happens
//! only through the owning component; callers receive clones.

use crate::{
    require_field, require_hours, AgentId, ArtifactType, AssumptionCategory, AssumptionStatus,
    ConflictType, ContractStatus, ContractType, ContractVersion, DependencyType, EntityId,
    SessionStatus, Severity, TeamId, Timestamp, TriggerType, ValidationError,
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

// ============================================================================
// ARTIFACT REFERENCES
// ============================================================================

/// Reference to an artifact by type and caller-supplied id.
/// Displays and parses as `type:id`, e.g. `task:optimize_dashboard`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ArtifactRef {
    pub artifact_type: ArtifactType,
    pub artifact_id: String,
}

impl ArtifactRef {
    pub fn new(artifact_type: ArtifactType, artifact_id: impl Into<String>) -> Self {
        Self {
            artifact_type,
            artifact_id: artifact_id.into(),
        }
    }

    /// Reference to a contract lineage. Lineages are team-scoped, so the
    /// id is `<team>/<name>`.
    pub fn contract(team_id: &str, name: &str) -> Self {
        Self::new(ArtifactType::Contract, format!("{}/{}", team_id, name))
    }

    pub fn agent(agent_id: impl Into<String>) -> Self {
        Self::new(ArtifactType::Agent, agent_id)
    }

    pub fn task(task_id: impl Into<String>) -> Self {
        Self::new(ArtifactType::Task, task_id)
    }

    pub fn assumption(assumption_id: EntityId) -> Self {
        Self::new(ArtifactType::Assumption, assumption_id.to_string())
    }

    /// Parse a `type:id` reference.
    pub fn parse(input: &str) -> Result<Self, ValidationError> {
        let invalid = || ValidationError::InvalidArtifactRef {
            value: input.to_string(),
        };
        let (kind, id) = input.split_once(':').ok_or_else(invalid)?;
        let artifact_type = ArtifactType::from_db_str(kind).map_err(|_| invalid())?;
        if id.trim().is_empty() {
            return Err(invalid());
        }
        Ok(Self::new(artifact_type, id))
    }

    /// Check the reference carries a usable id.
    pub fn validate(&self, field: &str) -> Result<(), ValidationError> {
        require_field(field, &self.artifact_id)
    }
}

impl fmt::Display for ArtifactRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.artifact_type, self.artifact_id)
    }
}

impl FromStr for ArtifactRef {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

/// Directed dependency between two artifacts. Immutable once created.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DependencyEdge {
    pub edge_id: EntityId,
    pub source: ArtifactRef,
    pub target: ArtifactRef,
    pub dependency_type: DependencyType,
    /// Target work halts while a blocking conflict involves the source
    pub is_blocking: bool,
    pub created_at: Timestamp,
}

// ============================================================================
// CONTRACTS
// ============================================================================

/// Versioned, named interface agreement between agents.
/// At most one contract per `(team_id, name)` lineage is Active.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Contract {
    pub contract_id: EntityId,
    pub team_id: TeamId,
    pub name: String,
    pub version: ContractVersion,
    pub contract_type: ContractType,
    pub spec: serde_json::Value,
    pub status: ContractStatus,
    /// Caller-declared; never derived by diffing spec documents
    pub breaking_changes: bool,
    pub changes_from_previous: Vec<String>,
    /// Previous version in the lineage (points toward older versions)
    pub supersedes_contract_id: Option<EntityId>,
    pub owner_role: String,
    pub owner_agent: AgentId,
    pub consumers: BTreeSet<AgentId>,
    pub created_at: Timestamp,
    pub activated_at: Option<Timestamp>,
    pub activated_by: Option<AgentId>,
    pub deprecated_at: Option<Timestamp>,
}

impl Contract {
    /// Graph reference for this contract's lineage.
    pub fn artifact_ref(&self) -> ArtifactRef {
        ArtifactRef::contract(&self.team_id, &self.name)
    }

    pub fn is_active(&self) -> bool {
        self.status == ContractStatus::Active
    }
}

/// Input for creating a draft contract.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewContract {
    pub team_id: TeamId,
    pub name: String,
    pub version: ContractVersion,
    pub contract_type: ContractType,
    pub spec: serde_json::Value,
    pub owner_role: String,
    pub owner_agent: AgentId,
    #[serde(default)]
    pub consumers: BTreeSet<AgentId>,
}

impl NewContract {
    pub fn validate(&self) -> Result<(), ValidationError> {
        require_field("team_id", &self.team_id)?;
        require_field("name", &self.name)?;
        require_field("owner_agent", &self.owner_agent)?;
        for consumer in &self.consumers {
            require_field("consumers", consumer)?;
        }
        Ok(())
    }
}

/// Input for evolving the active contract of a lineage into a new draft.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContractEvolution {
    pub team_id: TeamId,
    pub name: String,
    pub new_version: ContractVersion,
    pub new_spec: serde_json::Value,
    #[serde(default)]
    pub changes_from_previous: Vec<String>,
    pub breaking_changes: bool,
    pub owner_agent: AgentId,
}

impl ContractEvolution {
    pub fn validate(&self) -> Result<(), ValidationError> {
        require_field("team_id", &self.team_id)?;
        require_field("name", &self.name)?;
        require_field("owner_agent", &self.owner_agent)
    }
}

// ============================================================================
// ASSUMPTIONS
// ============================================================================

/// Agent-declared belief about another artifact.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Assumption {
    pub assumption_id: EntityId,
    pub team_id: TeamId,
    pub made_by_agent: AgentId,
    pub made_by_role: String,
    pub text: String,
    pub category: AssumptionCategory,
    /// Artifact the assumption is about
    pub related_artifact: ArtifactRef,
    /// Artifacts built on top of the assumption
    pub dependent_artifacts: Vec<ArtifactRef>,
    /// Fields the assumption expects the related artifact to expose
    pub asserted_fields: BTreeSet<String>,
    pub status: AssumptionStatus,
    pub resolved_by: Option<AgentId>,
    pub resolution_notes: Option<String>,
    pub created_at: Timestamp,
    pub resolved_at: Option<Timestamp>,
}

impl Assumption {
    pub fn artifact_ref(&self) -> ArtifactRef {
        ArtifactRef::assumption(self.assumption_id)
    }

    pub fn is_active(&self) -> bool {
        self.status == AssumptionStatus::Active
    }
}

/// Input for tracking a new assumption.
///
/// When `asserted_fields` is empty the tracker extracts back-ticked
/// identifiers from `text` instead.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewAssumption {
    pub team_id: TeamId,
    pub made_by_agent: AgentId,
    pub made_by_role: String,
    pub text: String,
    pub category: AssumptionCategory,
    pub related_artifact: ArtifactRef,
    #[serde(default)]
    pub dependent_artifacts: Vec<ArtifactRef>,
    #[serde(default)]
    pub asserted_fields: BTreeSet<String>,
}

impl NewAssumption {
    pub fn validate(&self) -> Result<(), ValidationError> {
        require_field("team_id", &self.team_id)?;
        require_field("made_by_agent", &self.made_by_agent)?;
        require_field("text", &self.text)?;
        self.related_artifact.validate("related_artifact")?;
        for dependent in &self.dependent_artifacts {
            dependent.validate("dependent_artifacts")?;
        }
        Ok(())
    }
}

/// New state of a changed artifact, submitted for assumption checks.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArtifactSnapshot {
    pub artifact: ArtifactRef,
    pub content: serde_json::Value,
}

impl ArtifactSnapshot {
    pub fn new(artifact: ArtifactRef, content: serde_json::Value) -> Self {
        Self { artifact, content }
    }

    /// Top-level keys of `content` when it is an object, empty otherwise.
    pub fn field_set(&self) -> BTreeSet<String> {
        match &self.content {
            serde_json::Value::Object(map) => map.keys().cloned().collect(),
            _ => BTreeSet::new(),
        }
    }
}

// ============================================================================
// CONFLICTS
// ============================================================================

/// Detected divergence between agents' work.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Conflict {
    pub conflict_id: EntityId,
    pub team_id: TeamId,
    pub conflict_type: ConflictType,
    pub severity: Severity,
    pub description: String,
    pub artifacts_involved: Vec<ArtifactRef>,
    pub affected_agents: BTreeSet<AgentId>,
    pub estimated_rework_hours: f64,
    pub resolved: bool,
    pub detected_at: Timestamp,
    pub resolved_at: Option<Timestamp>,
    pub resolved_by_session: Option<EntityId>,
}

impl Conflict {
    pub fn is_open(&self) -> bool {
        !self.resolved
    }
}

/// Input for a manually reported conflict.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewConflict {
    pub team_id: TeamId,
    pub conflict_type: ConflictType,
    pub severity: Severity,
    pub description: String,
    #[serde(default)]
    pub artifacts_involved: Vec<ArtifactRef>,
    #[serde(default)]
    pub affected_agents: BTreeSet<AgentId>,
    pub estimated_rework_hours: f64,
}

impl NewConflict {
    pub fn validate(&self) -> Result<(), ValidationError> {
        require_field("team_id", &self.team_id)?;
        require_field("description", &self.description)?;
        require_hours("estimated_rework_hours", self.estimated_rework_hours)?;
        for artifact in &self.artifacts_involved {
            artifact.validate("artifacts_involved")?;
        }
        Ok(())
    }
}

// ============================================================================
// CONVERGENCE
// ============================================================================

/// Rework actually performed while reconciling conflicts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReworkRecord {
    pub agent_id: Option<AgentId>,
    pub description: String,
    pub hours: f64,
}

impl ReworkRecord {
    pub fn new(agent_id: Option<&str>, description: impl Into<String>, hours: f64) -> Self {
        Self {
            agent_id: agent_id.map(str::to_string),
            description: description.into(),
            hours,
        }
    }
}

/// Batch reconciliation of a frozen set of conflicts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConvergenceSession {
    pub session_id: EntityId,
    pub team_id: TeamId,
    pub trigger_type: TriggerType,
    pub trigger_description: String,
    /// Frozen at trigger time
    pub conflict_ids: BTreeSet<EntityId>,
    pub participants: BTreeSet<AgentId>,
    pub status: SessionStatus,
    pub decisions_made: Vec<String>,
    pub artifacts_updated: Vec<ArtifactRef>,
    pub rework_performed: Vec<ReworkRecord>,
    /// Sum of the claimed conflicts' estimates at trigger time
    pub estimated_rework_hours: f64,
    /// Set only on completion
    pub actual_rework_hours: Option<f64>,
    pub started_at: Timestamp,
    pub completed_at: Option<Timestamp>,
}

impl ConvergenceSession {
    pub fn is_completed(&self) -> bool {
        self.status == SessionStatus::Completed
    }
}

/// Input for opening a convergence session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewConvergence {
    pub team_id: TeamId,
    pub trigger_type: TriggerType,
    pub description: String,
    pub conflict_ids: BTreeSet<EntityId>,
    pub participants: BTreeSet<AgentId>,
}

impl NewConvergence {
    pub fn validate(&self) -> Result<(), ValidationError> {
        require_field("team_id", &self.team_id)?;
        if self.conflict_ids.is_empty() {
            return Err(ValidationError::RequiredFieldMissing {
                field: "conflict_ids".to_string(),
            });
        }
        if self.participants.is_empty() {
            return Err(ValidationError::RequiredFieldMissing {
                field: "participants".to_string(),
            });
        }
        for participant in &self.participants {
            require_field("participants", participant)?;
        }
        Ok(())
    }
}

/// Outcome recorded when a convergence session completes.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ConvergenceOutcome {
    #[serde(default)]
    pub decisions_made: Vec<String>,
    #[serde(default)]
    pub artifacts_updated: Vec<ArtifactRef>,
    #[serde(default)]
    pub rework_performed: Vec<ReworkRecord>,
}

impl ConvergenceOutcome {
    pub fn validate(&self) -> Result<(), ValidationError> {
        for artifact in &self.artifacts_updated {
            artifact.validate("artifacts_updated")?;
        }
        for record in &self.rework_performed {
            require_hours("rework_performed.hours", record.hours)?;
        }
        Ok(())
    }

    /// Total hours across every rework record.
    pub fn actual_hours(&self) -> f64 {
        self.rework_performed.iter().map(|r| r.hours).sum()
    }
}
