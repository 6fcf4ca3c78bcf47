//! The coordination engine

use std::collections::{BTreeSet, HashSet};
use std::sync::Arc;

use futures_util::stream::{self, StreamExt};
use tandem_assumptions::{AssumptionInvalidation, AssumptionTracker};
use tandem_conflicts::{
    ConflictDetector, ConflictStore, ConvergenceCoordinator, ParallelExecutionMetrics,
};
use tandem_contracts::ContractRegistry;
use tandem_core::{
    require_field, ArtifactRef, ArtifactSnapshot, ArtifactType, Assumption, Conflict, Contract,
    ContractEvolution, ConvergenceOutcome, ConvergenceSession, DependencyEdge, DependencyType,
    EntityId, ErrorKind, NewAssumption, NewConflict, NewContract, NewConvergence, TandemConfig,
    TandemResult, TriggerType,
};
use tandem_graph::DependencyGraph;
use tandem_storage::{MemberState, NewTask, TaskStatus, TaskStore};

use crate::outcomes::{
    AssumptionInvalidationOutcome, ChangeImpact, ContractEvolutionOutcome, EngineSnapshot,
};
use crate::streams::{Mvd, StartedStream, WorkStreamManifest, WorkStreamSpec};

/// Batch claims tried by `converge_open_conflicts` before giving up.
const CLAIM_ATTEMPTS: usize = 3;

/// Single entry point over the graph, registry, tracker, detector and
/// coordinator. Construct once and share by reference.
pub struct ParallelWorkflowEngine {
    config: TandemConfig,
    graph: Arc<DependencyGraph>,
    registry: Arc<ContractRegistry>,
    tracker: Arc<AssumptionTracker>,
    conflicts: Arc<ConflictStore>,
    detector: Arc<ConflictDetector>,
    coordinator: Arc<ConvergenceCoordinator>,
    task_store: Arc<dyn TaskStore>,
}

impl std::fmt::Debug for ParallelWorkflowEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ParallelWorkflowEngine")
            .field("config", &self.config)
            .field("conflicts", &self.conflicts.len())
            .finish_non_exhaustive()
    }
}

impl ParallelWorkflowEngine {
    /// Build every component from a validated config.
    pub fn new(config: TandemConfig, task_store: Arc<dyn TaskStore>) -> TandemResult<Self> {
        config.validate()?;

        let graph = Arc::new(DependencyGraph::new(config.duplicate_edge_policy));
        let conflicts = Arc::new(ConflictStore::new());
        let engine = Self {
            registry: Arc::new(ContractRegistry::new(graph.clone())),
            tracker: Arc::new(AssumptionTracker::new(graph.clone())),
            detector: Arc::new(ConflictDetector::new(&config, conflicts.clone())),
            coordinator: Arc::new(ConvergenceCoordinator::new(conflicts.clone())),
            conflicts,
            graph,
            task_store,
            config,
        };

        tracing::info!(
            duplicate_edge_policy = %engine.graph.duplicate_policy(),
            max_parallel_streams = engine.config.max_parallel_streams,
            "Coordination engine initialized"
        );
        Ok(engine)
    }

    pub fn config(&self) -> &TandemConfig {
        &self.config
    }

    pub fn graph(&self) -> &Arc<DependencyGraph> {
        &self.graph
    }

    pub fn registry(&self) -> &Arc<ContractRegistry> {
        &self.registry
    }

    pub fn tracker(&self) -> &Arc<AssumptionTracker> {
        &self.tracker
    }

    pub fn detector(&self) -> &Arc<ConflictDetector> {
        &self.detector
    }

    pub fn coordinator(&self) -> &Arc<ConvergenceCoordinator> {
        &self.coordinator
    }

    // ========================================================================
    // WORK STREAMS
    // ========================================================================

    /// Create the first task of every requested stream concurrently.
    ///
    /// At most `max_parallel_streams` task-store calls run at once. Streams
    /// whose task cannot be created are logged and left out of the
    /// manifest; nothing is rolled back.
    pub async fn start_parallel_work_streams(
        &self,
        team_id: &str,
        mvd: Mvd,
        specs: Vec<WorkStreamSpec>,
    ) -> TandemResult<WorkStreamManifest> {
        require_field("team_id", team_id)?;
        require_field("mvd.title", &mvd.title)?;
        for spec in &specs {
            spec.validate()?;
        }

        let requested_streams = specs.len();
        let mvd_ref = &mvd;
        let streams: Vec<StartedStream> = stream::iter(specs)
            .map(|spec| async move {
                let initial_task = spec.resolved_initial_task(mvd_ref);
                let task = NewTask {
                    team_id: team_id.to_string(),
                    title: initial_task.clone(),
                    description: format!(
                        "{} stream for {} ({}): {}",
                        spec.stream_type, mvd_ref.title, spec.role, mvd_ref.description
                    ),
                    status: TaskStatus::Pending,
                };
                match self.task_store.create_task(task).await {
                    Ok(task_id) => Some(StartedStream {
                        role: spec.role,
                        agent_id: spec.agent_id,
                        stream_type: spec.stream_type,
                        initial_task,
                        task_id,
                    }),
                    Err(e) => {
                        tracing::warn!(
                            team_id = %team_id,
                            agent_id = %spec.agent_id,
                            stream_type = %spec.stream_type,
                            error = %e,
                            "Work stream failed to start"
                        );
                        None
                    }
                }
            })
            .buffer_unordered(self.config.max_parallel_streams)
            .filter_map(|started| async move { started })
            .collect()
            .await;

        tracing::info!(
            team_id = %team_id,
            mvd_id = %mvd.id,
            requested = requested_streams,
            started = streams.len(),
            "Parallel work streams started"
        );
        Ok(WorkStreamManifest {
            team_id: team_id.to_string(),
            mvd,
            requested_streams,
            streams,
        })
    }

    // ========================================================================
    // DEPENDENCIES & IMPACT
    // ========================================================================

    pub fn create_dependency(
        &self,
        source: ArtifactRef,
        target: ArtifactRef,
        dependency_type: DependencyType,
        is_blocking: bool,
    ) -> TandemResult<DependencyEdge> {
        self.graph
            .create_dependency(source, target, dependency_type, is_blocking)
    }

    pub fn get_downstream_dependencies(
        &self,
        artifact: &ArtifactRef,
    ) -> TandemResult<Vec<DependencyEdge>> {
        self.graph.get_downstream_dependencies(artifact)
    }

    pub fn get_upstream_dependencies(
        &self,
        artifact: &ArtifactRef,
    ) -> TandemResult<Vec<DependencyEdge>> {
        self.graph.get_upstream_dependencies(artifact)
    }

    pub fn get_blocking_dependents(
        &self,
        artifact: &ArtifactRef,
    ) -> TandemResult<Vec<DependencyEdge>> {
        self.graph.get_blocking_dependents(artifact)
    }

    /// Everything a change to `artifact` would touch: downstream edges and
    /// the Active assumptions made about it.
    pub fn analyze_change_impact(
        &self,
        team_id: &str,
        artifact: &ArtifactRef,
        change_description: &str,
    ) -> TandemResult<ChangeImpact> {
        let downstream_dependencies = self.graph.get_downstream_dependencies(artifact)?;
        let blocking_dependencies: Vec<DependencyEdge> = downstream_dependencies
            .iter()
            .filter(|e| e.is_blocking)
            .cloned()
            .collect();
        let affected_assumptions = self
            .tracker
            .get_active_assumptions_by_artifact(team_id, artifact);

        let affected_agents: BTreeSet<String> = downstream_dependencies
            .iter()
            .filter(|e| e.target.artifact_type == ArtifactType::Agent)
            .map(|e| e.target.artifact_id.clone())
            .chain(affected_assumptions.iter().map(|a| a.made_by_agent.clone()))
            .collect();

        tracing::debug!(
            team_id = %team_id,
            artifact = %artifact,
            downstream = downstream_dependencies.len(),
            assumptions = affected_assumptions.len(),
            "Change impact analyzed"
        );
        Ok(ChangeImpact {
            artifact: artifact.clone(),
            change_description: change_description.to_string(),
            downstream_dependencies,
            blocking_dependencies,
            affected_assumptions,
            affected_agents,
        })
    }

    /// Blocking edges downstream of artifacts involved in open High or
    /// Critical conflicts: the work that should stop until convergence.
    pub fn blocked_work(&self, team_id: &str) -> TandemResult<Vec<DependencyEdge>> {
        let mut seen = HashSet::new();
        let mut blocked = Vec::new();
        for conflict in self.conflicts.list_open(team_id) {
            if !conflict.severity.is_blocking() {
                continue;
            }
            for artifact in &conflict.artifacts_involved {
                for edge in self.graph.get_blocking_dependents(artifact)? {
                    if seen.insert(edge.edge_id) {
                        blocked.push(edge);
                    }
                }
            }
        }
        Ok(blocked)
    }

    // ========================================================================
    // CONTRACTS
    // ========================================================================

    pub fn create_contract(&self, input: NewContract) -> TandemResult<Contract> {
        self.registry.create_contract(input)
    }

    pub fn activate_contract(
        &self,
        contract_id: EntityId,
        activated_by: &str,
    ) -> TandemResult<Contract> {
        self.registry.activate_contract(contract_id, activated_by)
    }

    /// Evolve a lineage and check the draft for a breach against the
    /// contract it supersedes.
    pub fn evolve_contract(
        &self,
        input: ContractEvolution,
    ) -> TandemResult<ContractEvolutionOutcome> {
        let contract = self.registry.evolve_contract(input)?;
        let conflict = match contract.supersedes_contract_id {
            Some(previous_id) => {
                let previous = self.registry.get_contract(previous_id)?;
                self.detector.detect_contract_breach(&previous, &contract)?
            }
            None => None,
        };
        Ok(ContractEvolutionOutcome { contract, conflict })
    }

    pub fn register_consumer(
        &self,
        contract_id: EntityId,
        consumer_id: &str,
    ) -> TandemResult<Contract> {
        self.registry.register_consumer(contract_id, consumer_id)
    }

    pub fn get_contract(&self, contract_id: EntityId) -> TandemResult<Contract> {
        self.registry.get_contract(contract_id)
    }

    pub fn get_active_contract(&self, team_id: &str, name: &str) -> TandemResult<Option<Contract>> {
        self.registry.get_active_contract(team_id, name)
    }

    pub fn list_contracts(&self, team_id: &str) -> Vec<Contract> {
        self.registry.list_contracts(team_id)
    }

    pub fn get_version_history(&self, team_id: &str, name: &str) -> TandemResult<Vec<Contract>> {
        self.registry.get_version_history(team_id, name)
    }

    // ========================================================================
    // ASSUMPTIONS
    // ========================================================================

    pub fn track_assumption(&self, input: NewAssumption) -> TandemResult<Assumption> {
        self.tracker.track_assumption(input)
    }

    pub fn validate_assumption(
        &self,
        assumption_id: EntityId,
        validated_by: &str,
        notes: Option<String>,
    ) -> TandemResult<Assumption> {
        self.tracker
            .validate_assumption(assumption_id, validated_by, notes)
    }

    /// Invalidate an assumption; with `raise_conflict` also record a Medium
    /// conflict covering its dependents.
    pub fn invalidate_assumption(
        &self,
        assumption_id: EntityId,
        invalidated_by: &str,
        notes: Option<String>,
        raise_conflict: bool,
    ) -> TandemResult<AssumptionInvalidationOutcome> {
        let invalidation: AssumptionInvalidation =
            self.tracker
                .invalidate_assumption(assumption_id, invalidated_by, notes)?;
        let conflict = if raise_conflict {
            self.detector
                .detect_refuted_assumption(&invalidation.assumption)?
        } else {
            None
        };
        Ok(AssumptionInvalidationOutcome {
            invalidation,
            conflict,
        })
    }

    pub fn get_assumption(&self, assumption_id: EntityId) -> TandemResult<Assumption> {
        self.tracker.get_assumption(assumption_id)
    }

    pub fn get_assumptions_by_artifact(
        &self,
        team_id: &str,
        artifact: &ArtifactRef,
    ) -> Vec<Assumption> {
        self.tracker.get_assumptions_by_artifact(team_id, artifact)
    }

    pub fn get_assumptions_by_agent(&self, team_id: &str, agent_id: &str) -> Vec<Assumption> {
        self.tracker.get_assumptions_by_agent(team_id, agent_id)
    }

    pub fn get_active_assumptions_by_artifact(
        &self,
        team_id: &str,
        artifact: &ArtifactRef,
    ) -> Vec<Assumption> {
        self.tracker.get_active_assumptions_by_artifact(team_id, artifact)
    }

    /// Check a changed artifact against every Active assumption about it.
    /// Returns the conflicts raised (or previously raised for the same pair).
    pub fn report_artifact_change(
        &self,
        team_id: &str,
        snapshot: &ArtifactSnapshot,
    ) -> TandemResult<Vec<Conflict>> {
        snapshot.artifact.validate("artifact")?;
        let mut raised = Vec::new();
        for assumption in self
            .tracker
            .get_active_assumptions_by_artifact(team_id, &snapshot.artifact)
        {
            if let Some(conflict) = self
                .detector
                .detect_assumption_invalidation(&assumption, snapshot)?
            {
                raised.push(conflict);
            }
        }
        tracing::info!(
            team_id = %team_id,
            artifact = %snapshot.artifact,
            conflicts = raised.len(),
            "Artifact change checked against assumptions"
        );
        Ok(raised)
    }

    // ========================================================================
    // CONFLICTS & CONVERGENCE
    // ========================================================================

    pub fn create_conflict(&self, input: NewConflict) -> TandemResult<Conflict> {
        self.detector.create_conflict(input)
    }

    pub fn detect_contract_breach(
        &self,
        old: &Contract,
        new: &Contract,
    ) -> TandemResult<Option<Conflict>> {
        self.detector.detect_contract_breach(old, new)
    }

    pub fn detect_assumption_invalidation(
        &self,
        assumption: &Assumption,
        snapshot: &ArtifactSnapshot,
    ) -> TandemResult<Option<Conflict>> {
        self.detector
            .detect_assumption_invalidation(assumption, snapshot)
    }

    pub fn get_conflict(&self, conflict_id: EntityId) -> TandemResult<Conflict> {
        self.detector.get_conflict(conflict_id)
    }

    pub fn list_conflicts(&self, team_id: &str) -> Vec<Conflict> {
        self.detector.list_conflicts(team_id)
    }

    pub fn list_open_conflicts(&self, team_id: &str) -> Vec<Conflict> {
        self.detector.list_open_conflicts(team_id)
    }

    pub fn trigger_convergence(&self, input: NewConvergence) -> TandemResult<ConvergenceSession> {
        self.coordinator.trigger_convergence(input)
    }

    pub fn complete_convergence(
        &self,
        session_id: EntityId,
        outcome: ConvergenceOutcome,
    ) -> TandemResult<ConvergenceSession> {
        self.coordinator.complete_convergence(session_id, outcome)
    }

    pub fn get_session(&self, session_id: EntityId) -> TandemResult<ConvergenceSession> {
        self.coordinator.get_session(session_id)
    }

    pub fn list_sessions(&self, team_id: &str) -> Vec<ConvergenceSession> {
        self.coordinator.list_sessions(team_id)
    }

    /// Batch every unclaimed open conflict of a team into one session.
    ///
    /// Participants are the conflicts' affected agents plus the team's
    /// active members from the task store. Returns `None` when there is
    /// nothing to converge. When a concurrent caller claims part of the
    /// batch first, the remainder is retried up to `CLAIM_ATTEMPTS` times.
    pub async fn converge_open_conflicts(
        &self,
        team_id: &str,
        trigger_type: TriggerType,
        description: &str,
    ) -> TandemResult<Option<ConvergenceSession>> {
        require_field("team_id", team_id)?;
        let mut open = self.coordinator.unclaimed_open_conflicts(team_id);
        if open.is_empty() {
            tracing::debug!(team_id = %team_id, "No open conflicts to converge");
            return Ok(None);
        }

        let members: Vec<String> = self
            .task_store
            .get_team_members(team_id, MemberState::Active)
            .await?
            .into_iter()
            .map(|m| m.agent_id)
            .collect();

        let mut attempt = 1;
        loop {
            let participants: BTreeSet<String> = open
                .iter()
                .flat_map(|c| c.affected_agents.iter().cloned())
                .chain(members.iter().cloned())
                .collect();
            let conflict_ids: BTreeSet<EntityId> = open.iter().map(|c| c.conflict_id).collect();

            let result = self.coordinator.trigger_convergence(NewConvergence {
                team_id: team_id.to_string(),
                trigger_type,
                description: description.to_string(),
                conflict_ids,
                participants,
            });
            match result {
                Ok(session) => return Ok(Some(session)),
                Err(e)
                    if e.kind() == ErrorKind::InvalidStateTransition
                        && attempt < CLAIM_ATTEMPTS =>
                {
                    tracing::debug!(
                        team_id = %team_id,
                        attempt,
                        error = %e,
                        "Open conflicts claimed concurrently, retrying with the remainder"
                    );
                    attempt += 1;
                    open = self.coordinator.unclaimed_open_conflicts(team_id);
                    if open.is_empty() {
                        return Ok(None);
                    }
                }
                Err(e) => return Err(e),
            }
        }
    }

    pub fn get_parallel_execution_metrics(&self, team_id: &str) -> ParallelExecutionMetrics {
        self.coordinator.get_parallel_execution_metrics(team_id)
    }

    // ========================================================================
    // EXPORT
    // ========================================================================

    /// Every aggregate, for persistence or inspection.
    pub fn snapshot(&self) -> TandemResult<EngineSnapshot> {
        Ok(EngineSnapshot {
            taken_at: chrono::Utc::now(),
            edges: self.graph.edges()?,
            contracts: self.registry.all_contracts(),
            assumptions: self.tracker.all_assumptions(),
            conflicts: self.conflicts.select(|_| true),
            sessions: self.coordinator.all_sessions(),
        })
    }
}
