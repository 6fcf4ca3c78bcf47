//! Convergence sessions
//!
//! A session claims a frozen set of open conflicts and resolves them all
//! at once on completion. Each conflict is claimed by at most one
//! in-progress session. Completion holds the session entry while it
//! updates the claimed conflicts (lock order session, then conflict).

use std::sync::Arc;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use tandem_core::{
    new_entity_id, Conflict, ConvergenceOutcome, ConvergenceSession, EntityId, EntityType,
    NewConvergence, SessionStatus, TandemError, TandemResult, ValidationError,
};

use crate::{ConflictStore, ParallelExecutionMetrics};

/// Batches conflicts into convergence sessions.
#[derive(Debug)]
pub struct ConvergenceCoordinator {
    conflicts: Arc<ConflictStore>,
    sessions: DashMap<EntityId, ConvergenceSession>,
    /// conflict id -> in-progress session holding it
    claims: DashMap<EntityId, EntityId>,
}

impl ConvergenceCoordinator {
    pub fn new(conflicts: Arc<ConflictStore>) -> Self {
        Self {
            conflicts,
            sessions: DashMap::new(),
            claims: DashMap::new(),
        }
    }

    fn check_claimable(&self, team_id: &str, conflict: &Conflict) -> TandemResult<()> {
        if conflict.resolved {
            return Err(TandemError::AlreadyResolved {
                conflict_id: conflict.conflict_id,
            });
        }
        if conflict.team_id != team_id {
            return Err(ValidationError::TeamMismatch {
                conflict_id: conflict.conflict_id,
                expected: team_id.to_string(),
                actual: conflict.team_id.clone(),
            }
            .into());
        }
        Ok(())
    }

    fn release(&self, session_id: EntityId, conflict_ids: &[EntityId]) {
        for conflict_id in conflict_ids {
            self.claims
                .remove_if(conflict_id, |_, holder| *holder == session_id);
        }
    }

    /// Open a session over a set of unresolved, unclaimed conflicts.
    ///
    /// Claims are all-or-nothing: on any failure no conflict stays claimed.
    pub fn trigger_convergence(&self, input: NewConvergence) -> TandemResult<ConvergenceSession> {
        input.validate()?;

        let mut conflicts = Vec::with_capacity(input.conflict_ids.len());
        for conflict_id in &input.conflict_ids {
            let conflict = self.conflicts.get(*conflict_id)?;
            self.check_claimable(&input.team_id, &conflict)?;
            conflicts.push(conflict);
        }

        let session_id = new_entity_id();
        let mut claimed = Vec::with_capacity(conflicts.len());
        for conflict in &conflicts {
            match self.claims.entry(conflict.conflict_id) {
                Entry::Vacant(slot) => {
                    slot.insert(session_id);
                    claimed.push(conflict.conflict_id);
                }
                Entry::Occupied(holder) => {
                    let holder = *holder.get();
                    self.release(session_id, &claimed);
                    tracing::warn!(
                        conflict_id = %conflict.conflict_id,
                        claimed_by = %holder,
                        "Rejected convergence over claimed conflict"
                    );
                    return Err(TandemError::invalid_transition(
                        EntityType::Conflict,
                        conflict.conflict_id,
                        format!("claimed by session {}", holder),
                        format!("claimed by session {}", session_id),
                    ));
                }
            }
        }

        // A session that completed between the first check and the claim
        // may have resolved one of these.
        let mut estimated_rework_hours = 0.0;
        for conflict_id in &claimed {
            let current = self
                .conflicts
                .get(*conflict_id)
                .and_then(|c| self.check_claimable(&input.team_id, &c).map(|_| c));
            match current {
                Ok(conflict) => estimated_rework_hours += conflict.estimated_rework_hours,
                Err(e) => {
                    self.release(session_id, &claimed);
                    return Err(e);
                }
            }
        }

        let session = ConvergenceSession {
            session_id,
            team_id: input.team_id,
            trigger_type: input.trigger_type,
            trigger_description: input.description,
            conflict_ids: input.conflict_ids,
            participants: input.participants,
            status: SessionStatus::InProgress,
            decisions_made: Vec::new(),
            artifacts_updated: Vec::new(),
            rework_performed: Vec::new(),
            estimated_rework_hours,
            actual_rework_hours: None,
            started_at: chrono::Utc::now(),
            completed_at: None,
        };
        self.sessions.insert(session_id, session.clone());

        tracing::info!(
            session_id = %session_id,
            team_id = %session.team_id,
            trigger = %session.trigger_type,
            conflicts = session.conflict_ids.len(),
            participants = session.participants.len(),
            estimated_rework_hours,
            "Convergence triggered"
        );
        Ok(session)
    }

    /// Finalize a session: resolve every claimed conflict and record the
    /// outcome. Validation covers the whole outcome and every conflict
    /// before anything is mutated.
    pub fn complete_convergence(
        &self,
        session_id: EntityId,
        outcome: ConvergenceOutcome,
    ) -> TandemResult<ConvergenceSession> {
        outcome.validate()?;

        let mut session = self
            .sessions
            .get_mut(&session_id)
            .ok_or_else(|| TandemError::not_found(EntityType::ConvergenceSession, session_id))?;

        if session.status != SessionStatus::InProgress {
            tracing::warn!(session_id = %session_id, "Rejected completion of finished session");
            return Err(TandemError::invalid_transition(
                EntityType::ConvergenceSession,
                session_id,
                session.status,
                SessionStatus::Completed,
            ));
        }

        for conflict_id in &session.conflict_ids {
            let conflict = self.conflicts.get(*conflict_id)?;
            if conflict.resolved {
                return Err(TandemError::AlreadyResolved {
                    conflict_id: *conflict_id,
                });
            }
            let holder = self.claims.get(conflict_id).map(|h| *h.value());
            if holder != Some(session_id) {
                return Err(TandemError::invalid_transition(
                    EntityType::Conflict,
                    conflict_id,
                    "unclaimed",
                    "resolved",
                ));
            }
        }

        let now = chrono::Utc::now();
        for conflict_id in &session.conflict_ids {
            if let Some(mut conflict) = self.conflicts.map().get_mut(conflict_id) {
                conflict.resolved = true;
                conflict.resolved_at = Some(now);
                conflict.resolved_by_session = Some(session_id);
            }
        }

        let actual_rework_hours = outcome.actual_hours();
        session.status = SessionStatus::Completed;
        session.decisions_made = outcome.decisions_made;
        session.artifacts_updated = outcome.artifacts_updated;
        session.rework_performed = outcome.rework_performed;
        session.actual_rework_hours = Some(actual_rework_hours);
        session.completed_at = Some(now);

        let conflict_ids: Vec<EntityId> = session.conflict_ids.iter().copied().collect();
        self.release(session_id, &conflict_ids);

        tracing::info!(
            session_id = %session_id,
            team_id = %session.team_id,
            resolved_conflicts = conflict_ids.len(),
            estimated_rework_hours = session.estimated_rework_hours,
            actual_rework_hours,
            "Convergence completed"
        );
        Ok(session.value().clone())
    }

    pub fn get_session(&self, session_id: EntityId) -> TandemResult<ConvergenceSession> {
        self.sessions
            .get(&session_id)
            .map(|s| s.value().clone())
            .ok_or_else(|| TandemError::not_found(EntityType::ConvergenceSession, session_id))
    }

    /// Sessions of a team, oldest first.
    pub fn list_sessions(&self, team_id: &str) -> Vec<ConvergenceSession> {
        self.select_sessions(|s| s.team_id == team_id)
    }

    /// Every session across teams, for snapshots.
    pub fn all_sessions(&self) -> Vec<ConvergenceSession> {
        self.select_sessions(|_| true)
    }

    fn select_sessions(
        &self,
        predicate: impl Fn(&ConvergenceSession) -> bool,
    ) -> Vec<ConvergenceSession> {
        let mut sessions: Vec<ConvergenceSession> = self
            .sessions
            .iter()
            .filter(|s| predicate(s.value()))
            .map(|s| s.value().clone())
            .collect();
        sessions.sort_by(|a, b| {
            a.started_at
                .cmp(&b.started_at)
                .then(a.session_id.cmp(&b.session_id))
        });
        sessions
    }

    /// Whether an in-progress session holds the conflict.
    pub fn is_claimed(&self, conflict_id: EntityId) -> bool {
        self.claims.contains_key(&conflict_id)
    }

    /// Open conflicts of a team not held by any in-progress session.
    pub fn unclaimed_open_conflicts(&self, team_id: &str) -> Vec<Conflict> {
        self.conflicts
            .list_open(team_id)
            .into_iter()
            .filter(|c| !self.is_claimed(c.conflict_id))
            .collect()
    }

    pub fn get_parallel_execution_metrics(&self, team_id: &str) -> ParallelExecutionMetrics {
        let conflicts = self.conflicts.list(team_id);
        let sessions = self.list_sessions(team_id);
        ParallelExecutionMetrics::compute(team_id, &conflicts, &sessions)
    }
}
