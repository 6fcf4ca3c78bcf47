//! Conflict detection
//!
//! Detection is idempotent per composite key: a repeated detection of the
//! same breach (or the same assumption against the same artifact) returns
//! the conflict already recorded. Concurrent callers serialize on the
//! dedup map entry.

use std::collections::BTreeSet;
use std::sync::Arc;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use tandem_core::{
    new_entity_id, ArtifactRef, ArtifactSnapshot, Assumption, AssumptionStatus, Conflict,
    ConflictType, Contract, EntityId, NewConflict, Severity, TandemConfig, TandemResult,
};

use crate::ConflictStore;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
enum DetectionKey {
    ContractBreach {
        old_contract: EntityId,
        new_contract: EntityId,
    },
    Assumption {
        assumption_id: EntityId,
        artifact: ArtifactRef,
    },
}

/// Classifies contract evolutions and artifact changes into conflicts.
#[derive(Debug)]
pub struct ConflictDetector {
    store: Arc<ConflictStore>,
    detections: DashMap<DetectionKey, EntityId>,
    rework_hours_per_consumer: f64,
    assumption_rework_hours_per_artifact: f64,
}

impl ConflictDetector {
    pub fn new(config: &TandemConfig, store: Arc<ConflictStore>) -> Self {
        Self {
            store,
            detections: DashMap::new(),
            rework_hours_per_consumer: config.rework_hours_per_consumer,
            assumption_rework_hours_per_artifact: config.assumption_rework_hours_per_artifact,
        }
    }

    pub fn store(&self) -> &Arc<ConflictStore> {
        &self.store
    }

    /// Record the conflict for `key` unless one exists already.
    fn record_once(
        &self,
        key: DetectionKey,
        build: impl FnOnce() -> Conflict,
    ) -> TandemResult<Conflict> {
        match self.detections.entry(key) {
            Entry::Occupied(existing) => {
                let conflict_id = *existing.get();
                tracing::debug!(conflict_id = %conflict_id, "Detection already recorded");
                self.store.get(conflict_id)
            }
            Entry::Vacant(slot) => {
                let conflict = build();
                self.store.insert(conflict.clone());
                slot.insert(conflict.conflict_id);
                tracing::info!(
                    conflict_id = %conflict.conflict_id,
                    team_id = %conflict.team_id,
                    conflict_type = %conflict.conflict_type,
                    severity = %conflict.severity,
                    estimated_rework_hours = conflict.estimated_rework_hours,
                    "Conflict detected"
                );
                Ok(conflict)
            }
        }
    }

    fn assumption_estimate(&self, dependents: usize) -> f64 {
        self.assumption_rework_hours_per_artifact * dependents.max(1) as f64
    }

    /// Record a manually reported conflict.
    pub fn create_conflict(&self, input: NewConflict) -> TandemResult<Conflict> {
        input.validate()?;
        let conflict = Conflict {
            conflict_id: new_entity_id(),
            team_id: input.team_id,
            conflict_type: input.conflict_type,
            severity: input.severity,
            description: input.description,
            artifacts_involved: input.artifacts_involved,
            affected_agents: input.affected_agents,
            estimated_rework_hours: input.estimated_rework_hours,
            resolved: false,
            detected_at: chrono::Utc::now(),
            resolved_at: None,
            resolved_by_session: None,
        };
        self.store.insert(conflict.clone());
        tracing::info!(
            conflict_id = %conflict.conflict_id,
            team_id = %conflict.team_id,
            severity = %conflict.severity,
            "Conflict reported"
        );
        Ok(conflict)
    }

    /// A breaking evolution of a lineage conflicts with every existing consumer.
    ///
    /// Returns `None` when the contracts are not the same lineage or the new
    /// version is not declared breaking.
    pub fn detect_contract_breach(
        &self,
        old: &Contract,
        new: &Contract,
    ) -> TandemResult<Option<Conflict>> {
        if old.contract_id == new.contract_id
            || old.team_id != new.team_id
            || old.name != new.name
            || !new.breaking_changes
        {
            return Ok(None);
        }

        let key = DetectionKey::ContractBreach {
            old_contract: old.contract_id,
            new_contract: new.contract_id,
        };
        let conflict = self.record_once(key, || {
            let consumers = old.consumers.len();
            Conflict {
                conflict_id: new_entity_id(),
                team_id: new.team_id.clone(),
                conflict_type: ConflictType::ContractBreach,
                severity: Severity::High,
                description: format!(
                    "Breaking change in contract {} ({} -> {}) affects {} consumer(s)",
                    new.name, old.version, new.version, consumers
                ),
                artifacts_involved: vec![new.artifact_ref()],
                affected_agents: old.consumers.clone(),
                estimated_rework_hours: self.rework_hours_per_consumer * consumers as f64,
                resolved: false,
                detected_at: chrono::Utc::now(),
                resolved_at: None,
                resolved_by_session: None,
            }
        })?;
        Ok(Some(conflict))
    }

    /// A changed artifact conflicts with an Active assumption about it when
    /// it no longer exposes every field the assumption asserts.
    pub fn detect_assumption_invalidation(
        &self,
        assumption: &Assumption,
        snapshot: &ArtifactSnapshot,
    ) -> TandemResult<Option<Conflict>> {
        if snapshot.artifact != assumption.related_artifact
            || assumption.status != AssumptionStatus::Active
            || assumption.asserted_fields.is_empty()
        {
            return Ok(None);
        }

        let present = snapshot.field_set();
        let missing: BTreeSet<&String> = assumption.asserted_fields.difference(&present).collect();
        if missing.is_empty() {
            return Ok(None);
        }

        let key = DetectionKey::Assumption {
            assumption_id: assumption.assumption_id,
            artifact: snapshot.artifact.clone(),
        };
        let conflict = self.record_once(key, || {
            let missing: Vec<&str> = missing.iter().map(|f| f.as_str()).collect();
            Conflict {
                conflict_id: new_entity_id(),
                team_id: assumption.team_id.clone(),
                conflict_type: ConflictType::AssumptionInvalidation,
                severity: Severity::Medium,
                description: format!(
                    "{} no longer provides {} assumed by {}",
                    snapshot.artifact,
                    missing.join(", "),
                    assumption.made_by_agent
                ),
                artifacts_involved: assumption.dependent_artifacts.clone(),
                affected_agents: BTreeSet::from([assumption.made_by_agent.clone()]),
                estimated_rework_hours: self
                    .assumption_estimate(assumption.dependent_artifacts.len()),
                resolved: false,
                detected_at: chrono::Utc::now(),
                resolved_at: None,
                resolved_by_session: None,
            }
        })?;
        Ok(Some(conflict))
    }

    /// Conflict for an explicitly invalidated assumption's dependents.
    /// Shares the dedup key of a detection against the related artifact.
    pub fn detect_refuted_assumption(
        &self,
        assumption: &Assumption,
    ) -> TandemResult<Option<Conflict>> {
        if assumption.status != AssumptionStatus::Invalidated {
            return Ok(None);
        }

        let key = DetectionKey::Assumption {
            assumption_id: assumption.assumption_id,
            artifact: assumption.related_artifact.clone(),
        };
        let conflict = self.record_once(key, || Conflict {
            conflict_id: new_entity_id(),
            team_id: assumption.team_id.clone(),
            conflict_type: ConflictType::AssumptionInvalidation,
            severity: Severity::Medium,
            description: format!(
                "Assumption by {} about {} was invalidated: {}",
                assumption.made_by_agent, assumption.related_artifact, assumption.text
            ),
            artifacts_involved: assumption.dependent_artifacts.clone(),
            affected_agents: BTreeSet::from([assumption.made_by_agent.clone()]),
            estimated_rework_hours: self.assumption_estimate(assumption.dependent_artifacts.len()),
            resolved: false,
            detected_at: chrono::Utc::now(),
            resolved_at: None,
            resolved_by_session: None,
        })?;
        Ok(Some(conflict))
    }

    pub fn get_conflict(&self, conflict_id: EntityId) -> TandemResult<Conflict> {
        self.store.get(conflict_id)
    }

    pub fn list_conflicts(&self, team_id: &str) -> Vec<Conflict> {
        self.store.list(team_id)
    }

    pub fn list_open_conflicts(&self, team_id: &str) -> Vec<Conflict> {
        self.store.list_open(team_id)
    }
}
