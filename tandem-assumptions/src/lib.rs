//! Tandem Assumptions - Assumption Lifecycle Tracking
//!
//! Agents declare what they believe about other artifacts ("UserAPI returns
//! `id` and `email`"). Each assumption starts Active and ends either
//! Validated or Invalidated; both end states are terminal. Resolved
//! assumptions stay queryable as history.

use std::collections::{BTreeSet, HashSet};
use std::sync::Arc;

use dashmap::DashMap;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use tandem_core::{
    new_entity_id, require_field, ArtifactRef, Assumption, AssumptionStatus, DependencyType,
    EntityId, EntityType, NewAssumption, TandemError, TandemResult,
};
use tandem_graph::DependencyGraph;

static BACKTICKED_IDENT: Lazy<Option<Regex>> =
    Lazy::new(|| Regex::new(r"`([A-Za-z_][A-Za-z0-9_.\-]*)`").ok());

/// Identifiers quoted in backticks, e.g. "returns `id` and `email`".
pub fn extract_asserted_fields(text: &str) -> BTreeSet<String> {
    match BACKTICKED_IDENT.as_ref() {
        Some(re) => re
            .captures_iter(text)
            .filter_map(|caps| caps.get(1))
            .map(|m| m.as_str().to_string())
            .collect(),
        None => BTreeSet::new(),
    }
}

/// Result of invalidating an assumption: the dependents that were built on it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssumptionInvalidation {
    pub assumption: Assumption,
    pub dependent_artifacts: Vec<ArtifactRef>,
}

/// Tracks assumptions and links them to their dependents in the graph.
#[derive(Debug)]
pub struct AssumptionTracker {
    graph: Arc<DependencyGraph>,
    assumptions: DashMap<EntityId, Assumption>,
}

impl AssumptionTracker {
    pub fn new(graph: Arc<DependencyGraph>) -> Self {
        Self {
            graph,
            assumptions: DashMap::new(),
        }
    }

    /// Record a new Active assumption.
    ///
    /// Empty `asserted_fields` are filled from back-ticked identifiers in the
    /// text. Each dependent artifact gets an `assumption:id -> dependent`
    /// edge of type `InformedBy`.
    pub fn track_assumption(&self, input: NewAssumption) -> TandemResult<Assumption> {
        input.validate()?;

        let asserted_fields = if input.asserted_fields.is_empty() {
            extract_asserted_fields(&input.text)
        } else {
            input.asserted_fields
        };

        let mut seen = HashSet::new();
        let dependent_artifacts: Vec<ArtifactRef> = input
            .dependent_artifacts
            .into_iter()
            .filter(|a| seen.insert(a.clone()))
            .collect();

        let assumption = Assumption {
            assumption_id: new_entity_id(),
            team_id: input.team_id,
            made_by_agent: input.made_by_agent,
            made_by_role: input.made_by_role,
            text: input.text,
            category: input.category,
            related_artifact: input.related_artifact,
            dependent_artifacts,
            asserted_fields,
            status: AssumptionStatus::Active,
            resolved_by: None,
            resolution_notes: None,
            created_at: chrono::Utc::now(),
            resolved_at: None,
        };

        let source = assumption.artifact_ref();
        for dependent in &assumption.dependent_artifacts {
            self.graph.create_dependency(
                source.clone(),
                dependent.clone(),
                DependencyType::InformedBy,
                false,
            )?;
        }

        self.assumptions
            .insert(assumption.assumption_id, assumption.clone());

        tracing::info!(
            assumption_id = %assumption.assumption_id,
            team_id = %assumption.team_id,
            made_by = %assumption.made_by_agent,
            related_artifact = %assumption.related_artifact,
            asserted_fields = assumption.asserted_fields.len(),
            "Assumption tracked"
        );
        Ok(assumption)
    }

    fn resolve(
        &self,
        assumption_id: EntityId,
        to: AssumptionStatus,
        resolved_by: &str,
        notes: Option<String>,
    ) -> TandemResult<Assumption> {
        require_field("resolved_by", resolved_by)?;

        let mut entry = self
            .assumptions
            .get_mut(&assumption_id)
            .ok_or_else(|| TandemError::not_found(EntityType::Assumption, assumption_id))?;

        if entry.status.is_terminal() {
            tracing::warn!(
                assumption_id = %assumption_id,
                status = %entry.status,
                requested = %to,
                "Rejected transition of resolved assumption"
            );
            return Err(TandemError::invalid_transition(
                EntityType::Assumption,
                assumption_id,
                entry.status,
                to,
            ));
        }

        entry.status = to;
        entry.resolved_by = Some(resolved_by.to_string());
        entry.resolution_notes = notes;
        entry.resolved_at = Some(chrono::Utc::now());

        tracing::info!(
            assumption_id = %assumption_id,
            status = %to,
            resolved_by = %resolved_by,
            "Assumption resolved"
        );
        Ok(entry.value().clone())
    }

    /// Confirm an Active assumption.
    pub fn validate_assumption(
        &self,
        assumption_id: EntityId,
        validated_by: &str,
        notes: Option<String>,
    ) -> TandemResult<Assumption> {
        self.resolve(assumption_id, AssumptionStatus::Validated, validated_by, notes)
    }

    /// Refute an Active assumption and surface its dependents.
    /// Raises no conflict on its own.
    pub fn invalidate_assumption(
        &self,
        assumption_id: EntityId,
        invalidated_by: &str,
        notes: Option<String>,
    ) -> TandemResult<AssumptionInvalidation> {
        let assumption =
            self.resolve(assumption_id, AssumptionStatus::Invalidated, invalidated_by, notes)?;
        let dependent_artifacts = assumption.dependent_artifacts.clone();
        Ok(AssumptionInvalidation {
            assumption,
            dependent_artifacts,
        })
    }

    // ========================================================================
    // QUERIES
    // ========================================================================

    pub fn get_assumption(&self, assumption_id: EntityId) -> TandemResult<Assumption> {
        self.assumptions
            .get(&assumption_id)
            .map(|a| a.value().clone())
            .ok_or_else(|| TandemError::not_found(EntityType::Assumption, assumption_id))
    }

    fn select(&self, predicate: impl Fn(&Assumption) -> bool) -> Vec<Assumption> {
        let mut found: Vec<Assumption> = self
            .assumptions
            .iter()
            .filter(|a| predicate(a.value()))
            .map(|a| a.value().clone())
            .collect();
        found.sort_by_key(|a| a.assumption_id);
        found
    }

    /// Every assumption (any status) about an artifact, oldest first.
    pub fn get_assumptions_by_artifact(
        &self,
        team_id: &str,
        artifact: &ArtifactRef,
    ) -> Vec<Assumption> {
        self.select(|a| a.team_id == team_id && &a.related_artifact == artifact)
    }

    /// Active assumptions about an artifact, oldest first.
    pub fn get_active_assumptions_by_artifact(
        &self,
        team_id: &str,
        artifact: &ArtifactRef,
    ) -> Vec<Assumption> {
        self.select(|a| a.team_id == team_id && &a.related_artifact == artifact && a.is_active())
    }

    /// Every assumption made by an agent, oldest first.
    pub fn get_assumptions_by_agent(&self, team_id: &str, agent_id: &str) -> Vec<Assumption> {
        self.select(|a| a.team_id == team_id && a.made_by_agent == agent_id)
    }

    /// Every assumption across teams, for snapshots.
    pub fn all_assumptions(&self) -> Vec<Assumption> {
        self.select(|_| true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tandem_core::{ArtifactType, AssumptionCategory, ErrorKind};

    fn tracker() -> (Arc<DependencyGraph>, AssumptionTracker) {
        let graph = Arc::new(DependencyGraph::default());
        (graph.clone(), AssumptionTracker::new(graph))
    }

    fn input(text: &str, dependents: Vec<ArtifactRef>) -> NewAssumption {
        NewAssumption {
            team_id: "team-a".to_string(),
            made_by_agent: "frontend_001".to_string(),
            made_by_role: "frontend".to_string(),
            text: text.to_string(),
            category: AssumptionCategory::Interface,
            related_artifact: ArtifactRef::contract("team-a", "UserAPI"),
            dependent_artifacts: dependents,
            asserted_fields: BTreeSet::new(),
        }
    }

    #[test]
    fn test_extract_backticked_fields() {
        let fields = extract_asserted_fields("UserAPI returns `id` and `email`, not `2fa`");
        assert_eq!(
            fields.into_iter().collect::<Vec<_>>(),
            vec!["email".to_string(), "id".to_string()]
        );
        assert!(extract_asserted_fields("no identifiers here").is_empty());
    }

    #[test]
    fn test_track_defaults_fields_and_links_dependents() {
        let (graph, tracker) = tracker();
        let dependent = ArtifactRef::new(ArtifactType::Code, "profile_page");
        let assumption = tracker
            .track_assumption(input(
                "UserAPI returns `id` and `email`",
                vec![dependent.clone(), dependent.clone()],
            ))
            .unwrap();

        assert_eq!(assumption.status, AssumptionStatus::Active);
        assert!(assumption.asserted_fields.contains("id"));
        assert!(assumption.asserted_fields.contains("email"));
        assert_eq!(assumption.dependent_artifacts, vec![dependent.clone()]);

        let edges = graph
            .get_downstream_dependencies(&assumption.artifact_ref())
            .unwrap();
        assert_eq!(edges.len(), 1);
        assert_eq!(edges[0].target, dependent);
        assert_eq!(edges[0].dependency_type, DependencyType::InformedBy);
    }

    #[test]
    fn test_explicit_fields_win_over_text() {
        let (_, tracker) = tracker();
        let mut new = input("returns `id`", vec![]);
        new.asserted_fields = BTreeSet::from(["uuid".to_string()]);
        let assumption = tracker.track_assumption(new).unwrap();
        assert_eq!(
            assumption.asserted_fields,
            BTreeSet::from(["uuid".to_string()])
        );
    }

    #[test]
    fn test_blank_text_rejected() {
        let (_, tracker) = tracker();
        let err = tracker.track_assumption(input("  ", vec![])).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);
    }

    #[test]
    fn test_terminal_states_reject_transitions() {
        let (_, tracker) = tracker();
        let a = tracker.track_assumption(input("`id`", vec![])).unwrap();
        let validated = tracker
            .validate_assumption(a.assumption_id, "backend_001", Some("confirmed".into()))
            .unwrap();
        assert_eq!(validated.status, AssumptionStatus::Validated);
        assert!(validated.resolved_at.is_some());

        let err = tracker
            .invalidate_assumption(a.assumption_id, "backend_001", None)
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidStateTransition);
        let err = tracker
            .validate_assumption(a.assumption_id, "backend_001", None)
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidStateTransition);
    }

    #[test]
    fn test_invalidate_surfaces_dependents() {
        let (_, tracker) = tracker();
        let dependents = vec![
            ArtifactRef::new(ArtifactType::Code, "profile_page"),
            ArtifactRef::new(ArtifactType::Design, "profile_mockup"),
        ];
        let a = tracker
            .track_assumption(input("`avatar_url`", dependents.clone()))
            .unwrap();
        let outcome = tracker
            .invalidate_assumption(a.assumption_id, "backend_001", Some("field dropped".into()))
            .unwrap();
        assert_eq!(outcome.assumption.status, AssumptionStatus::Invalidated);
        assert_eq!(outcome.dependent_artifacts, dependents);
    }

    #[test]
    fn test_unknown_assumption_not_found() {
        let (_, tracker) = tracker();
        let err = tracker
            .validate_assumption(new_entity_id(), "x", None)
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }

    #[test]
    fn test_queries_keep_history() {
        let (_, tracker) = tracker();
        let first = tracker.track_assumption(input("`id`", vec![])).unwrap();
        let second = tracker.track_assumption(input("`email`", vec![])).unwrap();
        tracker
            .invalidate_assumption(first.assumption_id, "backend_001", None)
            .unwrap();

        let artifact = ArtifactRef::contract("team-a", "UserAPI");
        let all = tracker.get_assumptions_by_artifact("team-a", &artifact);
        assert_eq!(all.len(), 2);
        let active = tracker.get_active_assumptions_by_artifact("team-a", &artifact);
        assert_eq!(active.len(), 1);
        assert_eq!(active[0].assumption_id, second.assumption_id);
        assert_eq!(
            tracker.get_assumptions_by_agent("team-a", "frontend_001").len(),
            2
        );
        assert!(tracker.get_assumptions_by_agent("team-b", "frontend_001").is_empty());
    }

    #[test]
    fn test_concurrent_transitions_resolve_once() {
        let (_, tracker) = tracker();
        let id = tracker
            .track_assumption(input("`id`", vec![]))
            .unwrap()
            .assumption_id;
        let successes = std::sync::atomic::AtomicUsize::new(0);
        std::thread::scope(|scope| {
            for i in 0..8 {
                let tracker = &tracker;
                let successes = &successes;
                scope.spawn(move || {
                    let result = if i % 2 == 0 {
                        tracker
                            .validate_assumption(id, "agent", None)
                            .map(|_| ())
                    } else {
                        tracker
                            .invalidate_assumption(id, "agent", None)
                            .map(|_| ())
                    };
                    if result.is_ok() {
                        successes.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
                    }
                });
            }
        });
        assert_eq!(successes.load(std::sync::atomic::Ordering::SeqCst), 1);
    }
}
