//! Tandem Test Utilities
//!
//! Shared test infrastructure for the Tandem workspace:
//! - Proptest generators for references, versions and inputs
//! - Fixtures for the contract, assumption and convergence scenarios
//! - Assertions over the error taxonomy

// Re-export mock storage from its source crate
pub use tandem_storage::{MemberState, MockTaskStore};

// Re-export core types for convenience
pub use tandem_core::{
    ArtifactRef, ArtifactSnapshot, ArtifactType, AssumptionCategory, ContractEvolution,
    ContractType, ContractVersion, ConflictType, ConvergenceOutcome, DependencyType, EntityId,
    EntityType, ErrorKind, NewAssumption, NewConflict, NewContract, NewConvergence,
    ReworkRecord, Severity, TandemConfig, TandemError, TandemResult, TriggerType,
    ValidationError,
};

use std::collections::BTreeSet;

// ============================================================================
// PROPTEST GENERATORS
// ============================================================================

pub mod generators {
    //! Proptest strategies for Tandem inputs.

    use super::*;
    use proptest::prelude::*;

    /// Generate a non-blank identifier such as an agent or team id.
    pub fn arb_identifier() -> impl Strategy<Value = String> {
        "[a-z][a-z0-9_]{0,15}"
    }

    /// Generate an ArtifactType variant.
    pub fn arb_artifact_type() -> impl Strategy<Value = ArtifactType> {
        prop::sample::select(ArtifactType::ALL.to_vec())
    }

    /// Generate a DependencyType variant.
    pub fn arb_dependency_type() -> impl Strategy<Value = DependencyType> {
        prop::sample::select(DependencyType::ALL.to_vec())
    }

    /// Generate a Severity variant.
    pub fn arb_severity() -> impl Strategy<Value = Severity> {
        prop::sample::select(Severity::ALL.to_vec())
    }

    /// Generate a valid artifact reference. Ids may contain colons.
    pub fn arb_artifact_ref() -> impl Strategy<Value = ArtifactRef> {
        (arb_artifact_type(), "[a-z0-9_:\\-]{1,24}")
            .prop_filter("id must not be blank", |(_, id)| !id.trim().is_empty())
            .prop_map(|(ty, id)| ArtifactRef::new(ty, id))
    }

    /// Generate a contract version.
    pub fn arb_contract_version() -> impl Strategy<Value = ContractVersion> {
        (0u32..20, 0u32..20, 0u32..20).prop_map(|(major, minor, patch)| {
            ContractVersion::new(major, minor, patch)
        })
    }

    /// Generate a finite, non-negative rework estimate.
    pub fn arb_rework_hours() -> impl Strategy<Value = f64> {
        (0u32..400).prop_map(|quarters| quarters as f64 / 4.0)
    }

    /// Generate a valid manual conflict for a team.
    pub fn arb_new_conflict(team_id: String) -> impl Strategy<Value = NewConflict> {
        (
            arb_severity(),
            arb_rework_hours(),
            prop::collection::vec(arb_artifact_ref(), 0..4),
            prop::collection::btree_set(arb_identifier(), 0..4),
        )
            .prop_map(move |(severity, hours, artifacts, agents)| NewConflict {
                team_id: team_id.clone(),
                conflict_type: ConflictType::Other,
                severity,
                description: "generated conflict".to_string(),
                artifacts_involved: artifacts,
                affected_agents: agents,
                estimated_rework_hours: hours,
            })
    }
}

// ============================================================================
// TEST FIXTURES
// ============================================================================

pub mod fixtures {
    //! Pre-built inputs for common coordination scenarios.

    use super::*;
    use serde_json::json;

    pub const TEAM: &str = "team-alpha";
    pub const BACKEND: &str = "backend_001";
    pub const FRONTEND: &str = "frontend_001";
    pub const MOBILE: &str = "mobile_001";

    /// Config with the default rates and a fan-out bound of four.
    pub fn test_config() -> TandemConfig {
        TandemConfig {
            max_parallel_streams: 4,
            ..TandemConfig::default()
        }
    }

    /// A v1.0 REST contract owned by the backend agent.
    pub fn user_api_contract(consumers: &[&str]) -> NewContract {
        NewContract {
            team_id: TEAM.to_string(),
            name: "UserAPI".to_string(),
            version: ContractVersion::new(1, 0, 0),
            contract_type: ContractType::RestApi,
            spec: json!({
                "endpoints": {
                    "GET /users/{id}": {"fields": ["id", "name", "email"]}
                }
            }),
            owner_role: "backend".to_string(),
            owner_agent: BACKEND.to_string(),
            consumers: consumers.iter().map(|c| c.to_string()).collect(),
        }
    }

    /// Evolution of `UserAPI` to the given version.
    pub fn user_api_evolution(version: ContractVersion, breaking: bool) -> ContractEvolution {
        ContractEvolution {
            team_id: TEAM.to_string(),
            name: "UserAPI".to_string(),
            new_version: version,
            new_spec: json!({
                "endpoints": {
                    "GET /users/{id}": {"fields": ["id", "full_name", "email"]}
                }
            }),
            changes_from_previous: vec!["renamed name to full_name".to_string()],
            breaking_changes: breaking,
            owner_agent: BACKEND.to_string(),
        }
    }

    /// Frontend assumption that `UserAPI` returns back-ticked fields.
    pub fn user_fields_assumption(dependents: Vec<ArtifactRef>) -> NewAssumption {
        NewAssumption {
            team_id: TEAM.to_string(),
            made_by_agent: FRONTEND.to_string(),
            made_by_role: "frontend".to_string(),
            text: "UserAPI returns `id`, `name` and `email` for every user".to_string(),
            category: AssumptionCategory::Interface,
            related_artifact: ArtifactRef::contract(TEAM, "UserAPI"),
            dependent_artifacts: dependents,
            asserted_fields: BTreeSet::new(),
        }
    }

    /// A manual conflict with the given severity and estimate.
    pub fn manual_conflict(severity: Severity, hours: f64) -> NewConflict {
        NewConflict {
            team_id: TEAM.to_string(),
            conflict_type: ConflictType::Other,
            severity,
            description: format!("{} drift worth {}h", severity, hours),
            artifacts_involved: vec![ArtifactRef::task("integration")],
            affected_agents: BTreeSet::from([FRONTEND.to_string()]),
            estimated_rework_hours: hours,
        }
    }

    /// A convergence request over the given conflicts.
    pub fn convergence_request(conflict_ids: &[EntityId]) -> NewConvergence {
        NewConvergence {
            team_id: TEAM.to_string(),
            trigger_type: TriggerType::ConflictDetected,
            description: "reconcile drift".to_string(),
            conflict_ids: conflict_ids.iter().copied().collect(),
            participants: BTreeSet::from([BACKEND.to_string(), FRONTEND.to_string()]),
        }
    }

    /// An outcome recording `hours` of rework by one agent.
    pub fn rework_outcome(agent_id: &str, hours: f64) -> ConvergenceOutcome {
        ConvergenceOutcome {
            decisions_made: vec!["adopt the new shape".to_string()],
            artifacts_updated: vec![ArtifactRef::contract(TEAM, "UserAPI")],
            rework_performed: vec![ReworkRecord::new(Some(agent_id), "rework", hours)],
        }
    }

    /// Snapshot of an artifact exposing exactly `fields`.
    pub fn snapshot_with_fields(artifact: ArtifactRef, fields: &[&str]) -> ArtifactSnapshot {
        let content: serde_json::Map<String, serde_json::Value> = fields
            .iter()
            .map(|f| (f.to_string(), serde_json::Value::Null))
            .collect();
        ArtifactSnapshot::new(artifact, serde_json::Value::Object(content))
    }
}

// ============================================================================
// CUSTOM ASSERTIONS
// ============================================================================

pub mod assertions {
    //! Assertions over Tandem results.

    use super::*;

    /// Assert that a TandemResult is a specific error kind.
    #[track_caller]
    pub fn assert_kind<T: std::fmt::Debug>(result: &TandemResult<T>, kind: ErrorKind) {
        match result {
            Err(e) => assert_eq!(e.kind(), kind, "Wrong error kind for {:?}", e),
            Ok(value) => panic!("Expected {} error, got Ok: {:?}", kind, value),
        }
    }

    /// Assert that a TandemResult is a NotFound error for an entity type.
    #[track_caller]
    pub fn assert_not_found<T: std::fmt::Debug>(result: &TandemResult<T>, entity_type: EntityType) {
        match result {
            Err(TandemError::NotFound { entity_type: et, .. }) => {
                assert_eq!(*et, entity_type, "Wrong entity type in NotFound error");
            }
            other => panic!("Expected NotFound error for {:?}, got: {:?}", entity_type, other),
        }
    }

    /// Assert that a TandemResult names a missing required field.
    #[track_caller]
    pub fn assert_required_field<T: std::fmt::Debug>(result: &TandemResult<T>, field: &str) {
        match result {
            Err(TandemError::Validation(ValidationError::RequiredFieldMissing { field: f })) => {
                assert_eq!(f, field, "Wrong field in RequiredFieldMissing error");
            }
            other => panic!("Expected missing field {}, got: {:?}", field, other),
        }
    }

    /// Assert that two hour figures agree to within a thousandth.
    #[track_caller]
    pub fn assert_hours_eq(actual: f64, expected: f64) {
        assert!(
            (actual - expected).abs() < 1e-3,
            "Hours mismatch: expected {}, got {}",
            expected,
            actual
        );
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_fixtures_are_valid() {
        assert!(fixtures::test_config().validate().is_ok());
        assert!(fixtures::user_api_contract(&[fixtures::FRONTEND]).validate().is_ok());
        assert!(fixtures::user_fields_assumption(vec![]).validate().is_ok());
        assert!(fixtures::manual_conflict(Severity::Low, 1.0).validate().is_ok());
        assert!(fixtures::rework_outcome(fixtures::FRONTEND, 2.0).validate().is_ok());
    }

    #[test]
    fn test_snapshot_fields() {
        let snapshot = fixtures::snapshot_with_fields(
            ArtifactRef::contract(fixtures::TEAM, "UserAPI"),
            &["id", "email"],
        );
        let fields: Vec<String> = snapshot.field_set().into_iter().collect();
        assert_eq!(fields, vec!["email".to_string(), "id".to_string()]);
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(50))]

        #[test]
        fn generated_refs_are_valid(artifact in generators::arb_artifact_ref()) {
            prop_assert!(artifact.validate("artifact").is_ok());
        }

        #[test]
        fn generated_conflicts_are_valid(
            conflict in generators::arb_new_conflict(fixtures::TEAM.to_string())
        ) {
            prop_assert!(conflict.validate().is_ok());
        }
    }
}
