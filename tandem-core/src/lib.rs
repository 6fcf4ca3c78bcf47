//! Tandem Core - Entity Type Definitions
//!
//! Pure data structures shared by every Tandem crate: identities, closed
//! enums, contract versions, aggregate records, the error taxonomy and
//! engine configuration. No business logic beyond input validation.

mod config;
mod entities;
mod enums;
mod error;
mod identity;
mod version;

pub use config::{DuplicateEdgePolicy, TandemConfig};
pub use entities::{
    ArtifactRef, ArtifactSnapshot, Assumption, Conflict, Contract, ContractEvolution,
    ConvergenceOutcome, ConvergenceSession, DependencyEdge, NewAssumption, NewConflict,
    NewContract, NewConvergence, ReworkRecord,
};
pub use enums::{
    ArtifactType, AssumptionCategory, AssumptionStatus, ConflictType, ContractStatus,
    ContractType, DependencyType, EntityType, EnumParseError, SessionStatus, Severity,
    StreamType, TriggerType,
};
pub use error::{
    ConfigError, ErrorKind, StorageError, TandemError, TandemResult, ValidationError,
};
pub use identity::{
    is_blank, new_entity_id, require_field, require_hours, AgentId, EntityId, TaskId, TeamId,
    Timestamp,
};
pub use version::ContractVersion;

// ============================================================================
// PROPERTY-BASED TESTS
// ============================================================================

#[cfg(test)]
mod prop_tests {
    use super::*;
    use proptest::prelude::*;

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(100))]

        /// Version ordering agrees with tuple ordering of its components.
        #[test]
        fn prop_version_order_matches_tuple_order(
            a in (0u32..50, 0u32..50, 0u32..50),
            b in (0u32..50, 0u32..50, 0u32..50),
        ) {
            let va = ContractVersion::new(a.0, a.1, a.2);
            let vb = ContractVersion::new(b.0, b.1, b.2);
            prop_assert_eq!(va.cmp(&vb), a.cmp(&b));
        }

        /// Every displayed version parses back to itself.
        #[test]
        fn prop_version_display_parses_back(major in 0u32..1000, minor in 0u32..1000, patch in 0u32..1000) {
            let version = ContractVersion::new(major, minor, patch);
            prop_assert_eq!(ContractVersion::parse(&version.to_string()).unwrap(), version);
        }

        /// Negative hour rates never validate.
        #[test]
        fn prop_config_rejects_negative_rates(rate in -1000.0f64..-0.0001) {
            let config = TandemConfig {
                rework_hours_per_consumer: rate,
                ..Default::default()
            };
            let result = config.validate();
            if let Err(TandemError::Config(ConfigError::InvalidValue { field, .. })) = result {
                prop_assert_eq!(field, "rework_hours_per_consumer");
            } else {
                prop_assert!(false, "Expected ConfigError::InvalidValue");
            }
        }

        /// Artifact refs built from identifier-like ids survive display/parse.
        #[test]
        fn prop_artifact_ref_display_parses_back(
            idx in 0usize..6,
            id in "[a-zA-Z0-9_/.:-]{1,24}",
        ) {
            let artifact_type = ArtifactType::ALL[idx];
            prop_assume!(!id.trim().is_empty());
            let artifact = ArtifactRef::new(artifact_type, id);
            prop_assert_eq!(ArtifactRef::parse(&artifact.to_string()).unwrap(), artifact);
        }
    }
}
