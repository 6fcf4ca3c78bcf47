//! Property-Based Tests for Convergence Accounting
//!
//! For any set of reported conflicts split across sessions:
//! - every conflict ends up resolved by exactly one completed session
//! - a conflict is never claimed by two in-progress sessions
//! - rework efficiency equals actual over reconciled estimate, in percent

use proptest::prelude::*;
use tandem_engine::{EntityId, ErrorKind, Severity};
use tandem_test_utils::fixtures::{convergence_request, rework_outcome, FRONTEND, TEAM};
use tandem_test_utils::generators::{arb_new_conflict, arb_rework_hours};

#[path = "support/engine.rs"]
mod test_engine_support;
use test_engine_support::test_engine;

proptest! {
    #![proptest_config(ProptestConfig::with_cases(40))]

    #[test]
    fn prop_sessions_partition_conflicts(
        conflicts in prop::collection::vec(arb_new_conflict(TEAM.to_string()), 1..8),
        split in 0usize..8,
        actual in (arb_rework_hours(), arb_rework_hours()),
    ) {
        let (engine, _) = test_engine();
        let ids: Vec<EntityId> = conflicts
            .into_iter()
            .map(|c| engine.create_conflict(c).map(|c| c.conflict_id))
            .collect::<Result<_, _>>()
            .map_err(|e| TestCaseError::fail(e.to_string()))?;

        let split = split.min(ids.len() - 1) + 1;
        let (first, second) = ids.split_at(split);

        let session_a = engine
            .trigger_convergence(convergence_request(first))
            .map_err(|e| TestCaseError::fail(e.to_string()))?;

        // Overlapping request is refused and claims nothing.
        let overlap = engine.trigger_convergence(convergence_request(&ids));
        prop_assert_eq!(
            overlap.map_err(|e| e.kind()).err(),
            Some(ErrorKind::InvalidStateTransition)
        );
        for id in second {
            prop_assert!(!engine.coordinator().is_claimed(*id));
        }

        let mut sessions = vec![(session_a, actual.0)];
        if !second.is_empty() {
            let session_b = engine
                .trigger_convergence(convergence_request(second))
                .map_err(|e| TestCaseError::fail(e.to_string()))?;
            sessions.push((session_b, actual.1));
        }

        let mut estimated = 0.0;
        let mut spent = 0.0;
        for (session, hours) in &sessions {
            engine
                .complete_convergence(session.session_id, rework_outcome(FRONTEND, *hours))
                .map_err(|e| TestCaseError::fail(e.to_string()))?;
            estimated += session.estimated_rework_hours;
            spent += hours;
        }

        for id in &ids {
            let conflict = engine.get_conflict(*id).map_err(|e| TestCaseError::fail(e.to_string()))?;
            prop_assert!(conflict.resolved);
            prop_assert!(sessions
                .iter()
                .any(|(s, _)| Some(s.session_id) == conflict.resolved_by_session));
        }

        let metrics = engine.get_parallel_execution_metrics(TEAM);
        prop_assert_eq!(metrics.total_conflicts, ids.len());
        prop_assert_eq!(metrics.resolved_conflicts, ids.len());
        prop_assert_eq!(metrics.completed_convergences, sessions.len());
        let by_severity: usize = Severity::ALL
            .iter()
            .map(|s| metrics.conflicts_by_severity.get(s).copied().unwrap_or(0))
            .sum();
        prop_assert_eq!(by_severity, ids.len());

        match metrics.rework_efficiency {
            Some(efficiency) => {
                prop_assert!(estimated > 0.0);
                prop_assert!((efficiency - spent / estimated * 100.0).abs() < 1e-6);
            }
            None => prop_assert!(estimated == 0.0),
        }
    }
}
