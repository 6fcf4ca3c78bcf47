//! Parallel execution metrics

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use tandem_core::{Conflict, ConvergenceSession, Severity};

/// Aggregate conflict and convergence figures for one team.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParallelExecutionMetrics {
    pub team_id: String,
    pub total_conflicts: usize,
    pub resolved_conflicts: usize,
    pub open_conflicts: usize,
    pub conflicts_by_severity: BTreeMap<Severity, usize>,
    pub total_convergences: usize,
    pub completed_convergences: usize,
    /// Sum of every conflict's estimate
    pub total_estimated_rework_hours: f64,
    /// Sum of completed sessions' estimates
    pub reconciled_estimated_rework_hours: f64,
    pub total_actual_rework_hours: f64,
    /// `actual / reconciled_estimated * 100`; undefined until something
    /// with a non-zero estimate has been reconciled
    pub rework_efficiency: Option<f64>,
}

impl ParallelExecutionMetrics {
    /// Compute metrics from a team's conflicts and sessions.
    pub fn compute(
        team_id: &str,
        conflicts: &[Conflict],
        sessions: &[ConvergenceSession],
    ) -> Self {
        let mut conflicts_by_severity = BTreeMap::new();
        let mut resolved_conflicts = 0;
        let mut total_estimated_rework_hours = 0.0;
        for conflict in conflicts {
            *conflicts_by_severity.entry(conflict.severity).or_insert(0) += 1;
            if conflict.resolved {
                resolved_conflicts += 1;
            }
            total_estimated_rework_hours += conflict.estimated_rework_hours;
        }

        let completed: Vec<&ConvergenceSession> =
            sessions.iter().filter(|s| s.is_completed()).collect();
        let reconciled_estimated_rework_hours: f64 =
            completed.iter().map(|s| s.estimated_rework_hours).sum();
        let total_actual_rework_hours: f64 = completed
            .iter()
            .filter_map(|s| s.actual_rework_hours)
            .sum();

        let rework_efficiency = if reconciled_estimated_rework_hours > 0.0 {
            Some(total_actual_rework_hours / reconciled_estimated_rework_hours * 100.0)
        } else {
            None
        };

        Self {
            team_id: team_id.to_string(),
            total_conflicts: conflicts.len(),
            resolved_conflicts,
            open_conflicts: conflicts.len() - resolved_conflicts,
            conflicts_by_severity,
            total_convergences: sessions.len(),
            completed_convergences: completed.len(),
            total_estimated_rework_hours,
            reconciled_estimated_rework_hours,
            total_actual_rework_hours,
            rework_efficiency,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_team_has_undefined_efficiency() {
        let metrics = ParallelExecutionMetrics::compute("team-a", &[], &[]);
        assert_eq!(metrics.total_conflicts, 0);
        assert_eq!(metrics.open_conflicts, 0);
        assert!(metrics.rework_efficiency.is_none());
    }

    #[test]
    fn test_metrics_serialize_severity_keys() {
        let mut metrics = ParallelExecutionMetrics::compute("team-a", &[], &[]);
        metrics.conflicts_by_severity.insert(Severity::High, 2);
        let json = serde_json::to_value(&metrics).unwrap();
        assert_eq!(json["conflicts_by_severity"]["high"], 2);
        assert!(json["rework_efficiency"].is_null());
    }
}
