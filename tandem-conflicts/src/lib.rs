//! Tandem Conflicts - Detection and Convergence
//!
//! The detector turns contract evolutions and artifact changes into
//! `Conflict` records; the coordinator batches open conflicts into
//! convergence sessions and resolves them all at once. Both share one
//! `ConflictStore`.

mod convergence;
mod detector;
mod metrics;

pub use convergence::ConvergenceCoordinator;
pub use detector::ConflictDetector;
pub use metrics::ParallelExecutionMetrics;

use dashmap::DashMap;
use tandem_core::{Conflict, EntityId, EntityType, TandemError, TandemResult};

/// Shared conflict records, keyed by conflict id.
#[derive(Debug, Default)]
pub struct ConflictStore {
    conflicts: DashMap<EntityId, Conflict>,
}

impl ConflictStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn insert(&self, conflict: Conflict) {
        self.conflicts.insert(conflict.conflict_id, conflict);
    }

    pub(crate) fn map(&self) -> &DashMap<EntityId, Conflict> {
        &self.conflicts
    }

    pub fn get(&self, conflict_id: EntityId) -> TandemResult<Conflict> {
        self.conflicts
            .get(&conflict_id)
            .map(|c| c.value().clone())
            .ok_or_else(|| TandemError::not_found(EntityType::Conflict, conflict_id))
    }

    /// Conflicts matching `predicate`, in detection order.
    pub fn select(&self, predicate: impl Fn(&Conflict) -> bool) -> Vec<Conflict> {
        let mut found: Vec<Conflict> = self
            .conflicts
            .iter()
            .filter(|c| predicate(c.value()))
            .map(|c| c.value().clone())
            .collect();
        found.sort_by(|a, b| {
            a.detected_at
                .cmp(&b.detected_at)
                .then(a.conflict_id.cmp(&b.conflict_id))
        });
        found
    }

    pub fn list(&self, team_id: &str) -> Vec<Conflict> {
        self.select(|c| c.team_id == team_id)
    }

    pub fn list_open(&self, team_id: &str) -> Vec<Conflict> {
        self.select(|c| c.team_id == team_id && c.is_open())
    }

    pub fn len(&self) -> usize {
        self.conflicts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.conflicts.is_empty()
    }
}
