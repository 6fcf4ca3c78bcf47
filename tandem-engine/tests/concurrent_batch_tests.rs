//! Open-conflict batching when another caller claims conflicts first

use std::collections::BTreeSet;
use std::sync::{Arc, Mutex, OnceLock};

use async_trait::async_trait;
use tandem_engine::{
    ConvergenceCoordinator, EntityId, MemberState, NewTask, ParallelWorkflowEngine, Severity,
    TandemResult, TaskId, TaskStore, TeamMember, TriggerType,
};
use tandem_test_utils::fixtures::{convergence_request, manual_conflict, test_config, TEAM};

/// Task store that opens a competing session over the first `claim`
/// unclaimed conflicts the first time team members are listed, i.e. in
/// the window between the batch read and the batch claim.
struct CompetingStore {
    claim: usize,
    coordinator: OnceLock<Arc<ConvergenceCoordinator>>,
    claimed: Mutex<Vec<EntityId>>,
}

impl CompetingStore {
    fn new(claim: usize) -> Self {
        Self {
            claim,
            coordinator: OnceLock::new(),
            claimed: Mutex::new(Vec::new()),
        }
    }
}

#[async_trait]
impl TaskStore for CompetingStore {
    async fn create_task(&self, _task: NewTask) -> TandemResult<TaskId> {
        Ok("task-unused".to_string())
    }

    async fn get_team_members(
        &self,
        team_id: &str,
        _state: MemberState,
    ) -> TandemResult<Vec<TeamMember>> {
        let Some(coordinator) = self.coordinator.get() else {
            return Ok(Vec::new());
        };
        let mut claimed = self.claimed.lock().unwrap();
        if claimed.is_empty() {
            let ids: Vec<EntityId> = coordinator
                .unclaimed_open_conflicts(team_id)
                .into_iter()
                .take(self.claim)
                .map(|c| c.conflict_id)
                .collect();
            coordinator.trigger_convergence(convergence_request(&ids))?;
            *claimed = ids;
        }
        Ok(Vec::new())
    }
}

fn competing_engine(claim: usize) -> (ParallelWorkflowEngine, Arc<CompetingStore>) {
    let store = Arc::new(CompetingStore::new(claim));
    let engine = ParallelWorkflowEngine::new(test_config(), store.clone())
        .unwrap_or_else(|e| panic!("engine construction failed: {}", e));
    store
        .coordinator
        .set(engine.coordinator().clone())
        .unwrap_or_else(|_| panic!("coordinator already set"));
    (engine, store)
}

#[tokio::test]
async fn test_batch_retries_with_unclaimed_remainder() {
    let (engine, store) = competing_engine(1);
    let ids: BTreeSet<EntityId> = (0..3)
        .map(|i| {
            engine
                .create_conflict(manual_conflict(Severity::Medium, 1.0 + i as f64))
                .unwrap()
                .conflict_id
        })
        .collect();

    let session = engine
        .converge_open_conflicts(TEAM, TriggerType::Milestone, "sprint review")
        .await
        .unwrap()
        .expect("remainder should be batched");

    let taken: BTreeSet<EntityId> = store.claimed.lock().unwrap().iter().copied().collect();
    assert_eq!(taken.len(), 1);
    assert!(session.conflict_ids.is_disjoint(&taken));
    let union: BTreeSet<EntityId> = session.conflict_ids.union(&taken).copied().collect();
    assert_eq!(union, ids);
    assert_eq!(engine.list_sessions(TEAM).len(), 2);
}

#[tokio::test]
async fn test_batch_is_none_when_everything_was_claimed() {
    let (engine, store) = competing_engine(usize::MAX);
    for hours in [1.0, 2.0] {
        engine
            .create_conflict(manual_conflict(Severity::Low, hours))
            .unwrap();
    }

    let session = engine
        .converge_open_conflicts(TEAM, TriggerType::Manual, "retry")
        .await
        .unwrap();
    assert!(session.is_none());
    assert_eq!(store.claimed.lock().unwrap().len(), 2);
    assert_eq!(engine.list_sessions(TEAM).len(), 1);
}
