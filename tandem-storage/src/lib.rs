//! Tandem Storage - External Task Store
//!
//! Teams, tasks and members live outside the engine. The engine only needs
//! to create tasks when work streams start and to list active team members
//! when batching conflicts; `TaskStore` is that boundary.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use ::async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tandem_core::{AgentId, StorageError, TandemResult, TaskId, TeamId, Timestamp};
use tokio::sync::RwLock;

// ============================================================================
// TYPES
// ============================================================================

/// Status a task is created with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Pending,
}

/// Membership state filter for team queries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MemberState {
    Active,
    Inactive,
}

/// Input for creating a task in the external store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewTask {
    pub team_id: TeamId,
    pub title: String,
    pub description: String,
    pub status: TaskStatus,
}

/// Task record as held by the store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredTask {
    pub task_id: TaskId,
    pub team_id: TeamId,
    pub title: String,
    pub description: String,
    pub status: TaskStatus,
    pub created_at: Timestamp,
}

/// Member of a team.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TeamMember {
    pub agent_id: AgentId,
    pub role: String,
    pub state: MemberState,
}

// ============================================================================
// TRAIT
// ============================================================================

/// External task and team store.
#[async_trait]
pub trait TaskStore: Send + Sync {
    /// Create a task and return its id.
    async fn create_task(&self, task: NewTask) -> TandemResult<TaskId>;

    /// List members of a team in the given state.
    async fn get_team_members(
        &self,
        team_id: &str,
        state: MemberState,
    ) -> TandemResult<Vec<TeamMember>>;
}

#[async_trait]
impl<T: TaskStore + ?Sized> TaskStore for Arc<T> {
    async fn create_task(&self, task: NewTask) -> TandemResult<TaskId> {
        (**self).create_task(task).await
    }

    async fn get_team_members(
        &self,
        team_id: &str,
        state: MemberState,
    ) -> TandemResult<Vec<TeamMember>> {
        (**self).get_team_members(team_id, state).await
    }
}

// ============================================================================
// MOCK STORE
// ============================================================================

/// In-memory task store for testing, with per-title failure injection.
#[derive(Debug, Default)]
pub struct MockTaskStore {
    tasks: RwLock<HashMap<TaskId, StoredTask>>,
    members: RwLock<HashMap<TeamId, Vec<TeamMember>>>,
    failing_titles: RwLock<HashSet<String>>,
}

impl MockTaskStore {
    /// Create a new mock store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every `create_task` with this title fail.
    pub async fn fail_on_title(&self, title: impl Into<String>) {
        self.failing_titles.write().await.insert(title.into());
    }

    /// Add a member to a team.
    pub async fn add_member(
        &self,
        team_id: &str,
        agent_id: &str,
        role: &str,
        state: MemberState,
    ) {
        self.members
            .write()
            .await
            .entry(team_id.to_string())
            .or_default()
            .push(TeamMember {
                agent_id: agent_id.to_string(),
                role: role.to_string(),
                state,
            });
    }

    /// Every stored task of a team.
    pub async fn tasks_for_team(&self, team_id: &str) -> Vec<StoredTask> {
        let mut tasks: Vec<StoredTask> = self
            .tasks
            .read()
            .await
            .values()
            .filter(|t| t.team_id == team_id)
            .cloned()
            .collect();
        tasks.sort_by(|a, b| a.task_id.cmp(&b.task_id));
        tasks
    }

    /// Get count of stored tasks.
    pub async fn task_count(&self) -> usize {
        self.tasks.read().await.len()
    }
}

#[async_trait]
impl TaskStore for MockTaskStore {
    async fn create_task(&self, task: NewTask) -> TandemResult<TaskId> {
        if self.failing_titles.read().await.contains(&task.title) {
            tracing::debug!(title = %task.title, "Injected task store failure");
            return Err(StorageError::TaskStore {
                operation: "create_task".to_string(),
                reason: format!("injected failure for '{}'", task.title),
            }
            .into());
        }

        let task_id = format!("task-{}", uuid::Uuid::now_v7());
        let stored = StoredTask {
            task_id: task_id.clone(),
            team_id: task.team_id,
            title: task.title,
            description: task.description,
            status: task.status,
            created_at: chrono::Utc::now(),
        };
        self.tasks.write().await.insert(task_id.clone(), stored);
        Ok(task_id)
    }

    async fn get_team_members(
        &self,
        team_id: &str,
        state: MemberState,
    ) -> TandemResult<Vec<TeamMember>> {
        Ok(self
            .members
            .read()
            .await
            .get(team_id)
            .map(|members| {
                members
                    .iter()
                    .filter(|m| m.state == state)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default())
    }
}
