//! Parallel work stream types

use serde::{Deserialize, Serialize};
use tandem_core::{is_blank, require_field, AgentId, StreamType, TaskId, TeamId, ValidationError};

/// Minimum viable deliverable the streams work toward.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Mvd {
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub description: String,
}

/// One requested work stream.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkStreamSpec {
    pub role: String,
    pub agent_id: AgentId,
    pub stream_type: StreamType,
    /// Defaults to `"<stream type> work for <mvd title>"` when missing or blank
    #[serde(default)]
    pub initial_task: Option<String>,
}

impl WorkStreamSpec {
    pub fn new(role: &str, agent_id: &str, stream_type: StreamType) -> Self {
        Self {
            role: role.to_string(),
            agent_id: agent_id.to_string(),
            stream_type,
            initial_task: None,
        }
    }

    pub fn with_initial_task(mut self, task: impl Into<String>) -> Self {
        self.initial_task = Some(task.into());
        self
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        require_field("role", &self.role)?;
        require_field("agent_id", &self.agent_id)
    }

    /// The stream's first task title.
    pub fn resolved_initial_task(&self, mvd: &Mvd) -> String {
        match &self.initial_task {
            Some(task) if !is_blank(task) => task.clone(),
            _ => format!("{} work for {}", self.stream_type, mvd.title),
        }
    }
}

/// A stream whose first task was created in the task store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StartedStream {
    pub role: String,
    pub agent_id: AgentId,
    pub stream_type: StreamType,
    pub initial_task: String,
    pub task_id: TaskId,
}

/// Result of starting parallel work streams. Streams whose task could not
/// be created are omitted; compare `streams.len()` with `requested_streams`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkStreamManifest {
    pub team_id: TeamId,
    pub mvd: Mvd,
    pub requested_streams: usize,
    pub streams: Vec<StartedStream>,
}

impl WorkStreamManifest {
    pub fn failed_streams(&self) -> usize {
        self.requested_streams - self.streams.len()
    }
}
