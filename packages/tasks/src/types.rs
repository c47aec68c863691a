// ABOUTME: Task type definitions
// ABOUTME: Units of work bound to one agent with async and sync context sets

use chrono::{DateTime, Utc};
use crewyard_agents::AgentWithRelations;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// Which of the two context edges a link belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContextMode {
    Async,
    Sync,
}

impl ContextMode {
    pub(crate) fn table(&self) -> &'static str {
        match self {
            Self::Async => "task_async_context",
            Self::Sync => "task_sync_context",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    pub id: String,
    pub description: String,
    pub expected_output: String,
    pub async_execution: bool,
    pub agent_id: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskWithRelations {
    #[serde(flatten)]
    pub task: Task,
    pub agent: AgentWithRelations,
    pub async_context_task_ids: Vec<String>,
    pub sync_context_task_ids: Vec<String>,
}

impl TaskWithRelations {
    pub fn id(&self) -> &str {
        &self.task.id
    }

    /// Union of both context sets, async links first, without duplicates
    pub fn context_task_ids(&self) -> Vec<&str> {
        let mut seen = HashSet::new();
        self.async_context_task_ids
            .iter()
            .chain(self.sync_context_task_ids.iter())
            .map(String::as_str)
            .filter(|id| seen.insert(*id))
            .collect()
    }

    pub fn has_context(&self) -> bool {
        !self.async_context_task_ids.is_empty() || !self.sync_context_task_ids.is_empty()
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TaskCreateInput {
    pub description: String,
    pub expected_output: String,
    pub async_execution: Option<bool>,
    pub agent_id: String,
    #[serde(default)]
    pub async_context_task_ids: Vec<String>,
    #[serde(default)]
    pub sync_context_task_ids: Vec<String>,
}

/// Partial update. Present context sets replace the stored links.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TaskUpdateInput {
    pub description: Option<String>,
    pub expected_output: Option<String>,
    pub async_execution: Option<bool>,
    pub agent_id: Option<String>,
    pub async_context_task_ids: Option<Vec<String>>,
    pub sync_context_task_ids: Option<Vec<String>>,
}
