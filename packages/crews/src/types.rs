// ABOUTME: Crew type definitions
// ABOUTME: Process kinds, crew records and their fully loaded form

use chrono::{DateTime, Utc};
use crewyard_agents::AgentWithRelations;
use crewyard_core::serde_helpers::double_option;
use crewyard_knowledge::KnowledgeSource;
use crewyard_tasks::TaskWithRelations;
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "TEXT", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum Process {
    #[default]
    Sequential,
    Hierarchical,
}

impl fmt::Display for Process {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Sequential => f.write_str("sequential"),
            Self::Hierarchical => f.write_str("hierarchical"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Crew {
    pub id: String,
    pub name: String,
    pub process: Process,
    pub verbose: bool,
    pub cache: bool,
    pub max_rpm: Option<i32>,
    pub memory: bool,
    pub planning: bool,
    pub manager_llm: Option<String>,
    pub manager_agent_id: Option<String>,
    pub planning_llm: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Crew {
    pub fn has_manager(&self) -> bool {
        self.manager_llm.as_deref().is_some_and(|s| !s.trim().is_empty())
            || self.manager_agent_id.is_some()
    }
}

/// Crew with members in declared order
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CrewWithRelations {
    #[serde(flatten)]
    pub crew: Crew,
    pub agents: Vec<AgentWithRelations>,
    pub tasks: Vec<TaskWithRelations>,
    pub knowledge_sources: Vec<KnowledgeSource>,
    pub manager_agent: Option<AgentWithRelations>,
}

impl CrewWithRelations {
    pub fn id(&self) -> &str {
        &self.crew.id
    }

    pub fn agent_ids(&self) -> Vec<String> {
        self.agents.iter().map(|a| a.agent.id.clone()).collect()
    }

    pub fn task_ids(&self) -> Vec<String> {
        self.tasks.iter().map(|t| t.task.id.clone()).collect()
    }

    pub fn knowledge_source_ids(&self) -> Vec<String> {
        self.knowledge_sources.iter().map(|k| k.id.clone()).collect()
    }

    pub fn has_agent(&self, agent_id: &str) -> bool {
        self.agents.iter().any(|a| a.agent.id == agent_id)
    }

    pub fn task(&self, task_id: &str) -> Option<&TaskWithRelations> {
        self.tasks.iter().find(|t| t.task.id == task_id)
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CrewCreateInput {
    pub name: String,
    pub process: Option<Process>,
    pub verbose: Option<bool>,
    pub cache: Option<bool>,
    pub max_rpm: Option<i32>,
    pub memory: Option<bool>,
    pub planning: Option<bool>,
    pub manager_llm: Option<String>,
    pub manager_agent_id: Option<String>,
    pub planning_llm: Option<String>,
    #[serde(default)]
    pub agent_ids: Vec<String>,
    #[serde(default)]
    pub task_ids: Vec<String>,
    #[serde(default)]
    pub knowledge_source_ids: Vec<String>,
}

/// Partial update. Nullable scalars use `Some(None)` to clear.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CrewUpdateInput {
    pub name: Option<String>,
    pub process: Option<Process>,
    pub verbose: Option<bool>,
    pub cache: Option<bool>,
    #[serde(default, with = "double_option", skip_serializing_if = "Option::is_none")]
    pub max_rpm: Option<Option<i32>>,
    pub memory: Option<bool>,
    pub planning: Option<bool>,
    #[serde(default, with = "double_option", skip_serializing_if = "Option::is_none")]
    pub manager_llm: Option<Option<String>>,
    #[serde(default, with = "double_option", skip_serializing_if = "Option::is_none")]
    pub manager_agent_id: Option<Option<String>>,
    #[serde(default, with = "double_option", skip_serializing_if = "Option::is_none")]
    pub planning_llm: Option<Option<String>>,
    pub agent_ids: Option<Vec<String>>,
    pub task_ids: Option<Vec<String>>,
    pub knowledge_source_ids: Option<Vec<String>>,
}
