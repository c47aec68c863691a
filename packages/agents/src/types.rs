// ABOUTME: Agent type definitions
// ABOUTME: LLM personas bound to tools and knowledge sources

use chrono::{DateTime, Utc};
use crewyard_knowledge::KnowledgeSource;
use crewyard_tools::Tool;
use serde::{Deserialize, Serialize};

pub const DEFAULT_TEMPERATURE: f64 = 0.1;
pub const DEFAULT_MAX_ITER: i32 = 25;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Agent {
    pub id: String,
    pub role: String,
    pub backstory: String,
    pub goal: String,
    /// Provider and model, e.g. `openai/gpt-4o`
    pub llm_identifier: String,
    pub temperature: f64,
    pub max_iter: i32,
    pub allow_delegation: bool,
    pub verbose: bool,
    pub cache: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Agent with its tool and knowledge collections loaded
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentWithRelations {
    #[serde(flatten)]
    pub agent: Agent,
    pub tools: Vec<Tool>,
    pub knowledge_sources: Vec<KnowledgeSource>,
}

impl AgentWithRelations {
    pub fn id(&self) -> &str {
        &self.agent.id
    }

    pub fn tool_ids(&self) -> Vec<String> {
        self.tools.iter().map(|t| t.id.clone()).collect()
    }

    pub fn knowledge_source_ids(&self) -> Vec<String> {
        self.knowledge_sources.iter().map(|k| k.id.clone()).collect()
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AgentCreateInput {
    pub role: String,
    pub backstory: String,
    pub goal: String,
    pub llm_identifier: String,
    pub temperature: Option<f64>,
    pub max_iter: Option<i32>,
    pub allow_delegation: Option<bool>,
    pub verbose: Option<bool>,
    pub cache: Option<bool>,
    #[serde(default)]
    pub tool_ids: Vec<String>,
    #[serde(default)]
    pub knowledge_source_ids: Vec<String>,
}

/// Partial update. Present collections replace the stored membership.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AgentUpdateInput {
    pub role: Option<String>,
    pub backstory: Option<String>,
    pub goal: Option<String>,
    pub llm_identifier: Option<String>,
    pub temperature: Option<f64>,
    pub max_iter: Option<i32>,
    pub allow_delegation: Option<bool>,
    pub verbose: Option<bool>,
    pub cache: Option<bool>,
    pub tool_ids: Option<Vec<String>>,
    pub knowledge_source_ids: Option<Vec<String>>,
}
