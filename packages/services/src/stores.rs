// ABOUTME: Shared handle to every repository plus service-level settings
// ABOUTME: Built once from a pool and cloned into each service

use crewyard_agents::AgentStorage;
use crewyard_crews::CrewStorage;
use crewyard_knowledge::{FsKnowledgeLoader, KnowledgeLoader, KnowledgeStorage};
use crewyard_runs::RunStorage;
use crewyard_tasks::TaskStorage;
use crewyard_tools::ToolStorage;
use sqlx::SqlitePool;
use std::path::PathBuf;
use std::sync::Arc;

/// Repository handles over one pool
#[derive(Clone)]
pub struct Stores {
    pub pool: SqlitePool,
    pub tools: Arc<ToolStorage>,
    pub knowledge: Arc<KnowledgeStorage>,
    pub agents: Arc<AgentStorage>,
    pub tasks: Arc<TaskStorage>,
    pub crews: Arc<CrewStorage>,
    pub runs: Arc<RunStorage>,
}

impl Stores {
    pub fn new(pool: SqlitePool) -> Self {
        Self {
            tools: Arc::new(ToolStorage::new(pool.clone())),
            knowledge: Arc::new(KnowledgeStorage::new(pool.clone())),
            agents: Arc::new(AgentStorage::new(pool.clone())),
            tasks: Arc::new(TaskStorage::new(pool.clone())),
            crews: Arc::new(CrewStorage::new(pool.clone())),
            runs: Arc::new(RunStorage::new(pool.clone())),
            pool,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct ServiceSettings {
    /// Base directory for file-backed knowledge sources
    pub knowledge_dir: PathBuf,
    /// When set, only these LLM identifiers pass validation
    pub llm_allowlist: Option<Vec<String>>,
}

impl ServiceSettings {
    pub fn rules(&self) -> ValidationRules {
        ValidationRules {
            llm_allowlist: self.llm_allowlist.clone(),
        }
    }

    pub fn loader(&self) -> Arc<dyn KnowledgeLoader> {
        Arc::new(FsKnowledgeLoader::new(self.knowledge_dir.clone()))
    }
}

/// Configuration-dependent inputs to the validation rules
#[derive(Debug, Clone, Default)]
pub struct ValidationRules {
    pub llm_allowlist: Option<Vec<String>>,
}

impl ValidationRules {
    pub fn allows_llm(&self, identifier: &str) -> bool {
        match &self.llm_allowlist {
            Some(allowed) => allowed.iter().any(|a| a == identifier),
            None => true,
        }
    }
}
