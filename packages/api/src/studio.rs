// ABOUTME: Single entry point over entity services and the execution driver
// ABOUTME: CRUD and validation for every entity kind plus run execution, polling and cancellation

use crewyard_agents::{Agent, AgentCreateInput, AgentUpdateInput, AgentWithRelations};
use crewyard_core::{Config, ConfigError, ValidationReport};
use crewyard_crews::{Crew, CrewCreateInput, CrewUpdateInput, CrewWithRelations};
use crewyard_engine::{ExecutionDriver, RuntimeFactory};
use crewyard_knowledge::{
    KnowledgeSource, KnowledgeSourceCreateInput, KnowledgeSourceUpdateInput, LoadedKnowledge,
};
use crewyard_runs::Run;
use crewyard_services::{ServiceError, ServiceResult, ServiceSettings, Services, Stores};
use crewyard_storage::StorageError;
use crewyard_tasks::{Task, TaskCreateInput, TaskUpdateInput, TaskWithRelations};
use crewyard_tools::{Tool, ToolCreateInput, ToolUpdateInput};
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::Arc;
use thiserror::Error;
use tracing::info;

/// Failures while bringing a `Studio` up
#[derive(Error, Debug)]
pub enum StudioError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),
    #[error("Database error: {0}")]
    Storage(#[from] StorageError),
    #[error(transparent)]
    Service(#[from] ServiceError),
}

/// In-process API over one database and one runtime
pub struct Studio<R: RuntimeFactory> {
    services: Services,
    driver: ExecutionDriver<R>,
}

impl<R: RuntimeFactory> Clone for Studio<R> {
    fn clone(&self) -> Self {
        Self {
            services: self.services.clone(),
            driver: self.driver.clone(),
        }
    }
}

impl<R: RuntimeFactory> Studio<R> {
    pub fn new(services: Services, factory: Arc<R>) -> Self {
        let driver = ExecutionDriver::new(
            services.stores.clone(),
            services.crews.clone(),
            services.loader.clone(),
            factory,
        );
        Self { services, driver }
    }

    /// Open the configured database, migrate it and fail runs a previous
    /// process left unfinished.
    pub async fn from_config(config: &Config, factory: Arc<R>) -> Result<Self, StudioError> {
        let pool = crewyard_storage::connect(&config.database_url, config.max_connections).await?;
        let settings = ServiceSettings {
            knowledge_dir: config.knowledge_dir.clone(),
            llm_allowlist: config.llm_allowlist.clone(),
        };

        let studio = Self::new(Services::new(Stores::new(pool), &settings), factory);
        let recovered = studio.driver.recover_interrupted_runs().await?;

        info!(
            "Crewyard ready (database: {}, recovered runs: {})",
            config.database_url, recovered
        );
        Ok(studio)
    }

    pub async fn from_env(factory: Arc<R>) -> Result<Self, StudioError> {
        let config = Config::from_env()?;
        Self::from_config(&config, factory).await
    }

    pub fn services(&self) -> &Services {
        &self.services
    }

    pub fn driver(&self) -> &ExecutionDriver<R> {
        &self.driver
    }

    // Tools

    pub async fn create_tool(&self, input: ToolCreateInput) -> ServiceResult<Tool> {
        self.services.tools.create_tool(input).await
    }

    pub async fn get_tool(&self, tool_id: &str) -> ServiceResult<Tool> {
        self.services.tools.get_tool(tool_id).await
    }

    pub async fn list_tools(&self, skip: i64, limit: i64) -> ServiceResult<Vec<Tool>> {
        self.services.tools.list_tools(skip, limit).await
    }

    pub async fn update_tool(&self, tool_id: &str, input: ToolUpdateInput) -> ServiceResult<Tool> {
        self.services.tools.update_tool(tool_id, input).await
    }

    pub async fn delete_tool(&self, tool_id: &str) -> ServiceResult<()> {
        self.services.tools.delete_tool(tool_id).await
    }

    pub async fn validate_tool(&self, tool_id: &str) -> ServiceResult<ValidationReport> {
        self.services.tools.validate_tool(tool_id).await
    }

    // Knowledge sources

    pub async fn create_knowledge_source(
        &self,
        input: KnowledgeSourceCreateInput,
    ) -> ServiceResult<KnowledgeSource> {
        self.services.knowledge.create_knowledge_source(input).await
    }

    pub async fn get_knowledge_source(&self, source_id: &str) -> ServiceResult<KnowledgeSource> {
        self.services.knowledge.get_knowledge_source(source_id).await
    }

    pub async fn list_knowledge_sources(
        &self,
        skip: i64,
        limit: i64,
    ) -> ServiceResult<Vec<KnowledgeSource>> {
        self.services
            .knowledge
            .list_knowledge_sources(skip, limit)
            .await
    }

    pub async fn update_knowledge_source(
        &self,
        source_id: &str,
        input: KnowledgeSourceUpdateInput,
    ) -> ServiceResult<KnowledgeSource> {
        self.services
            .knowledge
            .update_knowledge_source(source_id, input)
            .await
    }

    pub async fn delete_knowledge_source(&self, source_id: &str) -> ServiceResult<()> {
        self.services.knowledge.delete_knowledge_source(source_id).await
    }

    pub async fn validate_knowledge_source(
        &self,
        source_id: &str,
    ) -> ServiceResult<ValidationReport> {
        self.services
            .knowledge
            .validate_knowledge_source(source_id)
            .await
    }

    /// Run the loader against a stored source and return its chunks
    pub async fn load_knowledge_source(&self, source_id: &str) -> ServiceResult<LoadedKnowledge> {
        self.services.knowledge.load_knowledge_source(source_id).await
    }

    // Agents

    pub async fn create_agent(&self, input: AgentCreateInput) -> ServiceResult<AgentWithRelations> {
        self.services.agents.create_agent(input).await
    }

    pub async fn get_agent(&self, agent_id: &str) -> ServiceResult<AgentWithRelations> {
        self.services.agents.get_agent_with_relations(agent_id).await
    }

    pub async fn list_agents(&self, skip: i64, limit: i64) -> ServiceResult<Vec<Agent>> {
        self.services.agents.list_agents(skip, limit).await
    }

    pub async fn update_agent(
        &self,
        agent_id: &str,
        input: AgentUpdateInput,
    ) -> ServiceResult<AgentWithRelations> {
        self.services.agents.update_agent(agent_id, input).await
    }

    pub async fn delete_agent(&self, agent_id: &str) -> ServiceResult<()> {
        self.services.agents.delete_agent(agent_id).await
    }

    pub async fn add_tool_to_agent(
        &self,
        agent_id: &str,
        tool_id: &str,
    ) -> ServiceResult<AgentWithRelations> {
        self.services.agents.add_tool(agent_id, tool_id).await
    }

    pub async fn remove_tool_from_agent(
        &self,
        agent_id: &str,
        tool_id: &str,
    ) -> ServiceResult<AgentWithRelations> {
        self.services.agents.remove_tool(agent_id, tool_id).await
    }

    pub async fn validate_agent(&self, agent_id: &str) -> ServiceResult<ValidationReport> {
        self.services.agents.validate_agent(agent_id).await
    }

    // Tasks

    pub async fn create_task(&self, input: TaskCreateInput) -> ServiceResult<TaskWithRelations> {
        self.services.tasks.create_task(input).await
    }

    pub async fn get_task(&self, task_id: &str) -> ServiceResult<TaskWithRelations> {
        self.services.tasks.get_task_with_relations(task_id).await
    }

    pub async fn list_tasks(&self, skip: i64, limit: i64) -> ServiceResult<Vec<Task>> {
        self.services.tasks.list_tasks(skip, limit).await
    }

    pub async fn update_task(
        &self,
        task_id: &str,
        input: TaskUpdateInput,
    ) -> ServiceResult<TaskWithRelations> {
        self.services.tasks.update_task(task_id, input).await
    }

    pub async fn delete_task(&self, task_id: &str) -> ServiceResult<()> {
        self.services.tasks.delete_task(task_id).await
    }

    pub async fn validate_task(&self, task_id: &str) -> ServiceResult<ValidationReport> {
        self.services.tasks.validate_task(task_id).await
    }

    // Crews

    pub async fn create_crew(&self, input: CrewCreateInput) -> ServiceResult<CrewWithRelations> {
        self.services.crews.create_crew(input).await
    }

    pub async fn get_crew(&self, crew_id: &str) -> ServiceResult<CrewWithRelations> {
        self.services.crews.get_crew_with_relations(crew_id).await
    }

    pub async fn list_crews(&self, skip: i64, limit: i64) -> ServiceResult<Vec<Crew>> {
        self.services.crews.list_crews(skip, limit).await
    }

    pub async fn update_crew(
        &self,
        crew_id: &str,
        input: CrewUpdateInput,
    ) -> ServiceResult<CrewWithRelations> {
        self.services.crews.update_crew(crew_id, input).await
    }

    /// Delete a crew and its runs. Returns the number of runs removed.
    pub async fn delete_crew(&self, crew_id: &str) -> ServiceResult<u64> {
        self.services.crews.delete_crew(crew_id).await
    }

    pub async fn validate_crew(&self, crew_id: &str) -> ServiceResult<ValidationReport> {
        self.services.crews.validate_crew(crew_id).await
    }

    // Runs

    /// Start a crew in the background and return the run id
    pub async fn execute_crew(
        &self,
        crew_id: &str,
        inputs: BTreeMap<String, Value>,
    ) -> ServiceResult<String> {
        self.driver.start(crew_id, inputs).await
    }

    pub async fn get_run(&self, run_id: &str) -> ServiceResult<Run> {
        self.driver.status(run_id).await
    }

    pub async fn list_runs(&self, crew_id: &str, limit: i64) -> ServiceResult<Vec<Run>> {
        self.driver.list_runs(crew_id, limit).await
    }

    pub async fn cancel_run(&self, run_id: &str) -> ServiceResult<Run> {
        self.driver.cancel(run_id).await
    }
}
