// ABOUTME: Agent service enforcing persona rules and tool/knowledge references
// ABOUTME: Deletion is blocked while tasks or crews still point at the agent

use chrono::Utc;
use crewyard_agents::{
    Agent, AgentCreateInput, AgentUpdateInput, AgentWithRelations, DEFAULT_MAX_ITER,
    DEFAULT_TEMPERATURE,
};
use crewyard_core::{EntityKind, ValidationReport};
use crewyard_knowledge::KnowledgeLoader;
use crewyard_storage::dedupe_ids;
use std::sync::Arc;
use tracing::info;

use crate::error::{ServiceError, ServiceResult};
use crate::stores::{Stores, ValidationRules};
use crate::support::{
    ensure_unreferenced, ensure_valid, referrers, require_existing, validate_blocking,
};
use crate::validation::{check_agent, validate_agent};

#[derive(Clone)]
pub struct AgentService {
    stores: Stores,
    rules: ValidationRules,
    loader: Arc<dyn KnowledgeLoader>,
}

impl AgentService {
    pub fn new(stores: Stores, rules: ValidationRules, loader: Arc<dyn KnowledgeLoader>) -> Self {
        Self {
            stores,
            rules,
            loader,
        }
    }

    pub async fn list_agents(&self, skip: i64, limit: i64) -> ServiceResult<Vec<Agent>> {
        Ok(self.stores.agents.list_agents(skip, limit).await?)
    }

    pub async fn get_agent(&self, agent_id: &str) -> ServiceResult<Agent> {
        self.stores
            .agents
            .get_agent(agent_id)
            .await?
            .ok_or_else(|| ServiceError::not_found(EntityKind::Agent, agent_id))
    }

    pub async fn get_agent_with_relations(
        &self,
        agent_id: &str,
    ) -> ServiceResult<AgentWithRelations> {
        self.stores
            .agents
            .get_agent_with_relations(agent_id)
            .await?
            .ok_or_else(|| ServiceError::not_found(EntityKind::Agent, agent_id))
    }

    pub async fn create_agent(
        &self,
        mut input: AgentCreateInput,
    ) -> ServiceResult<AgentWithRelations> {
        let now = Utc::now();
        let draft = Agent {
            id: String::new(),
            role: input.role.clone(),
            backstory: input.backstory.clone(),
            goal: input.goal.clone(),
            llm_identifier: input.llm_identifier.clone(),
            temperature: input.temperature.unwrap_or(DEFAULT_TEMPERATURE),
            max_iter: input.max_iter.unwrap_or(DEFAULT_MAX_ITER),
            allow_delegation: input.allow_delegation.unwrap_or(false),
            verbose: input.verbose.unwrap_or(true),
            cache: input.cache.unwrap_or(true),
            created_at: now,
            updated_at: now,
        };
        ensure_valid(
            EntityKind::Agent,
            &draft.role,
            check_agent(&draft, &self.rules),
        )?;

        input.tool_ids = dedupe_ids(&input.tool_ids);
        input.knowledge_source_ids = dedupe_ids(&input.knowledge_source_ids);
        self.check_references(Some(&input.tool_ids), Some(&input.knowledge_source_ids))
            .await?;

        let agent = self.stores.agents.create_agent(input).await?;
        info!("Created agent {} ({})", agent.id(), agent.agent.role);
        Ok(agent)
    }

    pub async fn update_agent(
        &self,
        agent_id: &str,
        mut input: AgentUpdateInput,
    ) -> ServiceResult<AgentWithRelations> {
        let mut draft = self.get_agent(agent_id).await?;
        if let Some(role) = &input.role {
            draft.role = role.clone();
        }
        if let Some(backstory) = &input.backstory {
            draft.backstory = backstory.clone();
        }
        if let Some(goal) = &input.goal {
            draft.goal = goal.clone();
        }
        if let Some(llm) = &input.llm_identifier {
            draft.llm_identifier = llm.clone();
        }
        if let Some(temperature) = input.temperature {
            draft.temperature = temperature;
        }
        if let Some(max_iter) = input.max_iter {
            draft.max_iter = max_iter;
        }
        ensure_valid(EntityKind::Agent, agent_id, check_agent(&draft, &self.rules))?;

        input.tool_ids = input.tool_ids.as_deref().map(dedupe_ids);
        input.knowledge_source_ids = input.knowledge_source_ids.as_deref().map(dedupe_ids);
        self.check_references(
            input.tool_ids.as_ref(),
            input.knowledge_source_ids.as_ref(),
        )
        .await?;

        let agent = self.stores.agents.update_agent(agent_id, input).await?;
        info!("Updated agent {}", agent_id);
        Ok(agent)
    }

    pub async fn delete_agent(&self, agent_id: &str) -> ServiceResult<()> {
        self.get_agent(agent_id).await?;

        let mut blocking = referrers(
            EntityKind::Task,
            self.stores.tasks.tasks_owned_by_agent(agent_id).await?,
        );
        blocking.extend(referrers(
            EntityKind::Crew,
            self.stores.crews.crews_using_agent(agent_id).await?,
        ));
        ensure_unreferenced(EntityKind::Agent, agent_id, blocking)?;

        self.stores.agents.delete_agent(agent_id).await?;
        info!("Deleted agent {}", agent_id);
        Ok(())
    }

    pub async fn add_tool(&self, agent_id: &str, tool_id: &str) -> ServiceResult<AgentWithRelations> {
        self.get_agent(agent_id).await?;
        if !self.stores.tools.tool_exists(tool_id).await? {
            return Err(ServiceError::Reference {
                kind: EntityKind::Tool,
                missing: vec![tool_id.to_string()],
            });
        }

        self.stores.agents.add_tool(agent_id, tool_id).await?;
        info!("Attached tool {} to agent {}", tool_id, agent_id);
        self.get_agent_with_relations(agent_id).await
    }

    pub async fn remove_tool(
        &self,
        agent_id: &str,
        tool_id: &str,
    ) -> ServiceResult<AgentWithRelations> {
        self.get_agent(agent_id).await?;

        if self.stores.agents.remove_tool(agent_id, tool_id).await? {
            info!("Detached tool {} from agent {}", tool_id, agent_id);
        }
        self.get_agent_with_relations(agent_id).await
    }

    pub async fn validate_agent(&self, agent_id: &str) -> ServiceResult<ValidationReport> {
        let agent = self.get_agent_with_relations(agent_id).await?;
        let rules = self.rules.clone();
        let loader = self.loader.clone();
        validate_blocking(move || validate_agent(&agent, &rules, loader.as_ref())).await
    }

    async fn check_references(
        &self,
        tool_ids: Option<&Vec<String>>,
        knowledge_source_ids: Option<&Vec<String>>,
    ) -> ServiceResult<()> {
        if let Some(ids) = tool_ids {
            require_existing(
                EntityKind::Tool,
                self.stores.tools.missing_tool_ids(ids).await?,
            )?;
        }
        if let Some(ids) = knowledge_source_ids {
            require_existing(
                EntityKind::KnowledgeSource,
                self.stores.knowledge.missing_knowledge_source_ids(ids).await?,
            )?;
        }
        Ok(())
    }
}
