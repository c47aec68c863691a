// ABOUTME: Crew service composing agents, tasks and knowledge into an executable unit
// ABOUTME: Owns the manager exclusivity rule and the strict pre-execution validation

use chrono::Utc;
use crewyard_core::{EntityKind, ValidationReport};
use crewyard_crews::{Crew, CrewCreateInput, CrewUpdateInput, CrewWithRelations, Process};
use crewyard_knowledge::KnowledgeLoader;
use crewyard_storage::dedupe_ids;
use std::sync::Arc;
use tracing::{info, warn};

use crate::error::{ServiceError, ServiceResult};
use crate::stores::{Stores, ValidationRules};
use crate::support::{ensure_valid, require_existing, validate_blocking};
use crate::validation::{check_crew, validate_crew};

const BOTH_MANAGERS: &str = "manager_llm and manager_agent cannot both be set";

#[derive(Clone)]
pub struct CrewService {
    stores: Stores,
    rules: ValidationRules,
    loader: Arc<dyn KnowledgeLoader>,
}

impl CrewService {
    pub fn new(stores: Stores, rules: ValidationRules, loader: Arc<dyn KnowledgeLoader>) -> Self {
        Self {
            stores,
            rules,
            loader,
        }
    }

    pub async fn list_crews(&self, skip: i64, limit: i64) -> ServiceResult<Vec<Crew>> {
        Ok(self.stores.crews.list_crews(skip, limit).await?)
    }

    pub async fn get_crew(&self, crew_id: &str) -> ServiceResult<Crew> {
        self.stores
            .crews
            .get_crew(crew_id)
            .await?
            .ok_or_else(|| ServiceError::not_found(EntityKind::Crew, crew_id))
    }

    pub async fn get_crew_with_relations(&self, crew_id: &str) -> ServiceResult<CrewWithRelations> {
        self.stores
            .crews
            .get_crew_with_relations(crew_id)
            .await?
            .ok_or_else(|| ServiceError::not_found(EntityKind::Crew, crew_id))
    }

    pub async fn create_crew(&self, mut input: CrewCreateInput) -> ServiceResult<CrewWithRelations> {
        if input.manager_llm.is_some() && input.manager_agent_id.is_some() {
            return Err(ServiceError::Constraint(BOTH_MANAGERS.to_string()));
        }

        let now = Utc::now();
        let draft = Crew {
            id: String::new(),
            name: input.name.clone(),
            process: input.process.unwrap_or(Process::Sequential),
            verbose: input.verbose.unwrap_or(true),
            cache: input.cache.unwrap_or(true),
            max_rpm: input.max_rpm,
            memory: input.memory.unwrap_or(false),
            planning: input.planning.unwrap_or(false),
            manager_llm: input.manager_llm.clone(),
            manager_agent_id: input.manager_agent_id.clone(),
            planning_llm: input.planning_llm.clone(),
            created_at: now,
            updated_at: now,
        };
        ensure_valid(EntityKind::Crew, &draft.name, check_crew(&draft, &self.rules))?;

        input.agent_ids = dedupe_ids(&input.agent_ids);
        input.task_ids = dedupe_ids(&input.task_ids);
        input.knowledge_source_ids = dedupe_ids(&input.knowledge_source_ids);
        self.check_references(
            Some(&input.agent_ids),
            Some(&input.task_ids),
            Some(&input.knowledge_source_ids),
            input.manager_agent_id.as_deref(),
        )
        .await?;

        let crew = self.stores.crews.create_crew(input).await?;
        info!(
            "Created crew {} ({}, {} agents, {} tasks)",
            crew.id(),
            crew.crew.name,
            crew.agents.len(),
            crew.tasks.len()
        );
        Ok(crew)
    }

    /// Partial update. Setting one manager clears the other.
    pub async fn update_crew(
        &self,
        crew_id: &str,
        mut input: CrewUpdateInput,
    ) -> ServiceResult<CrewWithRelations> {
        let mut draft = self.get_crew(crew_id).await?;

        let sets_llm = matches!(input.manager_llm, Some(Some(_)));
        let sets_agent = matches!(input.manager_agent_id, Some(Some(_)));
        if sets_llm && sets_agent {
            return Err(ServiceError::Constraint(BOTH_MANAGERS.to_string()));
        }
        if sets_llm && input.manager_agent_id.is_none() {
            input.manager_agent_id = Some(None);
        }
        if sets_agent && input.manager_llm.is_none() {
            input.manager_llm = Some(None);
        }

        if let Some(name) = &input.name {
            draft.name = name.clone();
        }
        if let Some(process) = input.process {
            draft.process = process;
        }
        if let Some(max_rpm) = input.max_rpm {
            draft.max_rpm = max_rpm;
        }
        if let Some(manager_llm) = &input.manager_llm {
            draft.manager_llm = manager_llm.clone();
        }
        if let Some(manager_agent_id) = &input.manager_agent_id {
            draft.manager_agent_id = manager_agent_id.clone();
        }
        if let Some(planning_llm) = &input.planning_llm {
            draft.planning_llm = planning_llm.clone();
        }
        ensure_valid(EntityKind::Crew, crew_id, check_crew(&draft, &self.rules))?;

        input.agent_ids = input.agent_ids.as_deref().map(dedupe_ids);
        input.task_ids = input.task_ids.as_deref().map(dedupe_ids);
        input.knowledge_source_ids = input.knowledge_source_ids.as_deref().map(dedupe_ids);
        let manager_agent_id = input.manager_agent_id.clone().flatten();
        self.check_references(
            input.agent_ids.as_ref(),
            input.task_ids.as_ref(),
            input.knowledge_source_ids.as_ref(),
            manager_agent_id.as_deref(),
        )
        .await?;

        let crew = self.stores.crews.update_crew(crew_id, input).await?;
        info!("Updated crew {}", crew_id);
        Ok(crew)
    }

    /// Delete a crew together with its runs. Returns the number of runs removed.
    pub async fn delete_crew(&self, crew_id: &str) -> ServiceResult<u64> {
        self.get_crew(crew_id).await?;

        let runs = self.stores.crews.delete_crew(crew_id).await?;
        info!("Deleted crew {} and {} runs", crew_id, runs);
        Ok(runs)
    }

    /// Read-only report. Empty crews and owners outside the crew are warnings here.
    pub async fn validate_crew(&self, crew_id: &str) -> ServiceResult<ValidationReport> {
        let crew = self.get_crew_with_relations(crew_id).await?;
        let rules = self.rules.clone();
        let loader = self.loader.clone();
        validate_blocking(move || validate_crew(&crew, &rules, loader.as_ref(), false)).await
    }

    /// Load the crew and apply the strict rules used before a run is created
    pub async fn validate_for_execution(&self, crew_id: &str) -> ServiceResult<CrewWithRelations> {
        let crew = self.get_crew_with_relations(crew_id).await?;
        let rules = self.rules.clone();
        let loader = self.loader.clone();
        let (crew, report) = tokio::task::spawn_blocking(move || {
            let report = validate_crew(&crew, &rules, loader.as_ref(), true);
            (crew, report)
        })
        .await
        .map_err(|e| ServiceError::Runtime(format!("validation task failed: {}", e)))?;

        if report.has_errors() {
            warn!(
                "Crew {} failed execution validation: {}",
                crew_id,
                report.summary()
            );
            return Err(ServiceError::Validation(report));
        }
        for warning in &report.warnings {
            warn!("crew {}: {}", crew_id, warning);
        }
        Ok(crew)
    }

    async fn check_references(
        &self,
        agent_ids: Option<&Vec<String>>,
        task_ids: Option<&Vec<String>>,
        knowledge_source_ids: Option<&Vec<String>>,
        manager_agent_id: Option<&str>,
    ) -> ServiceResult<()> {
        let mut agents: Vec<String> = agent_ids.cloned().unwrap_or_default();
        if let Some(manager) = manager_agent_id {
            agents.push(manager.to_string());
        }
        let agents = dedupe_ids(&agents);
        if !agents.is_empty() {
            require_existing(
                EntityKind::Agent,
                self.stores.agents.missing_agent_ids(&agents).await?,
            )?;
        }
        if let Some(ids) = task_ids {
            require_existing(
                EntityKind::Task,
                self.stores.tasks.missing_task_ids(ids).await?,
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
