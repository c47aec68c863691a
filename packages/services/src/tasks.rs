// ABOUTME: Task service enforcing owner and context references
// ABOUTME: Rejects self-context and blocks deletes while other tasks or crews use the task

use chrono::Utc;
use crewyard_core::{EntityKind, ValidationReport};
use crewyard_knowledge::KnowledgeLoader;
use crewyard_storage::dedupe_ids;
use crewyard_tasks::{ContextMode, Task, TaskCreateInput, TaskUpdateInput, TaskWithRelations};
use std::sync::Arc;
use tracing::info;

use crate::error::{ServiceError, ServiceResult};
use crate::stores::{Stores, ValidationRules};
use crate::support::{
    ensure_unreferenced, ensure_valid, referrers, require_existing, validate_blocking,
};
use crate::validation::{check_task, validate_task};

#[derive(Clone)]
pub struct TaskService {
    stores: Stores,
    rules: ValidationRules,
    loader: Arc<dyn KnowledgeLoader>,
}

impl TaskService {
    pub fn new(stores: Stores, rules: ValidationRules, loader: Arc<dyn KnowledgeLoader>) -> Self {
        Self {
            stores,
            rules,
            loader,
        }
    }

    pub async fn list_tasks(&self, skip: i64, limit: i64) -> ServiceResult<Vec<Task>> {
        Ok(self.stores.tasks.list_tasks(skip, limit).await?)
    }

    pub async fn get_task(&self, task_id: &str) -> ServiceResult<Task> {
        self.stores
            .tasks
            .get_task(task_id)
            .await?
            .ok_or_else(|| ServiceError::not_found(EntityKind::Task, task_id))
    }

    pub async fn get_task_with_relations(&self, task_id: &str) -> ServiceResult<TaskWithRelations> {
        self.stores
            .tasks
            .get_task_with_relations(task_id)
            .await?
            .ok_or_else(|| ServiceError::not_found(EntityKind::Task, task_id))
    }

    pub async fn create_task(&self, mut input: TaskCreateInput) -> ServiceResult<TaskWithRelations> {
        input.async_context_task_ids = dedupe_ids(&input.async_context_task_ids);
        input.sync_context_task_ids = dedupe_ids(&input.sync_context_task_ids);

        let now = Utc::now();
        let draft = Task {
            id: String::new(),
            description: input.description.clone(),
            expected_output: input.expected_output.clone(),
            async_execution: input.async_execution.unwrap_or(false),
            agent_id: input.agent_id.clone(),
            created_at: now,
            updated_at: now,
        };
        let has_context =
            !input.async_context_task_ids.is_empty() || !input.sync_context_task_ids.is_empty();
        ensure_valid(
            EntityKind::Task,
            &draft.description,
            check_task(&draft, has_context),
        )?;

        self.check_agent(&input.agent_id).await?;
        self.check_context(&input.async_context_task_ids, &input.sync_context_task_ids)
            .await?;

        let task = self.stores.tasks.create_task(input).await?;
        info!("Created task {} (agent: {})", task.id(), task.task.agent_id);
        Ok(task)
    }

    pub async fn update_task(
        &self,
        task_id: &str,
        mut input: TaskUpdateInput,
    ) -> ServiceResult<TaskWithRelations> {
        let current = self.get_task(task_id).await?;

        input.async_context_task_ids = input.async_context_task_ids.as_deref().map(dedupe_ids);
        input.sync_context_task_ids = input.sync_context_task_ids.as_deref().map(dedupe_ids);

        for ids in [&input.async_context_task_ids, &input.sync_context_task_ids]
            .into_iter()
            .flatten()
        {
            if ids.iter().any(|id| id == task_id) {
                return Err(ServiceError::Constraint(format!(
                    "task {} cannot use itself as context",
                    task_id
                )));
            }
        }

        let async_ids = match &input.async_context_task_ids {
            Some(ids) => ids.clone(),
            None => {
                self.stores
                    .tasks
                    .context_task_ids(task_id, ContextMode::Async)
                    .await?
            }
        };
        let sync_ids = match &input.sync_context_task_ids {
            Some(ids) => ids.clone(),
            None => {
                self.stores
                    .tasks
                    .context_task_ids(task_id, ContextMode::Sync)
                    .await?
            }
        };

        let mut draft = current;
        if let Some(description) = &input.description {
            draft.description = description.clone();
        }
        if let Some(expected_output) = &input.expected_output {
            draft.expected_output = expected_output.clone();
        }
        if let Some(async_execution) = input.async_execution {
            draft.async_execution = async_execution;
        }
        if let Some(agent_id) = &input.agent_id {
            draft.agent_id = agent_id.clone();
        }
        let has_context = !async_ids.is_empty() || !sync_ids.is_empty();
        ensure_valid(EntityKind::Task, task_id, check_task(&draft, has_context))?;

        if let Some(agent_id) = &input.agent_id {
            self.check_agent(agent_id).await?;
        }
        self.check_context(
            input.async_context_task_ids.as_deref().unwrap_or_default(),
            input.sync_context_task_ids.as_deref().unwrap_or_default(),
        )
        .await?;

        let task = self.stores.tasks.update_task(task_id, input).await?;
        info!("Updated task {}", task_id);
        Ok(task)
    }

    pub async fn delete_task(&self, task_id: &str) -> ServiceResult<()> {
        self.get_task(task_id).await?;

        let mut blocking = referrers(
            EntityKind::Task,
            self.stores.tasks.tasks_using_context(task_id).await?,
        );
        blocking.extend(referrers(
            EntityKind::Crew,
            self.stores.crews.crews_using_task(task_id).await?,
        ));
        ensure_unreferenced(EntityKind::Task, task_id, blocking)?;

        self.stores.tasks.delete_task(task_id).await?;
        info!("Deleted task {}", task_id);
        Ok(())
    }

    pub async fn validate_task(&self, task_id: &str) -> ServiceResult<ValidationReport> {
        let task = self.get_task_with_relations(task_id).await?;
        let rules = self.rules.clone();
        let loader = self.loader.clone();
        validate_blocking(move || validate_task(&task, &rules, loader.as_ref())).await
    }

    async fn check_agent(&self, agent_id: &str) -> ServiceResult<()> {
        if self.stores.agents.agent_exists(agent_id).await? {
            return Ok(());
        }
        Err(ServiceError::Reference {
            kind: EntityKind::Agent,
            missing: vec![agent_id.to_string()],
        })
    }

    async fn check_context(&self, async_ids: &[String], sync_ids: &[String]) -> ServiceResult<()> {
        let mut ids = async_ids.to_vec();
        ids.extend_from_slice(sync_ids);
        let ids = dedupe_ids(&ids);
        if ids.is_empty() {
            return Ok(());
        }
        require_existing(
            EntityKind::Task,
            self.stores.tasks.missing_task_ids(&ids).await?,
        )
    }
}
