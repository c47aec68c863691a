// ABOUTME: Task storage layer using SQLite
// ABOUTME: Task CRUD plus the async and sync self-referential context joins

use chrono::Utc;
use sqlx::{Row, SqliteConnection, SqlitePool};
use tracing::debug;

use super::types::{ContextMode, Task, TaskCreateInput, TaskUpdateInput, TaskWithRelations};
use crewyard_agents::AgentStorage;
use crewyard_core::{generate_id, EntityKind};
use crewyard_storage::helpers;
use crewyard_storage::{dedupe_ids, Page, StorageError, Table};

pub struct TaskStorage {
    pool: SqlitePool,
    agents: AgentStorage,
}

impl TaskStorage {
    pub fn new(pool: SqlitePool) -> Self {
        Self {
            agents: AgentStorage::new(pool.clone()),
            pool,
        }
    }

    /// List tasks ordered by creation time
    pub async fn list_tasks(&self, skip: i64, limit: i64) -> Result<Vec<Task>, StorageError> {
        let page = Page::new(skip, limit);
        debug!("Fetching tasks (skip: {}, limit: {})", page.skip, page.limit);

        let rows = sqlx::query("SELECT * FROM tasks ORDER BY created_at, rowid LIMIT ? OFFSET ?")
            .bind(page.limit)
            .bind(page.skip)
            .fetch_all(&self.pool)
            .await
            .map_err(StorageError::Sqlx)?;

        rows.iter().map(row_to_task).collect()
    }

    pub async fn get_task(&self, task_id: &str) -> Result<Option<Task>, StorageError> {
        debug!("Fetching task: {}", task_id);

        let row = sqlx::query("SELECT * FROM tasks WHERE id = ?")
            .bind(task_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(StorageError::Sqlx)?;

        row.as_ref().map(row_to_task).transpose()
    }

    /// Get a task with its owning agent (and that agent's relations) and context ids
    pub async fn get_task_with_relations(
        &self,
        task_id: &str,
    ) -> Result<Option<TaskWithRelations>, StorageError> {
        match self.get_task(task_id).await? {
            Some(task) => Ok(Some(self.with_relations(task).await?)),
            None => Ok(None),
        }
    }

    pub async fn with_relations(&self, task: Task) -> Result<TaskWithRelations, StorageError> {
        let agent = self
            .agents
            .get_agent_with_relations(&task.agent_id)
            .await?
            .ok_or_else(|| {
                StorageError::Database(format!(
                    "task {} references missing agent {}",
                    task.id, task.agent_id
                ))
            })?;
        let async_context_task_ids = self.context_task_ids(&task.id, ContextMode::Async).await?;
        let sync_context_task_ids = self.context_task_ids(&task.id, ContextMode::Sync).await?;

        Ok(TaskWithRelations {
            task,
            agent,
            async_context_task_ids,
            sync_context_task_ids,
        })
    }

    /// Context links of one kind, in the order they were supplied
    pub async fn context_task_ids(
        &self,
        task_id: &str,
        mode: ContextMode,
    ) -> Result<Vec<String>, StorageError> {
        let query = format!(
            "SELECT context_task_id FROM {} WHERE task_id = ? ORDER BY rowid",
            mode.table()
        );

        sqlx::query_scalar(&query)
            .bind(task_id)
            .fetch_all(&self.pool)
            .await
            .map_err(StorageError::Sqlx)
    }

    pub async fn task_exists(&self, task_id: &str) -> Result<bool, StorageError> {
        helpers::exists(&self.pool, Table::Tasks, task_id).await
    }

    pub async fn missing_task_ids(&self, task_ids: &[String]) -> Result<Vec<String>, StorageError> {
        helpers::missing_ids(&self.pool, Table::Tasks, task_ids).await
    }

    /// Create a task and its context links in one transaction
    pub async fn create_task(
        &self,
        input: TaskCreateInput,
    ) -> Result<TaskWithRelations, StorageError> {
        let task_id = generate_id(EntityKind::Task);
        let now = Utc::now();

        debug!("Creating task: {} (agent: {})", task_id, input.agent_id);

        let mut tx = self.pool.begin().await.map_err(StorageError::Sqlx)?;

        sqlx::query(
            r#"
            INSERT INTO tasks (id, description, expected_output, async_execution, agent_id, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&task_id)
        .bind(&input.description)
        .bind(&input.expected_output)
        .bind(input.async_execution.unwrap_or(false))
        .bind(&input.agent_id)
        .bind(now)
        .bind(now)
        .execute(&mut *tx)
        .await
        .map_err(StorageError::from_write)?;

        replace_context(&mut tx, &task_id, ContextMode::Async, &input.async_context_task_ids)
            .await?;
        replace_context(&mut tx, &task_id, ContextMode::Sync, &input.sync_context_task_ids)
            .await?;

        tx.commit().await.map_err(StorageError::Sqlx)?;

        self.get_task_with_relations(&task_id)
            .await?
            .ok_or(StorageError::NotFound)
    }

    /// Update a task. Present context sets replace the stored links.
    pub async fn update_task(
        &self,
        task_id: &str,
        input: TaskUpdateInput,
    ) -> Result<TaskWithRelations, StorageError> {
        debug!("Updating task: {}", task_id);

        let mut updates = vec!["updated_at = ?"];

        if input.description.is_some() {
            updates.push("description = ?");
        }
        if input.expected_output.is_some() {
            updates.push("expected_output = ?");
        }
        if input.async_execution.is_some() {
            updates.push("async_execution = ?");
        }
        if input.agent_id.is_some() {
            updates.push("agent_id = ?");
        }

        let query_str = format!("UPDATE tasks SET {} WHERE id = ?", updates.join(", "));
        let mut query = sqlx::query(&query_str).bind(Utc::now());

        if let Some(description) = input.description {
            query = query.bind(description);
        }
        if let Some(expected_output) = input.expected_output {
            query = query.bind(expected_output);
        }
        if let Some(async_execution) = input.async_execution {
            query = query.bind(async_execution);
        }
        if let Some(agent_id) = input.agent_id {
            query = query.bind(agent_id);
        }

        let mut tx = self.pool.begin().await.map_err(StorageError::Sqlx)?;

        let result = query
            .bind(task_id)
            .execute(&mut *tx)
            .await
            .map_err(StorageError::from_write)?;

        if result.rows_affected() == 0 {
            return Err(StorageError::NotFound);
        }

        if let Some(ids) = &input.async_context_task_ids {
            replace_context(&mut tx, task_id, ContextMode::Async, ids).await?;
        }
        if let Some(ids) = &input.sync_context_task_ids {
            replace_context(&mut tx, task_id, ContextMode::Sync, ids).await?;
        }

        tx.commit().await.map_err(StorageError::Sqlx)?;

        self.get_task_with_relations(task_id)
            .await?
            .ok_or(StorageError::NotFound)
    }

    /// Delete a task. Its outgoing context links cascade; incoming links and crews block it.
    pub async fn delete_task(&self, task_id: &str) -> Result<(), StorageError> {
        debug!("Deleting task: {}", task_id);

        let result = sqlx::query("DELETE FROM tasks WHERE id = ?")
            .bind(task_id)
            .execute(&self.pool)
            .await
            .map_err(StorageError::from_delete)?;

        if result.rows_affected() == 0 {
            return Err(StorageError::NotFound);
        }

        Ok(())
    }

    /// Ids of tasks owned by `agent_id`
    pub async fn tasks_owned_by_agent(&self, agent_id: &str) -> Result<Vec<String>, StorageError> {
        sqlx::query_scalar("SELECT id FROM tasks WHERE agent_id = ? ORDER BY created_at, rowid")
            .bind(agent_id)
            .fetch_all(&self.pool)
            .await
            .map_err(StorageError::Sqlx)
    }

    /// Ids of tasks listing `task_id` in either context set
    pub async fn tasks_using_context(&self, task_id: &str) -> Result<Vec<String>, StorageError> {
        sqlx::query_scalar(
            r#"
            SELECT id FROM tasks WHERE id IN (
                SELECT task_id FROM task_async_context WHERE context_task_id = ?
                UNION
                SELECT task_id FROM task_sync_context WHERE context_task_id = ?
            )
            ORDER BY created_at, rowid
            "#,
        )
        .bind(task_id)
        .bind(task_id)
        .fetch_all(&self.pool)
        .await
        .map_err(StorageError::Sqlx)
    }
}

async fn replace_context(
    conn: &mut SqliteConnection,
    task_id: &str,
    mode: ContextMode,
    context_ids: &[String],
) -> Result<(), StorageError> {
    let delete = format!("DELETE FROM {} WHERE task_id = ?", mode.table());
    sqlx::query(&delete)
        .bind(task_id)
        .execute(&mut *conn)
        .await
        .map_err(StorageError::Sqlx)?;

    let insert = format!(
        "INSERT INTO {} (task_id, context_task_id) VALUES (?, ?)",
        mode.table()
    );
    for context_id in dedupe_ids(context_ids) {
        sqlx::query(&insert)
            .bind(task_id)
            .bind(&context_id)
            .execute(&mut *conn)
            .await
            .map_err(StorageError::from_write)?;
    }

    Ok(())
}

/// Convert a database row to a Task
pub fn row_to_task(row: &sqlx::sqlite::SqliteRow) -> Result<Task, StorageError> {
    Ok(Task {
        id: row.try_get("id").map_err(StorageError::Sqlx)?,
        description: row.try_get("description").map_err(StorageError::Sqlx)?,
        expected_output: row.try_get("expected_output").map_err(StorageError::Sqlx)?,
        async_execution: row.try_get("async_execution").map_err(StorageError::Sqlx)?,
        agent_id: row.try_get("agent_id").map_err(StorageError::Sqlx)?,
        created_at: row.try_get("created_at").map_err(StorageError::Sqlx)?,
        updated_at: row.try_get("updated_at").map_err(StorageError::Sqlx)?,
    })
}
