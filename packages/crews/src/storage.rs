// ABOUTME: Crew storage layer using SQLite
// ABOUTME: Crew CRUD with ordered agent/task joins, knowledge joins and run cleanup

use chrono::Utc;
use sqlx::{Row, SqliteConnection, SqlitePool};
use tracing::debug;

use super::types::{Crew, CrewCreateInput, CrewUpdateInput, CrewWithRelations, Process};
use crewyard_agents::{row_to_agent, AgentStorage, AgentWithRelations};
use crewyard_core::{generate_id, EntityKind};
use crewyard_knowledge::{row_to_knowledge_source, KnowledgeSource};
use crewyard_storage::helpers;
use crewyard_storage::{dedupe_ids, Page, StorageError, Table};
use crewyard_tasks::{row_to_task, TaskStorage, TaskWithRelations};

pub struct CrewStorage {
    pool: SqlitePool,
    agents: AgentStorage,
    tasks: TaskStorage,
}

impl CrewStorage {
    pub fn new(pool: SqlitePool) -> Self {
        Self {
            agents: AgentStorage::new(pool.clone()),
            tasks: TaskStorage::new(pool.clone()),
            pool,
        }
    }

    /// List crews ordered by creation time
    pub async fn list_crews(&self, skip: i64, limit: i64) -> Result<Vec<Crew>, StorageError> {
        let page = Page::new(skip, limit);
        debug!("Fetching crews (skip: {}, limit: {})", page.skip, page.limit);

        let rows = sqlx::query("SELECT * FROM crews ORDER BY created_at, rowid LIMIT ? OFFSET ?")
            .bind(page.limit)
            .bind(page.skip)
            .fetch_all(&self.pool)
            .await
            .map_err(StorageError::Sqlx)?;

        rows.iter().map(row_to_crew).collect()
    }

    pub async fn get_crew(&self, crew_id: &str) -> Result<Option<Crew>, StorageError> {
        debug!("Fetching crew: {}", crew_id);

        let row = sqlx::query("SELECT * FROM crews WHERE id = ?")
            .bind(crew_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(StorageError::Sqlx)?;

        row.as_ref().map(row_to_crew).transpose()
    }

    /// Get a crew with agents, tasks, knowledge and manager agent fully loaded
    pub async fn get_crew_with_relations(
        &self,
        crew_id: &str,
    ) -> Result<Option<CrewWithRelations>, StorageError> {
        let crew = match self.get_crew(crew_id).await? {
            Some(crew) => crew,
            None => return Ok(None),
        };

        let agents = self.crew_agents(crew_id).await?;
        let tasks = self.crew_tasks(crew_id).await?;
        let knowledge_sources = self.crew_knowledge_sources(crew_id).await?;
        let manager_agent = match &crew.manager_agent_id {
            Some(agent_id) => self.agents.get_agent_with_relations(agent_id).await?,
            None => None,
        };

        Ok(Some(CrewWithRelations {
            crew,
            agents,
            tasks,
            knowledge_sources,
            manager_agent,
        }))
    }

    /// Member agents in declared order
    pub async fn crew_agents(&self, crew_id: &str) -> Result<Vec<AgentWithRelations>, StorageError> {
        let rows = sqlx::query(
            r#"
            SELECT a.* FROM agents a
            INNER JOIN crew_agents ca ON ca.agent_id = a.id
            WHERE ca.crew_id = ?
            ORDER BY ca.position
            "#,
        )
        .bind(crew_id)
        .fetch_all(&self.pool)
        .await
        .map_err(StorageError::Sqlx)?;

        let mut agents = Vec::with_capacity(rows.len());
        for row in &rows {
            agents.push(self.agents.with_relations(row_to_agent(row)?).await?);
        }
        Ok(agents)
    }

    /// Member tasks in declared order
    pub async fn crew_tasks(&self, crew_id: &str) -> Result<Vec<TaskWithRelations>, StorageError> {
        let rows = sqlx::query(
            r#"
            SELECT t.* FROM tasks t
            INNER JOIN crew_tasks ct ON ct.task_id = t.id
            WHERE ct.crew_id = ?
            ORDER BY ct.position
            "#,
        )
        .bind(crew_id)
        .fetch_all(&self.pool)
        .await
        .map_err(StorageError::Sqlx)?;

        let mut tasks = Vec::with_capacity(rows.len());
        for row in &rows {
            tasks.push(self.tasks.with_relations(row_to_task(row)?).await?);
        }
        Ok(tasks)
    }

    pub async fn crew_knowledge_sources(
        &self,
        crew_id: &str,
    ) -> Result<Vec<KnowledgeSource>, StorageError> {
        let rows = sqlx::query(
            r#"
            SELECT ks.* FROM knowledge_sources ks
            INNER JOIN crew_knowledge_sources cks ON cks.knowledge_source_id = ks.id
            WHERE cks.crew_id = ?
            ORDER BY ks.created_at, ks.rowid
            "#,
        )
        .bind(crew_id)
        .fetch_all(&self.pool)
        .await
        .map_err(StorageError::Sqlx)?;

        rows.iter().map(row_to_knowledge_source).collect()
    }

    pub async fn crew_exists(&self, crew_id: &str) -> Result<bool, StorageError> {
        helpers::exists(&self.pool, Table::Crews, crew_id).await
    }

    /// Create a crew and all its memberships in one transaction
    pub async fn create_crew(
        &self,
        input: CrewCreateInput,
    ) -> Result<CrewWithRelations, StorageError> {
        let crew_id = generate_id(EntityKind::Crew);
        let now = Utc::now();

        debug!("Creating crew: {} (name: {})", crew_id, input.name);

        let mut tx = self.pool.begin().await.map_err(StorageError::Sqlx)?;

        sqlx::query(
            r#"
            INSERT INTO crews (
                id, name, process, verbose, cache, max_rpm, memory, planning,
                manager_llm, manager_agent_id, planning_llm, created_at, updated_at
            )
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&crew_id)
        .bind(&input.name)
        .bind(input.process.unwrap_or(Process::Sequential))
        .bind(input.verbose.unwrap_or(true))
        .bind(input.cache.unwrap_or(true))
        .bind(input.max_rpm)
        .bind(input.memory.unwrap_or(false))
        .bind(input.planning.unwrap_or(false))
        .bind(&input.manager_llm)
        .bind(&input.manager_agent_id)
        .bind(&input.planning_llm)
        .bind(now)
        .bind(now)
        .execute(&mut *tx)
        .await
        .map_err(StorageError::from_write)?;

        replace_members(&mut tx, Membership::Agents, &crew_id, &input.agent_ids).await?;
        replace_members(&mut tx, Membership::Tasks, &crew_id, &input.task_ids).await?;
        replace_members(
            &mut tx,
            Membership::KnowledgeSources,
            &crew_id,
            &input.knowledge_source_ids,
        )
        .await?;

        tx.commit().await.map_err(StorageError::Sqlx)?;

        self.get_crew_with_relations(&crew_id)
            .await?
            .ok_or(StorageError::NotFound)
    }

    /// Update a crew. Present collections replace membership and keep the supplied order.
    pub async fn update_crew(
        &self,
        crew_id: &str,
        input: CrewUpdateInput,
    ) -> Result<CrewWithRelations, StorageError> {
        debug!("Updating crew: {}", crew_id);

        let mut updates = vec!["updated_at = ?"];

        if input.name.is_some() {
            updates.push("name = ?");
        }
        if input.process.is_some() {
            updates.push("process = ?");
        }
        if input.verbose.is_some() {
            updates.push("verbose = ?");
        }
        if input.cache.is_some() {
            updates.push("cache = ?");
        }
        if input.max_rpm.is_some() {
            updates.push("max_rpm = ?");
        }
        if input.memory.is_some() {
            updates.push("memory = ?");
        }
        if input.planning.is_some() {
            updates.push("planning = ?");
        }
        if input.manager_llm.is_some() {
            updates.push("manager_llm = ?");
        }
        if input.manager_agent_id.is_some() {
            updates.push("manager_agent_id = ?");
        }
        if input.planning_llm.is_some() {
            updates.push("planning_llm = ?");
        }

        let query_str = format!("UPDATE crews SET {} WHERE id = ?", updates.join(", "));
        let mut query = sqlx::query(&query_str).bind(Utc::now());

        if let Some(name) = input.name {
            query = query.bind(name);
        }
        if let Some(process) = input.process {
            query = query.bind(process);
        }
        if let Some(verbose) = input.verbose {
            query = query.bind(verbose);
        }
        if let Some(cache) = input.cache {
            query = query.bind(cache);
        }
        if let Some(max_rpm) = input.max_rpm {
            query = query.bind(max_rpm);
        }
        if let Some(memory) = input.memory {
            query = query.bind(memory);
        }
        if let Some(planning) = input.planning {
            query = query.bind(planning);
        }
        if let Some(manager_llm) = input.manager_llm {
            query = query.bind(manager_llm);
        }
        if let Some(manager_agent_id) = input.manager_agent_id {
            query = query.bind(manager_agent_id);
        }
        if let Some(planning_llm) = input.planning_llm {
            query = query.bind(planning_llm);
        }

        let mut tx = self.pool.begin().await.map_err(StorageError::Sqlx)?;

        let result = query
            .bind(crew_id)
            .execute(&mut *tx)
            .await
            .map_err(StorageError::from_write)?;

        if result.rows_affected() == 0 {
            return Err(StorageError::NotFound);
        }

        if let Some(ids) = &input.agent_ids {
            replace_members(&mut tx, Membership::Agents, crew_id, ids).await?;
        }
        if let Some(ids) = &input.task_ids {
            replace_members(&mut tx, Membership::Tasks, crew_id, ids).await?;
        }
        if let Some(ids) = &input.knowledge_source_ids {
            replace_members(&mut tx, Membership::KnowledgeSources, crew_id, ids).await?;
        }

        tx.commit().await.map_err(StorageError::Sqlx)?;

        self.get_crew_with_relations(crew_id)
            .await?
            .ok_or(StorageError::NotFound)
    }

    /// Delete a crew and its runs in one transaction. Member entities are untouched.
    pub async fn delete_crew(&self, crew_id: &str) -> Result<u64, StorageError> {
        debug!("Deleting crew: {}", crew_id);

        let mut tx = self.pool.begin().await.map_err(StorageError::Sqlx)?;

        let runs = sqlx::query("DELETE FROM runs WHERE crew_id = ?")
            .bind(crew_id)
            .execute(&mut *tx)
            .await
            .map_err(StorageError::Sqlx)?
            .rows_affected();

        let result = sqlx::query("DELETE FROM crews WHERE id = ?")
            .bind(crew_id)
            .execute(&mut *tx)
            .await
            .map_err(StorageError::from_delete)?;

        if result.rows_affected() == 0 {
            return Err(StorageError::NotFound);
        }

        tx.commit().await.map_err(StorageError::Sqlx)?;

        debug!("Deleted crew {} with {} runs", crew_id, runs);
        Ok(runs)
    }

    /// Ids of crews that list `agent_id` as a member or use it as manager
    pub async fn crews_using_agent(&self, agent_id: &str) -> Result<Vec<String>, StorageError> {
        sqlx::query_scalar(
            r#"
            SELECT id FROM crews
            WHERE manager_agent_id = ?
               OR id IN (SELECT crew_id FROM crew_agents WHERE agent_id = ?)
            ORDER BY created_at, rowid
            "#,
        )
        .bind(agent_id)
        .bind(agent_id)
        .fetch_all(&self.pool)
        .await
        .map_err(StorageError::Sqlx)
    }

    pub async fn crews_using_task(&self, task_id: &str) -> Result<Vec<String>, StorageError> {
        sqlx::query_scalar(
            r#"
            SELECT c.id FROM crews c
            INNER JOIN crew_tasks ct ON ct.crew_id = c.id
            WHERE ct.task_id = ?
            ORDER BY c.created_at, c.rowid
            "#,
        )
        .bind(task_id)
        .fetch_all(&self.pool)
        .await
        .map_err(StorageError::Sqlx)
    }

    pub async fn crews_using_knowledge_source(
        &self,
        source_id: &str,
    ) -> Result<Vec<String>, StorageError> {
        sqlx::query_scalar(
            r#"
            SELECT c.id FROM crews c
            INNER JOIN crew_knowledge_sources cks ON cks.crew_id = c.id
            WHERE cks.knowledge_source_id = ?
            ORDER BY c.created_at, c.rowid
            "#,
        )
        .bind(source_id)
        .fetch_all(&self.pool)
        .await
        .map_err(StorageError::Sqlx)
    }
}

#[derive(Debug, Clone, Copy)]
enum Membership {
    Agents,
    Tasks,
    KnowledgeSources,
}

impl Membership {
    fn table(&self) -> &'static str {
        match self {
            Self::Agents => "crew_agents",
            Self::Tasks => "crew_tasks",
            Self::KnowledgeSources => "crew_knowledge_sources",
        }
    }

    fn column(&self) -> &'static str {
        match self {
            Self::Agents => "agent_id",
            Self::Tasks => "task_id",
            Self::KnowledgeSources => "knowledge_source_id",
        }
    }

    fn ordered(&self) -> bool {
        !matches!(self, Self::KnowledgeSources)
    }
}

async fn replace_members(
    conn: &mut SqliteConnection,
    membership: Membership,
    crew_id: &str,
    ids: &[String],
) -> Result<(), StorageError> {
    let delete = format!("DELETE FROM {} WHERE crew_id = ?", membership.table());
    sqlx::query(&delete)
        .bind(crew_id)
        .execute(&mut *conn)
        .await
        .map_err(StorageError::Sqlx)?;

    let insert = if membership.ordered() {
        format!(
            "INSERT INTO {} (crew_id, {}, position) VALUES (?, ?, ?)",
            membership.table(),
            membership.column()
        )
    } else {
        format!(
            "INSERT INTO {} (crew_id, {}) VALUES (?, ?)",
            membership.table(),
            membership.column()
        )
    };

    for (position, id) in dedupe_ids(ids).iter().enumerate() {
        let mut query = sqlx::query(&insert).bind(crew_id).bind(id);
        if membership.ordered() {
            query = query.bind(position as i64);
        }
        query
            .execute(&mut *conn)
            .await
            .map_err(StorageError::from_write)?;
    }

    Ok(())
}

/// Convert a database row to a Crew
pub fn row_to_crew(row: &sqlx::sqlite::SqliteRow) -> Result<Crew, StorageError> {
    Ok(Crew {
        id: row.try_get("id").map_err(StorageError::Sqlx)?,
        name: row.try_get("name").map_err(StorageError::Sqlx)?,
        process: row.try_get("process").map_err(StorageError::Sqlx)?,
        verbose: row.try_get("verbose").map_err(StorageError::Sqlx)?,
        cache: row.try_get("cache").map_err(StorageError::Sqlx)?,
        max_rpm: row.try_get("max_rpm").map_err(StorageError::Sqlx)?,
        memory: row.try_get("memory").map_err(StorageError::Sqlx)?,
        planning: row.try_get("planning").map_err(StorageError::Sqlx)?,
        manager_llm: row.try_get("manager_llm").map_err(StorageError::Sqlx)?,
        manager_agent_id: row.try_get("manager_agent_id").map_err(StorageError::Sqlx)?,
        planning_llm: row.try_get("planning_llm").map_err(StorageError::Sqlx)?,
        created_at: row.try_get("created_at").map_err(StorageError::Sqlx)?,
        updated_at: row.try_get("updated_at").map_err(StorageError::Sqlx)?,
    })
}
