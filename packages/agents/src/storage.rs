// ABOUTME: Agent storage layer using SQLite
// ABOUTME: Agent CRUD plus the agent-tool and agent-knowledge join tables

use chrono::Utc;
use sqlx::{Row, SqliteConnection, SqlitePool};
use tracing::debug;

use super::types::{Agent, AgentCreateInput, AgentUpdateInput, AgentWithRelations};
use super::types::{DEFAULT_MAX_ITER, DEFAULT_TEMPERATURE};
use crewyard_core::{generate_id, EntityKind};
use crewyard_knowledge::{row_to_knowledge_source, KnowledgeSource};
use crewyard_storage::helpers;
use crewyard_storage::{dedupe_ids, Page, StorageError, Table};
use crewyard_tools::{row_to_tool, Tool};

pub struct AgentStorage {
    pool: SqlitePool,
}

impl AgentStorage {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// List agents ordered by creation time
    pub async fn list_agents(&self, skip: i64, limit: i64) -> Result<Vec<Agent>, StorageError> {
        let page = Page::new(skip, limit);
        debug!("Fetching agents (skip: {}, limit: {})", page.skip, page.limit);

        let rows = sqlx::query("SELECT * FROM agents ORDER BY created_at, rowid LIMIT ? OFFSET ?")
            .bind(page.limit)
            .bind(page.skip)
            .fetch_all(&self.pool)
            .await
            .map_err(StorageError::Sqlx)?;

        rows.iter().map(row_to_agent).collect()
    }

    pub async fn get_agent(&self, agent_id: &str) -> Result<Option<Agent>, StorageError> {
        debug!("Fetching agent: {}", agent_id);

        let row = sqlx::query("SELECT * FROM agents WHERE id = ?")
            .bind(agent_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(StorageError::Sqlx)?;

        row.as_ref().map(row_to_agent).transpose()
    }

    /// Get an agent with its tools and knowledge sources
    pub async fn get_agent_with_relations(
        &self,
        agent_id: &str,
    ) -> Result<Option<AgentWithRelations>, StorageError> {
        match self.get_agent(agent_id).await? {
            Some(agent) => Ok(Some(self.with_relations(agent).await?)),
            None => Ok(None),
        }
    }

    /// Attach the tool and knowledge collections to a loaded agent
    pub async fn with_relations(&self, agent: Agent) -> Result<AgentWithRelations, StorageError> {
        let tools = self.agent_tools(&agent.id).await?;
        let knowledge_sources = self.agent_knowledge_sources(&agent.id).await?;

        Ok(AgentWithRelations {
            agent,
            tools,
            knowledge_sources,
        })
    }

    pub async fn agent_tools(&self, agent_id: &str) -> Result<Vec<Tool>, StorageError> {
        let rows = sqlx::query(
            r#"
            SELECT t.* FROM tools t
            INNER JOIN agent_tools at ON at.tool_id = t.id
            WHERE at.agent_id = ?
            ORDER BY t.created_at, t.rowid
            "#,
        )
        .bind(agent_id)
        .fetch_all(&self.pool)
        .await
        .map_err(StorageError::Sqlx)?;

        rows.iter().map(row_to_tool).collect()
    }

    pub async fn agent_knowledge_sources(
        &self,
        agent_id: &str,
    ) -> Result<Vec<KnowledgeSource>, StorageError> {
        let rows = sqlx::query(
            r#"
            SELECT ks.* FROM knowledge_sources ks
            INNER JOIN agent_knowledge_sources aks ON aks.knowledge_source_id = ks.id
            WHERE aks.agent_id = ?
            ORDER BY ks.created_at, ks.rowid
            "#,
        )
        .bind(agent_id)
        .fetch_all(&self.pool)
        .await
        .map_err(StorageError::Sqlx)?;

        rows.iter().map(row_to_knowledge_source).collect()
    }

    pub async fn agent_exists(&self, agent_id: &str) -> Result<bool, StorageError> {
        helpers::exists(&self.pool, Table::Agents, agent_id).await
    }

    pub async fn missing_agent_ids(&self, agent_ids: &[String]) -> Result<Vec<String>, StorageError> {
        helpers::missing_ids(&self.pool, Table::Agents, agent_ids).await
    }

    /// Create an agent and its tool/knowledge memberships in one transaction
    pub async fn create_agent(
        &self,
        input: AgentCreateInput,
    ) -> Result<AgentWithRelations, StorageError> {
        let agent_id = generate_id(EntityKind::Agent);
        let now = Utc::now();

        debug!("Creating agent: {} (role: {})", agent_id, input.role);

        let mut tx = self.pool.begin().await.map_err(StorageError::Sqlx)?;

        sqlx::query(
            r#"
            INSERT INTO agents (
                id, role, backstory, goal, llm_identifier, temperature, max_iter,
                allow_delegation, verbose, cache, created_at, updated_at
            )
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&agent_id)
        .bind(&input.role)
        .bind(&input.backstory)
        .bind(&input.goal)
        .bind(&input.llm_identifier)
        .bind(input.temperature.unwrap_or(DEFAULT_TEMPERATURE))
        .bind(input.max_iter.unwrap_or(DEFAULT_MAX_ITER))
        .bind(input.allow_delegation.unwrap_or(false))
        .bind(input.verbose.unwrap_or(true))
        .bind(input.cache.unwrap_or(true))
        .bind(now)
        .bind(now)
        .execute(&mut *tx)
        .await
        .map_err(StorageError::from_write)?;

        replace_tools(&mut tx, &agent_id, &input.tool_ids).await?;
        replace_knowledge_sources(&mut tx, &agent_id, &input.knowledge_source_ids).await?;

        tx.commit().await.map_err(StorageError::Sqlx)?;

        self.get_agent_with_relations(&agent_id)
            .await?
            .ok_or(StorageError::NotFound)
    }

    /// Update an agent. Present collections replace the stored membership.
    pub async fn update_agent(
        &self,
        agent_id: &str,
        input: AgentUpdateInput,
    ) -> Result<AgentWithRelations, StorageError> {
        debug!("Updating agent: {}", agent_id);

        let mut updates = vec!["updated_at = ?"];

        if input.role.is_some() {
            updates.push("role = ?");
        }
        if input.backstory.is_some() {
            updates.push("backstory = ?");
        }
        if input.goal.is_some() {
            updates.push("goal = ?");
        }
        if input.llm_identifier.is_some() {
            updates.push("llm_identifier = ?");
        }
        if input.temperature.is_some() {
            updates.push("temperature = ?");
        }
        if input.max_iter.is_some() {
            updates.push("max_iter = ?");
        }
        if input.allow_delegation.is_some() {
            updates.push("allow_delegation = ?");
        }
        if input.verbose.is_some() {
            updates.push("verbose = ?");
        }
        if input.cache.is_some() {
            updates.push("cache = ?");
        }

        let query_str = format!("UPDATE agents SET {} WHERE id = ?", updates.join(", "));
        let mut query = sqlx::query(&query_str).bind(Utc::now());

        if let Some(role) = input.role {
            query = query.bind(role);
        }
        if let Some(backstory) = input.backstory {
            query = query.bind(backstory);
        }
        if let Some(goal) = input.goal {
            query = query.bind(goal);
        }
        if let Some(llm_identifier) = input.llm_identifier {
            query = query.bind(llm_identifier);
        }
        if let Some(temperature) = input.temperature {
            query = query.bind(temperature);
        }
        if let Some(max_iter) = input.max_iter {
            query = query.bind(max_iter);
        }
        if let Some(allow_delegation) = input.allow_delegation {
            query = query.bind(allow_delegation);
        }
        if let Some(verbose) = input.verbose {
            query = query.bind(verbose);
        }
        if let Some(cache) = input.cache {
            query = query.bind(cache);
        }

        let mut tx = self.pool.begin().await.map_err(StorageError::Sqlx)?;

        let result = query
            .bind(agent_id)
            .execute(&mut *tx)
            .await
            .map_err(StorageError::from_write)?;

        if result.rows_affected() == 0 {
            return Err(StorageError::NotFound);
        }

        if let Some(tool_ids) = &input.tool_ids {
            replace_tools(&mut tx, agent_id, tool_ids).await?;
        }
        if let Some(source_ids) = &input.knowledge_source_ids {
            replace_knowledge_sources(&mut tx, agent_id, source_ids).await?;
        }

        tx.commit().await.map_err(StorageError::Sqlx)?;

        self.get_agent_with_relations(agent_id)
            .await?
            .ok_or(StorageError::NotFound)
    }

    /// Delete an agent. Its join rows cascade; tasks and crews block the delete.
    pub async fn delete_agent(&self, agent_id: &str) -> Result<(), StorageError> {
        debug!("Deleting agent: {}", agent_id);

        let result = sqlx::query("DELETE FROM agents WHERE id = ?")
            .bind(agent_id)
            .execute(&self.pool)
            .await
            .map_err(StorageError::from_delete)?;

        if result.rows_affected() == 0 {
            return Err(StorageError::NotFound);
        }

        Ok(())
    }

    /// Attach a tool; attaching twice is a no-op
    pub async fn add_tool(&self, agent_id: &str, tool_id: &str) -> Result<(), StorageError> {
        debug!("Adding tool {} to agent {}", tool_id, agent_id);

        sqlx::query("INSERT OR IGNORE INTO agent_tools (agent_id, tool_id) VALUES (?, ?)")
            .bind(agent_id)
            .bind(tool_id)
            .execute(&self.pool)
            .await
            .map_err(StorageError::from_write)?;

        Ok(())
    }

    /// Detach a tool. Returns whether a membership was removed.
    pub async fn remove_tool(&self, agent_id: &str, tool_id: &str) -> Result<bool, StorageError> {
        debug!("Removing tool {} from agent {}", tool_id, agent_id);

        let result = sqlx::query("DELETE FROM agent_tools WHERE agent_id = ? AND tool_id = ?")
            .bind(agent_id)
            .bind(tool_id)
            .execute(&self.pool)
            .await
            .map_err(StorageError::Sqlx)?;

        Ok(result.rows_affected() > 0)
    }

    /// Ids of agents whose tool set contains `tool_id`
    pub async fn agents_using_tool(&self, tool_id: &str) -> Result<Vec<String>, StorageError> {
        sqlx::query_scalar(
            r#"
            SELECT a.id FROM agents a
            INNER JOIN agent_tools at ON at.agent_id = a.id
            WHERE at.tool_id = ?
            ORDER BY a.created_at, a.rowid
            "#,
        )
        .bind(tool_id)
        .fetch_all(&self.pool)
        .await
        .map_err(StorageError::Sqlx)
    }

    /// Ids of agents whose knowledge set contains `source_id`
    pub async fn agents_using_knowledge_source(
        &self,
        source_id: &str,
    ) -> Result<Vec<String>, StorageError> {
        sqlx::query_scalar(
            r#"
            SELECT a.id FROM agents a
            INNER JOIN agent_knowledge_sources aks ON aks.agent_id = a.id
            WHERE aks.knowledge_source_id = ?
            ORDER BY a.created_at, a.rowid
            "#,
        )
        .bind(source_id)
        .fetch_all(&self.pool)
        .await
        .map_err(StorageError::Sqlx)
    }
}

async fn replace_tools(
    conn: &mut SqliteConnection,
    agent_id: &str,
    tool_ids: &[String],
) -> Result<(), StorageError> {
    sqlx::query("DELETE FROM agent_tools WHERE agent_id = ?")
        .bind(agent_id)
        .execute(&mut *conn)
        .await
        .map_err(StorageError::Sqlx)?;

    for tool_id in dedupe_ids(tool_ids) {
        sqlx::query("INSERT INTO agent_tools (agent_id, tool_id) VALUES (?, ?)")
            .bind(agent_id)
            .bind(&tool_id)
            .execute(&mut *conn)
            .await
            .map_err(StorageError::from_write)?;
    }

    Ok(())
}

async fn replace_knowledge_sources(
    conn: &mut SqliteConnection,
    agent_id: &str,
    source_ids: &[String],
) -> Result<(), StorageError> {
    sqlx::query("DELETE FROM agent_knowledge_sources WHERE agent_id = ?")
        .bind(agent_id)
        .execute(&mut *conn)
        .await
        .map_err(StorageError::Sqlx)?;

    for source_id in dedupe_ids(source_ids) {
        sqlx::query(
            "INSERT INTO agent_knowledge_sources (agent_id, knowledge_source_id) VALUES (?, ?)",
        )
        .bind(agent_id)
        .bind(&source_id)
        .execute(&mut *conn)
        .await
        .map_err(StorageError::from_write)?;
    }

    Ok(())
}

/// Convert a database row to an Agent
pub fn row_to_agent(row: &sqlx::sqlite::SqliteRow) -> Result<Agent, StorageError> {
    Ok(Agent {
        id: row.try_get("id").map_err(StorageError::Sqlx)?,
        role: row.try_get("role").map_err(StorageError::Sqlx)?,
        backstory: row.try_get("backstory").map_err(StorageError::Sqlx)?,
        goal: row.try_get("goal").map_err(StorageError::Sqlx)?,
        llm_identifier: row.try_get("llm_identifier").map_err(StorageError::Sqlx)?,
        temperature: row.try_get("temperature").map_err(StorageError::Sqlx)?,
        max_iter: row.try_get("max_iter").map_err(StorageError::Sqlx)?,
        allow_delegation: row.try_get("allow_delegation").map_err(StorageError::Sqlx)?,
        verbose: row.try_get("verbose").map_err(StorageError::Sqlx)?,
        cache: row.try_get("cache").map_err(StorageError::Sqlx)?,
        created_at: row.try_get("created_at").map_err(StorageError::Sqlx)?,
        updated_at: row.try_get("updated_at").map_err(StorageError::Sqlx)?,
    })
}
