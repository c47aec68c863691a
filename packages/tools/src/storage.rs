// ABOUTME: Tool storage layer using SQLite
// ABOUTME: Handles CRUD operations for tools with JSON parameter columns

use chrono::Utc;
use sqlx::{Row, SqlitePool};
use tracing::debug;

use super::types::{Tool, ToolCreateInput, ToolUpdateInput};
use crewyard_core::{generate_id, EntityKind};
use crewyard_storage::helpers::{self, decode_json, encode_json};
use crewyard_storage::{Page, StorageError, Table};

pub struct ToolStorage {
    pool: SqlitePool,
}

impl ToolStorage {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// List tools ordered by creation time
    pub async fn list_tools(&self, skip: i64, limit: i64) -> Result<Vec<Tool>, StorageError> {
        let page = Page::new(skip, limit);
        debug!("Fetching tools (skip: {}, limit: {})", page.skip, page.limit);

        let rows = sqlx::query("SELECT * FROM tools ORDER BY created_at, rowid LIMIT ? OFFSET ?")
            .bind(page.limit)
            .bind(page.skip)
            .fetch_all(&self.pool)
            .await
            .map_err(StorageError::Sqlx)?;

        rows.iter().map(row_to_tool).collect()
    }

    /// Get a single tool by ID
    pub async fn get_tool(&self, tool_id: &str) -> Result<Option<Tool>, StorageError> {
        debug!("Fetching tool: {}", tool_id);

        let row = sqlx::query("SELECT * FROM tools WHERE id = ?")
            .bind(tool_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(StorageError::Sqlx)?;

        row.as_ref().map(row_to_tool).transpose()
    }

    pub async fn tool_exists(&self, tool_id: &str) -> Result<bool, StorageError> {
        helpers::exists(&self.pool, Table::Tools, tool_id).await
    }

    /// Ids from `tool_ids` that do not exist
    pub async fn missing_tool_ids(&self, tool_ids: &[String]) -> Result<Vec<String>, StorageError> {
        helpers::missing_ids(&self.pool, Table::Tools, tool_ids).await
    }

    /// Create a new tool
    pub async fn create_tool(&self, input: ToolCreateInput) -> Result<Tool, StorageError> {
        let tool_id = generate_id(EntityKind::Tool);
        let now = Utc::now();

        debug!("Creating tool: {} (name: {})", tool_id, input.name);

        let parameters = encode_json(&input.parameters.unwrap_or_default())?;
        let metadata = encode_json(&input.parameters_metadata.unwrap_or_default())?;

        sqlx::query(
            r#"
            INSERT INTO tools (id, name, description, parameters, parameters_metadata, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&tool_id)
        .bind(&input.name)
        .bind(input.description.unwrap_or_default())
        .bind(parameters)
        .bind(metadata)
        .bind(now)
        .bind(now)
        .execute(&self.pool)
        .await
        .map_err(StorageError::from_write)?;

        self.get_tool(&tool_id).await?.ok_or(StorageError::NotFound)
    }

    /// Update a tool; only fields present in `input` are written
    pub async fn update_tool(
        &self,
        tool_id: &str,
        input: ToolUpdateInput,
    ) -> Result<Tool, StorageError> {
        debug!("Updating tool: {}", tool_id);

        let parameters = input.parameters.as_ref().map(encode_json).transpose()?;
        let metadata = input
            .parameters_metadata
            .as_ref()
            .map(encode_json)
            .transpose()?;

        // Build update query dynamically based on provided fields
        let mut updates = vec!["updated_at = ?"];

        if input.name.is_some() {
            updates.push("name = ?");
        }
        if input.description.is_some() {
            updates.push("description = ?");
        }
        if parameters.is_some() {
            updates.push("parameters = ?");
        }
        if metadata.is_some() {
            updates.push("parameters_metadata = ?");
        }

        let query_str = format!("UPDATE tools SET {} WHERE id = ?", updates.join(", "));
        let mut query = sqlx::query(&query_str).bind(Utc::now());

        // Bind parameters in the same order
        if let Some(name) = input.name {
            query = query.bind(name);
        }
        if let Some(description) = input.description {
            query = query.bind(description);
        }
        if let Some(parameters) = parameters {
            query = query.bind(parameters);
        }
        if let Some(metadata) = metadata {
            query = query.bind(metadata);
        }

        let result = query
            .bind(tool_id)
            .execute(&self.pool)
            .await
            .map_err(StorageError::from_write)?;

        if result.rows_affected() == 0 {
            return Err(StorageError::NotFound);
        }

        self.get_tool(tool_id).await?.ok_or(StorageError::NotFound)
    }

    /// Delete a tool. Fails with `InUse` while an agent still references it.
    pub async fn delete_tool(&self, tool_id: &str) -> Result<(), StorageError> {
        debug!("Deleting tool: {}", tool_id);

        let result = sqlx::query("DELETE FROM tools WHERE id = ?")
            .bind(tool_id)
            .execute(&self.pool)
            .await
            .map_err(StorageError::from_delete)?;

        if result.rows_affected() == 0 {
            return Err(StorageError::NotFound);
        }

        Ok(())
    }
}

/// Convert a database row to a Tool
pub fn row_to_tool(row: &sqlx::sqlite::SqliteRow) -> Result<Tool, StorageError> {
    Ok(Tool {
        id: row.try_get("id").map_err(StorageError::Sqlx)?,
        name: row.try_get("name").map_err(StorageError::Sqlx)?,
        description: row.try_get("description").map_err(StorageError::Sqlx)?,
        parameters: decode_json(row.try_get("parameters").map_err(StorageError::Sqlx)?)?,
        parameters_metadata: decode_json(
            row.try_get("parameters_metadata")
                .map_err(StorageError::Sqlx)?,
        )?,
        created_at: row.try_get("created_at").map_err(StorageError::Sqlx)?,
        updated_at: row.try_get("updated_at").map_err(StorageError::Sqlx)?,
    })
}
