// ABOUTME: Knowledge source storage layer using SQLite
// ABOUTME: Handles CRUD operations for knowledge sources

use chrono::Utc;
use sqlx::{Row, SqlitePool};
use tracing::debug;

use super::types::{
    KnowledgeSource, KnowledgeSourceCreateInput, KnowledgeSourceUpdateInput,
    DEFAULT_CHUNK_OVERLAP, DEFAULT_CHUNK_SIZE,
};
use crewyard_core::{generate_id, EntityKind};
use crewyard_storage::helpers::{self, decode_json, encode_json};
use crewyard_storage::{Page, StorageError, Table};

pub struct KnowledgeStorage {
    pool: SqlitePool,
}

impl KnowledgeStorage {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// List knowledge sources ordered by creation time
    pub async fn list_knowledge_sources(
        &self,
        skip: i64,
        limit: i64,
    ) -> Result<Vec<KnowledgeSource>, StorageError> {
        let page = Page::new(skip, limit);
        debug!(
            "Fetching knowledge sources (skip: {}, limit: {})",
            page.skip, page.limit
        );

        let rows = sqlx::query(
            "SELECT * FROM knowledge_sources ORDER BY created_at, rowid LIMIT ? OFFSET ?",
        )
        .bind(page.limit)
        .bind(page.skip)
        .fetch_all(&self.pool)
        .await
        .map_err(StorageError::Sqlx)?;

        rows.iter().map(row_to_knowledge_source).collect()
    }

    pub async fn get_knowledge_source(
        &self,
        source_id: &str,
    ) -> Result<Option<KnowledgeSource>, StorageError> {
        debug!("Fetching knowledge source: {}", source_id);

        let row = sqlx::query("SELECT * FROM knowledge_sources WHERE id = ?")
            .bind(source_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(StorageError::Sqlx)?;

        row.as_ref().map(row_to_knowledge_source).transpose()
    }

    pub async fn knowledge_source_exists(&self, source_id: &str) -> Result<bool, StorageError> {
        helpers::exists(&self.pool, Table::KnowledgeSources, source_id).await
    }

    pub async fn missing_knowledge_source_ids(
        &self,
        source_ids: &[String],
    ) -> Result<Vec<String>, StorageError> {
        helpers::missing_ids(&self.pool, Table::KnowledgeSources, source_ids).await
    }

    /// Create a knowledge source, filling chunking defaults when absent
    pub async fn create_knowledge_source(
        &self,
        input: KnowledgeSourceCreateInput,
    ) -> Result<KnowledgeSource, StorageError> {
        let source_id = generate_id(EntityKind::KnowledgeSource);
        let now = Utc::now();

        debug!(
            "Creating knowledge source: {} (name: {}, type: {})",
            source_id, input.name, input.source_type
        );

        let metadata = encode_json(&input.metadata.unwrap_or_default())?;

        sqlx::query(
            r#"
            INSERT INTO knowledge_sources (
                id, name, source_type, source_path, content, metadata,
                chunk_size, chunk_overlap, created_at, updated_at
            )
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&source_id)
        .bind(&input.name)
        .bind(input.source_type)
        .bind(&input.source_path)
        .bind(&input.content)
        .bind(metadata)
        .bind(input.chunk_size.unwrap_or(DEFAULT_CHUNK_SIZE))
        .bind(input.chunk_overlap.unwrap_or(DEFAULT_CHUNK_OVERLAP))
        .bind(now)
        .bind(now)
        .execute(&self.pool)
        .await
        .map_err(StorageError::from_write)?;

        self.get_knowledge_source(&source_id)
            .await?
            .ok_or(StorageError::NotFound)
    }

    pub async fn update_knowledge_source(
        &self,
        source_id: &str,
        input: KnowledgeSourceUpdateInput,
    ) -> Result<KnowledgeSource, StorageError> {
        debug!("Updating knowledge source: {}", source_id);

        let metadata = input.metadata.as_ref().map(encode_json).transpose()?;

        let mut updates = vec!["updated_at = ?"];

        if input.name.is_some() {
            updates.push("name = ?");
        }
        if input.source_type.is_some() {
            updates.push("source_type = ?");
        }
        if input.source_path.is_some() {
            updates.push("source_path = ?");
        }
        if input.content.is_some() {
            updates.push("content = ?");
        }
        if metadata.is_some() {
            updates.push("metadata = ?");
        }
        if input.chunk_size.is_some() {
            updates.push("chunk_size = ?");
        }
        if input.chunk_overlap.is_some() {
            updates.push("chunk_overlap = ?");
        }

        let query_str = format!(
            "UPDATE knowledge_sources SET {} WHERE id = ?",
            updates.join(", ")
        );
        let mut query = sqlx::query(&query_str).bind(Utc::now());

        if let Some(name) = input.name {
            query = query.bind(name);
        }
        if let Some(source_type) = input.source_type {
            query = query.bind(source_type);
        }
        if let Some(source_path) = input.source_path {
            query = query.bind(source_path);
        }
        if let Some(content) = input.content {
            query = query.bind(content);
        }
        if let Some(metadata) = metadata {
            query = query.bind(metadata);
        }
        if let Some(chunk_size) = input.chunk_size {
            query = query.bind(chunk_size);
        }
        if let Some(chunk_overlap) = input.chunk_overlap {
            query = query.bind(chunk_overlap);
        }

        let result = query
            .bind(source_id)
            .execute(&self.pool)
            .await
            .map_err(StorageError::from_write)?;

        if result.rows_affected() == 0 {
            return Err(StorageError::NotFound);
        }

        self.get_knowledge_source(source_id)
            .await?
            .ok_or(StorageError::NotFound)
    }

    /// Delete a knowledge source. Fails with `InUse` while an agent or crew references it.
    pub async fn delete_knowledge_source(&self, source_id: &str) -> Result<(), StorageError> {
        debug!("Deleting knowledge source: {}", source_id);

        let result = sqlx::query("DELETE FROM knowledge_sources WHERE id = ?")
            .bind(source_id)
            .execute(&self.pool)
            .await
            .map_err(StorageError::from_delete)?;

        if result.rows_affected() == 0 {
            return Err(StorageError::NotFound);
        }

        Ok(())
    }
}

/// Convert a database row to a KnowledgeSource
pub fn row_to_knowledge_source(
    row: &sqlx::sqlite::SqliteRow,
) -> Result<KnowledgeSource, StorageError> {
    Ok(KnowledgeSource {
        id: row.try_get("id").map_err(StorageError::Sqlx)?,
        name: row.try_get("name").map_err(StorageError::Sqlx)?,
        source_type: row.try_get("source_type").map_err(StorageError::Sqlx)?,
        source_path: row.try_get("source_path").map_err(StorageError::Sqlx)?,
        content: row.try_get("content").map_err(StorageError::Sqlx)?,
        metadata: decode_json(row.try_get("metadata").map_err(StorageError::Sqlx)?)?,
        chunk_size: row.try_get("chunk_size").map_err(StorageError::Sqlx)?,
        chunk_overlap: row.try_get("chunk_overlap").map_err(StorageError::Sqlx)?,
        created_at: row.try_get("created_at").map_err(StorageError::Sqlx)?,
        updated_at: row.try_get("updated_at").map_err(StorageError::Sqlx)?,
    })
}
