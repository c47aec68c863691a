// ABOUTME: Shared query helpers for entity repositories
// ABOUTME: Existence checks, pagination bounds, id de-duplication and JSON column codecs

use serde::de::DeserializeOwned;
use serde::Serialize;
use sqlx::SqlitePool;
use std::collections::HashSet;

use crate::StorageError;

/// Default page size for list queries
pub const DEFAULT_PAGE_SIZE: i64 = 20;

/// Maximum page size to prevent performance issues
pub const MAX_PAGE_SIZE: i64 = 100;

/// Entity tables addressable by id. Table names never come from callers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Table {
    Tools,
    KnowledgeSources,
    Agents,
    Tasks,
    Crews,
    Runs,
}

impl Table {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Tools => "tools",
            Self::KnowledgeSources => "knowledge_sources",
            Self::Agents => "agents",
            Self::Tasks => "tasks",
            Self::Crews => "crews",
            Self::Runs => "runs",
        }
    }
}

/// Skip/limit window for list queries
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Page {
    pub skip: i64,
    pub limit: i64,
}

impl Page {
    /// Clamp skip to >= 0 and limit into 1..=MAX_PAGE_SIZE
    pub fn new(skip: i64, limit: i64) -> Self {
        Self {
            skip: skip.max(0),
            limit: limit.clamp(1, MAX_PAGE_SIZE),
        }
    }
}

impl Default for Page {
    fn default() -> Self {
        Self::new(0, DEFAULT_PAGE_SIZE)
    }
}

/// Check whether a row with `id` exists in `table`
pub async fn exists(pool: &SqlitePool, table: Table, id: &str) -> Result<bool, StorageError> {
    let query = format!("SELECT COUNT(*) FROM {} WHERE id = ?", table.name());
    let count: i64 = sqlx::query_scalar(&query)
        .bind(id)
        .fetch_one(pool)
        .await
        .map_err(StorageError::Sqlx)?;

    Ok(count > 0)
}

/// Return the ids from `ids` that have no row in `table`, in input order
pub async fn missing_ids(
    pool: &SqlitePool,
    table: Table,
    ids: &[String],
) -> Result<Vec<String>, StorageError> {
    let mut missing = Vec::new();
    for id in dedupe_ids(ids) {
        if !exists(pool, table, &id).await? {
            missing.push(id);
        }
    }
    Ok(missing)
}

/// Remove duplicate ids, keeping the first occurrence and the input order
pub fn dedupe_ids(ids: &[String]) -> Vec<String> {
    let mut seen = HashSet::new();
    ids.iter()
        .filter(|id| seen.insert(id.as_str()))
        .cloned()
        .collect()
}

/// Encode a value for a JSON text column
pub fn encode_json<T: Serialize>(value: &T) -> Result<String, StorageError> {
    serde_json::to_string(value).map_err(StorageError::Json)
}

/// Decode a JSON text column, treating NULL as the type's default
pub fn decode_json<T: DeserializeOwned + Default>(raw: Option<String>) -> Result<T, StorageError> {
    match raw {
        Some(text) if !text.is_empty() => serde_json::from_str(&text).map_err(StorageError::Json),
        _ => Ok(T::default()),
    }
}
