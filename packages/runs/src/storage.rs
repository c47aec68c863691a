// ABOUTME: Run storage layer using SQLite
// ABOUTME: Run inserts, history queries and guarded single-statement status transitions

use chrono::Utc;
use serde_json::Value;
use sqlx::{Row, SqlitePool};
use std::collections::BTreeMap;
use tracing::debug;

use super::types::{Run, RunStatus};
use crewyard_core::{generate_id, EntityKind};
use crewyard_storage::helpers::{decode_json, encode_json};
use crewyard_storage::{Page, StorageError};

/// Recorded on runs found unfinished at start-up
pub const INTERRUPTED_REASON: &str = "interrupted: the process stopped before the run finished";

pub struct RunStorage {
    pool: SqlitePool,
}

impl RunStorage {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Insert a pending run with frozen inputs
    pub async fn create_run(
        &self,
        crew_id: &str,
        inputs: &BTreeMap<String, Value>,
    ) -> Result<Run, StorageError> {
        let run_id = generate_id(EntityKind::Run);
        let now = Utc::now();

        debug!("Creating run: {} (crew: {})", run_id, crew_id);

        sqlx::query(
            r#"
            INSERT INTO runs (id, crew_id, status, inputs, created_at)
            VALUES (?, ?, ?, ?, ?)
            "#,
        )
        .bind(&run_id)
        .bind(crew_id)
        .bind(RunStatus::Pending)
        .bind(encode_json(inputs)?)
        .bind(now)
        .execute(&self.pool)
        .await
        .map_err(StorageError::from_write)?;

        self.get_run(&run_id).await?.ok_or(StorageError::NotFound)
    }

    pub async fn get_run(&self, run_id: &str) -> Result<Option<Run>, StorageError> {
        debug!("Fetching run: {}", run_id);

        let row = sqlx::query("SELECT * FROM runs WHERE id = ?")
            .bind(run_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(StorageError::Sqlx)?;

        row.as_ref().map(row_to_run).transpose()
    }

    /// Runs of a crew, newest first
    pub async fn list_runs(&self, crew_id: &str, limit: i64) -> Result<Vec<Run>, StorageError> {
        let page = Page::new(0, limit);
        debug!("Fetching runs for crew {} (limit: {})", crew_id, page.limit);

        let rows = sqlx::query(
            "SELECT * FROM runs WHERE crew_id = ? ORDER BY created_at DESC, rowid DESC LIMIT ?",
        )
        .bind(crew_id)
        .bind(page.limit)
        .fetch_all(&self.pool)
        .await
        .map_err(StorageError::Sqlx)?;

        rows.iter().map(row_to_run).collect()
    }

    /// pending -> running. Returns false when the run had already moved on.
    pub async fn mark_running(&self, run_id: &str) -> Result<bool, StorageError> {
        let result = sqlx::query(
            "UPDATE runs SET status = ?, started_at = ? WHERE id = ? AND status = ?",
        )
        .bind(RunStatus::Running)
        .bind(Utc::now())
        .bind(run_id)
        .bind(RunStatus::Pending)
        .execute(&self.pool)
        .await
        .map_err(StorageError::Sqlx)?;

        debug!("Run {} -> running: {}", run_id, result.rows_affected() > 0);
        Ok(result.rows_affected() > 0)
    }

    /// running -> completed with the runtime output
    pub async fn mark_completed(&self, run_id: &str, result_text: &str) -> Result<bool, StorageError> {
        let result = sqlx::query(
            r#"
            UPDATE runs SET status = ?, result_text = ?, error_text = NULL, completed_at = ?
            WHERE id = ? AND status = ?
            "#,
        )
        .bind(RunStatus::Completed)
        .bind(result_text)
        .bind(Utc::now())
        .bind(run_id)
        .bind(RunStatus::Running)
        .execute(&self.pool)
        .await
        .map_err(StorageError::Sqlx)?;

        debug!("Run {} -> completed: {}", run_id, result.rows_affected() > 0);
        Ok(result.rows_affected() > 0)
    }

    /// pending|running -> failed
    pub async fn mark_failed(&self, run_id: &str, error_text: &str) -> Result<bool, StorageError> {
        self.finish_unfinished(run_id, RunStatus::Failed, error_text)
            .await
    }

    /// pending|running -> cancelled with a short reason
    pub async fn mark_cancelled(&self, run_id: &str, reason: &str) -> Result<bool, StorageError> {
        self.finish_unfinished(run_id, RunStatus::Cancelled, reason)
            .await
    }

    async fn finish_unfinished(
        &self,
        run_id: &str,
        status: RunStatus,
        error_text: &str,
    ) -> Result<bool, StorageError> {
        let result = sqlx::query(
            r#"
            UPDATE runs SET status = ?, result_text = NULL, error_text = ?, completed_at = ?
            WHERE id = ? AND status IN (?, ?)
            "#,
        )
        .bind(status)
        .bind(error_text)
        .bind(Utc::now())
        .bind(run_id)
        .bind(RunStatus::Pending)
        .bind(RunStatus::Running)
        .execute(&self.pool)
        .await
        .map_err(StorageError::Sqlx)?;

        debug!("Run {} -> {}: {}", run_id, status, result.rows_affected() > 0);
        Ok(result.rows_affected() > 0)
    }

    /// Fail every run left unfinished by a previous process. Returns how many were touched.
    pub async fn fail_interrupted_runs(&self) -> Result<u64, StorageError> {
        let result = sqlx::query(
            r#"
            UPDATE runs SET status = ?, error_text = ?, completed_at = ?
            WHERE status IN (?, ?)
            "#,
        )
        .bind(RunStatus::Failed)
        .bind(INTERRUPTED_REASON)
        .bind(Utc::now())
        .bind(RunStatus::Pending)
        .bind(RunStatus::Running)
        .execute(&self.pool)
        .await
        .map_err(StorageError::Sqlx)?;

        Ok(result.rows_affected())
    }
}

/// Convert a database row to a Run
pub fn row_to_run(row: &sqlx::sqlite::SqliteRow) -> Result<Run, StorageError> {
    Ok(Run {
        id: row.try_get("id").map_err(StorageError::Sqlx)?,
        crew_id: row.try_get("crew_id").map_err(StorageError::Sqlx)?,
        status: row.try_get("status").map_err(StorageError::Sqlx)?,
        inputs: decode_json(row.try_get("inputs").map_err(StorageError::Sqlx)?)?,
        result_text: row.try_get("result_text").map_err(StorageError::Sqlx)?,
        error_text: row.try_get("error_text").map_err(StorageError::Sqlx)?,
        created_at: row.try_get("created_at").map_err(StorageError::Sqlx)?,
        started_at: row.try_get("started_at").map_err(StorageError::Sqlx)?,
        completed_at: row.try_get("completed_at").map_err(StorageError::Sqlx)?,
    })
}
