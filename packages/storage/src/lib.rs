// ABOUTME: Data layer and persistence for Crewyard
// ABOUTME: SQLite pool construction, embedded migrations and shared storage errors

pub mod db;
pub mod helpers;

use sqlx::error::ErrorKind;
use thiserror::Error;

pub use db::{connect, connect_in_memory, run_migrations};
pub use helpers::{dedupe_ids, Page, Table};

#[derive(Error, Debug)]
pub enum StorageError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Database error: {0}")]
    Database(String),
    #[error("Migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),
    #[error("Sqlx error: {0}")]
    Sqlx(#[from] sqlx::Error),
    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("Record not found")]
    NotFound,
    #[error("Constraint violation: {0}")]
    Constraint(String),
    #[error("Missing reference: {0}")]
    MissingReference(String),
    #[error("Record in use: {0}")]
    InUse(String),
}

pub type StorageResult<T> = Result<T, StorageError>;

impl StorageError {
    /// Classify an error raised by an INSERT or UPDATE statement
    pub fn from_write(err: sqlx::Error) -> Self {
        if let sqlx::Error::Database(db_err) = &err {
            match db_err.kind() {
                ErrorKind::UniqueViolation
                | ErrorKind::CheckViolation
                | ErrorKind::NotNullViolation => {
                    return StorageError::Constraint(db_err.message().to_string())
                }
                ErrorKind::ForeignKeyViolation => {
                    return StorageError::MissingReference(db_err.message().to_string())
                }
                _ => {}
            }
        }
        StorageError::Sqlx(err)
    }

    /// Classify an error raised by a DELETE statement
    pub fn from_delete(err: sqlx::Error) -> Self {
        if let sqlx::Error::Database(db_err) = &err {
            if db_err.kind() == ErrorKind::ForeignKeyViolation {
                return StorageError::InUse(db_err.message().to_string());
            }
        }
        StorageError::Sqlx(err)
    }
}
