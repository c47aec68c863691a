// ABOUTME: Service error taxonomy shared by services, the engine and the facade
// ABOUTME: Each variant maps to a stable kind string callers can match on

use crewyard_core::{EntityKind, ValidationReport};
use crewyard_knowledge::LoaderError;
use crewyard_storage::StorageError;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// An entity that blocks a delete
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Referrer {
    pub kind: EntityKind,
    pub id: String,
}

impl Referrer {
    pub fn new(kind: EntityKind, id: impl Into<String>) -> Self {
        Self {
            kind,
            id: id.into(),
        }
    }
}

impl fmt::Display for Referrer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.kind, self.id)
    }
}

fn join<T: fmt::Display>(items: &[T]) -> String {
    items
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

#[derive(Error, Debug)]
pub enum ServiceError {
    #[error("{kind} {id} not found")]
    NotFound { kind: EntityKind, id: String },

    #[error("unknown {kind} ids: {}", missing.join(", "))]
    Reference {
        kind: EntityKind,
        missing: Vec<String>,
    },

    #[error("constraint violated: {0}")]
    Constraint(String),

    #[error("{kind} {id} is in use by {}", join(referrers))]
    InUse {
        kind: EntityKind,
        id: String,
        referrers: Vec<Referrer>,
    },

    /// Foreign-key failure raised by the database rather than a pre-check
    #[error("reference error: {0}")]
    DanglingReference(String),

    /// Delete blocked by the database rather than a pre-check
    #[error("record is in use: {0}")]
    Blocked(String),

    #[error("validation failed: {}", .0.summary())]
    Validation(ValidationReport),

    #[error(transparent)]
    Loader(#[from] LoaderError),

    #[error("illegal state: {0}")]
    IllegalState(String),

    #[error("runtime failure: {0}")]
    Runtime(String),

    #[error("storage failure: {0}")]
    Storage(StorageError),
}

pub type ServiceResult<T> = Result<T, ServiceError>;

impl ServiceError {
    pub fn not_found(kind: EntityKind, id: impl Into<String>) -> Self {
        Self::NotFound {
            kind,
            id: id.into(),
        }
    }

    /// Stable kind string
    pub fn kind(&self) -> &'static str {
        match self {
            Self::NotFound { .. } => "NotFound",
            Self::Reference { .. } | Self::DanglingReference(_) => "ReferenceError",
            Self::Constraint(_) => "ConstraintError",
            Self::InUse { .. } | Self::Blocked(_) => "InUseError",
            Self::Validation(_) => "ValidationError",
            Self::Loader(_) => "LoaderError",
            Self::IllegalState(_) => "IllegalState",
            Self::Runtime(_) => "RuntimeFailure",
            Self::Storage(_) => "StorageFailure",
        }
    }

    pub fn report(&self) -> Option<&ValidationReport> {
        match self {
            Self::Validation(report) => Some(report),
            _ => None,
        }
    }
}

impl From<StorageError> for ServiceError {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::Constraint(msg) => Self::Constraint(msg),
            StorageError::MissingReference(msg) => Self::DanglingReference(msg),
            StorageError::InUse(msg) => Self::Blocked(msg),
            other => Self::Storage(other),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_strings() {
        assert_eq!(
            ServiceError::not_found(EntityKind::Crew, "C_1").kind(),
            "NotFound"
        );
        assert_eq!(
            ServiceError::Validation(ValidationReport::new()).kind(),
            "ValidationError"
        );
        assert_eq!(ServiceError::Runtime("x".into()).kind(), "RuntimeFailure");
    }

    #[test]
    fn test_in_use_message_lists_referrers() {
        let err = ServiceError::InUse {
            kind: EntityKind::Agent,
            id: "A_1".to_string(),
            referrers: vec![
                Referrer::new(EntityKind::Task, "T_1"),
                Referrer::new(EntityKind::Crew, "C_2"),
            ],
        };
        assert_eq!(err.to_string(), "agent A_1 is in use by task T_1, crew C_2");
    }

    #[test]
    fn test_storage_conversion() {
        let err: ServiceError = StorageError::Constraint("UNIQUE constraint failed".into()).into();
        assert_eq!(err.kind(), "ConstraintError");

        let err: ServiceError = StorageError::InUse("FOREIGN KEY constraint failed".into()).into();
        assert_eq!(err.kind(), "InUseError");

        let err: ServiceError = StorageError::NotFound.into();
        assert_eq!(err.kind(), "StorageFailure");
    }
}
