// ABOUTME: Small helpers shared by the entity services
// ABOUTME: Report gating, reference checks, referrer lists and blocking validation

use crewyard_core::{EntityKind, ValidationReport};
use tracing::warn;

use crate::error::{Referrer, ServiceError, ServiceResult};

/// Turn a report with errors into `ValidationError`; log warnings otherwise
pub(crate) fn ensure_valid(
    kind: EntityKind,
    id: &str,
    report: ValidationReport,
) -> ServiceResult<()> {
    if report.has_errors() {
        return Err(ServiceError::Validation(report));
    }
    for warning in &report.warnings {
        warn!("{} {}: {}", kind, id, warning);
    }
    Ok(())
}

pub(crate) fn require_existing(kind: EntityKind, missing: Vec<String>) -> ServiceResult<()> {
    if missing.is_empty() {
        Ok(())
    } else {
        Err(ServiceError::Reference { kind, missing })
    }
}

pub(crate) fn referrers(kind: EntityKind, ids: Vec<String>) -> Vec<Referrer> {
    ids.into_iter().map(|id| Referrer::new(kind, id)).collect()
}

pub(crate) fn ensure_unreferenced(
    kind: EntityKind,
    id: &str,
    referrers: Vec<Referrer>,
) -> ServiceResult<()> {
    if referrers.is_empty() {
        Ok(())
    } else {
        Err(ServiceError::InUse {
            kind,
            id: id.to_string(),
            referrers,
        })
    }
}

/// Run a validation closure on the blocking pool; knowledge checks touch the filesystem
pub(crate) async fn validate_blocking<F>(f: F) -> ServiceResult<ValidationReport>
where
    F: FnOnce() -> ValidationReport + Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| ServiceError::Runtime(format!("validation task failed: {}", e)))
}
