// ABOUTME: In-process API layer for Crewyard
// ABOUTME: Integration layer that depends on all domain packages

pub mod logging;
pub mod studio;

pub use logging::init_tracing;
pub use studio::{Studio, StudioError};

pub use crewyard_engine::{RuntimeFactory, CANCELLED_REASON};
pub use crewyard_runs::{Run, RunStatus, DEFAULT_RUN_LIST_LIMIT};
pub use crewyard_services::{Referrer, ServiceError, ServiceResult};
