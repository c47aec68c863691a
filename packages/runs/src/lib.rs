// ABOUTME: Crew run tracking for Crewyard
// ABOUTME: Provides run types and storage with compare-and-set state transitions

pub mod storage;
pub mod types;

pub use storage::{row_to_run, RunStorage, INTERRUPTED_REASON};
pub use types::{Run, RunStatus, DEFAULT_RUN_LIST_LIMIT};
