// ABOUTME: Crew composition for Crewyard
// ABOUTME: Ordered agent and task memberships, shared knowledge and execution policy

pub mod storage;
pub mod types;

pub use storage::{row_to_crew, CrewStorage};
pub use types::{Crew, CrewCreateInput, CrewUpdateInput, CrewWithRelations, Process};
