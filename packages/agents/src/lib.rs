// ABOUTME: Agent definitions for Crewyard crews
// ABOUTME: Provides agent types and storage with tool and knowledge memberships

pub mod storage;
pub mod types;

pub use storage::{row_to_agent, AgentStorage};
pub use types::{
    Agent, AgentCreateInput, AgentUpdateInput, AgentWithRelations, DEFAULT_MAX_ITER,
    DEFAULT_TEMPERATURE,
};
