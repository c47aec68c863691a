// ABOUTME: Tool definitions attachable to agents
// ABOUTME: Provides types and storage layer for parameterized tools

pub mod storage;
pub mod types;

// Re-export main types
pub use storage::{row_to_tool, ToolStorage};
pub use types::{ParameterMap, ParameterMetadata, Tool, ToolCreateInput, ToolUpdateInput};
