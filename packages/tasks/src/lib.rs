// ABOUTME: Task definitions with agent assignment and context links
// ABOUTME: Provides CRUD operations and storage for tasks and their context sets

pub mod storage;
pub mod types;

pub use storage::{row_to_task, TaskStorage};
pub use types::{ContextMode, Task, TaskCreateInput, TaskUpdateInput, TaskWithRelations};
