// ABOUTME: Knowledge source management for Crewyard
// ABOUTME: Source records, SQLite storage and the loader that feeds runtime knowledge

pub mod loader;
pub mod storage;
pub mod types;

pub use loader::{chunk_text, FsKnowledgeLoader, KnowledgeLoader, LoadedKnowledge, LoaderError};
pub use storage::{row_to_knowledge_source, KnowledgeStorage};
pub use types::{
    KnowledgeSource, KnowledgeSourceCreateInput, KnowledgeSourceUpdateInput, SourceType,
    DEFAULT_CHUNK_OVERLAP, DEFAULT_CHUNK_SIZE, MAX_CHUNK_SIZE, MIN_CHUNK_SIZE,
};
