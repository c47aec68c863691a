// ABOUTME: Core types and utilities for Crewyard
// ABOUTME: Foundational package providing ids, configuration and validation reports

pub mod config;
pub mod constants;
pub mod ids;
pub mod serde_helpers;
pub mod validation;

// Re-export main types
pub use config::{Config, ConfigError};
pub use ids::{generate_id, EntityKind};
pub use validation::ValidationReport;

// Re-export constants
pub use constants::{crewyard_dir, default_database_path, default_knowledge_dir};
