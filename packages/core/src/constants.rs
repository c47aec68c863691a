use std::env;
use std::path::PathBuf;

/// Name of the per-user data directory
pub const DATA_DIR_NAME: &str = ".crewyard";

/// Database file name inside the data directory
pub const DATABASE_FILE: &str = "crewyard.db";

/// Knowledge file directory inside the data directory
pub const KNOWLEDGE_DIR_NAME: &str = "knowledge";

/// Get the path to the Crewyard directory (~/.crewyard)
pub fn crewyard_dir() -> PathBuf {
    // First try HOME environment variable (useful for tests)
    if let Ok(home) = env::var("HOME") {
        PathBuf::from(home).join(DATA_DIR_NAME)
    } else {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(DATA_DIR_NAME)
    }
}

/// Get the default database path (~/.crewyard/crewyard.db)
pub fn default_database_path() -> PathBuf {
    crewyard_dir().join(DATABASE_FILE)
}

/// Get the default knowledge base directory (~/.crewyard/knowledge)
pub fn default_knowledge_dir() -> PathBuf {
    crewyard_dir().join(KNOWLEDGE_DIR_NAME)
}
