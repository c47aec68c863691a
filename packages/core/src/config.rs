// ABOUTME: Runtime configuration loaded from CREWYARD_* environment variables
// ABOUTME: Database URL, knowledge directory, pool size, LLM allowlist and log filter

use std::env;
use std::num::ParseIntError;
use std::path::PathBuf;
use thiserror::Error;

use crate::constants::{default_database_path, default_knowledge_dir};

pub const ENV_DATABASE_URL: &str = "CREWYARD_DATABASE_URL";
pub const ENV_KNOWLEDGE_DIR: &str = "CREWYARD_KNOWLEDGE_DIR";
pub const ENV_MAX_CONNECTIONS: &str = "CREWYARD_MAX_CONNECTIONS";
pub const ENV_LLM_ALLOWLIST: &str = "CREWYARD_LLM_ALLOWLIST";
pub const ENV_LOG: &str = "CREWYARD_LOG";

const DEFAULT_MAX_CONNECTIONS: u32 = 10;
const DEFAULT_LOG_FILTER: &str = "info";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Invalid max connections: {0}")]
    InvalidMaxConnections(#[from] ParseIntError),
    #[error("Max connections {0} is out of valid range (1-100)")]
    MaxConnectionsOutOfRange(u32),
    #[error("Unsupported database URL: {0} (only sqlite: URLs are supported)")]
    UnsupportedDatabase(String),
}

#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub knowledge_dir: PathBuf,
    pub max_connections: u32,
    pub llm_allowlist: Option<Vec<String>>,
    pub log_filter: String,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build a config from an arbitrary variable source
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let database_url = lookup(ENV_DATABASE_URL)
            .unwrap_or_else(|| format!("sqlite:{}", default_database_path().display()));

        if !database_url.starts_with("sqlite:") {
            return Err(ConfigError::UnsupportedDatabase(database_url));
        }

        let knowledge_dir = lookup(ENV_KNOWLEDGE_DIR)
            .map(PathBuf::from)
            .unwrap_or_else(default_knowledge_dir);

        let max_connections = match lookup(ENV_MAX_CONNECTIONS) {
            Some(raw) => raw.trim().parse::<u32>()?,
            None => DEFAULT_MAX_CONNECTIONS,
        };

        if !(1..=100).contains(&max_connections) {
            return Err(ConfigError::MaxConnectionsOutOfRange(max_connections));
        }

        // Unset or blank means every identifier is accepted
        let llm_allowlist = lookup(ENV_LLM_ALLOWLIST)
            .map(|raw| {
                raw.split(',')
                    .map(|s| s.trim().to_string())
                    .filter(|s| !s.is_empty())
                    .collect::<Vec<_>>()
            })
            .filter(|list| !list.is_empty());

        let log_filter = lookup(ENV_LOG).unwrap_or_else(|| DEFAULT_LOG_FILTER.to_string());

        Ok(Config {
            database_url,
            knowledge_dir,
            max_connections,
            llm_allowlist,
            log_filter,
        })
    }
}
