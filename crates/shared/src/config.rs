use std::env;
use std::path::{Path, PathBuf};
use std::time::Duration;

use thiserror::Error;

use crate::config_env::{optional_trimmed_env, parse_u32_env, parse_u64_env};

const DEFAULT_BIND_ADDR: &str = "127.0.0.1:8080";
const LOCAL_DATABASE_FILE_NAME: &str = "student.db";
const DEFAULT_CONNECTION_TTL_SECONDS: u64 = 2 * 60 * 60;
const DEFAULT_SESSION_IDLE_TTL_SECONDS: u64 = 24 * 60 * 60;
const DEFAULT_SESSION_PRUNE_INTERVAL_SECONDS: u64 = 300;
const DEFAULT_DATABASE_MAX_CONNECTIONS: u32 = 5;
const DEFAULT_AGENT_MAX_ITERATIONS: u32 = 15;
const DEFAULT_AGENT_TOP_K: u32 = 10;

#[derive(Debug, Clone)]
pub struct ApiConfig {
    pub bind_addr: String,
    pub local_database_path: PathBuf,
    pub connection_ttl_seconds: u64,
    pub session_idle_ttl_seconds: u64,
    pub session_prune_interval_seconds: u64,
    pub database_max_connections: u32,
    pub agent_max_iterations: u32,
    pub agent_top_k: u32,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing required env var {0}")]
    MissingVar(String),
    #[error("invalid integer in env var {key}: {value}")]
    ParseInt { key: String, value: String },
    #[error("invalid configuration: {0}")]
    InvalidConfiguration(String),
    #[error("failed to build http client: {0}")]
    HttpClient(String),
    #[error("failed to load .env file: {0}")]
    Dotenv(String),
}

impl ApiConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        let config = Self {
            bind_addr: optional_trimmed_env("API_BIND_ADDR")
                .unwrap_or_else(|| DEFAULT_BIND_ADDR.to_string()),
            local_database_path: resolve_local_database_path(
                optional_trimmed_env("LOCAL_DATABASE_PATH"),
                env::current_exe().ok().as_deref(),
            ),
            connection_ttl_seconds: parse_u64_env(
                "CONNECTION_TTL_SECONDS",
                DEFAULT_CONNECTION_TTL_SECONDS,
            )?,
            session_idle_ttl_seconds: parse_u64_env(
                "SESSION_IDLE_TTL_SECONDS",
                DEFAULT_SESSION_IDLE_TTL_SECONDS,
            )?,
            session_prune_interval_seconds: parse_u64_env(
                "SESSION_PRUNE_INTERVAL_SECONDS",
                DEFAULT_SESSION_PRUNE_INTERVAL_SECONDS,
            )?,
            database_max_connections: parse_u32_env(
                "DATABASE_MAX_CONNECTIONS",
                DEFAULT_DATABASE_MAX_CONNECTIONS,
            )?,
            agent_max_iterations: parse_u32_env(
                "AGENT_MAX_ITERATIONS",
                DEFAULT_AGENT_MAX_ITERATIONS,
            )?,
            agent_top_k: parse_u32_env("AGENT_TOP_K", DEFAULT_AGENT_TOP_K)?,
        };
        config.validate()?;
        Ok(config)
    }

    pub fn connection_ttl(&self) -> Duration {
        Duration::from_secs(self.connection_ttl_seconds)
    }

    pub fn session_idle_ttl(&self) -> Duration {
        Duration::from_secs(self.session_idle_ttl_seconds)
    }

    pub fn session_prune_interval(&self) -> Duration {
        Duration::from_secs(self.session_prune_interval_seconds)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.connection_ttl_seconds == 0 {
            return Err(ConfigError::InvalidConfiguration(
                "CONNECTION_TTL_SECONDS must be greater than 0".to_string(),
            ));
        }
        if self.session_prune_interval_seconds == 0 {
            return Err(ConfigError::InvalidConfiguration(
                "SESSION_PRUNE_INTERVAL_SECONDS must be greater than 0".to_string(),
            ));
        }
        if self.database_max_connections == 0 {
            return Err(ConfigError::InvalidConfiguration(
                "DATABASE_MAX_CONNECTIONS must be greater than 0".to_string(),
            ));
        }
        if self.agent_max_iterations == 0 {
            return Err(ConfigError::InvalidConfiguration(
                "AGENT_MAX_ITERATIONS must be greater than 0".to_string(),
            ));
        }
        Ok(())
    }
}

/// An explicit `LOCAL_DATABASE_PATH` wins. Otherwise the file sits next to the
/// running executable, or in the working directory when that cannot be determined.
fn resolve_local_database_path(configured: Option<String>, executable: Option<&Path>) -> PathBuf {
    if let Some(path) = configured {
        return PathBuf::from(path);
    }

    executable
        .and_then(Path::parent)
        .map(Path::to_path_buf)
        .or_else(|| env::current_dir().ok())
        .unwrap_or_default()
        .join(LOCAL_DATABASE_FILE_NAME)
}

/// Loads `.env` from the working directory or its parents. A missing file is not an error.
pub fn load_dotenv() -> Result<(), ConfigError> {
    dotenv_outcome(dotenvy::dotenv())
}

fn dotenv_outcome<T>(result: Result<T, dotenvy::Error>) -> Result<(), ConfigError> {
    match result {
        Ok(_) => Ok(()),
        Err(err) if err.not_found() => Ok(()),
        Err(err) => Err(ConfigError::Dotenv(err.to_string())),
    }
}
