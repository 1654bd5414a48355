use serde::Deserialize;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;
use tracing::info;

use crate::core::llm::RetryPolicy;
use crate::core::llm::registry::ProviderDef;

pub const ENV_API_HOST: &str = "CUBEWISE_API_HOST";
pub const ENV_API_PORT: &str = "CUBEWISE_API_PORT";
pub const ENV_DB: &str = "CUBEWISE_DB";
pub const ENV_LOG: &str = "CUBEWISE_LOG";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid config {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("{var} has invalid value '{value}'")]
    InvalidEnv { var: String, value: String },
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub api_host: String,
    pub api_port: u16,
    /// SQLite file backing the cube. In-memory and freshly seeded when unset.
    pub db_path: Option<PathBuf>,
    pub dataset_rows: usize,
    pub dataset_seed: u64,
    pub request_timeout_secs: u64,
    pub log_filter: Option<String>,
    pub llm: LlmSettings,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LlmSettings {
    pub retry_attempts: u32,
    pub retry_delay_ms: u64,
    pub max_tokens: u32,
    /// Provider id → model id, replacing the registry default.
    pub model_overrides: HashMap<String, String>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            api_host: "127.0.0.1".to_string(),
            api_port: 17890,
            db_path: None,
            dataset_rows: 10_000,
            dataset_seed: 42,
            request_timeout_secs: 120,
            log_filter: None,
            llm: LlmSettings::default(),
        }
    }
}

impl Default for LlmSettings {
    fn default() -> Self {
        Self {
            retry_attempts: 3,
            retry_delay_ms: 3000,
            max_tokens: 1500,
            model_overrides: HashMap::new(),
        }
    }
}

impl LlmSettings {
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.retry_attempts.max(1),
            delay: Duration::from_millis(self.retry_delay_ms),
        }
    }

    pub fn model_for(&self, provider: &ProviderDef) -> String {
        self.model_overrides
            .get(&provider.id)
            .cloned()
            .unwrap_or_else(|| provider.default_model.clone())
    }
}

pub fn default_config_path() -> Option<PathBuf> {
    dirs::home_dir().map(|h| h.join(".cubewise").join("config.toml"))
}

impl AppConfig {
    /// Reads `path` (or the default location) and applies environment
    /// overrides. A missing file yields defaults; a malformed one is an error.
    pub async fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let path = path.map(Path::to_path_buf).or_else(default_config_path);
        let mut config = match path {
            Some(path) if path.exists() => {
                let content = tokio::fs::read_to_string(&path)
                    .await
                    .map_err(|source| ConfigError::Read {
                        path: path.clone(),
                        source,
                    })?;
                let config = Self::from_toml(&content).map_err(|source| ConfigError::Parse {
                    path: path.clone(),
                    source,
                })?;
                info!("Loaded config from {}", path.display());
                config
            }
            _ => Self::default(),
        };
        config.apply_env(|var| std::env::var(var).ok())?;
        Ok(config)
    }

    pub fn from_toml(content: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(content)
    }

    pub fn apply_env<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let lookup = |var: &str| lookup(var).filter(|v| !v.trim().is_empty());
        if let Some(host) = lookup(ENV_API_HOST) {
            self.api_host = host;
        }
        if let Some(port) = lookup(ENV_API_PORT) {
            self.api_port = port.trim().parse().map_err(|_| ConfigError::InvalidEnv {
                var: ENV_API_PORT.to_string(),
                value: port,
            })?;
        }
        if let Some(db) = lookup(ENV_DB) {
            self.db_path = Some(PathBuf::from(db));
        }
        if let Some(filter) = lookup(ENV_LOG) {
            self.log_filter = Some(filter);
        }
        Ok(())
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.api_host, self.api_port)
    }
}
