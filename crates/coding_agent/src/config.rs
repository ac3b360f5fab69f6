//! Agent configuration: optional JSON file plus environment overrides.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;
use thiserror::Error;

use crate::tools::PermissionLevel;

pub const CONFIG_PATH_ENV_VAR: &str = "CODING_AGENT_CONFIG_PATH";
pub const API_KEY_ENV_VAR: &str = "CODING_AGENT_API_KEY";
pub const BASE_URL_ENV_VAR: &str = "CODING_AGENT_BASE_URL";
pub const MODEL_ENV_VAR: &str = "CODING_AGENT_MODEL";

pub const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";
pub const DEFAULT_MODEL: &str = "gpt-4o-mini";
pub const DEFAULT_MAX_TOKENS: u32 = 4096;
pub const DEFAULT_TIMEOUT_SEC: u64 = 120;
pub const DEFAULT_MAX_TURNS: u32 = crate::agent::DEFAULT_MAX_TURNS;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid config file {}: {source}", path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("config field '{field}' must be > 0")]
    NotPositive { field: &'static str },
    #[error("config field '{field}' must not be blank")]
    Blank { field: &'static str },
    #[error("{0}")]
    Permission(String),
}

/// On-disk shape. Every field is optional.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
struct ConfigFile {
    base_url: Option<String>,
    api_key: Option<String>,
    model: Option<String>,
    max_tokens: Option<u32>,
    timeout_sec: Option<u64>,
    max_turns: Option<u32>,
    permission: Option<String>,
    system_prompt: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AgentConfig {
    pub base_url: String,
    pub api_key: Option<String>,
    pub model: String,
    pub max_tokens: u32,
    pub timeout: Duration,
    pub max_turns: u32,
    pub permission: PermissionLevel,
    pub system_prompt: Option<String>,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            api_key: None,
            model: DEFAULT_MODEL.to_string(),
            max_tokens: DEFAULT_MAX_TOKENS,
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SEC),
            max_turns: DEFAULT_MAX_TURNS,
            permission: PermissionLevel::default(),
            system_prompt: None,
        }
    }
}

impl AgentConfig {
    /// Loads from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Loads using `lookup` in place of the process environment.
    ///
    /// The file named by [`CONFIG_PATH_ENV_VAR`] is read first; the API key,
    /// base URL and model variables then override it.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let var = |key: &str| {
            lookup(key)
                .map(|value| value.trim().to_string())
                .filter(|value| !value.is_empty())
        };

        let mut config = match var(CONFIG_PATH_ENV_VAR) {
            Some(path) => Self::from_file(Path::new(&path))?,
            None => Self::default(),
        };

        if let Some(api_key) = var(API_KEY_ENV_VAR) {
            config.api_key = Some(api_key);
        }
        if let Some(base_url) = var(BASE_URL_ENV_VAR) {
            config.base_url = base_url;
        }
        if let Some(model) = var(MODEL_ENV_VAR) {
            config.model = model;
        }

        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let raw = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let file: ConfigFile = serde_json::from_str(&raw).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_parsed(file)
    }

    fn from_parsed(file: ConfigFile) -> Result<Self, ConfigError> {
        let defaults = Self::default();

        let base_url = match file.base_url {
            Some(value) => non_blank(value, "base_url")?,
            None => defaults.base_url,
        };
        let model = match file.model {
            Some(value) => non_blank(value, "model")?,
            None => defaults.model,
        };
        let permission = match file.permission {
            Some(value) => value.parse().map_err(ConfigError::Permission)?,
            None => defaults.permission,
        };

        Ok(Self {
            base_url,
            api_key: file
                .api_key
                .map(|key| key.trim().to_string())
                .filter(|key| !key.is_empty()),
            model,
            max_tokens: positive(file.max_tokens, "max_tokens")?.unwrap_or(defaults.max_tokens),
            timeout: positive(file.timeout_sec, "timeout_sec")?
                .map(Duration::from_secs)
                .unwrap_or(defaults.timeout),
            max_turns: positive(file.max_turns, "max_turns")?.unwrap_or(defaults.max_turns),
            permission,
            system_prompt: file
                .system_prompt
                .map(|prompt| prompt.trim().to_string())
                .filter(|prompt| !prompt.is_empty()),
        })
    }
}

fn positive<T>(value: Option<T>, field: &'static str) -> Result<Option<T>, ConfigError>
where
    T: Copy + PartialEq + Default,
{
    match value {
        Some(value) if value == T::default() => Err(ConfigError::NotPositive { field }),
        other => Ok(other),
    }
}

fn non_blank(value: String, field: &'static str) -> Result<String, ConfigError> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        Err(ConfigError::Blank { field })
    } else {
        Ok(trimmed.to_string())
    }
}
