//! Environment configuration shared by every binary in the workspace.

use std::env;

pub const LOG_FILTER_ENV_VAR: &str = "AGENTLOOP_LOG";
pub const LOG_FILE_ENV_VAR: &str = "AGENTLOOP_LOG_FILE";

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EnvConfig {
    /// `tracing` filter directives, e.g. `coding_agent=debug,warn`.
    pub log_filter: Option<String>,
    /// Log file appended to instead of stderr.
    pub log_file: Option<String>,
}

impl EnvConfig {
    pub fn from_env() -> Self {
        Self {
            log_filter: env_string_opt(LOG_FILTER_ENV_VAR),
            log_file: env_string_opt(LOG_FILE_ENV_VAR),
        }
    }
}

fn env_string_opt(key: &str) -> Option<String> {
    env::var(key).ok().and_then(|value| {
        if value.trim().is_empty() {
            None
        } else {
            Some(value)
        }
    })
}
