//! `tracing` subscriber setup.

use std::fs::OpenOptions;
use std::io;
use std::sync::Arc;

use tracing_subscriber::EnvFilter;

use crate::config::EnvConfig;

pub const DEFAULT_LOG_FILTER: &str = "warn";

/// Installs the global subscriber described by `config`.
///
/// Logs go to stderr unless a log file is configured. A second call is a no-op.
/// Only failing to open the log file is reported.
pub fn init(config: &EnvConfig) -> io::Result<()> {
    let filter = env_filter(config.log_filter.as_deref());
    let builder = tracing_subscriber::fmt().with_env_filter(filter);

    let init_result = match config.log_file.as_deref() {
        Some(path) => {
            let file = OpenOptions::new().create(true).append(true).open(path)?;
            builder
                .with_writer(Arc::new(file))
                .with_ansi(false)
                .try_init()
        }
        None => builder.with_writer(io::stderr).try_init(),
    };

    if let Err(error) = init_result {
        tracing::debug!(%error, "tracing already initialized; keeping existing subscriber");
    }
    Ok(())
}

/// Parses `directives`, falling back to [`DEFAULT_LOG_FILTER`] when missing or invalid.
pub fn env_filter(directives: Option<&str>) -> EnvFilter {
    directives
        .and_then(|directives| EnvFilter::try_new(directives).ok())
        .unwrap_or_else(|| EnvFilter::new(DEFAULT_LOG_FILTER))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn invalid_directives_fall_back_to_default() {
        assert_eq!(env_filter(Some("coding_agent=loud")).to_string(), DEFAULT_LOG_FILTER);
        assert_eq!(env_filter(None).to_string(), DEFAULT_LOG_FILTER);
    }

    #[test]
    fn valid_directives_are_kept() {
        assert_eq!(
            env_filter(Some("coding_agent=debug")).to_string(),
            "coding_agent=debug"
        );
    }
}
