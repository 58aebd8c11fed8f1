//! Tracing subscriber setup for binaries.
//!
//! The library only emits events; binaries call [`init`] once. `RUST_LOG`
//! overrides the configured default filter. With a log directory, output goes
//! to a non-blocking file writer and the returned guard must be kept alive
//! until exit so buffered lines are flushed.

use std::path::PathBuf;

use thiserror::Error;
pub use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

pub const DEFAULT_LOG_FILE: &str = "tilestream.log";
pub const DEFAULT_FILTER: &str = "info,tilestream=debug";

#[derive(Debug, Error)]
pub enum LoggingError {
    #[error("Failed to create log directory {path}: {source}")]
    CreateDir {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to install tracing subscriber: {0}")]
    Init(String),
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LoggingConfig {
    /// Write to `directory/file_name` instead of stderr.
    pub directory: Option<PathBuf>,
    pub file_name: String,
    pub default_filter: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            directory: None,
            file_name: DEFAULT_LOG_FILE.to_string(),
            default_filter: DEFAULT_FILTER.to_string(),
        }
    }
}

impl LoggingConfig {
    pub fn with_directory(mut self, directory: impl Into<PathBuf>) -> Self {
        self.directory = Some(directory.into());
        self
    }

    pub fn with_filter(mut self, filter: impl Into<String>) -> Self {
        self.default_filter = filter.into();
        self
    }

    fn env_filter(&self) -> EnvFilter {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&self.default_filter))
    }
}

/// Installs the global subscriber.
pub fn init(config: &LoggingConfig) -> Result<Option<WorkerGuard>, LoggingError> {
    let filter = config.env_filter();

    match &config.directory {
        Some(directory) => {
            std::fs::create_dir_all(directory).map_err(|source| LoggingError::CreateDir {
                path: directory.clone(),
                source,
            })?;
            let appender = tracing_appender::rolling::never(directory, &config.file_name);
            let (writer, guard) = tracing_appender::non_blocking(appender);

            tracing_subscriber::registry()
                .with(filter)
                .with(fmt::layer().with_writer(writer).with_ansi(false))
                .try_init()
                .map_err(|e| LoggingError::Init(e.to_string()))?;
            Ok(Some(guard))
        }
        None => {
            tracing_subscriber::registry()
                .with(filter)
                .with(fmt::layer().with_target(false).with_writer(std::io::stderr))
                .try_init()
                .map_err(|e| LoggingError::Init(e.to_string()))?;
            Ok(None)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = LoggingConfig::default();
        assert!(config.directory.is_none());
        assert_eq!(config.file_name, DEFAULT_LOG_FILE);
        assert_eq!(config.default_filter, DEFAULT_FILTER);
    }

    #[test]
    fn test_builders() {
        let config = LoggingConfig::default()
            .with_directory("/tmp/logs")
            .with_filter("warn");
        assert_eq!(config.directory, Some(PathBuf::from("/tmp/logs")));
        assert_eq!(config.default_filter, "warn");
    }

    #[test]
    fn test_init_creates_log_directory() {
        let dir = tempfile::tempdir().unwrap();
        let logs = dir.path().join("logs");
        let config = LoggingConfig::default().with_directory(&logs);

        // Another test in this process may already own the global subscriber.
        let result = init(&config);
        assert!(logs.is_dir());
        if let Ok(guard) = result {
            assert!(guard.is_some());
        }
    }
}
