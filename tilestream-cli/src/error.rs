//! CLI error type.

use std::path::PathBuf;

use thiserror::Error;
use tilestream::admin::ConfigError;
use tilestream::format::FormatError;
use tilestream::id::IdError;
use tilestream::logging::LoggingError;
use tilestream::TreeLoadError;

#[derive(Debug, Error)]
pub enum CliError {
    #[error("Failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to write {path}: {source}")]
    Write {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Not a readable tile: {0}")]
    UnreadableTile(String),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Id(#[from] IdError),

    #[error(transparent)]
    Format(#[from] FormatError),

    #[error(transparent)]
    TreeLoad(#[from] TreeLoadError),

    #[error(transparent)]
    Logging(#[from] LoggingError),

    #[error("Failed to start async runtime: {0}")]
    Runtime(std::io::Error),
}
