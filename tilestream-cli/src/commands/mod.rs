//! Subcommand implementations.

pub mod ids;
pub mod inspect;
pub mod sample;
pub mod walk;

use crate::error::CliError;

/// Runtime for commands that drive the async library.
pub(crate) fn runtime() -> Result<tokio::runtime::Runtime, CliError> {
    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(CliError::Runtime)
}
