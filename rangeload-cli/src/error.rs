//! CLI error type.

use thiserror::Error;

use rangeload::EngineError;

/// Errors reported by CLI commands.
#[derive(Debug, Error)]
pub enum CliError {
    /// Invalid arguments or configuration.
    #[error("{0}")]
    Config(String),

    /// The engine rejected an operation.
    #[error(transparent)]
    Engine(#[from] EngineError),

    /// One or more downloads did not complete.
    #[error("{failed} of {total} downloads did not complete")]
    Incomplete { failed: usize, total: usize },
}
