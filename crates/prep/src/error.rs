//! CLI error types.

use prep_config::ConfigError;
use prep_core::PrepError;

/// CLI error type.
#[derive(Debug, thiserror::Error)]
pub(crate) enum CliError {
    #[error("{0}")]
    Config(#[from] ConfigError),

    #[error("{0}")]
    Io(#[from] std::io::Error),

    #[error("{0}")]
    Expand(#[from] PrepError),

    #[error("{0}")]
    Validation(String),
}
