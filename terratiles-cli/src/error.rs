//! CLI error type.

use terratiles::RetrievalError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CliError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error(transparent)]
    Retrieval(#[from] RetrievalError),

    #[error("Failed to start runtime: {0}")]
    Runtime(#[from] std::io::Error),
}
