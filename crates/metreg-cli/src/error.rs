//! CLI error types.

use thiserror::Error;

/// CLI errors.
#[derive(Debug, Error)]
pub enum Error {
    /// The manifest is well-formed JSON but describes something invalid.
    #[error("manifest error: {0}")]
    Manifest(String),

    /// The manifest is not valid JSON for the expected shape.
    #[error("manifest parse error: {0}")]
    Parse(#[from] serde_json::Error),

    /// Registry error.
    #[error("registry error: {0}")]
    Registry(#[from] metreg_core::Error),

    /// Exposition encoding error.
    #[error("encoding error: {0}")]
    Encode(#[from] prometheus::Error),

    /// IO error.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for CLI operations.
pub type Result<T> = std::result::Result<T, Error>;
