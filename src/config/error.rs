//! Configuration error types.

use std::path::PathBuf;
use thiserror::Error;

/// Manifest-related errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error when reading `{0}`")]
    Io(PathBuf, #[source] std::io::Error),

    #[error("Manifest parsing error")]
    Toml(#[from] toml::de::Error),

    #[error("Manifest validation error: {0}")]
    Validation(String),
}
