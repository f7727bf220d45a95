//! Runtime error types.

use thiserror::Error;

use lattice_core::StoreError;
use lattice_framework::{ManifestError, PluginError};

use crate::config::ConfigError;

/// Errors that can occur during runtime operations.
#[derive(Debug, Error)]
pub enum RuntimeError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("storage error: {0}")]
    Store(#[from] StoreError),

    #[error(transparent)]
    Plugin(#[from] PluginError),

    #[error(transparent)]
    Manifest(#[from] ManifestError),

    #[error("platform configuration incomplete: {0}")]
    Platform(String),
}

/// Result type for runtime operations.
pub type RuntimeResult<T> = Result<T, RuntimeError>;
