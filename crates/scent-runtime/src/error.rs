//! Runtime error types.

use thiserror::Error;

pub use crate::config::{ConfigError, ConfigResult};

/// Errors that can occur while setting up the facade.
#[derive(Error, Debug)]
pub enum RuntimeError {
    /// The process-wide instance was already initialized.
    #[error("Scent is already initialized in this process")]
    AlreadyInitialized,

    /// Configuration could not be loaded or is invalid.
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),
}

/// Result type for runtime operations.
pub type RuntimeResult<T> = Result<T, RuntimeError>;
