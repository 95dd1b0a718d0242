//! Configuration module for the scent runtime.
//!
//! Layered loading with figment (defaults, files, `SCENT_*` environment
//! variables, programmatic overrides) plus validation of the result.

pub mod error;
pub mod loader;
pub mod schema;
pub mod validation;

pub use error::{ConfigError, ConfigResult};
pub use loader::{ConfigLoader, Profile, load_config, load_config_from_file};
pub use schema::{
    LogFormat, LogLevel, LogOutput, LoggingConfig, NodeConfig, ScentConfig, SpanEventConfig,
};
pub use validation::validate_config;
