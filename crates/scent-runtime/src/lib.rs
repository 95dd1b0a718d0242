//! Scent Runtime - the application-facing layer of scent.
//!
//! This crate provides:
//! - The [`Scent`] facade: role selection, inbound decoding, `emit` / `call` /
//!   `on` / `off`
//! - Layered configuration ([`config`])
//! - Logging setup ([`logging`])
//!
//! ```ignore
//! use scent_runtime::{Scent, config::load_config, logging};
//!
//! let config = load_config()?;
//! logging::init_from_config(&config.logging);
//!
//! let scent = Scent::init(frame, config.node.to_options())?;
//! scent.on("add-one", |v: serde_json::Value| v.as_i64().unwrap_or(0) + 1);
//! let answer = scent.call("remote-op", serde_json::json!({})).await?;
//! ```

pub mod config;
pub mod error;
pub mod logging;
pub mod scent;

// Re-exports
pub use config::{ConfigError, ConfigLoader, ConfigResult, NodeConfig, ScentConfig};
pub use error::{RuntimeError, RuntimeResult};
pub use logging::{LoggingBuilder, SpanEvents};
pub use scent::{NodeStats, Scent};

// Re-export tracing for use by other crates
pub use tracing;
pub use tracing_subscriber;

/// Logging macros for convenient imports.
pub mod prelude {
    pub use tracing::{Level, debug, error, info, instrument, span, trace, warn};
}
