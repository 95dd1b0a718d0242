//! Configuration schema definitions.
//!
//! ```toml
//! [logging]
//! level = "info"
//! format = "compact"
//! output = "stdout"
//!
//! [logging.filters]
//! scent_core = "debug"
//!
//! [node]
//! call_timeout_ms = 0
//! sweep_on_broadcast = true
//! ```

use std::collections::HashMap;
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use scent_core::NodeOptions;
use serde::{Deserialize, Serialize};

/// Root configuration structure.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ScentConfig {
    /// Logging setup.
    #[serde(default)]
    pub logging: LoggingConfig,

    /// Routing behaviour of the local node.
    #[serde(default)]
    pub node: NodeConfig,
}

// =============================================================================
// Logging
// =============================================================================

/// Log verbosity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Trace,
    Debug,
    #[default]
    Info,
    Warn,
    Error,
}

impl LogLevel {
    /// Returns the level as a filter directive string.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Trace => "trace",
            Self::Debug => "debug",
            Self::Info => "info",
            Self::Warn => "warn",
            Self::Error => "error",
        }
    }

    /// Converts to the matching `tracing` level.
    pub fn to_tracing_level(self) -> tracing::Level {
        match self {
            Self::Trace => tracing::Level::TRACE,
            Self::Debug => tracing::Level::DEBUG,
            Self::Info => tracing::Level::INFO,
            Self::Warn => tracing::Level::WARN,
            Self::Error => tracing::Level::ERROR,
        }
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Log line layout.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Compact,
    Full,
    Pretty,
    /// Requires the `json-log` feature.
    Json,
}

/// Where log lines go.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogOutput {
    #[default]
    Stdout,
    Stderr,
    File,
}

/// Which span lifecycle events are logged.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default)]
pub struct SpanEventConfig {
    #[serde(default)]
    pub new: bool,
    #[serde(default)]
    pub enter: bool,
    #[serde(default)]
    pub exit: bool,
    #[serde(default)]
    pub close: bool,
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Global level.
    #[serde(default)]
    pub level: LogLevel,

    /// Line layout.
    #[serde(default)]
    pub format: LogFormat,

    /// Destination.
    #[serde(default)]
    pub output: LogOutput,

    /// Log file, required when `output = "file"`.
    #[serde(default)]
    pub file_path: Option<PathBuf>,

    /// Include thread ids in log lines.
    #[serde(default)]
    pub thread_ids: bool,

    /// Include source file and line in log lines.
    #[serde(default)]
    pub file_location: bool,

    /// Span lifecycle events to log.
    #[serde(default)]
    pub span_events: SpanEventConfig,

    /// Per-target levels, e.g. `scent_core = "debug"`.
    #[serde(default)]
    pub filters: HashMap<String, LogLevel>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: LogLevel::Info,
            format: LogFormat::Compact,
            output: LogOutput::Stdout,
            file_path: None,
            thread_ids: false,
            file_location: false,
            span_events: SpanEventConfig::default(),
            filters: HashMap::new(),
        }
    }
}

// =============================================================================
// Node
// =============================================================================

/// Routing configuration of the local node.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeConfig {
    /// Expire unanswered calls after this many milliseconds. `0` never expires.
    #[serde(default)]
    pub call_timeout_ms: u64,

    /// Drop detached children before every broadcast from the root.
    #[serde(default = "default_sweep_on_broadcast")]
    pub sweep_on_broadcast: bool,
}

fn default_sweep_on_broadcast() -> bool {
    true
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            call_timeout_ms: 0,
            sweep_on_broadcast: default_sweep_on_broadcast(),
        }
    }
}

impl NodeConfig {
    /// Converts to the options understood by the routing core.
    pub fn to_options(&self) -> NodeOptions {
        NodeOptions {
            call_timeout: (self.call_timeout_ms > 0)
                .then(|| Duration::from_millis(self.call_timeout_ms)),
            sweep_on_broadcast: self.sweep_on_broadcast,
        }
    }
}

impl From<&NodeConfig> for NodeOptions {
    fn from(config: &NodeConfig) -> Self {
        config.to_options()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_zero_timeout_means_never() {
        let options = NodeConfig::default().to_options();
        assert_eq!(options.call_timeout, None);
        assert!(options.sweep_on_broadcast);
    }

    #[test]
    fn test_timeout_converts_to_duration() {
        let config = NodeConfig {
            call_timeout_ms: 1500,
            sweep_on_broadcast: false,
        };
        let options = NodeOptions::from(&config);
        assert_eq!(options.call_timeout, Some(Duration::from_millis(1500)));
        assert!(!options.sweep_on_broadcast);
    }

    #[test]
    fn test_deserialize_partial_sections() {
        let config: ScentConfig =
            serde_json::from_str(r#"{"logging": {"level": "debug"}, "node": {}}"#).unwrap();
        assert_eq!(config.logging.level, LogLevel::Debug);
        assert_eq!(config.logging.format, LogFormat::Compact);
        assert!(config.node.sweep_on_broadcast);
    }

    #[test]
    fn test_unknown_level_is_rejected() {
        let result: Result<LoggingConfig, _> = serde_json::from_str(r#"{"level": "loud"}"#);
        assert!(result.is_err());
    }
}
