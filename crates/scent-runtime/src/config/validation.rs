//! Configuration validation utilities.

use super::error::{ConfigError, ConfigResult};
use super::schema::{LogFormat, LogOutput, LoggingConfig, NodeConfig, ScentConfig};

/// Upper bound on `node.call_timeout_ms`: one day.
const MAX_CALL_TIMEOUT_MS: u64 = 24 * 60 * 60 * 1000;

/// Validates the entire configuration.
pub fn validate_config(config: &ScentConfig) -> ConfigResult<()> {
    validate_logging_config(&config.logging)?;
    validate_node_config(&config.node)?;
    Ok(())
}

fn validate_logging_config(logging: &LoggingConfig) -> ConfigResult<()> {
    if logging.output == LogOutput::File {
        match &logging.file_path {
            None => return Err(ConfigError::validation("File output requires logging.file_path")),
            Some(path) if path.as_os_str().is_empty() => {
                return Err(ConfigError::missing_field("logging.file_path"));
            }
            Some(_) => {}
        }
    }

    if logging.format == LogFormat::Json && !cfg!(feature = "json-log") {
        return Err(ConfigError::validation(
            "JSON log format requires the `json-log` feature",
        ));
    }

    for target in logging.filters.keys() {
        if target.trim().is_empty() || target.contains(char::is_whitespace) {
            return Err(ConfigError::validation(format!(
                "Invalid log filter target: {target:?}"
            )));
        }
    }

    Ok(())
}

fn validate_node_config(node: &NodeConfig) -> ConfigResult<()> {
    if node.call_timeout_ms > MAX_CALL_TIMEOUT_MS {
        return Err(ConfigError::validation(format!(
            "Call timeout must not exceed {MAX_CALL_TIMEOUT_MS} ms"
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::schema::LogLevel;
    use std::path::PathBuf;

    #[test]
    fn test_validate_default_config() {
        assert!(validate_config(&ScentConfig::default()).is_ok());
    }

    #[test]
    fn test_file_output_requires_path() {
        let mut config = ScentConfig::default();
        config.logging.output = LogOutput::File;
        assert!(matches!(
            validate_config(&config),
            Err(ConfigError::ValidationError { .. })
        ));

        config.logging.file_path = Some(PathBuf::new());
        assert!(matches!(
            validate_config(&config),
            Err(ConfigError::MissingField { .. })
        ));

        config.logging.file_path = Some(PathBuf::from("scent.log"));
        assert!(validate_config(&config).is_ok());
    }

    #[test]
    fn test_invalid_filter_target() {
        let mut config = ScentConfig::default();
        config
            .logging
            .filters
            .insert("scent core".to_string(), LogLevel::Debug);
        assert!(validate_config(&config).is_err());
    }

    #[test]
    fn test_excessive_call_timeout() {
        let mut config = ScentConfig::default();
        config.node.call_timeout_ms = MAX_CALL_TIMEOUT_MS + 1;
        assert!(validate_config(&config).is_err());
    }
}
