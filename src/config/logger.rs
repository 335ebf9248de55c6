//! Logging section of the node configuration.
//!
//! Two sinks are supported: a console layer with a selectable format and a
//! systemd journald layer for headless deployments. Either can be switched
//! off; refusing both is caught at logger init, not here.

use serde::{Deserialize, Serialize};
use validator::{Validate, ValidationError};

/// Console output format.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum LogFormat {
    #[serde(rename = "compact")]
    Compact,
    #[serde(rename = "pretty")]
    Pretty,
    #[serde(rename = "json")]
    Json,
}

impl Default for LogFormat {
    fn default() -> Self {
        LogFormat::Compact
    }
}

/// The `[logger]` section: global level plus per-sink settings.
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(default)]
pub struct LoggerConfig {
    /// Global log level: trace, debug, info, warn or error (case-insensitive).
    /// `RUST_LOG` overrides this when set.
    #[validate(custom(function = "validate_log_level"))]
    pub level: String,

    #[validate(nested)]
    pub console: Option<ConsoleConfig>,

    #[validate(nested)]
    pub journald: Option<JournaldConfig>,
}

fn validate_log_level(level: &str) -> Result<(), ValidationError> {
    match level.to_lowercase().as_str() {
        "trace" | "debug" | "info" | "warn" | "error" => Ok(()),
        _ => {
            let mut err = ValidationError::new("invalid_log_level");
            err.message = Some(format!("Invalid log level: {}", level).into());
            Err(err)
        }
    }
}

impl Default for LoggerConfig {
    fn default() -> Self {
        LoggerConfig {
            level: "info".to_string(),
            console: Some(ConsoleConfig::default()),
            journald: Some(JournaldConfig::default()),
        }
    }
}

/// Console sink settings.
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(default)]
pub struct ConsoleConfig {
    pub enabled: bool,

    #[serde(default)]
    pub format: LogFormat,

    /// Include the log target (module path) in output.
    pub show_target: bool,

    /// Include thread IDs in output.
    pub show_thread_ids: bool,

    /// Include span entry/exit events in output.
    pub show_spans: bool,

    /// Enable ANSI color codes.
    pub ansi_colors: bool,
}

impl Default for ConsoleConfig {
    fn default() -> Self {
        ConsoleConfig {
            enabled: true,
            format: LogFormat::default(),
            show_target: false,
            show_thread_ids: false,
            show_spans: false,
            ansi_colors: true,
        }
    }
}

/// systemd journald sink settings (Unix only).
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct JournaldConfig {
    #[serde(default)]
    pub enabled: bool,

    /// Syslog identifier for journal entries. Must be non-empty.
    #[validate(length(min = 1))]
    pub identifier: String,
}

impl Default for JournaldConfig {
    fn default() -> Self {
        JournaldConfig {
            enabled: false,
            identifier: "smartsense".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_validates() {
        assert!(LoggerConfig::default().validate().is_ok());
    }

    #[test]
    fn bogus_level_is_rejected() {
        let config = LoggerConfig {
            level: "loud".into(),
            ..LoggerConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn empty_journald_identifier_is_rejected() {
        let config = LoggerConfig {
            journald: Some(JournaldConfig {
                enabled: true,
                identifier: String::new(),
            }),
            ..LoggerConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn format_parses_from_toml() {
        let config: ConsoleConfig = toml::from_str(
            r#"
            enabled = true
            format = "json"
            "#,
        )
        .unwrap();
        assert!(matches!(config.format, LogFormat::Json));
    }
}
