//! Node configuration loading and validation.
//!
//! Aggregates the identity, logging, sensor and transport sections into one
//! `Config` loaded from TOML. The file is located via the
//! `SMARTSENSE_CONFIG` environment variable with an `/etc/smartsense/`
//! fallback, parsed, and validated before anything else starts. After
//! startup the configuration is immutable.

use std::{
    fs,
    path::{Path, PathBuf},
};

use serde::{Deserialize, Serialize};
use validator::Validate;

use self::{logger::LoggerConfig, node::NodeConfig, sensors::SensorsConfig};

pub mod logger;
pub mod node;
pub mod sensors;

/// Timestamped stdout messages for the window before the tracing subscriber
/// exists (config loading itself, logger setup failures).
#[macro_export]
macro_rules! print_info {
    ($($arg:tt)*) => {
        println!("{}  {} {}",
            console::style(
                time::OffsetDateTime::now_utc()
                    .format(&time::format_description::parse(
                        "[year]-[month]-[day]T[hour]:[minute]:[second].[subsecond digits:6]Z"
                    ).unwrap())
                    .unwrap()
            ).dim(),
            console::style("INFO").green(),
            format_args!($($arg)*)
        );
    };
}

#[macro_export]
macro_rules! print_warn {
    ($($arg:tt)*) => {
        println!("{}  {} {}",
            console::style(
                time::OffsetDateTime::now_utc()
                    .format(&time::format_description::parse(
                        "[year]-[month]-[day]T[hour]:[minute]:[second].[subsecond digits:6]Z"
                    ).unwrap())
                    .unwrap()
            ).dim(),
            console::style("WARN").yellow(),
            format_args!($($arg)*)
        );
    };
}

#[macro_export]
macro_rules! print_error {
    ($($arg:tt)*) => {
        println!("{}  {} {}",
            console::style(
                time::OffsetDateTime::now_utc()
                    .format(&time::format_description::parse(
                        "[year]-[month]-[day]T[hour]:[minute]:[second].[subsecond digits:6]Z"
                    ).unwrap())
                    .unwrap()
            ).dim(),
            console::style("ERROR").red(),
            format_args!($($arg)*)
        );
    };
}

/// Errors raised while locating, parsing or validating the configuration.
/// All of them are fatal at startup; the node refuses to run half-configured.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// No usable configuration file, or a semantic problem a parser cannot
    /// catch (for example: no sensor enabled).
    #[error("configuration error: {0}")]
    Config(String),

    #[error("io error while reading configuration: {0}")]
    Io(#[from] std::io::Error),

    #[error("parse error in configuration file: {0}")]
    Parse(String),

    #[error("configuration validation failed: {0}")]
    Validation(String),
}

/// Top-level node configuration.
#[derive(Serialize, Deserialize, Debug, Clone, Validate, Default)]
#[serde(default)]
pub struct Config {
    /// Who this node is on the wire.
    #[validate(nested)]
    pub node: NodeConfig,

    /// Logging subsystem settings.
    #[validate(nested)]
    pub logger: LoggerConfig,

    /// Sensor enablement, simulation flags and poll cadence.
    #[validate(nested)]
    pub sensors: SensorsConfig,

    /// Broker session settings.
    #[validate(nested)]
    pub transport: smartsense_mqtt::Config,
}

impl Config {
    /// Locates and loads the configuration file.
    pub fn new() -> Result<Self, ConfigError> {
        let config_path = Self::get_config_path()?;
        Self::load(&config_path)
    }

    /// Path priority: `SMARTSENSE_CONFIG`, then `/etc/smartsense/config.toml`.
    fn get_config_path() -> Result<PathBuf, ConfigError> {
        if let Ok(config_path) = std::env::var("SMARTSENSE_CONFIG") {
            let path = PathBuf::from(config_path);
            print_info!("Using config from SMARTSENSE_CONFIG: {}", path.display());
            return Ok(path);
        }

        let fallback = Path::new("/etc/smartsense/config.toml");
        if fallback.exists() {
            print_info!("Using default config path: {}", fallback.display());
            return Ok(fallback.to_path_buf());
        }

        Err(ConfigError::Config(
            "no configuration file found".to_string(),
        ))
    }

    /// Loads and validates configuration from the given path.
    pub fn load(path: &Path) -> Result<Config, ConfigError> {
        print_info!("Loading configuration from: {}", path.display());

        if !path.exists() {
            return Err(ConfigError::Config(format!(
                "configuration file missing: {}",
                path.display()
            )));
        }

        let config_str = fs::read_to_string(path)?;
        let config: Config =
            toml::from_str(&config_str).map_err(|e| ConfigError::Parse(e.to_string()))?;

        config
            .validate()
            .map_err(|e| ConfigError::Validation(e.to_string()))?;

        print_info!("Configuration loaded and validated");
        Ok(config)
    }
}
