//! Global `tracing` subscriber setup.
//!
//! Builds the configured output layers (console in one of three formats,
//! systemd journald for headless units) and installs them once at startup.
//! `RUST_LOG` takes precedence over the configured level for both sinks.

use std::io;

use thiserror::Error;
use tracing_subscriber::{fmt, fmt::format::FmtSpan, prelude::*, EnvFilter, Layer};
use validator::{Validate, ValidationErrors};

use crate::{
    config::logger::{ConsoleConfig, JournaldConfig, LogFormat, LoggerConfig},
    print_info, print_warn,
};

/// Errors raised while building or installing the subscriber.
#[derive(Error, Debug)]
pub enum LoggerError {
    #[error("Logger configuration validation error: {0}")]
    ValidationError(#[from] ValidationErrors),

    #[error("Environment filter error: {0}")]
    EnvFilterError(#[from] tracing_subscriber::filter::FromEnvError),

    /// Typically the journald socket is unavailable.
    #[error("IO error: {0}")]
    IoError(#[from] io::Error),

    /// Both sinks disabled, or every enabled sink failed to come up.
    #[error("No logging layers were configured or successfully initialized")]
    NoLayersConfigured,

    /// Journald was requested alongside the console and failed; with the
    /// console still up this is treated as a configuration problem rather
    /// than silently running with half the requested outputs.
    #[error("Failed to initialize journald logger while console logging is enabled")]
    JournaldFailedWithConsoleEnabled,
}

/// Validates the logging configuration and installs the global subscriber.
pub struct LoggerManager {
    config: LoggerConfig,
}

impl LoggerManager {
    pub fn new(config: LoggerConfig) -> Result<Self, LoggerError> {
        config.validate()?;

        Ok(LoggerManager { config })
    }

    /// Builds the configured layers and registers them globally. Call once,
    /// before the first tracing macro fires.
    pub fn init(&mut self) -> Result<(), LoggerError> {
        let mut layers = Vec::new();

        match &self.config.console {
            Some(console_config) if console_config.enabled => {
                let filter = self.env_filter();
                layers.push(self.build_console_layer(console_config, filter));
            }
            _ => {}
        }

        // Journald layer (Linux/systemd only)
        match &self.config.journald {
            Some(journald_config) if journald_config.enabled => {
                let filter = self.env_filter();
                match self.build_journald_layer(journald_config, filter) {
                    Ok(journald_layer) => {
                        layers.push(journald_layer);
                        print_info!(
                            "Journald logging enabled with identifier: {}",
                            journald_config.identifier
                        );
                    }
                    Err(e) => {
                        print_warn!("Failed to initialize journald logging: {}", e);
                        if self.config.console.as_ref().is_some_and(|c| c.enabled) {
                            return Err(LoggerError::JournaldFailedWithConsoleEnabled);
                        }
                    }
                }
            }
            _ => {}
        }

        if layers.is_empty() {
            print_warn!("No logging layers were initialized; check the [logger] section");
            return Err(LoggerError::NoLayersConfigured);
        }

        tracing_subscriber::registry().with(layers).init();
        Ok(())
    }

    fn env_filter(&self) -> EnvFilter {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&self.config.level))
    }

    fn build_console_layer(
        &self,
        config: &ConsoleConfig,
        filter: EnvFilter,
    ) -> Box<dyn Layer<tracing_subscriber::Registry> + Send + Sync> {
        let writer = io::stdout;
        let span_events = if config.show_spans {
            FmtSpan::CLOSE
        } else {
            FmtSpan::NONE
        };
        match config.format {
            LogFormat::Json => fmt::layer()
                .json()
                .with_target(config.show_target)
                .with_thread_ids(config.show_thread_ids)
                .with_span_events(span_events)
                .with_ansi(config.ansi_colors)
                .with_writer(writer)
                .with_filter(filter)
                .boxed(),
            LogFormat::Pretty => fmt::layer()
                .pretty()
                .with_target(config.show_target)
                .with_thread_ids(config.show_thread_ids)
                .with_span_events(span_events)
                .with_ansi(config.ansi_colors)
                .with_writer(writer)
                .with_filter(filter)
                .boxed(),
            LogFormat::Compact => fmt::layer()
                .compact()
                .with_target(config.show_target)
                .with_thread_ids(config.show_thread_ids)
                .with_span_events(span_events)
                .with_ansi(config.ansi_colors)
                .with_writer(writer)
                .with_filter(filter)
                .boxed(),
        }
    }

    fn build_journald_layer(
        &self,
        config: &JournaldConfig,
        filter: EnvFilter,
    ) -> Result<Box<dyn Layer<tracing_subscriber::Registry> + Send + Sync>, LoggerError> {
        let layer = tracing_journald::layer()?.with_syslog_identifier(config.identifier.clone());
        Ok(layer.with_filter(filter).boxed())
    }
}
