//! Broker session configuration.
//!
//! Deserialized from the node's TOML configuration and validated with the
//! `validator` crate before any socket is opened. TLS material is checked for
//! existence up front so a bad path fails at startup rather than mid-outage.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use validator::{Validate, ValidationError};

use crate::backoff::Backoff;

/// Broker connection settings for the transport session.
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(default)]
pub struct Config {
    /// Broker hostname or IP.
    #[validate(length(min = 1, max = 255))]
    pub host: String,

    /// Broker port. 1883 plain, 8883 TLS by convention.
    #[validate(range(min = 1))]
    pub port: u16,

    /// MQTT keep-alive interval in seconds.
    #[validate(range(min = 5, max = 3600))]
    pub keep_alive: u64,

    /// Whether the broker should drop session state between connects. The
    /// node keeps it false so command subscriptions survive an outage.
    pub clean_session: bool,

    /// Seconds to wait for the broker to accept the initial connection.
    #[validate(range(min = 1, max = 120))]
    pub connect_timeout: u64,

    /// Optional broker credentials. Username and password travel together.
    pub username: Option<String>,
    pub password: Option<String>,

    /// First reconnect delay in seconds.
    #[validate(range(min = 1, max = 300))]
    pub reconnect_initial_delay: u64,

    /// Reconnect delay cap in seconds.
    #[validate(range(min = 1, max = 3600))]
    pub reconnect_max_delay: u64,

    /// Hard limit on reconnect attempts. 0 retries forever at the capped
    /// delay.
    pub reconnect_max_attempts: u32,

    /// Largest packet the client will accept or emit, in bytes.
    #[validate(range(min = 1024))]
    pub max_packet_size: usize,

    /// Optional TLS settings. Absent means a plain TCP link.
    #[validate(nested)]
    pub tls: Option<TlsConfig>,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            host: "localhost".to_string(),
            port: 1883,
            keep_alive: 60,
            clean_session: false,
            connect_timeout: 10,
            username: None,
            password: None,
            reconnect_initial_delay: 1,
            reconnect_max_delay: 60,
            reconnect_max_attempts: 0,
            max_packet_size: 256 * 1024,
            tls: None,
        }
    }
}

impl Config {
    /// Builds the reconnect schedule described by this configuration.
    pub fn backoff(&self) -> Backoff {
        let mut backoff = Backoff::new(
            Duration::from_secs(self.reconnect_initial_delay),
            Duration::from_secs(self.reconnect_max_delay),
            2.0,
        );
        if self.reconnect_max_attempts > 0 {
            backoff.set_attempt_limit(self.reconnect_max_attempts);
        }
        backoff
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout)
    }
}

/// TLS settings: a CA bundle, optionally a client certificate pair for
/// mutual authentication.
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct TlsConfig {
    /// PEM bundle used to verify the broker.
    #[validate(custom(function = "validate_file_path"))]
    pub ca_cert_path: String,

    /// Client certificate for mutual TLS. Requires `client_key_path`.
    #[validate(custom(function = "validate_file_path"))]
    pub client_cert_path: Option<String>,

    /// Client private key for mutual TLS. Requires `client_cert_path`.
    #[validate(custom(function = "validate_file_path"))]
    pub client_key_path: Option<String>,
}

impl TlsConfig {
    /// CA-only verification, the common deployment.
    pub fn with_ca_only(ca_cert_path: impl Into<String>) -> Self {
        TlsConfig {
            ca_cert_path: ca_cert_path.into(),
            client_cert_path: None,
            client_key_path: None,
        }
    }

    /// Mutual TLS with a client certificate pair.
    pub fn with_client_auth(
        ca_cert_path: impl Into<String>,
        client_cert_path: impl Into<String>,
        client_key_path: impl Into<String>,
    ) -> Self {
        TlsConfig {
            ca_cert_path: ca_cert_path.into(),
            client_cert_path: Some(client_cert_path.into()),
            client_key_path: Some(client_key_path.into()),
        }
    }

    pub fn has_client_auth(&self) -> bool {
        self.client_cert_path.is_some() && self.client_key_path.is_some()
    }

    /// A certificate without its key (or vice versa) is a configuration
    /// mistake, not a CA-only setup.
    pub fn is_consistent(&self) -> bool {
        self.client_cert_path.is_some() == self.client_key_path.is_some()
    }
}

fn validate_file_path(path: &str) -> Result<(), ValidationError> {
    if path.is_empty() {
        let mut err = ValidationError::new("empty_path");
        err.message = Some("path cannot be empty".into());
        return Err(err);
    }
    if !Path::new(path).exists() {
        let mut err = ValidationError::new("missing_file");
        err.message = Some(format!("file does not exist: {path}").into());
        return Err(err);
    }
    Ok(())
}
