//! Unified error type for the transport session.
//!
//! Every fallible operation in this crate returns `SessionError`. The
//! variants fall into three buckets the node treats differently:
//!
//! **Startup faults** (fail fast, fix configuration):
//! - `Setup`: client could not be built (bad TLS paths, malformed options)
//! - `Config`: validation failures in the broker settings
//!
//! **Transport faults** (the driver retries, callers may observe):
//! - `Connection`: network-level connection error
//! - `ConnectTimeout`: the broker did not accept us within the window
//! - `RetryBudget`: a configured reconnect attempt limit was spent
//! - `Client` / `ProtocolState` / `Packet`: rumqttc-level failures
//!
//! **Payload faults** (never fatal to the session):
//! - `Serialization`: an outbound payload failed to encode
//! - `CommandDecode`: an inbound command was malformed; it is logged and
//!   dropped, the subscription stays up

use thiserror::Error;

/// The unified error type for broker session operations.
#[derive(Debug, Error)]
pub enum SessionError {
    /// Session could not be assembled from its configuration: unreadable TLS
    /// material, contradictory options, missing credentials. Caught at
    /// startup; the node refuses to run with a half-built transport.
    #[error("session setup error: {0}")]
    Setup(String),

    /// Broker configuration failed validation (host length, port range,
    /// keep-alive bounds, TLS path rules).
    #[error("configuration error: {0}")]
    Config(#[from] validator::ValidationErrors),

    /// An outbound payload failed to serialize. The data is wrong, not the
    /// link; retrying the same payload will not help.
    #[error("payload serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// An inbound command payload did not decode. Logged and dropped; the
    /// command subscription is unaffected.
    #[error("command decode error on {topic}: {reason}")]
    CommandDecode { topic: String, reason: String },

    /// The local client could not queue a request (publish, subscribe,
    /// disconnect). Usually means the event loop is shutting down.
    #[error("client request error: {0}")]
    Client(#[from] rumqttc::ClientError),

    /// Network-level connection failure: refused, reset, TLS handshake,
    /// broker rejection. Boxed to keep the enum small; the driver classifies
    /// these into retryable and fatal.
    #[error("connection error: {0}")]
    Connection(#[from] Box<rumqttc::ConnectionError>),

    /// The MQTT protocol state machine was violated. Indicates a bug rather
    /// than an environmental failure.
    #[error("protocol state error: {0}")]
    ProtocolState(#[from] rumqttc::StateError),

    /// A packet failed to encode or exceeded negotiated limits.
    #[error("packet error: {0}")]
    Packet(#[from] rumqttc::mqttbytes::Error),

    /// The broker did not move the session to Connected within the allowed
    /// window.
    #[error("broker did not accept the connection within {seconds}s")]
    ConnectTimeout { seconds: u64 },

    /// The reconnect schedule ran out of attempts.
    #[error("retry budget error: {0}")]
    RetryBudget(#[from] crate::backoff::BackoffError),

    /// File access failed, typically while loading TLS material.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

// ConnectionError is large; box it at the conversion boundary so `?` keeps
// working in the driver.
impl From<rumqttc::ConnectionError> for SessionError {
    fn from(err: rumqttc::ConnectionError) -> Self {
        SessionError::Connection(Box::new(err))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_carries_context() {
        let err = SessionError::Setup("TLS CA not readable".into());
        assert_eq!(err.to_string(), "session setup error: TLS CA not readable");

        let err = SessionError::ConnectTimeout { seconds: 10 };
        assert_eq!(
            err.to_string(),
            "broker did not accept the connection within 10s"
        );
    }

    #[test]
    fn command_decode_names_the_topic() {
        let err = SessionError::CommandDecode {
            topic: "smartsense/node-1/command".into(),
            reason: "expected value at line 1".into(),
        };
        let msg = err.to_string();
        assert!(msg.contains("smartsense/node-1/command"));
        assert!(msg.contains("expected value"));
    }

    #[test]
    fn io_errors_convert() {
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "ca.pem missing");
        let err: SessionError = io.into();
        assert!(err.to_string().contains("ca.pem missing"));
    }

    #[test]
    fn works_as_boxed_std_error() {
        let err: Box<dyn std::error::Error> =
            Box::new(SessionError::Setup("no broker host".into()));
        assert!(err.to_string().contains("no broker host"));
    }
}
