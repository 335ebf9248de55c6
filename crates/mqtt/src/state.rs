//! Session state tracking for the broker connection.
//!
//! The session driver publishes every state change on a watch channel so the
//! rest of the node can react (gate publishes, drive indicator outputs, decide
//! when a birth status must be re-announced) without polling the socket.

use std::fmt;

/// Lifecycle state of the broker session.
///
/// The only transitions the driver produces are:
/// `Disconnected` -> `Connecting` -> `Connected`, and `Connected` ->
/// `Disconnected(reason)` when the link drops. There is no other path; a
/// reconnect attempt always passes through `Connecting` again after the
/// backoff delay has elapsed.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionState {
    /// No usable link to the broker. The `String` carries the reason: the
    /// initial "not started" placeholder, a socket error, or a broker
    /// disconnect. The driver schedules a retry per the backoff policy.
    Disconnected(String),

    /// A CONNECT is in flight (or about to be); waiting for CONNACK.
    /// Publishes and subscribes do not succeed here.
    Connecting,

    /// CONNACK accepted, keep-alive running. The only state in which the
    /// node publishes data.
    Connected,
}

impl SessionState {
    /// Short static label, handy for log fields.
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionState::Disconnected(_) => "Disconnected",
            SessionState::Connecting => "Connecting",
            SessionState::Connected => "Connected",
        }
    }

    /// Contextual detail: the disconnect reason, empty otherwise.
    pub fn details(&self) -> &str {
        match self {
            SessionState::Disconnected(reason) => reason,
            _ => "",
        }
    }

    /// True only in `Connected`; the single state where publishing works.
    pub fn is_connected(&self) -> bool {
        matches!(self, SessionState::Connected)
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())?;
        let details = self.details();
        if !details.is_empty() {
            write!(f, " ({details})")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn labels_match_variants() {
        assert_eq!(SessionState::Connecting.as_str(), "Connecting");
        assert_eq!(SessionState::Connected.as_str(), "Connected");
        assert_eq!(
            SessionState::Disconnected("io".into()).as_str(),
            "Disconnected"
        );
    }

    #[test]
    fn details_only_for_disconnected() {
        assert_eq!(SessionState::Connecting.details(), "");
        assert_eq!(SessionState::Connected.details(), "");
        assert_eq!(
            SessionState::Disconnected("connection refused".into()).details(),
            "connection refused"
        );
    }

    #[test]
    fn display_includes_reason() {
        assert_eq!(SessionState::Connected.to_string(), "Connected");
        assert_eq!(
            SessionState::Disconnected("broker closed".into()).to_string(),
            "Disconnected (broker closed)"
        );
    }

    #[test]
    fn only_connected_counts_as_connected() {
        assert!(SessionState::Connected.is_connected());
        assert!(!SessionState::Connecting.is_connected());
        assert!(!SessionState::Disconnected("x".into()).is_connected());
    }
}
