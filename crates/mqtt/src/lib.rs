//! # smartsense-mqtt: broker transport for SmartSense nodes
//!
//! An async MQTT session library built on `rumqttc`, shaped around the
//! lifecycle a device-resident sensor node needs:
//!
//! - **Last-will lifecycle**: a retained offline status is registered with
//!   the broker before the first CONNECT; a birth status is published after
//!   every successful connect; a clean shutdown publishes a death status and
//!   suppresses the will.
//! - **Subscribe-then-announce ordering**: the command subscription is armed
//!   before the birth status goes out, so a node is never visibly online
//!   while deaf to commands.
//! - **Automatic reconnection** with an exponential backoff that saturates
//!   at a capped delay; fatal errors (bad credentials, broken TLS material)
//!   stop the driver instead of retrying forever.
//! - **Observable state**: `Disconnected -> Connecting -> Connected` on a
//!   watch channel, plus a lock-free connected flag for hot-path checks.
//! - **Bounded command intake**: inbound commands are decoded off the event
//!   loop and queued; malformed payloads are logged and dropped.
//! - **Publish drain**: shutdown waits for in-flight publishes before
//!   closing the socket.
//!
//! # Quick start
//!
//! ```ignore
//! use smartsense_mqtt::{Config, NodeIdentity, NodeStatus, TransportSession};
//!
//! #[tokio::main]
//! async fn main() -> smartsense_mqtt::Result<()> {
//!     let config = Config::default();
//!     let identity = NodeIdentity::new("greenhouse-01");
//!
//!     let (session, mut commands) = TransportSession::start(&config, identity)?;
//!     session.wait_connected().await?;
//!
//!     let mut snapshot = smartsense_mqtt::DataPayload::new(
//!         "greenhouse-01",
//!         smartsense_mqtt::payload::now_millis(),
//!     );
//!     snapshot.insert("bme680/temperature", serde_json::json!(22.4), "°C");
//!     session.publish_data(&snapshot).await?;
//!
//!     if let Some(command) = commands.recv().await {
//!         println!("server says: {}", command.action);
//!     }
//!
//!     session.shutdown().await;
//!     Ok(())
//! }
//! ```
//!
//! # Topic contract
//!
//! | Topic                      | Direction | QoS | Retained |
//! |----------------------------|-----------|-----|----------|
//! | `smartsense/{id}/status`   | publish   | 1   | yes      |
//! | `smartsense/{id}/sensors`  | publish   | 0   | no       |
//! | `smartsense/{id}/command`  | subscribe | 1   | —        |
//!
//! # Connection lifecycle
//!
//! ```text
//! Disconnected ──(driver starts)──> Connecting ──(CONNACK)──> Connected
//!       ▲                               ▲                         │
//!       │                          (backoff delay)          (link error)
//!       │                               │                         │
//!       └───────────────────────── Disconnected <─────────────────┘
//! ```

pub mod backoff;
pub mod client;
pub mod config;
pub mod error;
pub mod payload;
pub mod session;
pub mod state;

pub use backoff::Backoff;
pub use config::{Config, TlsConfig};
pub use error::SessionError;
pub use payload::{Command, DataPayload, MetricPoint, NodeIdentity, NodeStatus, StatusPayload, TopicSet};
pub use session::TransportSession;
pub use state::SessionState;

/// Result alias used by every fallible operation in this crate.
pub type Result<T> = std::result::Result<T, SessionError>;
