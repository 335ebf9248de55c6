//! Wire payloads and topic layout for the node's broker contract.
//!
//! Everything the node exchanges with the broker is JSON:
//!
//! - `smartsense/{id}/status` — retained [`StatusPayload`] announcing the
//!   node online or offline (the last will carries the offline form)
//! - `smartsense/{id}/sensors` — [`DataPayload`], one aggregated snapshot of
//!   all metrics from a poll cycle
//! - `smartsense/{id}/command` — inbound [`Command`] messages

use std::collections::BTreeMap;
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};

/// Root of the node's topic namespace.
pub const TOPIC_ROOT: &str = "smartsense";

/// Milliseconds since the Unix epoch; the timestamp unit of every payload.
pub fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

/// Who this node is, as far as the broker contract is concerned.
#[derive(Debug, Clone)]
pub struct NodeIdentity {
    pub node_id: String,
    pub location: Option<String>,
    pub description: Option<String>,
}

impl NodeIdentity {
    pub fn new(node_id: impl Into<String>) -> Self {
        NodeIdentity {
            node_id: node_id.into(),
            location: None,
            description: None,
        }
    }

    /// MQTT client id, namespaced so broker-side ACLs can match on it.
    pub fn client_id(&self) -> String {
        format!("{TOPIC_ROOT}-{}", self.node_id)
    }
}

/// The three topics a node touches, interpolated once at session build.
#[derive(Debug, Clone)]
pub struct TopicSet {
    pub status: String,
    pub data: String,
    pub command: String,
}

impl TopicSet {
    pub fn for_node(node_id: &str) -> Self {
        TopicSet {
            status: format!("{TOPIC_ROOT}/{node_id}/status"),
            data: format!("{TOPIC_ROOT}/{node_id}/sensors"),
            command: format!("{TOPIC_ROOT}/{node_id}/command"),
        }
    }
}

/// Node liveness as seen by subscribers of the retained status topic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeStatus {
    Online,
    Offline,
}

impl NodeStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            NodeStatus::Online => "online",
            NodeStatus::Offline => "offline",
        }
    }
}

/// Retained status announcement. The birth carries the full identity; the
/// last will registered with the broker only carries id, status and the
/// registration timestamp.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusPayload {
    pub node_id: String,
    pub status: NodeStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Milliseconds since the Unix epoch.
    pub timestamp: u64,
}

impl StatusPayload {
    pub fn birth(identity: &NodeIdentity, timestamp: u64) -> Self {
        StatusPayload {
            node_id: identity.node_id.clone(),
            status: NodeStatus::Online,
            location: identity.location.clone(),
            description: identity.description.clone(),
            timestamp,
        }
    }

    pub fn death(identity: &NodeIdentity, timestamp: u64) -> Self {
        StatusPayload {
            node_id: identity.node_id.clone(),
            status: NodeStatus::Offline,
            location: identity.location.clone(),
            description: identity.description.clone(),
            timestamp,
        }
    }

    /// The will payload the broker publishes on our behalf if the link dies.
    pub fn last_will(identity: &NodeIdentity, timestamp: u64) -> Self {
        StatusPayload {
            node_id: identity.node_id.clone(),
            status: NodeStatus::Offline,
            location: None,
            description: None,
            timestamp,
        }
    }
}

/// One normalized metric inside a data snapshot.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricPoint {
    pub value: serde_json::Value,
    pub unit: String,
    /// The shared cycle timestamp, repeated per point so consumers can
    /// process points independently.
    pub timestamp: u64,
}

/// Aggregated snapshot of one poll cycle, published QoS 0 and not retained.
/// Keys are metric names of the form `{sensor}/{field}`; a BTreeMap keeps
/// the serialized order stable for downstream diffing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DataPayload {
    pub node_id: String,
    pub timestamp: u64,
    pub sensors: BTreeMap<String, MetricPoint>,
}

impl DataPayload {
    pub fn new(node_id: impl Into<String>, timestamp: u64) -> Self {
        DataPayload {
            node_id: node_id.into(),
            timestamp,
            sensors: BTreeMap::new(),
        }
    }

    pub fn insert(
        &mut self,
        name: impl Into<String>,
        value: serde_json::Value,
        unit: impl Into<String>,
    ) {
        self.sensors.insert(
            name.into(),
            MetricPoint {
                value,
                unit: unit.into(),
                timestamp: self.timestamp,
            },
        );
    }

    pub fn is_empty(&self) -> bool {
        self.sensors.is_empty()
    }

    pub fn len(&self) -> usize {
        self.sensors.len()
    }
}

/// Inbound command from the server side. Unknown actions are the handler's
/// problem; undecodable payloads never make it past the session driver.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Command {
    pub action: String,
    #[serde(default)]
    pub params: serde_json::Value,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn identity() -> NodeIdentity {
        NodeIdentity {
            node_id: "node-7".into(),
            location: Some("greenhouse".into()),
            description: Some("east wall".into()),
        }
    }

    #[test]
    fn topics_interpolate_the_node_id() {
        let topics = TopicSet::for_node("node-7");
        assert_eq!(topics.status, "smartsense/node-7/status");
        assert_eq!(topics.data, "smartsense/node-7/sensors");
        assert_eq!(topics.command, "smartsense/node-7/command");
    }

    #[test]
    fn client_id_is_namespaced() {
        assert_eq!(identity().client_id(), "smartsense-node-7");
    }

    #[test]
    fn birth_serializes_full_identity() {
        let payload = StatusPayload::birth(&identity(), 1_700_000_000_000);
        let json = serde_json::to_value(&payload).unwrap();
        assert_eq!(json["node_id"], "node-7");
        assert_eq!(json["status"], "online");
        assert_eq!(json["location"], "greenhouse");
        assert_eq!(json["timestamp"], 1_700_000_000_000u64);
    }

    #[test]
    fn last_will_omits_location_and_description() {
        let payload = StatusPayload::last_will(&identity(), 42);
        let json = serde_json::to_value(&payload).unwrap();
        assert_eq!(json["status"], "offline");
        assert!(json.get("location").is_none());
        assert!(json.get("description").is_none());
    }

    #[test]
    fn data_payload_shares_the_cycle_timestamp() {
        let mut payload = DataPayload::new("node-7", 1000);
        payload.insert("bme680/temperature", serde_json::json!(22.5), "°C");
        payload.insert("pms5003/pm2_5", serde_json::json!(11), "µg/m³");

        assert_eq!(payload.len(), 2);
        let json = serde_json::to_value(&payload).unwrap();
        assert_eq!(json["sensors"]["bme680/temperature"]["unit"], "°C");
        assert_eq!(json["sensors"]["bme680/temperature"]["timestamp"], 1000);
        assert_eq!(json["sensors"]["pms5003/pm2_5"]["timestamp"], 1000);
    }

    #[test]
    fn command_decodes_with_and_without_params() {
        let cmd: Command = serde_json::from_str(r#"{"action":"identify"}"#).unwrap();
        assert_eq!(cmd.action, "identify");
        assert!(cmd.params.is_null());

        let cmd: Command =
            serde_json::from_str(r#"{"action":"set_interval","params":{"seconds":30}}"#).unwrap();
        assert_eq!(cmd.params["seconds"], 30);
    }

    #[test]
    fn malformed_command_fails_to_decode() {
        assert!(serde_json::from_str::<Command>(r#"{"verb":"reboot"}"#).is_err());
        assert!(serde_json::from_str::<Command>("not json").is_err());
    }
}
