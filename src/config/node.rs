//! Node identity section.

use serde::{Deserialize, Serialize};
use smartsense_mqtt::NodeIdentity;
use validator::Validate;

/// Who this node is. The `node_id` becomes both the MQTT client id suffix
/// and the topic segment, so it is required and kept short.
#[derive(Serialize, Deserialize, Debug, Clone, Validate)]
#[serde(default)]
pub struct NodeConfig {
    #[validate(length(min = 1, max = 64, message = "node_id must be 1..=64 characters"))]
    pub node_id: String,

    /// Free-form placement hint carried in the birth status.
    pub location: Option<String>,

    /// Free-form description carried in the birth status.
    pub description: Option<String>,
}

impl Default for NodeConfig {
    fn default() -> Self {
        NodeConfig {
            node_id: String::new(),
            location: None,
            description: None,
        }
    }
}

impl NodeConfig {
    pub fn identity(&self) -> NodeIdentity {
        NodeIdentity {
            node_id: self.node_id.clone(),
            location: self.location.clone(),
            description: self.description.clone(),
        }
    }
}
