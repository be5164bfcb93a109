//! Wire types for deployment status reporting, shared by the HTTP
//! responses and the WebSocket broadcast stream.

use serde::{Deserialize, Serialize};

use crate::runtime::ContainerStatus;

/// The `type` field of broadcast status messages.
pub const STATUS_MESSAGE_TYPE: &str = "status_update";

/// Overall state of the deployment state machine.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeployState {
    #[default]
    Idle,
    Deploying,
    Deployed,
    TearingDown,
    Error,
}

impl std::fmt::Display for DeployState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            DeployState::Idle => "idle",
            DeployState::Deploying => "deploying",
            DeployState::Deployed => "deployed",
            DeployState::TearingDown => "tearing_down",
            DeployState::Error => "error",
        };
        f.write_str(s)
    }
}

/// Status of a single deployed node.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct NodeStatus {
    #[serde(rename = "nodeId")]
    pub node_id: String,
    #[serde(rename = "containerId")]
    pub container_id: String,
    pub status: ContainerStatus,
}

/// WebSocket message carrying a full status snapshot.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct StatusMessage {
    #[serde(rename = "type")]
    pub message_type: String,
    #[serde(rename = "deployStatus")]
    pub deploy_status: DeployState,
    #[serde(rename = "nodeStatuses")]
    pub node_statuses: Vec<NodeStatus>,
}

/// HTTP response body for status queries. `nodeStatuses` is always a
/// list, never null.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct StatusResponse {
    #[serde(rename = "deployStatus")]
    pub deploy_status: DeployState,
    #[serde(rename = "nodeStatuses")]
    pub node_statuses: Vec<NodeStatus>,
}
