/*!
 * Device driver abstraction.
 *
 * The gateway never talks to the control network itself. It reads node and
 * value snapshots from a [`DeviceDriver`] and hands write commands back to it.
 */
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use thiserror::Error;

use zflow_core::error::Error as CoreError;

use crate::node::{Node, NodeId};

/// Error type for device operations
#[derive(Error, Debug)]
pub enum DeviceError {
    /// The node does not exist
    #[error("Node {0} not found")]
    NodeNotFound(NodeId),

    /// The value does not exist on the node
    #[error("Value {1} not found on node {0}")]
    ValueNotFound(NodeId, String),

    /// The value cannot be written
    #[error("Value {1} on node {0} is not writable")]
    NotWritable(NodeId, String),

    /// The payload is not valid for the value
    #[error("Invalid value: {0}")]
    InvalidValue(String),

    /// Transport error
    #[error("Transport error: {0}")]
    Transport(String),

    /// Driver error
    #[error("Driver error: {0}")]
    Driver(String),

    /// Core error
    #[error("Core error: {0}")]
    Core(#[from] CoreError),
}

/// Result type for device operations
pub type Result<T> = std::result::Result<T, DeviceError>;

impl DeviceError {
    /// Create a new transport error
    pub fn transport<S: AsRef<str>>(msg: S) -> Self {
        DeviceError::Transport(msg.as_ref().to_string())
    }

    /// Create a new driver error
    pub fn driver<S: AsRef<str>>(msg: S) -> Self {
        DeviceError::Driver(msg.as_ref().to_string())
    }
}

/// Structured result of an API call
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApiResponse {
    /// Whether the call succeeded
    pub success: bool,
    /// Human-readable outcome
    pub message: String,
    /// Call result
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<JsonValue>,
}

impl ApiResponse {
    /// A successful response
    pub fn ok<S: Into<String>>(message: S, result: Option<JsonValue>) -> Self {
        Self {
            success: true,
            message: message.into(),
            result,
        }
    }

    /// A failed response
    pub fn failure<S: Into<String>>(message: S) -> Self {
        Self {
            success: false,
            message: message.into(),
            result: None,
        }
    }
}

/// Read access to the node network plus the commands the gateway issues
pub trait DeviceDriver: Send + Sync {
    /// Home id of the network, as hex
    fn home_hex(&self) -> String;

    /// Snapshot of a node
    fn node(&self, node_id: NodeId) -> Option<Node>;

    /// Ids of every known node
    fn node_ids(&self) -> Vec<NodeId>;

    /// Write a value on the device
    fn write_value(&self, node_id: NodeId, value_id: &str, value: JsonValue) -> Result<()>;

    /// Call a driver API by name
    fn call_api(&self, name: &str, args: &[JsonValue]) -> ApiResponse;

    /// Refresh a value from the device
    fn poll_value(&self, node_id: NodeId, value_id: &str) -> Result<()> {
        let _ = (node_id, value_id);
        Ok(())
    }

    /// Persist a discovery descriptor with the node's settings
    fn persist_descriptor(&self, node_id: NodeId, descriptor: &JsonValue, deleted: bool) {
        let _ = (node_id, descriptor, deleted);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_api_response_serialization() {
        let ok = ApiResponse::ok("done", Some(json!([1, 2])));
        assert_eq!(
            serde_json::to_value(&ok).unwrap(),
            json!({"success": true, "message": "done", "result": [1, 2]})
        );

        let failed = ApiResponse::failure("Unknown API");
        assert_eq!(
            serde_json::to_value(&failed).unwrap(),
            json!({"success": false, "message": "Unknown API"})
        );
    }

    #[test]
    fn test_error_messages() {
        let err = DeviceError::ValueNotFound(3, "37-0-targetValue".to_string());
        assert_eq!(err.to_string(), "Value 37-0-targetValue not found on node 3");
    }
}
