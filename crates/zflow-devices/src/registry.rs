/*!
 * In-memory node registry.
 *
 * [`NodeRegistry`] holds node snapshots and implements [`DeviceDriver`]
 * against them. Writes are applied to the stored value and echoed as
 * [`DriverEvent::ValueChanged`], so it doubles as a simulated network.
 */
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::{Mutex, RwLock};

use serde_json::{json, Value as JsonValue};
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

use crate::device::{ApiResponse, DeviceDriver, DeviceError, Result};
use crate::event::DriverEvent;
use crate::node::{Node, NodeId};
use crate::value::Value;

/// A write received by the registry
#[derive(Debug, Clone, PartialEq)]
pub struct WriteCommand {
    /// Node
    pub node_id: NodeId,
    /// Node-less value id
    pub value_id: String,
    /// Written value
    pub value: JsonValue,
}

/// In-memory device driver
#[derive(Debug)]
pub struct NodeRegistry {
    home_hex: String,
    nodes: RwLock<BTreeMap<NodeId, Node>>,
    writes: Mutex<Vec<WriteCommand>>,
    polls: Mutex<Vec<(NodeId, String)>>,
    persisted: Mutex<Vec<(NodeId, JsonValue, bool)>>,
    event_sender: broadcast::Sender<DriverEvent>,
}

impl NodeRegistry {
    /// Create an empty registry for the given home id
    pub fn new<S: Into<String>>(home_hex: S) -> Self {
        let (event_sender, _) = broadcast::channel(256);
        Self {
            home_hex: home_hex.into(),
            nodes: RwLock::new(BTreeMap::new()),
            writes: Mutex::new(Vec::new()),
            polls: Mutex::new(Vec::new()),
            persisted: Mutex::new(Vec::new()),
            event_sender,
        }
    }

    /// Load a registry from a JSON snapshot: `{ "home_hex": "...", "nodes": [Node, ...] }`
    pub fn from_json_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let text = std::fs::read_to_string(path.as_ref())
            .map_err(|e| DeviceError::driver(format!("Failed to read node snapshot: {}", e)))?;
        let snapshot: JsonValue = serde_json::from_str(&text)
            .map_err(|e| DeviceError::driver(format!("Invalid node snapshot: {}", e)))?;

        let home_hex = snapshot
            .get("home_hex")
            .and_then(JsonValue::as_str)
            .unwrap_or("0x00000000");
        let nodes: Vec<Node> = serde_json::from_value(
            snapshot.get("nodes").cloned().unwrap_or_else(|| json!([])),
        )
        .map_err(|e| DeviceError::driver(format!("Invalid node list: {}", e)))?;

        let registry = Self::new(home_hex);
        for node in nodes {
            registry.insert_node(node)?;
        }
        info!("Loaded {} nodes from snapshot", registry.node_ids().len());
        Ok(registry)
    }

    /// Insert or replace a node
    pub fn insert_node(&self, mut node: Node) -> Result<()> {
        // Values are keyed by their own id regardless of how they were loaded
        let values = std::mem::take(&mut node.values);
        for (_, value) in values {
            node.add_value(value);
        }

        let mut nodes = self.nodes.write().map_err(|_| {
            DeviceError::driver("Failed to acquire write lock on node registry")
        })?;
        debug!("Registered node {}", node.id);
        nodes.insert(node.id, node);
        Ok(())
    }

    /// Remove a node and announce it
    pub fn remove_node(&self, node_id: NodeId) -> Result<Node> {
        let mut nodes = self.nodes.write().map_err(|_| {
            DeviceError::driver("Failed to acquire write lock on node registry")
        })?;
        let node = nodes.remove(&node_id).ok_or(DeviceError::NodeNotFound(node_id))?;
        let _ = self.event_sender.send(DriverEvent::NodeRemoved { node_id });
        Ok(node)
    }

    /// Mark a node ready (or not) and announce its status
    pub fn set_ready(&self, node_id: NodeId, ready: bool) -> Result<()> {
        self.with_node(node_id, |node| {
            node.ready = ready;
            Ok(())
        })?;
        let _ = self.event_sender.send(DriverEvent::NodeStatus { node_id });
        Ok(())
    }

    /// Add a value to a node and report it
    pub fn add_value(&self, node_id: NodeId, value: Value) -> Result<()> {
        let value_id = value.id();
        self.with_node(node_id, |node| {
            node.add_value(value);
            Ok(())
        })?;
        let _ = self.event_sender.send(DriverEvent::ValueChanged {
            node_id,
            value_id,
            changed: true,
        });
        Ok(())
    }

    /// Update a value and report it
    pub fn update_value(&self, node_id: NodeId, value_id: &str, new_value: JsonValue) -> Result<bool> {
        let changed = self.with_node(node_id, |node| {
            let value = node
                .values
                .get_mut(value_id)
                .ok_or_else(|| DeviceError::ValueNotFound(node_id, value_id.to_string()))?;
            let changed = value.value != new_value;
            value.value = new_value;
            Ok(changed)
        })?;
        let _ = self.event_sender.send(DriverEvent::ValueChanged {
            node_id,
            value_id: value_id.to_string(),
            changed,
        });
        Ok(changed)
    }

    /// Subscribe to driver events
    pub fn subscribe(&self) -> broadcast::Receiver<DriverEvent> {
        self.event_sender.subscribe()
    }

    /// Writes received so far
    pub fn writes(&self) -> Vec<WriteCommand> {
        self.writes.lock().map(|w| w.clone()).unwrap_or_default()
    }

    /// Polls requested so far
    pub fn polls(&self) -> Vec<(NodeId, String)> {
        self.polls.lock().map(|p| p.clone()).unwrap_or_default()
    }

    /// Descriptors persisted so far, with their deletion flag
    pub fn persisted(&self) -> Vec<(NodeId, JsonValue, bool)> {
        self.persisted.lock().map(|p| p.clone()).unwrap_or_default()
    }

    fn with_node<T, F>(&self, node_id: NodeId, f: F) -> Result<T>
    where
        F: FnOnce(&mut Node) -> Result<T>,
    {
        let mut nodes = self.nodes.write().map_err(|_| {
            DeviceError::driver("Failed to acquire write lock on node registry")
        })?;
        let node = nodes.get_mut(&node_id).ok_or(DeviceError::NodeNotFound(node_id))?;
        f(node)
    }
}

impl DeviceDriver for NodeRegistry {
    fn home_hex(&self) -> String {
        self.home_hex.clone()
    }

    fn node(&self, node_id: NodeId) -> Option<Node> {
        self.nodes.read().ok()?.get(&node_id).cloned()
    }

    fn node_ids(&self) -> Vec<NodeId> {
        self.nodes
            .read()
            .map(|nodes| nodes.keys().copied().collect())
            .unwrap_or_default()
    }

    fn write_value(&self, node_id: NodeId, value_id: &str, value: JsonValue) -> Result<()> {
        let node = self.node(node_id).ok_or(DeviceError::NodeNotFound(node_id))?;
        let target = node
            .value(value_id)
            .ok_or_else(|| DeviceError::ValueNotFound(node_id, value_id.to_string()))?;
        if !target.writable {
            return Err(DeviceError::NotWritable(node_id, value_id.to_string()));
        }

        debug!("Writing {} to {}-{}", value, node_id, value_id);
        if let Ok(mut writes) = self.writes.lock() {
            writes.push(WriteCommand {
                node_id,
                value_id: value_id.to_string(),
                value: value.clone(),
            });
        }

        self.update_value(node_id, value_id, value)?;
        Ok(())
    }

    fn call_api(&self, name: &str, args: &[JsonValue]) -> ApiResponse {
        match name {
            "getNodes" => match self.nodes.read() {
                Ok(nodes) => match serde_json::to_value(nodes.values().collect::<Vec<_>>()) {
                    Ok(result) => ApiResponse::ok("Success zwave api call", Some(result)),
                    Err(e) => ApiResponse::failure(e.to_string()),
                },
                Err(_) => ApiResponse::failure("Failed to acquire read lock on node registry"),
            },
            "refreshValues" => {
                let Some(node_id) = args.first().and_then(JsonValue::as_u64) else {
                    return ApiResponse::failure("Missing node id");
                };
                match self.node(node_id as NodeId) {
                    Some(node) => {
                        for value_id in node.values.keys() {
                            let _ = self.poll_value(node.id, value_id);
                        }
                        ApiResponse::ok("Values refreshed", None)
                    }
                    None => ApiResponse::failure(format!("Node {} not found", node_id)),
                }
            }
            _ => {
                warn!("Unknown API call {}", name);
                ApiResponse::failure(format!("Unknown API {}", name))
            }
        }
    }

    fn poll_value(&self, node_id: NodeId, value_id: &str) -> Result<()> {
        let node = self.node(node_id).ok_or(DeviceError::NodeNotFound(node_id))?;
        let value = node
            .value(value_id)
            .ok_or_else(|| DeviceError::ValueNotFound(node_id, value_id.to_string()))?
            .value
            .clone();

        if let Ok(mut polls) = self.polls.lock() {
            polls.push((node_id, value_id.to_string()));
        }
        let _ = self.event_sender.send(DriverEvent::ValueChanged {
            node_id,
            value_id: value_id.to_string(),
            changed: false,
        });
        debug!("Polled {}-{}: {}", node_id, value_id, value);
        Ok(())
    }

    fn persist_descriptor(&self, node_id: NodeId, descriptor: &JsonValue, deleted: bool) {
        if let Ok(mut persisted) = self.persisted.lock() {
            persisted.push((node_id, descriptor.clone(), deleted));
        }
    }
}
