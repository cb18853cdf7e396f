/*!
 * Discovered-device store.
 *
 * Holds the active descriptors of every node, keyed by `type_objectId`,
 * and the reverse index from full value id to the owning descriptor. A
 * value id has at most one owner at any time.
 */
use std::collections::{BTreeMap, HashMap};

use tracing::debug;

use zflow_devices::NodeId;

use crate::descriptor::Descriptor;

/// Owner of a value: node and descriptor key
pub type Owner = (NodeId, String);

/// Descriptors and value ownership of all nodes
#[derive(Debug, Default)]
pub struct DiscoveredStore {
    nodes: HashMap<NodeId, BTreeMap<String, Descriptor>>,
    owners: HashMap<String, Owner>,
}

fn full_id(node_id: NodeId, value_id: &str) -> String {
    format!("{}-{}", node_id, value_id)
}

impl DiscoveredStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Store a descriptor in its node's map, replacing one with the same key
    pub fn insert(&mut self, node_id: NodeId, descriptor: Descriptor) {
        self.nodes
            .entry(node_id)
            .or_default()
            .insert(descriptor.key(), descriptor);
    }

    /// Store a descriptor and take ownership of its values.
    ///
    /// Values owned by a different descriptor are left to their owner.
    pub fn claim(&mut self, node_id: NodeId, descriptor: &Descriptor) {
        let key = descriptor.key();
        for value_id in &descriptor.values {
            let id = full_id(node_id, value_id);
            match self.owners.get(&id) {
                Some((owner_node, owner_key)) if *owner_node != node_id || *owner_key != key => {
                    debug!("{} already owned by {}, not claiming for {}", id, owner_key, key);
                }
                _ => {
                    self.owners.insert(id, (node_id, key.clone()));
                }
            }
        }
        self.insert(node_id, descriptor.clone());
    }

    /// Drop a descriptor and release the values it owns
    pub fn release(&mut self, node_id: NodeId, descriptor: &Descriptor) {
        let key = descriptor.key();
        self.owners
            .retain(|_, (owner_node, owner_key)| *owner_node != node_id || *owner_key != key);
        if let Some(descriptors) = self.nodes.get_mut(&node_id) {
            descriptors.remove(&key);
        }
    }

    /// Owner of a value, by node and node-less value id
    pub fn owner_of(&self, node_id: NodeId, value_id: &str) -> Option<&Owner> {
        self.owners.get(&full_id(node_id, value_id))
    }

    /// Descriptor owning a value
    pub fn descriptor_of(&self, node_id: NodeId, value_id: &str) -> Option<&Descriptor> {
        let (owner_node, key) = self.owner_of(node_id, value_id)?;
        self.get(*owner_node, key)
    }

    /// Whether a value has an owner
    pub fn is_discovered(&self, node_id: NodeId, value_id: &str) -> bool {
        self.owner_of(node_id, value_id).is_some()
    }

    /// Whether the node has a descriptor with this key
    pub fn contains(&self, node_id: NodeId, key: &str) -> bool {
        self.get(node_id, key).is_some()
    }

    /// A descriptor by node and key
    pub fn get(&self, node_id: NodeId, key: &str) -> Option<&Descriptor> {
        self.nodes.get(&node_id)?.get(key)
    }

    /// Descriptors of a node
    pub fn descriptors(&self, node_id: NodeId) -> Vec<Descriptor> {
        self.nodes
            .get(&node_id)
            .map(|d| d.values().cloned().collect())
            .unwrap_or_default()
    }

    /// Ids of the nodes with descriptors
    pub fn node_ids(&self) -> Vec<NodeId> {
        let mut ids: Vec<NodeId> = self.nodes.keys().copied().collect();
        ids.sort_unstable();
        ids
    }

    /// Remove every descriptor of a node and prune ownership by node id prefix
    pub fn clear_node(&mut self, node_id: NodeId) -> Vec<Descriptor> {
        let prefix = format!("{}-", node_id);
        self.owners.retain(|id, _| !id.starts_with(&prefix));
        self.nodes
            .remove(&node_id)
            .map(|d| d.into_values().collect())
            .unwrap_or_default()
    }

    /// Mark every descriptor of a node ignored, keeping ownership
    pub fn mark_ignored(&mut self, node_id: NodeId) -> Vec<Descriptor> {
        match self.nodes.get_mut(&node_id) {
            Some(descriptors) => descriptors
                .values_mut()
                .map(|d| {
                    d.ignore_discovery = true;
                    d.clone()
                })
                .collect(),
            None => Vec::new(),
        }
    }

    /// Number of owned values
    pub fn owned_count(&self) -> usize {
        self.owners.len()
    }
}
