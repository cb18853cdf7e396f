/*!
 * Nodes of the control network.
 */
use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::value::Value;

/// Stable numeric node id
pub type NodeId = u32;

/// Prefix used when a node has no name
pub const NODE_PREFIX: &str = "nodeID_";

/// Device class triple reported by the node
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct DeviceClass {
    /// Basic device class
    #[serde(default)]
    pub basic: u8,
    /// Generic device class
    #[serde(default)]
    pub generic: u8,
    /// Specific device class
    #[serde(default)]
    pub specific: u8,
}

impl DeviceClass {
    /// Generic class of thermostats
    pub const GENERIC_THERMOSTAT: u8 = 0x08;
    /// Generic class of multilevel switches
    pub const GENERIC_MULTILEVEL_SWITCH: u8 = 0x11;

    /// Specific classes of multilevel switches that drive motors (A/B/C, multiposition)
    pub const MOTOR_CONTROL: [u8; 4] = [0x03, 0x05, 0x06, 0x07];

    /// Create a device class
    pub fn new(basic: u8, generic: u8, specific: u8) -> Self {
        Self {
            basic,
            generic,
            specific,
        }
    }

    /// Whether the device is a thermostat
    pub fn is_thermostat(&self) -> bool {
        self.generic == Self::GENERIC_THERMOSTAT
    }

    /// Whether the device is a motor-driven multilevel switch (blinds, shutters)
    pub fn is_motor_control(&self) -> bool {
        self.generic == Self::GENERIC_MULTILEVEL_SWITCH && Self::MOTOR_CONTROL.contains(&self.specific)
    }
}

/// Node status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeStatus {
    /// Not known yet
    #[default]
    Unknown,
    /// Battery device asleep
    Asleep,
    /// Battery device awake
    Awake,
    /// Not responding
    Dead,
    /// Responding
    Alive,
}

impl fmt::Display for NodeStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            NodeStatus::Unknown => "unknown",
            NodeStatus::Asleep => "asleep",
            NodeStatus::Awake => "awake",
            NodeStatus::Dead => "dead",
            NodeStatus::Alive => "alive",
        };
        write!(f, "{}", s)
    }
}

/// A device on the control network and its values
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Node {
    /// Stable id
    pub id: NodeId,
    /// User-assigned name
    #[serde(default)]
    pub name: Option<String>,
    /// User-assigned location
    #[serde(default)]
    pub location: Option<String>,
    /// Whether the interview completed
    #[serde(default)]
    pub ready: bool,
    /// Status
    #[serde(default)]
    pub status: NodeStatus,
    /// Device class
    #[serde(default)]
    pub device_class: DeviceClass,
    /// Manufacturer id
    #[serde(default)]
    pub manufacturer_id: u16,
    /// Product id
    #[serde(default)]
    pub product_id: u16,
    /// Product type
    #[serde(default)]
    pub product_type: u16,
    /// Manufacturer name
    #[serde(default)]
    pub manufacturer: Option<String>,
    /// Product label
    #[serde(default)]
    pub product_label: Option<String>,
    /// Product description
    #[serde(default)]
    pub product_description: Option<String>,
    /// Firmware version
    #[serde(default)]
    pub firmware_version: Option<String>,
    /// Values keyed by node-less value id
    #[serde(default)]
    pub values: BTreeMap<String, Value>,
}

impl Node {
    /// Create an empty node
    pub fn new(id: NodeId) -> Self {
        Self {
            id,
            name: None,
            location: None,
            ready: false,
            status: NodeStatus::Unknown,
            device_class: DeviceClass::default(),
            manufacturer_id: 0,
            product_id: 0,
            product_type: 0,
            manufacturer: None,
            product_label: None,
            product_description: None,
            firmware_version: None,
            values: BTreeMap::new(),
        }
    }

    /// Set the name
    pub fn with_name<S: Into<String>>(mut self, name: S) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Set the location
    pub fn with_location<S: Into<String>>(mut self, location: S) -> Self {
        self.location = Some(location.into());
        self
    }

    /// Set the device class
    pub fn with_device_class(mut self, device_class: DeviceClass) -> Self {
        self.device_class = device_class;
        self
    }

    /// Set manufacturer id, product id and product type
    pub fn with_product(mut self, manufacturer_id: u16, product_id: u16, product_type: u16) -> Self {
        self.manufacturer_id = manufacturer_id;
        self.product_id = product_id;
        self.product_type = product_type;
        self
    }

    /// Mark the node ready
    pub fn ready(mut self) -> Self {
        self.ready = true;
        self.status = NodeStatus::Alive;
        self
    }

    /// Add a value, keyed by its id. The value's node id is rewritten to this node.
    pub fn add_value(&mut self, mut value: Value) {
        value.node_id = self.id;
        self.values.insert(value.id(), value);
    }

    /// Builder form of [`Node::add_value`]
    pub fn with_value(mut self, value: Value) -> Self {
        self.add_value(value);
        self
    }

    /// Look up a value by node-less id
    pub fn value(&self, value_id: &str) -> Option<&Value> {
        self.values.get(value_id)
    }

    /// Device model id: `manufacturerId-productId-productType`
    pub fn device_id(&self) -> String {
        format!("{}-{}-{}", self.manufacturer_id, self.product_id, self.product_type)
    }

    /// Name, or `nodeID_<id>` when unnamed
    pub fn display_name(&self) -> String {
        match self.name.as_deref() {
            Some(name) if !name.is_empty() => name.to_string(),
            _ => format!("{}{}", NODE_PREFIX, self.id),
        }
    }

    /// Location, if set and not empty
    pub fn location(&self) -> Option<&str> {
        self.location.as_deref().filter(|l| !l.is_empty())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::command_class::CommandClass;

    #[test]
    fn test_device_id_and_names() {
        let node = Node::new(4).with_product(134, 100, 3);
        assert_eq!(node.device_id(), "134-100-3");
        assert_eq!(node.display_name(), "nodeID_4");
        assert_eq!(node.location(), None);

        let node = node.with_name("Lamp").with_location("");
        assert_eq!(node.display_name(), "Lamp");
        assert_eq!(node.location(), None);
    }

    #[test]
    fn test_add_value_rewrites_node_id() {
        let node = Node::new(9).with_value(Value::new(1, CommandClass::SWITCH_BINARY, 0, "currentValue"));
        let value = node.value("37-0-currentValue").unwrap();
        assert_eq!(value.node_id, 9);
        assert_eq!(value.full_id(), "9-37-0-currentValue");
    }

    #[test]
    fn test_device_class_predicates() {
        assert!(DeviceClass::new(4, 0x08, 0x06).is_thermostat());
        assert!(DeviceClass::new(4, 0x11, 0x07).is_motor_control());
        assert!(!DeviceClass::new(4, 0x11, 0x01).is_motor_control());
    }
}
