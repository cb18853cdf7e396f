/*!
 * Discovery descriptors.
 *
 * A descriptor is the structured entity configuration published to the
 * discovery consumer for one or more values of a node.
 */
use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value as JsonValue};

/// Entity category of a descriptor
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Category {
    /// On/off actuator
    Switch,
    /// Dimmer or color light
    Light,
    /// Blinds, shutters, garage doors
    Cover,
    /// Door lock
    Lock,
    /// Generic sensor
    Sensor,
    /// Two-state sensor
    BinarySensor,
    /// Thermostat
    Climate,
    /// Fan
    Fan,
}

impl Category {
    /// Name used in discovery topics and unique ids
    pub fn as_str(&self) -> &'static str {
        match self {
            Category::Switch => "switch",
            Category::Light => "light",
            Category::Cover => "cover",
            Category::Lock => "lock",
            Category::Sensor => "sensor",
            Category::BinarySensor => "binary_sensor",
            Category::Climate => "climate",
            Category::Fan => "fan",
        }
    }

    /// Whether the entity exposes the state topic as its attributes topic
    pub fn has_attributes(&self) -> bool {
        matches!(
            self,
            Category::Sensor | Category::BinarySensor | Category::Lock | Category::Climate | Category::Fan
        )
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An entity configuration for the discovery consumer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Descriptor {
    /// Entity category
    #[serde(rename = "type")]
    pub category: Category,
    /// Object id, unique per node and category
    pub object_id: String,
    /// Payload published to the consumer
    #[serde(default)]
    pub discovery_payload: Map<String, JsonValue>,
    /// Discovery topic, relative to the discovery prefix
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub discovery_topic: String,
    /// Node-less ids of the contributing values
    #[serde(default)]
    pub values: Vec<String>,
    /// Survives rediscovery when persisted by the driver
    #[serde(default)]
    pub persistent: bool,
    /// Kept in the store but never published
    #[serde(default)]
    pub ignore_discovery: bool,
    /// Consumer mode token to device ordinal
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mode_map: Option<BTreeMap<String, i64>>,
    /// Consumer fan mode token to device ordinal
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fan_mode_map: Option<BTreeMap<String, i64>>,
    /// Mode ordinal to setpoint value id
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub setpoint_topic: Option<BTreeMap<i64, String>>,
    /// Setpoint value id used until the mode is known
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_setpoint: Option<String>,
    /// Operating state ordinal to consumer action token
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub action_map: Option<BTreeMap<i64, String>>,
}

impl Descriptor {
    /// Create an empty descriptor
    pub fn new<S: Into<String>>(category: Category, object_id: S) -> Self {
        Self {
            category,
            object_id: object_id.into(),
            discovery_payload: Map::new(),
            discovery_topic: String::new(),
            values: Vec::new(),
            persistent: false,
            ignore_discovery: false,
            mode_map: None,
            fan_mode_map: None,
            setpoint_topic: None,
            default_setpoint: None,
            action_map: None,
        }
    }

    /// Merge the entries of a JSON object into the payload
    pub fn with_payload(mut self, payload: JsonValue) -> Self {
        if let JsonValue::Object(entries) = payload {
            self.discovery_payload.extend(entries);
        }
        self
    }

    /// Key in the node's descriptor map: `type_objectId`
    pub fn key(&self) -> String {
        format!("{}_{}", self.category, self.object_id)
    }

    /// Set a payload entry
    pub fn set<K: Into<String>, V: Into<JsonValue>>(&mut self, key: K, value: V) {
        self.discovery_payload.insert(key.into(), value.into());
    }

    /// A payload entry as a string
    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.discovery_payload.get(key).and_then(JsonValue::as_str)
    }

    /// Whether the payload defines both `payload_on` and `payload_off`
    pub fn has_on_off(&self) -> bool {
        self.discovery_payload.contains_key("payload_on")
            && self.discovery_payload.contains_key("payload_off")
    }

    /// Device ordinal for a consumer mode or fan mode token
    pub fn mode_ordinal(&self, token: &str) -> Option<i64> {
        let token = token.trim();
        self.mode_map
            .iter()
            .chain(self.fan_mode_map.iter())
            .find_map(|map| map.get(token).copied())
    }
}
