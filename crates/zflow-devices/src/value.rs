/*!
 * Device values.
 *
 * A value is the atomic addressable quantity of a node, identified by its
 * command class, endpoint, property, and optional property key.
 */
use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

use crate::command_class::CommandClass;
use crate::node::NodeId;

/// A property or property key: either numeric or named
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PropertyKey {
    /// Numeric key (setpoint types, configuration parameters, ...)
    Number(i64),
    /// Named key
    Name(String),
}

impl PropertyKey {
    /// Numeric form of the key, if it is numeric
    pub fn as_number(&self) -> Option<i64> {
        match self {
            PropertyKey::Number(n) => Some(*n),
            PropertyKey::Name(_) => None,
        }
    }

    /// Whether the key is the given name
    pub fn is(&self, name: &str) -> bool {
        matches!(self, PropertyKey::Name(n) if n == name)
    }
}

impl fmt::Display for PropertyKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PropertyKey::Number(n) => write!(f, "{}", n),
            PropertyKey::Name(s) => write!(f, "{}", s),
        }
    }
}

impl From<&str> for PropertyKey {
    fn from(s: &str) -> Self {
        PropertyKey::Name(s.to_string())
    }
}

impl From<String> for PropertyKey {
    fn from(s: String) -> Self {
        PropertyKey::Name(s)
    }
}

impl From<i64> for PropertyKey {
    fn from(n: i64) -> Self {
        PropertyKey::Number(n)
    }
}

/// Value data type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ValueType {
    /// true / false
    Boolean,
    /// Integer or float
    Number,
    /// Free text
    String,
    /// Raw bytes, stored as a JSON array of numbers
    Buffer,
    /// Numeric value with enumerated states
    List,
    /// Anything else (objects such as colors)
    #[default]
    Any,
}

impl ValueType {
    /// Whether values of this type are numbers on the device side
    pub fn is_numeric(&self) -> bool {
        matches!(self, ValueType::Number | ValueType::List)
    }
}

/// One enumerated state of a list-typed value
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValueState {
    /// Ordinal sent to the device
    pub value: i64,
    /// Human-readable label
    pub text: String,
}

/// Build a node-less value id: `class-endpoint-property[-propertyKey]`
pub fn value_id(
    command_class: CommandClass,
    endpoint: u8,
    property: &PropertyKey,
    property_key: Option<&PropertyKey>,
) -> String {
    match property_key {
        Some(key) => format!("{}-{}-{}-{}", command_class, endpoint, property, key),
        None => format!("{}-{}-{}", command_class, endpoint, property),
    }
}

/// A typed, addressable value of a node
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Value {
    /// Owning node
    pub node_id: NodeId,
    /// Command class
    pub command_class: CommandClass,
    /// Endpoint, 0 for the root device
    #[serde(default)]
    pub endpoint: u8,
    /// Property
    pub property: PropertyKey,
    /// Display name of the property
    #[serde(default)]
    pub property_name: Option<String>,
    /// Optional property key
    #[serde(default)]
    pub property_key: Option<PropertyKey>,
    /// Display name of the property key
    #[serde(default)]
    pub property_key_name: Option<String>,
    /// Label
    #[serde(default)]
    pub label: Option<String>,
    /// Data type
    #[serde(default, rename = "type")]
    pub value_type: ValueType,
    /// Whether the value can be read
    #[serde(default = "default_true")]
    pub readable: bool,
    /// Whether the value can be written
    #[serde(default)]
    pub writable: bool,
    /// Event-like value, never retained
    #[serde(default)]
    pub stateless: bool,
    /// Enumerated states of list-typed values
    #[serde(default)]
    pub states: Vec<ValueState>,
    /// Unit
    #[serde(default)]
    pub unit: Option<String>,
    /// Minimum
    #[serde(default)]
    pub min: Option<f64>,
    /// Maximum
    #[serde(default)]
    pub max: Option<f64>,
    /// Default
    #[serde(default)]
    pub default: Option<JsonValue>,
    /// Node-less id of the companion write-only value
    #[serde(default)]
    pub target_value: Option<String>,
    /// Current value
    #[serde(default)]
    pub value: JsonValue,
}

fn default_true() -> bool {
    true
}

impl Value {
    /// Create a readable, read-only value
    pub fn new<P: Into<PropertyKey>>(
        node_id: NodeId,
        command_class: CommandClass,
        endpoint: u8,
        property: P,
    ) -> Self {
        Self {
            node_id,
            command_class,
            endpoint,
            property: property.into(),
            property_name: None,
            property_key: None,
            property_key_name: None,
            label: None,
            value_type: ValueType::Any,
            readable: true,
            writable: false,
            stateless: false,
            states: Vec::new(),
            unit: None,
            min: None,
            max: None,
            default: None,
            target_value: None,
            value: JsonValue::Null,
        }
    }

    /// Set the property key
    pub fn with_key<K: Into<PropertyKey>>(mut self, key: K) -> Self {
        self.property_key = Some(key.into());
        self
    }

    /// Set the property key display name
    pub fn with_key_name<S: Into<String>>(mut self, name: S) -> Self {
        self.property_key_name = Some(name.into());
        self
    }

    /// Set the property display name
    pub fn with_property_name<S: Into<String>>(mut self, name: S) -> Self {
        self.property_name = Some(name.into());
        self
    }

    /// Set the label
    pub fn with_label<S: Into<String>>(mut self, label: S) -> Self {
        self.label = Some(label.into());
        self
    }

    /// Set the data type
    pub fn with_type(mut self, value_type: ValueType) -> Self {
        self.value_type = value_type;
        self
    }

    /// Mark the value writable
    pub fn writable(mut self) -> Self {
        self.writable = true;
        self
    }

    /// Mark the value write-only
    pub fn write_only(mut self) -> Self {
        self.readable = false;
        self.writable = true;
        self
    }

    /// Mark the value stateless
    pub fn stateless(mut self) -> Self {
        self.stateless = true;
        self
    }

    /// Set enumerated states; also makes the value list-typed
    pub fn with_states(mut self, states: &[(i64, &str)]) -> Self {
        self.value_type = ValueType::List;
        self.states = states
            .iter()
            .map(|(value, text)| ValueState {
                value: *value,
                text: text.to_string(),
            })
            .collect();
        self
    }

    /// Set the unit
    pub fn with_unit<S: Into<String>>(mut self, unit: S) -> Self {
        self.unit = Some(unit.into());
        self
    }

    /// Set the range
    pub fn with_range(mut self, min: f64, max: f64) -> Self {
        self.min = Some(min);
        self.max = Some(max);
        self
    }

    /// Pair with a companion write-only value
    pub fn with_target<S: Into<String>>(mut self, target_value: S) -> Self {
        self.target_value = Some(target_value.into());
        self
    }

    /// Set the current value
    pub fn with_value<V: Into<JsonValue>>(mut self, value: V) -> Self {
        self.value = value.into();
        self
    }

    /// Node-less id, unique within the node
    pub fn id(&self) -> String {
        value_id(
            self.command_class,
            self.endpoint,
            &self.property,
            self.property_key.as_ref(),
        )
    }

    /// Id unique across the network: `nodeId-valueId`
    pub fn full_id(&self) -> String {
        format!("{}-{}", self.node_id, self.id())
    }

    /// Display name of the property, falling back to the property itself
    pub fn property_name(&self) -> String {
        self.property_name
            .clone()
            .unwrap_or_else(|| self.property.to_string())
    }

    /// Display name of the property key, falling back to the key itself
    pub fn key_name(&self) -> Option<String> {
        self.property_key_name
            .clone()
            .or_else(|| self.property_key.as_ref().map(|k| k.to_string()))
    }

    /// Label, falling back to the property name
    pub fn label(&self) -> String {
        self.label.clone().unwrap_or_else(|| self.property_name())
    }

    /// Whether the value has enumerated states
    pub fn is_list(&self) -> bool {
        self.value_type == ValueType::List || !self.states.is_empty()
    }

    /// Whether this is the `property` of the value, ignoring case
    pub fn is_property(&self, property: &str) -> bool {
        match &self.property {
            PropertyKey::Name(name) => name.eq_ignore_ascii_case(property),
            PropertyKey::Number(_) => false,
        }
    }

    /// Current value as a number
    pub fn number(&self) -> Option<f64> {
        match &self.value {
            JsonValue::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
            v => v.as_f64(),
        }
    }

    /// Label of an enumerated state
    pub fn state_text(&self, ordinal: i64) -> Option<&str> {
        self.states
            .iter()
            .find(|s| s.value == ordinal)
            .map(|s| s.text.as_str())
    }
}
