/*!
 * Payload transform pipeline.
 *
 * `encode` turns a device value into an outbound payload:
 * raw value, post-operation, encode hook, envelope, node annotation.
 *
 * `decode` mirrors it for inbound payloads:
 * unwrap, free-text booleans, device remaps, buffer normalization,
 * inverse post-operation, decode hook.
 *
 * Both return errors instead of panicking; the gateway logs them and
 * skips the publish or write for that cycle.
 */
use serde_json::{json, Map, Value as JsonValue};

use zflow_core::config::{GatewayConfig, PayloadMode, ValueOverride};
use zflow_core::utils::now_millis;
use zflow_devices::{CommandClass, Node, Value, ValueType};

use crate::descriptor::Descriptor;
use crate::error::{Error, Result};
use crate::expression::{number_to_json, Hook, PostOperation};

const TRUE_WORDS: [&str; 3] = ["true", "on", "lock"];
const FALSE_WORDS: [&str; 3] = ["false", "off", "unlock"];

/// Level written for "on" to multilevel switches: restore the previous level
const RESTORE_LEVEL: i64 = 0xff;

/// Encodes and decodes payloads for one configuration
#[derive(Debug, Clone, Copy)]
pub struct Transformer<'a> {
    config: &'a GatewayConfig,
}

impl<'a> Transformer<'a> {
    /// Create a transformer
    pub fn new(config: &'a GatewayConfig) -> Self {
        Self { config }
    }

    /// Device value to outbound payload
    pub fn encode(&self, node: &Node, value: &Value, conf: Option<&ValueOverride>) -> Result<JsonValue> {
        let mut data = raw_value(value);

        if let Some(op) = conf.and_then(|c| c.post_operation.as_deref()) {
            if let Some(number) = data.as_f64() {
                let op = PostOperation::parse(op)?;
                data = number_to_json(op.apply(number)?)?;
            }
        }

        if let Some(source) = conf.and_then(|c| c.encode_hook.as_deref()) {
            if let Some(result) = Hook::new(source).run(&data, value, node)? {
                data = result;
            }
        }

        let mut payload = match self.config.payload {
            PayloadMode::FullObject => full_object(value, data)?,
            PayloadMode::Timestamped => json!({ "time": now_millis(), "value": data }),
            PayloadMode::Raw => data,
        };
        self.annotate(&mut payload, node);
        Ok(payload)
    }

    /// Wrap a non-value payload (status, notifications) in the configured envelope
    pub fn wrap(&self, data: JsonValue) -> JsonValue {
        match self.config.payload {
            PayloadMode::Raw => data,
            PayloadMode::FullObject | PayloadMode::Timestamped => {
                json!({ "time": now_millis(), "value": data })
            }
        }
    }

    /// Inbound payload to the value written to the device
    pub fn decode(
        &self,
        payload: &JsonValue,
        node: &Node,
        value: &Value,
        conf: Option<&ValueOverride>,
        descriptor: Option<&Descriptor>,
    ) -> Result<JsonValue> {
        let mut data = match payload {
            JsonValue::Object(map) if map.contains_key("value") => map["value"].clone(),
            other => other.clone(),
        };

        data = remap(data, value, descriptor)?;

        if value.value_type == ValueType::Buffer {
            data = normalize_buffer(&data)?;
        }

        if let Some(op) = conf.and_then(|c| c.post_operation.as_deref()) {
            if let Some(number) = data.as_f64() {
                let op = PostOperation::parse(op)?.inverse()?;
                data = number_to_json(op.apply(number)?)?;
            }
        }

        if let Some(source) = conf.and_then(|c| c.decode_hook.as_deref()) {
            if let Some(result) = Hook::new(source).run(&data, value, node)? {
                data = result;
            }
        }

        Ok(data)
    }

    fn annotate(&self, payload: &mut JsonValue, node: &Node) {
        if !self.config.include_node_info {
            return;
        }
        if let JsonValue::Object(map) = payload {
            map.insert("nodeName".to_string(), json!(node.display_name()));
            map.insert("nodeLocation".to_string(), json!(node.location().unwrap_or_default()));
        }
    }
}

fn raw_value(value: &Value) -> JsonValue {
    match (&value.value_type, &value.value) {
        (ValueType::Buffer, JsonValue::Array(bytes)) => json!({ "type": "Buffer", "data": bytes }),
        (_, v) => v.clone(),
    }
}

fn full_object(value: &Value, data: JsonValue) -> Result<JsonValue> {
    let mut object = match serde_json::to_value(value)? {
        JsonValue::Object(map) => map,
        _ => Map::new(),
    };
    object.insert("id".to_string(), json!(value.full_id()));
    object.insert("value".to_string(), data);
    object.insert("time".to_string(), json!(now_millis()));
    Ok(JsonValue::Object(object))
}

/// Free text to boolean: `true/on/lock` and `false/off/unlock`, as whole words
pub fn parse_bool_text(text: &str) -> Option<bool> {
    let words: Vec<String> = text
        .split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty())
        .map(str::to_lowercase)
        .collect();

    if words.iter().any(|w| TRUE_WORDS.contains(&w.as_str())) {
        Some(true)
    } else if words.iter().any(|w| FALSE_WORDS.contains(&w.as_str())) {
        Some(false)
    } else {
        None
    }
}

fn remap(data: JsonValue, value: &Value, descriptor: Option<&Descriptor>) -> Result<JsonValue> {
    match value.command_class {
        CommandClass::SWITCH_TOGGLE_BINARY => return Ok(json!(1)),
        CommandClass::SWITCH_TOGGLE_MULTILEVEL => {
            let level = if value.number().unwrap_or(0.0) > 0.0 { 0 } else { RESTORE_LEVEL };
            return Ok(json!(level));
        }
        _ => {}
    }

    let mut data = data;
    if let JsonValue::String(text) = &data {
        if value.value_type.is_numeric() || value.is_list() {
            if let Some(ordinal) = descriptor.and_then(|d| d.mode_ordinal(text)) {
                return Ok(json!(ordinal));
            }
            if let Some(state) = value
                .states
                .iter()
                .find(|s| s.text.eq_ignore_ascii_case(text.trim()))
            {
                return Ok(json!(state.value));
            }
            if let Ok(number) = text.trim().parse::<f64>() {
                return number_to_json(number);
            }
        }
        if value.value_type == ValueType::Boolean || value.value_type.is_numeric() {
            if let Some(b) = parse_bool_text(text) {
                data = JsonValue::Bool(b);
            }
        }
    }

    match &data {
        JsonValue::Bool(on) if value.value_type.is_numeric() => {
            if *on {
                Ok(json!(on_level(value)))
            } else {
                number_to_json(value.min.unwrap_or(0.0))
            }
        }
        JsonValue::Number(n) if value.value_type == ValueType::Boolean => {
            Ok(JsonValue::Bool(n.as_f64().unwrap_or(0.0) > 0.0))
        }
        _ => Ok(data),
    }
}

fn on_level(value: &Value) -> i64 {
    match value.command_class {
        CommandClass::SWITCH_MULTILEVEL | CommandClass::BASIC => RESTORE_LEVEL,
        _ => value.max.map(|m| m as i64).unwrap_or(1),
    }
}

/// Normalize a buffer payload into a JSON array of bytes.
///
/// Accepts a byte array, `{"type": "Buffer", "data": [...]}`, a
/// length-prefixed index object `{"length": 2, "0": .., "1": ..}` or a string.
pub fn normalize_buffer(data: &JsonValue) -> Result<JsonValue> {
    let bytes: Vec<JsonValue> = match data {
        JsonValue::Array(items) => items.clone(),
        JsonValue::Object(map) => {
            if let Some(JsonValue::Array(items)) = map.get("data") {
                items.clone()
            } else if let Some(length) = map.get("length").and_then(JsonValue::as_u64) {
                (0..length)
                    .map(|i| map.get(&i.to_string()).cloned().unwrap_or(JsonValue::Null))
                    .collect()
            } else {
                return Err(Error::transform("Object payload is not a buffer"));
            }
        }
        JsonValue::String(s) => s.bytes().map(JsonValue::from).collect(),
        other => return Err(Error::transform(format!("Cannot convert {} to a buffer", other))),
    };

    bytes
        .into_iter()
        .map(|b| match b.as_u64() {
            Some(byte) if byte <= 0xff => Ok(JsonValue::from(byte)),
            _ => Err(Error::transform(format!("Invalid buffer byte {}", b))),
        })
        .collect::<Result<Vec<_>>>()
        .map(JsonValue::Array)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    use crate::descriptor::Category;

    fn config(payload: PayloadMode) -> GatewayConfig {
        let mut config = GatewayConfig::default();
        config.payload = payload;
        config
    }

    fn node_with(value: Value) -> Node {
        Node::new(2).with_name("Node").with_location("Office").with_value(value)
    }

    fn conf(post_operation: Option<&str>) -> ValueOverride {
        ValueOverride {
            device: "0-0-0".to_string(),
            value: "49-0-Air temperature".to_string(),
            post_operation: post_operation.map(str::to_string),
            ..Default::default()
        }
    }

    #[test]
    fn test_round_trip_identity() {
        let values = vec![
            Value::new(2, CommandClass::SWITCH_BINARY, 0, "currentValue")
                .with_type(ValueType::Boolean)
                .with_value(true),
            Value::new(2, CommandClass::SENSOR_MULTILEVEL, 0, "Air temperature")
                .with_type(ValueType::Number)
                .with_value(21.5),
            Value::new(2, CommandClass::THERMOSTAT_MODE, 0, "mode")
                .with_states(&[(0, "Off"), (1, "Heat")])
                .with_value(1),
            Value::new(2, CommandClass::CONFIGURATION, 0, "name")
                .with_type(ValueType::String)
                .with_value("on"),
            Value::new(2, CommandClass::SWITCH_COLOR, 0, "currentColor")
                .with_value(json!({"red": 255, "green": 0, "blue": 12})),
            Value::new(2, CommandClass::CONFIGURATION, 0, "raw")
                .with_type(ValueType::Buffer)
                .with_value(json!([1, 2, 255])),
        ];

        for mode in [PayloadMode::FullObject, PayloadMode::Timestamped, PayloadMode::Raw] {
            let config = config(mode);
            let transformer = Transformer::new(&config);
            for value in &values {
                let node = node_with(value.clone());
                let encoded = transformer.encode(&node, value, None).unwrap();
                let decoded = transformer.decode(&encoded, &node, value, None, None).unwrap();
                assert_eq!(decoded, value.value, "{:?} {}", mode, value.id());
            }
        }
    }

    #[test]
    fn test_envelopes() {
        let value = Value::new(2, CommandClass::SENSOR_MULTILEVEL, 0, "Air temperature")
            .with_type(ValueType::Number)
            .with_value(20);
        let node = node_with(value.clone());

        let raw = config(PayloadMode::Raw);
        assert_eq!(Transformer::new(&raw).encode(&node, &value, None).unwrap(), json!(20));

        let timestamped = config(PayloadMode::Timestamped);
        let payload = Transformer::new(&timestamped).encode(&node, &value, None).unwrap();
        assert_eq!(payload["value"], json!(20));
        assert!(payload["time"].as_i64().is_some());

        let mut full = config(PayloadMode::FullObject);
        full.include_node_info = true;
        let payload = Transformer::new(&full).encode(&node, &value, None).unwrap();
        assert_eq!(payload["id"], json!("2-49-0-Air temperature"));
        assert_eq!(payload["command_class"], json!(49));
        assert_eq!(payload["nodeName"], json!("Node"));
        assert_eq!(payload["nodeLocation"], json!("Office"));
    }

    #[test]
    fn test_post_operation_round_trip() {
        let value = Value::new(2, CommandClass::SENSOR_MULTILEVEL, 0, "Air temperature")
            .with_type(ValueType::Number)
            .with_value(215);
        let node = node_with(value.clone());
        let config = config(PayloadMode::Raw);
        let transformer = Transformer::new(&config);
        let conf = conf(Some("/10"));

        let encoded = transformer.encode(&node, &value, Some(&conf)).unwrap();
        assert_eq!(encoded, json!(21.5));
        let decoded = transformer.decode(&encoded, &node, &value, Some(&conf), None).unwrap();
        assert_eq!(decoded, json!(215));
    }

    #[test]
    fn test_compound_post_operation_round_trip() {
        let value = Value::new(2, CommandClass::SENSOR_MULTILEVEL, 0, "Air temperature")
            .with_type(ValueType::Number)
            .with_value(20);
        let node = node_with(value.clone());
        let config = config(PayloadMode::Timestamped);
        let transformer = Transformer::new(&config);
        let conf = conf(Some("*1.8+32"));

        let encoded = transformer.encode(&node, &value, Some(&conf)).unwrap();
        assert_eq!(encoded["value"], json!(68));
        let decoded = transformer.decode(&encoded, &node, &value, Some(&conf), None).unwrap();
        assert_eq!(decoded, json!(20));
    }

    #[test]
    fn test_invalid_post_operation_is_an_error() {
        let value = Value::new(2, CommandClass::SENSOR_MULTILEVEL, 0, "Air temperature")
            .with_type(ValueType::Number)
            .with_value(1);
        let node = node_with(value.clone());
        let config = config(PayloadMode::Raw);

        let result = Transformer::new(&config).encode(&node, &value, Some(&conf(Some("; drop"))));
        assert!(matches!(result, Err(Error::Expression(_))));
    }

    #[test]
    fn test_hooks() {
        let value = Value::new(2, CommandClass::SENSOR_MULTILEVEL, 0, "Air temperature")
            .with_type(ValueType::Number)
            .with_value(20);
        let node = node_with(value.clone());
        let config = config(PayloadMode::Raw);
        let transformer = Transformer::new(&config);

        let mut conf = conf(None);
        conf.encode_hook = Some("value * 9 / 5 + 32".to_string());
        conf.decode_hook = Some("round(value)".to_string());

        assert_eq!(transformer.encode(&node, &value, Some(&conf)).unwrap(), json!(68));
        assert_eq!(
            transformer.decode(&json!(20.4), &node, &value, Some(&conf), None).unwrap(),
            json!(20.0)
        );
    }

    #[test]
    fn test_free_text_booleans() {
        assert_eq!(parse_bool_text("ON"), Some(true));
        assert_eq!(parse_bool_text("lock"), Some(true));
        assert_eq!(parse_bool_text("UNLOCK"), Some(false));
        assert_eq!(parse_bool_text("turn it off"), Some(false));
        assert_eq!(parse_bool_text("online"), None);

        let value = Value::new(2, CommandClass::SWITCH_BINARY, 0, "targetValue")
            .with_type(ValueType::Boolean)
            .write_only();
        let node = node_with(value.clone());
        let config = config(PayloadMode::Raw);
        let transformer = Transformer::new(&config);
        assert_eq!(transformer.decode(&json!("ON"), &node, &value, None, None).unwrap(), json!(true));
        assert_eq!(transformer.decode(&json!(0), &node, &value, None, None).unwrap(), json!(false));
    }

    #[test]
    fn test_boolean_to_numeric_range() {
        let dimmer = Value::new(2, CommandClass::SWITCH_MULTILEVEL, 0, "targetValue")
            .with_type(ValueType::Number)
            .with_range(0.0, 99.0)
            .write_only();
        let node = node_with(dimmer.clone());
        let config = config(PayloadMode::Raw);
        let transformer = Transformer::new(&config);

        assert_eq!(transformer.decode(&json!(true), &node, &dimmer, None, None).unwrap(), json!(255));
        assert_eq!(transformer.decode(&json!("off"), &node, &dimmer, None, None).unwrap(), json!(0));
        assert_eq!(transformer.decode(&json!("42"), &node, &dimmer, None, None).unwrap(), json!(42));

        let lock = Value::new(2, CommandClass::DOOR_LOCK, 0, "targetMode")
            .with_states(&[(0, "Unsecured"), (255, "Secured")])
            .with_range(0.0, 255.0)
            .write_only();
        assert_eq!(transformer.decode(&json!("LOCK"), &node, &lock, None, None).unwrap(), json!(255));
        assert_eq!(transformer.decode(&json!("Unsecured"), &node, &lock, None, None).unwrap(), json!(0));
    }

    #[test]
    fn test_mode_map_remap() {
        let mode = Value::new(2, CommandClass::THERMOSTAT_MODE, 0, "mode")
            .with_states(&[(0, "Off"), (1, "Heat"), (11, "Energy heat")])
            .writable();
        let node = node_with(mode.clone());
        let config = config(PayloadMode::Raw);
        let transformer = Transformer::new(&config);

        let mut descriptor = crate::descriptor::Descriptor::new(Category::Climate, "thermostat");
        descriptor.mode_map = Some(BTreeMap::from([
            ("off".to_string(), 0),
            ("heat".to_string(), 1),
            ("heat_cool".to_string(), 11),
        ]));

        assert_eq!(
            transformer.decode(&json!("heat_cool"), &node, &mode, None, Some(&descriptor)).unwrap(),
            json!(11)
        );
        assert_eq!(
            transformer.decode(&json!({"value": "off"}), &node, &mode, None, Some(&descriptor)).unwrap(),
            json!(0)
        );
    }

    #[test]
    fn test_toggle_sentinels() {
        let config = config(PayloadMode::Raw);
        let transformer = Transformer::new(&config);

        let toggle = Value::new(2, CommandClass::SWITCH_TOGGLE_BINARY, 0, "currentValue")
            .with_type(ValueType::Boolean)
            .writable();
        let node = node_with(toggle.clone());
        assert_eq!(transformer.decode(&json!(false), &node, &toggle, None, None).unwrap(), json!(1));

        let level = Value::new(2, CommandClass::SWITCH_TOGGLE_MULTILEVEL, 0, "currentValue")
            .with_type(ValueType::Number)
            .writable()
            .with_value(40);
        assert_eq!(transformer.decode(&json!(80), &node, &level, None, None).unwrap(), json!(0));
        let level = level.with_value(0);
        assert_eq!(transformer.decode(&json!(80), &node, &level, None, None).unwrap(), json!(255));
    }

    #[test]
    fn test_normalize_buffer() {
        assert_eq!(normalize_buffer(&json!([1, 2])).unwrap(), json!([1, 2]));
        assert_eq!(normalize_buffer(&json!({"type": "Buffer", "data": [3]})).unwrap(), json!([3]));
        assert_eq!(
            normalize_buffer(&json!({"length": 2, "0": 7, "1": 8})).unwrap(),
            json!([7, 8])
        );
        assert_eq!(normalize_buffer(&json!("AB")).unwrap(), json!([65, 66]));
        assert!(normalize_buffer(&json!([256])).is_err());
        assert!(normalize_buffer(&json!(true)).is_err());
    }

    #[test]
    fn test_wrap() {
        let raw = config(PayloadMode::Raw);
        assert_eq!(Transformer::new(&raw).wrap(json!(true)), json!(true));

        let full = config(PayloadMode::FullObject);
        assert_eq!(Transformer::new(&full).wrap(json!(true))["value"], json!(true));
    }
}
