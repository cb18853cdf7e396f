/*!
 * Thermostat discovery.
 *
 * Thermostats expose one setpoint per mode, a mode enum, an ambient
 * temperature and optionally an operating state and a fan mode. They are
 * synthesized into a single climate template per device model; the
 * template is then discovered like any other device template.
 */
use std::collections::BTreeMap;

use serde_json::json;
use tracing::{debug, warn};

use zflow_devices::{CommandClass, Node, Value, ValueState};

use super::rules::object_id;
use crate::descriptor::{Category, Descriptor};

const VALUE_TEMPLATE: &str = "{{ value_json.value }}";

/// Consumer modes a device mode ordinal may map to, most preferred first
fn mode_preferences(ordinal: i64) -> &'static [&'static str] {
    match ordinal {
        0 => &["off"],
        1 => &["heat"],
        2 => &["cool"],
        3 => &["auto", "heat_cool"],
        4 => &["heat", "heat_cool", "auto"],
        5 => &["auto", "heat_cool"],
        6 => &["fan_only"],
        7 => &["heat"],
        8 => &["dry"],
        9 => &["dry", "fan_only"],
        10 => &["heat_cool", "auto"],
        11 => &["heat", "heat_cool", "auto"],
        12 => &["cool", "auto"],
        13 => &["auto", "heat_cool"],
        15 => &["heat"],
        _ => &[],
    }
}

/// Consumer action for an operating state ordinal
fn action(ordinal: i64) -> Option<&'static str> {
    match ordinal {
        0 => Some("idle"),
        1 | 4 | 7 | 8 | 10 | 11 => Some("heating"),
        2 | 5 | 9 => Some("cooling"),
        3 | 6 => Some("fan"),
        _ => None,
    }
}

/// Map device modes to consumer modes.
///
/// Modes are assigned in device order. A mode whose preferred consumer mode
/// is taken gets its next unused preference; when none is left the mode is
/// dropped. Returns the map and the consumer modes in device order.
pub fn map_modes(states: &[ValueState]) -> (BTreeMap<String, i64>, Vec<String>) {
    let mut map = BTreeMap::new();
    let mut modes = Vec::new();

    for state in states {
        let preferences = mode_preferences(state.value);
        if preferences.is_empty() {
            debug!("No consumer mode for thermostat mode {} ({})", state.value, state.text);
            continue;
        }
        match preferences.iter().find(|token| !map.contains_key(**token)) {
            Some(token) => {
                map.insert(token.to_string(), state.value);
                modes.push(token.to_string());
            }
            None => warn!(
                "Thermostat mode {} ({}) collides with {:?}, skipping",
                state.value, state.text, preferences
            ),
        }
    }

    (map, modes)
}

fn find<'a>(node: &'a Node, command_class: CommandClass, property: &str) -> Option<&'a Value> {
    node.values
        .values()
        .find(|v| v.command_class == command_class && v.is_property(property))
}

fn temperature_unit(unit: Option<&str>) -> &'static str {
    match unit {
        Some(u) if u.contains('F') => "F",
        _ => "C",
    }
}

/// Synthesize the climate template of a thermostat, if it has setpoints
pub fn synthesize(node: &Node) -> Option<Descriptor> {
    let setpoints: BTreeMap<i64, &Value> = node
        .values
        .values()
        .filter(|v| v.command_class == CommandClass::THERMOSTAT_SETPOINT && v.is_property("setpoint"))
        .filter_map(|v| v.property_key.as_ref()?.as_number().map(|k| (k, v)))
        .collect();
    let (_, first_setpoint) = setpoints.iter().next()?;

    let mode = find(node, CommandClass::THERMOSTAT_MODE, "mode");
    let operating_state = find(node, CommandClass::THERMOSTAT_OPERATING_STATE, "state");
    let fan_mode = find(node, CommandClass::THERMOSTAT_FAN_MODE, "mode");
    let temperature = find(node, CommandClass::SENSOR_MULTILEVEL, "Air temperature").or_else(|| {
        node.values.values().find(|v| {
            v.command_class == CommandClass::SENSOR_MULTILEVEL
                && matches!(v.unit.as_deref(), Some("°C") | Some("°F"))
        })
    });

    let mut descriptor = Descriptor::new(Category::Climate, "thermostat");

    let (mode_map, modes) = mode.map(|m| map_modes(&m.states)).unwrap_or_default();

    let setpoint_topic: BTreeMap<i64, String> = mode_map
        .values()
        .filter(|ordinal| **ordinal != 0)
        .filter_map(|ordinal| setpoints.get(ordinal).map(|v| (*ordinal, v.id())))
        .collect();

    let default_setpoint = modes
        .iter()
        .filter_map(|token| mode_map.get(token))
        .find_map(|ordinal| setpoint_topic.get(ordinal).cloned())
        .unwrap_or_else(|| first_setpoint.id());

    descriptor = descriptor.with_payload(json!({
        "temperature_state_topic": default_setpoint,
        "temperature_command_topic": default_setpoint,
        "temperature_state_template": VALUE_TEMPLATE,
        "temperature_unit": temperature_unit(first_setpoint.unit.as_deref()),
        "precision": 0.1,
    }));
    descriptor.values.extend(setpoints.values().map(|v| v.id()));

    if let Some(mode) = mode {
        let by_ordinal: BTreeMap<i64, &String> = mode_map.iter().map(|(token, o)| (*o, token)).collect();
        let entries = by_ordinal
            .iter()
            .map(|(ordinal, token)| format!("{}: \"{}\"", ordinal, token))
            .collect::<Vec<_>>()
            .join(", ");
        descriptor = descriptor.with_payload(json!({
            "mode_state_topic": mode.id(),
            "mode_command_topic": mode.id(),
            "mode_state_template": format!("{{{{ {{{}}}[value_json.value | int] | default('off') }}}}", entries),
            "modes": modes,
        }));
        descriptor.values.push(mode.id());
        descriptor.mode_map = Some(mode_map);
        descriptor.setpoint_topic = Some(setpoint_topic);
    }

    if let Some(temperature) = temperature {
        descriptor = descriptor.with_payload(json!({
            "current_temperature_topic": temperature.id(),
            "current_temperature_template": VALUE_TEMPLATE,
        }));
        descriptor.values.push(temperature.id());
    }

    if let Some(state) = operating_state {
        let ordinals: Vec<i64> = if state.states.is_empty() {
            (0..=11).collect()
        } else {
            state.states.iter().map(|s| s.value).collect()
        };
        let action_map: BTreeMap<i64, String> = ordinals
            .into_iter()
            .filter_map(|o| action(o).map(|a| (o, a.to_string())))
            .collect();
        let entries = action_map
            .iter()
            .map(|(ordinal, action)| format!("{}: \"{}\"", ordinal, action))
            .collect::<Vec<_>>()
            .join(", ");
        descriptor = descriptor.with_payload(json!({
            "action_topic": state.id(),
            "action_template": format!("{{{{ {{{}}}[value_json.value | int] | default('idle') }}}}", entries),
        }));
        descriptor.values.push(state.id());
        descriptor.action_map = Some(action_map);
    }

    if let Some(fan) = fan_mode {
        let fan_map: BTreeMap<String, i64> = fan
            .states
            .iter()
            .map(|s| (object_id(&[s.text.as_str()]), s.value))
            .collect();
        let fan_modes: Vec<String> = fan.states.iter().map(|s| object_id(&[s.text.as_str()])).collect();
        let entries = fan
            .states
            .iter()
            .map(|s| format!("{}: \"{}\"", s.value, object_id(&[s.text.as_str()])))
            .collect::<Vec<_>>()
            .join(", ");
        descriptor = descriptor.with_payload(json!({
            "fan_mode_state_topic": fan.id(),
            "fan_mode_command_topic": fan.id(),
            "fan_mode_state_template": format!("{{{{ {{{}}}[value_json.value | int] }}}}", entries),
            "fan_modes": fan_modes,
        }));
        descriptor.values.push(fan.id());
        descriptor.fan_mode_map = Some(fan_map);
    }

    descriptor.default_setpoint = Some(default_setpoint);
    Some(descriptor)
}

/// Setpoint value id for a device mode ordinal
pub fn active_setpoint(descriptor: &Descriptor, ordinal: i64) -> Option<&str> {
    descriptor
        .setpoint_topic
        .as_ref()?
        .get(&ordinal)
        .map(String::as_str)
}

#[cfg(test)]
mod tests {
    use super::*;
    use zflow_devices::{DeviceClass, ValueType};

    fn state(value: i64, text: &str) -> ValueState {
        ValueState {
            value,
            text: text.to_string(),
        }
    }

    fn thermostat() -> Node {
        Node::new(10)
            .with_device_class(DeviceClass::new(4, 0x08, 0x06))
            .with_product(0x0148, 0x0003, 0x0001)
            .with_value(
                Value::new(10, CommandClass::THERMOSTAT_MODE, 0, "mode")
                    .with_states(&[(0, "Off"), (1, "Heat"), (2, "Cool")])
                    .writable(),
            )
            .with_value(
                Value::new(10, CommandClass::THERMOSTAT_SETPOINT, 0, "setpoint")
                    .with_key(1)
                    .with_type(ValueType::Number)
                    .with_unit("°C")
                    .writable(),
            )
            .with_value(
                Value::new(10, CommandClass::THERMOSTAT_SETPOINT, 0, "setpoint")
                    .with_key(2)
                    .with_type(ValueType::Number)
                    .with_unit("°C")
                    .writable(),
            )
            .with_value(
                Value::new(10, CommandClass::SENSOR_MULTILEVEL, 0, "Air temperature")
                    .with_type(ValueType::Number)
                    .with_unit("°C"),
            )
    }

    #[test]
    fn test_synthesize_off_heat_cool() {
        let descriptor = synthesize(&thermostat()).unwrap();

        assert_eq!(
            descriptor.mode_map,
            Some(BTreeMap::from([
                ("off".to_string(), 0),
                ("heat".to_string(), 1),
                ("cool".to_string(), 2),
            ]))
        );
        assert_eq!(
            descriptor.setpoint_topic,
            Some(BTreeMap::from([
                (1, "67-0-setpoint-1".to_string()),
                (2, "67-0-setpoint-2".to_string()),
            ]))
        );
        assert_eq!(descriptor.default_setpoint.as_deref(), Some("67-0-setpoint-1"));
        assert_eq!(descriptor.discovery_payload["modes"], json!(["off", "heat", "cool"]));
        assert_eq!(
            descriptor.get_str("mode_state_template"),
            Some("{{ {0: \"off\", 1: \"heat\", 2: \"cool\"}[value_json.value | int] | default('off') }}")
        );
        assert_eq!(descriptor.get_str("current_temperature_topic"), Some("49-0-Air temperature"));
        assert_eq!(descriptor.get_str("temperature_unit"), Some("C"));
    }

    #[test]
    fn test_collision_takes_next_preference() {
        let (map, modes) = map_modes(&[state(1, "Heat"), state(4, "Aux"), state(11, "Energy heat")]);
        assert_eq!(map.get("heat"), Some(&1));
        assert_eq!(map.get("heat_cool"), Some(&4));
        assert_eq!(map.get("auto"), Some(&11));
        assert_eq!(modes, vec!["heat", "heat_cool", "auto"]);
    }

    #[test]
    fn test_collision_exhausted_is_first_wins() {
        let (map, modes) = map_modes(&[state(1, "Heat"), state(7, "Furnace"), state(31, "Manufacturer")]);
        assert_eq!(map.len(), 1);
        assert_eq!(map.get("heat"), Some(&1));
        assert_eq!(modes, vec!["heat"]);
    }

    #[test]
    fn test_action_map() {
        let node = thermostat().with_value(
            Value::new(10, CommandClass::THERMOSTAT_OPERATING_STATE, 0, "state")
                .with_states(&[(0, "Idle"), (1, "Heating"), (2, "Cooling"), (3, "Fan Only")]),
        );
        let descriptor = synthesize(&node).unwrap();
        let actions = descriptor.action_map.unwrap();
        assert_eq!(actions.get(&0).map(String::as_str), Some("idle"));
        assert_eq!(actions.get(&1).map(String::as_str), Some("heating"));
        assert_eq!(actions.get(&3).map(String::as_str), Some("fan"));
    }

    #[test]
    fn test_default_setpoint_without_mode() {
        let mut node = thermostat();
        node.values.remove("64-0-mode");
        let descriptor = synthesize(&node).unwrap();
        assert_eq!(descriptor.default_setpoint.as_deref(), Some("67-0-setpoint-1"));
        assert!(descriptor.mode_map.is_none());
    }

    #[test]
    fn test_no_setpoints_no_climate() {
        assert!(synthesize(&Node::new(3)).is_none());
    }

    #[test]
    fn test_active_setpoint() {
        let descriptor = synthesize(&thermostat()).unwrap();
        assert_eq!(active_setpoint(&descriptor, 2), Some("67-0-setpoint-2"));
        assert_eq!(active_setpoint(&descriptor, 0), None);
    }
}
