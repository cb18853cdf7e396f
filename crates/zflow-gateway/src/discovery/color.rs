/*!
 * Composite RGB light discovery.
 */
use serde_json::json;

use zflow_devices::{value_id, CommandClass, Node, PropertyKey, Value};

use crate::descriptor::{Category, Descriptor};

const WHITE_CHANNELS: [&str; 2] = ["warmWhite", "coldWhite"];

/// Companion value driving brightness and on/off: endpoint multilevel,
/// then root multilevel (composite devices), then endpoint binary switch
pub fn companion<'a>(node: &'a Node, endpoint: u8) -> Option<&'a Value> {
    let current = PropertyKey::from("currentValue");
    [
        (CommandClass::SWITCH_MULTILEVEL, endpoint),
        (CommandClass::SWITCH_MULTILEVEL, 0),
        (CommandClass::SWITCH_BINARY, endpoint),
    ]
    .iter()
    .find_map(|(cc, ep)| node.value(&value_id(*cc, *ep, &current, None)))
}

/// Light descriptor for a `currentColor` value
pub fn rgb_light(node: &Node, color: &Value) -> Descriptor {
    let color_id = color.id();
    let mut descriptor = Descriptor::new(Category::Light, "rgb_dimmer").with_payload(json!({
        "rgb_state_topic": color_id,
        "rgb_command_topic": color_id,
        "rgb_value_template": "{{ value_json.value.red }},{{ value_json.value.green }},{{ value_json.value.blue }}",
        "rgb_command_template": "{{ {'red': red, 'green': green, 'blue': blue} | to_json }}",
    }));
    descriptor.values.push(color_id.clone());

    match companion(node, color.endpoint) {
        Some(level) if level.command_class == CommandClass::SWITCH_MULTILEVEL => {
            let level_id = level.id();
            descriptor = descriptor.with_payload(json!({
                "state_topic": level_id,
                "command_topic": level_id,
                "on_command_type": "brightness",
                "state_value_template": "{{ 'OFF' if (value_json.value | int) == 0 else 'ON' }}",
                "brightness_state_topic": level_id,
                "brightness_command_topic": level_id,
                "brightness_scale": 99,
                "brightness_value_template": "{{ value_json.value }}",
            }));
            descriptor.values.push(level_id);
        }
        Some(switch) => {
            let switch_id = switch.id();
            descriptor = descriptor.with_payload(json!({
                "state_topic": switch_id,
                "command_topic": switch_id,
                "state_value_template": "{{ 'ON' if value_json.value else 'OFF' }}",
            }));
            descriptor.values.push(switch_id);
        }
        None => {
            descriptor.set("state_topic", color_id.clone());
            descriptor.set("command_topic", color_id.clone());
            descriptor.set(
                "state_value_template",
                "{{ 'OFF' if value_json.value.red == 0 and value_json.value.green == 0 and value_json.value.blue == 0 else 'ON' }}",
            );
        }
    }

    let whites: Vec<String> = WHITE_CHANNELS
        .iter()
        .map(|channel| {
            value_id(
                CommandClass::SWITCH_COLOR,
                color.endpoint,
                &color.property,
                Some(&PropertyKey::from(*channel)),
            )
        })
        .filter(|id| node.value(id).is_some())
        .collect();

    if !whites.is_empty() {
        descriptor = descriptor.with_payload(json!({
            "color_temp_state_topic": color_id,
            "color_temp_command_topic": color_id,
            "min_mireds": 153,
            "max_mireds": 500,
            "color_temp_command_template": "{%- set warm = ((value - 153) / 347 * 255) | round(0) | int -%}{{ {'warmWhite': warm, 'coldWhite': 255 - warm} | to_json }}",
            "color_temp_value_template": "{{ (153 + (value_json.value.warmWhite | default(0)) / 255 * 347) | round(0) | int }}",
        }));
        descriptor.values.extend(whites);
    }

    descriptor
}
