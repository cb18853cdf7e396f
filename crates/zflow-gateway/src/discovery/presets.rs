/*!
 * Descriptor presets per classification.
 *
 * Presets return draft descriptors whose topic fields hold sentinels:
 * `true` is filled with the value's state or command topic, `false` removes
 * the field, and a value id string is replaced by that value's topic.
 */
use serde_json::json;

use zflow_devices::{Node, Value};

use super::color;
use super::rules::{object_id, BinaryKind, Classification, SensorKind};
use crate::descriptor::{Category, Descriptor};

const VALUE_TEMPLATE: &str = "{{ value_json.value }}";

/// Draft descriptor for a classified value
pub fn draft(classification: &Classification, node: &Node, value: &Value) -> Descriptor {
    match classification {
        Classification::Switch => switch(),
        Classification::BarrierCover => barrier(),
        Classification::CoverPosition => cover_position(),
        Classification::Dimmer => dimmer("dimmer", 99),
        Classification::VolumeDimmer => dimmer("volume_dimmer", 100),
        Classification::Lock => lock(),
        Classification::ColorLight => color::rgb_light(node, value),
        Classification::Scene => scene(value),
        Classification::BinarySensor(kind) => binary_sensor(kind),
        Classification::AlarmSensor { alarm } => alarm_sensor(alarm),
        Classification::NotificationBinary {
            object_id,
            device_class,
            on,
            off,
        } => notification_binary(object_id, *device_class, *on, *off),
        Classification::NotificationSensor { object_id } => notification_sensor(object_id, value),
        Classification::NumericSensor(kind) => numeric_sensor(kind),
        Classification::BatteryLow => binary_sensor(&BinaryKind {
            object_id: "battery_islow".to_string(),
            device_class: Some("battery"),
            reversed: false,
        }),
    }
}

fn switch() -> Descriptor {
    Descriptor::new(Category::Switch, "switch").with_payload(json!({
        "state_topic": true,
        "command_topic": true,
        "value_template": VALUE_TEMPLATE,
        "payload_on": true,
        "payload_off": false,
    }))
}

fn barrier() -> Descriptor {
    Descriptor::new(Category::Cover, "barrier_state").with_payload(json!({
        "state_topic": true,
        "command_topic": true,
        "device_class": "garage",
        "value_template": "{{ {0: 'Closed', 252: 'Closing', 253: 'Stopped', 254: 'Opening', 255: 'Opened'}[value_json.value | int] | default('Stopped') }}",
        "payload_open": 255,
        "payload_close": 0,
        "state_open": "Opened",
        "state_opening": "Opening",
        "state_closed": "Closed",
        "state_closing": "Closing",
        "state_stopped": "Stopped",
    }))
}

fn cover_position() -> Descriptor {
    Descriptor::new(Category::Cover, "position").with_payload(json!({
        "command_topic": true,
        "position_topic": true,
        "set_position_topic": true,
        "state_topic": false,
        "value_template": "{{ value_json.value | round(0) }}",
        "position_template": "{{ value_json.value | round(0) }}",
        "position_open": 99,
        "position_closed": 0,
        "payload_open": 99,
        "payload_close": 0,
    }))
}

fn dimmer(object_id: &str, scale: u32) -> Descriptor {
    Descriptor::new(Category::Light, object_id).with_payload(json!({
        "state_topic": true,
        "command_topic": true,
        "on_command_type": "brightness",
        "brightness_state_topic": true,
        "brightness_command_topic": true,
        "brightness_scale": scale,
        "state_value_template": "{{ 'OFF' if (value_json.value | int) == 0 else 'ON' }}",
        "brightness_value_template": VALUE_TEMPLATE,
    }))
}

fn lock() -> Descriptor {
    Descriptor::new(Category::Lock, "lock").with_payload(json!({
        "state_topic": true,
        "command_topic": true,
        "value_template": "{{ 'LOCKED' if (value_json.value | int) == 255 else 'UNLOCKED' }}",
        "payload_lock": "LOCK",
        "payload_unlock": "UNLOCK",
        "state_locked": "LOCKED",
        "state_unlocked": "UNLOCKED",
    }))
}

fn scene(value: &Value) -> Descriptor {
    let key = value.property_key.as_ref().map(|k| k.to_string()).unwrap_or_default();
    let id = object_id(&["scene_state", &value.property_name(), &key]);
    Descriptor::new(Category::Sensor, id).with_payload(json!({
        "state_topic": true,
        "value_template": VALUE_TEMPLATE,
        "icon": "mdi:gesture-tap-button",
    }))
}

fn binary_sensor(kind: &BinaryKind) -> Descriptor {
    let mut descriptor = Descriptor::new(Category::BinarySensor, kind.object_id.as_str()).with_payload(json!({
        "state_topic": true,
        "value_template": VALUE_TEMPLATE,
        "payload_on": !kind.reversed,
        "payload_off": kind.reversed,
    }));
    if let Some(device_class) = kind.device_class {
        descriptor.set("device_class", device_class);
    }
    descriptor
}

fn alarm_sensor(alarm: &str) -> Descriptor {
    Descriptor::new(Category::BinarySensor, object_id(&["alarm", alarm])).with_payload(json!({
        "state_topic": true,
        "device_class": "problem",
        "value_template": "{{ 'ON' if (value_json.value | int) > 0 else 'OFF' }}",
    }))
}

fn notification_binary(id: &str, device_class: Option<&str>, on: i64, off: i64) -> Descriptor {
    let mut descriptor = Descriptor::new(Category::BinarySensor, id).with_payload(json!({
        "state_topic": true,
        "value_template": format!(
            "{{{{ 'ON' if (value_json.value | int) == {} else 'OFF' if (value_json.value | int) == {} else None }}}}",
            on, off
        ),
    }));
    if let Some(device_class) = device_class {
        descriptor.set("device_class", device_class);
    }
    descriptor
}

fn notification_sensor(id: &str, value: &Value) -> Descriptor {
    let states = value
        .states
        .iter()
        .map(|s| format!("{}: {}", s.value, json!(s.text)))
        .collect::<Vec<_>>()
        .join(", ");
    let template = if states.is_empty() {
        VALUE_TEMPLATE.to_string()
    } else {
        format!(
            "{{{{ {{{}}}[value_json.value | int] | default(value_json.value) }}}}",
            states
        )
    };

    Descriptor::new(Category::Sensor, id).with_payload(json!({
        "state_topic": true,
        "value_template": template,
        "icon": "mdi:alarm-light",
    }))
}

fn numeric_sensor(kind: &SensorKind) -> Descriptor {
    let mut descriptor = Descriptor::new(Category::Sensor, kind.object_id.as_str()).with_payload(json!({
        "state_topic": true,
        "value_template": VALUE_TEMPLATE,
    }));
    if let Some(device_class) = kind.device_class {
        descriptor.set("device_class", device_class);
        descriptor.set("state_class", "measurement");
    }
    if let Some(unit) = &kind.unit {
        descriptor.set("unit_of_measurement", unit.as_str());
    }
    descriptor
}
