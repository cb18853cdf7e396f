/*!
 * Value classification.
 *
 * An ordered table of classifier rules. The first rule whose predicate
 * matches a value decides its [`Classification`]; a matching rule may still
 * decline (return `None`) when the value's metadata does not fit the
 * category. Values no rule accepts get no descriptor.
 */
use zflow_devices::{CommandClass, Node, Value, ValueState};

use crate::topic::sanitize;

/// Device class and polarity of a binary sensor
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BinaryKind {
    /// Object id fragment
    pub object_id: String,
    /// Consumer device class
    pub device_class: Option<&'static str>,
    /// `on` is reported as `false` (locks)
    pub reversed: bool,
}

/// Object id, device class and unit of a numeric sensor
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SensorKind {
    /// Object id fragment
    pub object_id: String,
    /// Consumer device class
    pub device_class: Option<&'static str>,
    /// Unit of measurement
    pub unit: Option<String>,
}

/// What a value is published as
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Classification {
    /// On/off switch
    Switch,
    /// Garage door or gate
    BarrierCover,
    /// Positionable cover driven by a multilevel switch
    CoverPosition,
    /// Dimmable light
    Dimmer,
    /// Door lock
    Lock,
    /// Siren volume exposed as a dimmer
    VolumeDimmer,
    /// RGB light composed of several values
    ColorLight,
    /// Scene sensor
    Scene,
    /// Binary sensor
    BinarySensor(BinaryKind),
    /// Alarm sensor, one per alarm type
    AlarmSensor {
        /// Alarm type name
        alarm: String,
    },
    /// Two-state notification
    NotificationBinary {
        /// Object id fragment
        object_id: String,
        /// Device class derived from the notification name
        device_class: Option<&'static str>,
        /// Ordinal reported when active
        on: i64,
        /// Ordinal reported when idle
        off: i64,
    },
    /// Multi-state notification
    NotificationSensor {
        /// Object id fragment
        object_id: String,
    },
    /// Numeric sensor
    NumericSensor(SensorKind),
    /// Low battery flag
    BatteryLow,
}

/// One entry of the classifier table
pub struct ClassifierRule {
    /// Rule name, for logs
    pub name: &'static str,
    /// Whether the rule applies to the value
    pub matches: fn(&Value) -> bool,
    /// Classification, or `None` when the value is filtered out
    pub classify: fn(&Node, &Value) -> Option<Classification>,
}

/// The classifier table, in priority order
pub static RULES: &[ClassifierRule] = &[
    ClassifierRule {
        name: "switch",
        matches: |v| {
            matches!(
                v.command_class,
                CommandClass::SWITCH_BINARY | CommandClass::SWITCH_ALL | CommandClass::SWITCH_TOGGLE_BINARY
            )
        },
        classify: |_, v| v.is_property("currentValue").then_some(Classification::Switch),
    },
    ClassifierRule {
        name: "barrier",
        matches: |v| v.command_class == CommandClass::BARRIER_OPERATOR,
        classify: |_, v| v.is_property("currentState").then_some(Classification::BarrierCover),
    },
    ClassifierRule {
        name: "multilevel",
        matches: |v| {
            matches!(
                v.command_class,
                CommandClass::SWITCH_MULTILEVEL | CommandClass::SWITCH_TOGGLE_MULTILEVEL
            )
        },
        classify: |node, v| {
            if !v.is_property("currentValue") {
                return None;
            }
            if node.device_class.is_motor_control() {
                Some(Classification::CoverPosition)
            } else {
                Some(Classification::Dimmer)
            }
        },
    },
    ClassifierRule {
        name: "lock",
        matches: |v| v.command_class == CommandClass::DOOR_LOCK,
        classify: |_, v| v.is_property("currentMode").then_some(Classification::Lock),
    },
    ClassifierRule {
        name: "volume",
        matches: |v| v.command_class == CommandClass::SOUND_SWITCH,
        classify: |_, v| v.is_property("volume").then_some(Classification::VolumeDimmer),
    },
    ClassifierRule {
        name: "color",
        matches: |v| v.command_class == CommandClass::SWITCH_COLOR,
        classify: |_, v| {
            (v.is_property("currentColor") && v.property_key.is_none()).then_some(Classification::ColorLight)
        },
    },
    ClassifierRule {
        name: "scene",
        matches: |v| {
            matches!(
                v.command_class,
                CommandClass::CENTRAL_SCENE | CommandClass::SCENE_ACTIVATION
            )
        },
        classify: |_, v| (v.is_property("scene") || v.is_property("sceneId")).then_some(Classification::Scene),
    },
    ClassifierRule {
        name: "binary_sensor",
        matches: |v| v.command_class == CommandClass::SENSOR_BINARY,
        classify: |_, v| Some(Classification::BinarySensor(binary_kind(&v.property_name()))),
    },
    ClassifierRule {
        name: "alarm_sensor",
        matches: |v| v.command_class == CommandClass::SENSOR_ALARM,
        classify: |_, v| {
            if !v.is_property("state") {
                return None;
            }
            let alarm = v.key_name().unwrap_or_else(|| v.property_name());
            Some(Classification::AlarmSensor {
                alarm: object_id(&[alarm.as_str()]),
            })
        },
    },
    ClassifierRule {
        name: "battery",
        matches: |v| v.command_class == CommandClass::BATTERY,
        classify: |_, v| {
            if v.is_property("isLow") {
                Some(Classification::BatteryLow)
            } else if v.is_property("level") {
                Some(Classification::NumericSensor(SensorKind {
                    object_id: "battery_level".to_string(),
                    device_class: Some("battery"),
                    unit: Some(v.unit.clone().unwrap_or_else(|| "%".to_string())),
                }))
            } else {
                None
            }
        },
    },
    ClassifierRule {
        name: "notification",
        matches: |v| matches!(v.command_class, CommandClass::NOTIFICATION | CommandClass::BASIC),
        classify: classify_notification,
    },
    ClassifierRule {
        name: "numeric_sensor",
        matches: |v| {
            matches!(
                v.command_class,
                CommandClass::SENSOR_MULTILEVEL
                    | CommandClass::METER
                    | CommandClass::METER_PULSE
                    | CommandClass::TIME
            )
        },
        classify: classify_numeric,
    },
];

/// Classify a value through the rule table
pub fn classify(node: &Node, value: &Value) -> Option<Classification> {
    let rule = RULES.iter().find(|rule| (rule.matches)(value))?;
    let classification = (rule.classify)(node, value);
    tracing::trace!(
        "Rule {} classified {} as {:?}",
        rule.name,
        value.full_id(),
        classification
    );
    classification
}

/// Lowercase, sanitized object id joined from non-empty parts
pub fn object_id(parts: &[&str]) -> String {
    let joined = parts
        .iter()
        .filter(|p| !p.is_empty())
        .map(|p| p.to_lowercase())
        .collect::<Vec<_>>()
        .join("_");
    sanitize(&joined, true).replace('-', "_")
}

fn tokens(name: &str) -> Vec<String> {
    name.split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(str::to_lowercase)
        .collect()
}

/// Device class and polarity of a binary sensor from its semantic name
pub fn binary_kind(name: &str) -> BinaryKind {
    let tokens = tokens(name);
    let has = |words: &[&str]| tokens.iter().any(|t| words.contains(&t.as_str()));
    let low_battery = tokens.windows(2).any(|w| w[0] == "battery" && w[1] == "low");

    let (device_class, reversed) = if low_battery {
        (Some("battery"), false)
    } else if has(&["lock"]) {
        (Some("lock"), true)
    } else if has(&["motion", "presence"]) {
        (Some("motion"), false)
    } else if has(&["door", "window"]) {
        (Some("door"), false)
    } else if has(&["water"]) {
        (Some("moisture"), false)
    } else if has(&["smoke"]) {
        (Some("smoke"), false)
    } else if has(&["gas", "co", "co2"]) {
        (Some("gas"), false)
    } else if has(&["tamper"]) {
        (Some("tamper"), false)
    } else if has(&["alarm"]) {
        (Some("problem"), false)
    } else if has(&["router"]) {
        (Some("connectivity"), false)
    } else {
        (None, false)
    };

    BinaryKind {
        object_id: object_id(&[name]),
        device_class,
        reversed,
    }
}

const IDLE_WORDS: [&str; 8] = ["idle", "clear", "closed", "off", "inactive", "no", "ok", "normal"];

fn is_idle(state: &ValueState) -> bool {
    tokens(&state.text).iter().any(|t| IDLE_WORDS.contains(&t.as_str()))
}

fn classify_notification(_: &Node, value: &Value) -> Option<Classification> {
    if value.command_class == CommandClass::BASIC && !value.is_property("currentValue") {
        return None;
    }
    let name = value.key_name().unwrap_or_else(|| value.property_name());
    let object_id = object_id(&[name.as_str()]);

    match value.states.as_slice() {
        [a, b] => {
            let (off, on) = match (is_idle(a), is_idle(b)) {
                (false, true) => (b, a),
                (true, false) => (a, b),
                _ if a.value <= b.value => (a, b),
                _ => (b, a),
            };
            Some(Classification::NotificationBinary {
                device_class: binary_kind(&name).device_class,
                object_id,
                on: on.value,
                off: off.value,
            })
        }
        [] if value.value_type.is_numeric() => Some(Classification::NumericSensor(SensorKind {
            object_id,
            device_class: None,
            unit: value.unit.clone(),
        })),
        _ => Some(Classification::NotificationSensor { object_id }),
    }
}

fn classify_numeric(_: &Node, value: &Value) -> Option<Classification> {
    let (object_id, unit) = match value.command_class {
        CommandClass::METER => {
            if !value.is_property("value") {
                return None;
            }
            let name = value
                .key_name()
                .map(|k| object_id(&[k.as_str()]))
                .unwrap_or_else(|| "meter".to_string());
            (name, value.unit.clone())
        }
        CommandClass::METER_PULSE => ("pulse".to_string(), value.unit.clone()),
        _ => (object_id(&[value.property_name().as_str()]), value.unit.clone()),
    };

    Some(Classification::NumericSensor(SensorKind {
        device_class: sensor_device_class(&object_id, unit.as_deref()),
        object_id,
        unit,
    }))
}

/// Consumer device class from a sensor name and unit
pub fn sensor_device_class(name: &str, unit: Option<&str>) -> Option<&'static str> {
    let by_unit = match unit.map(str::trim) {
        Some("°C") | Some("°F") => Some("temperature"),
        Some("W") => Some("power"),
        Some("kWh") | Some("Wh") => Some("energy"),
        Some("V") => Some("voltage"),
        Some("A") => Some("current"),
        Some("lux") | Some("Lux") | Some("lx") => Some("illuminance"),
        Some("kPa") | Some("hPa") | Some("Pa") => Some("pressure"),
        _ => None,
    };
    if by_unit.is_some() {
        return by_unit;
    }

    let tokens = tokens(name);
    let has = |word: &str| tokens.iter().any(|t| t == word);
    if has("temperature") {
        Some("temperature")
    } else if has("humidity") {
        Some("humidity")
    } else if has("illuminance") {
        Some("illuminance")
    } else if has("co2") {
        Some("carbon_dioxide")
    } else if has("battery") {
        Some("battery")
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use zflow_devices::{DeviceClass, ValueType};

    fn node() -> Node {
        Node::new(5)
    }

    #[test]
    fn test_binary_sensor_polarity() {
        let lock = binary_kind("lock");
        assert_eq!(lock.device_class, Some("lock"));
        assert!(lock.reversed);

        let motion = binary_kind("Motion");
        assert_eq!(motion.device_class, Some("motion"));
        assert!(!motion.reversed);
        assert_eq!(motion.object_id, "motion");
    }

    #[test]
    fn test_binary_sensor_vocabulary() {
        assert_eq!(binary_kind("Door/Window").device_class, Some("door"));
        assert_eq!(binary_kind("Door/Window").object_id, "door_window");
        assert_eq!(binary_kind("CO2").device_class, Some("gas"));
        assert_eq!(binary_kind("battery_low").device_class, Some("battery"));
        assert_eq!(binary_kind("Contact").device_class, None);
    }

    #[test]
    fn test_multilevel_cover_or_dimmer() {
        let value = Value::new(5, CommandClass::SWITCH_MULTILEVEL, 0, "currentValue");
        assert_eq!(classify(&node(), &value), Some(Classification::Dimmer));

        let shutter = node().with_device_class(DeviceClass::new(4, 0x11, 0x06));
        assert_eq!(classify(&shutter, &value), Some(Classification::CoverPosition));

        let target = Value::new(5, CommandClass::SWITCH_MULTILEVEL, 0, "targetValue");
        assert_eq!(classify(&node(), &target), None);
    }

    #[test]
    fn test_color_requires_composite_value() {
        let color = Value::new(5, CommandClass::SWITCH_COLOR, 0, "currentColor");
        assert_eq!(classify(&node(), &color), Some(Classification::ColorLight));
        let channel = color.clone().with_key("red");
        assert_eq!(classify(&node(), &channel), None);
    }

    #[test]
    fn test_notification_two_states() {
        let value = Value::new(5, CommandClass::NOTIFICATION, 0, "Home Security")
            .with_key("Motion sensor status")
            .with_states(&[(0, "idle"), (8, "Motion detection")]);

        match classify(&node(), &value) {
            Some(Classification::NotificationBinary {
                object_id,
                device_class,
                on,
                off,
            }) => {
                assert_eq!(object_id, "motion_sensor_status");
                assert_eq!(device_class, Some("motion"));
                assert_eq!((on, off), (8, 0));
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_notification_many_states() {
        let value = Value::new(5, CommandClass::NOTIFICATION, 0, "Access Control")
            .with_key("Door state")
            .with_states(&[(22, "Window/door is open"), (23, "Window/door is closed"), (5, "Jammed")]);
        assert_eq!(
            classify(&node(), &value),
            Some(Classification::NotificationSensor {
                object_id: "door_state".to_string()
            })
        );
    }

    #[test]
    fn test_numeric_sensors() {
        let temperature = Value::new(5, CommandClass::SENSOR_MULTILEVEL, 0, "Air temperature")
            .with_type(ValueType::Number)
            .with_unit("°C");
        assert_eq!(
            classify(&node(), &temperature),
            Some(Classification::NumericSensor(SensorKind {
                object_id: "air_temperature".to_string(),
                device_class: Some("temperature"),
                unit: Some("°C".to_string()),
            }))
        );

        let meter = Value::new(5, CommandClass::METER, 0, "value")
            .with_key(65537)
            .with_key_name("Electric_kWh_Consumed")
            .with_unit("kWh");
        match classify(&node(), &meter) {
            Some(Classification::NumericSensor(kind)) => {
                assert_eq!(kind.object_id, "electric_kwh_consumed");
                assert_eq!(kind.device_class, Some("energy"));
            }
            other => panic!("unexpected {:?}", other),
        }

        let reset = Value::new(5, CommandClass::METER, 0, "reset").write_only();
        assert_eq!(classify(&node(), &reset), None);
    }

    #[test]
    fn test_battery() {
        let low = Value::new(5, CommandClass::BATTERY, 0, "isLow").with_type(ValueType::Boolean);
        assert_eq!(classify(&node(), &low), Some(Classification::BatteryLow));
    }

    #[test]
    fn test_unhandled_class_is_filtered() {
        let value = Value::new(5, CommandClass::CONFIGURATION, 0, "3");
        assert_eq!(classify(&node(), &value), None);
    }

    #[test]
    fn test_object_id() {
        assert_eq!(object_id(&["scene_state", "scene", "001"]), "scene_state_scene_001");
        assert_eq!(object_id(&["Air temperature", ""]), "air_temperature");
    }
}
