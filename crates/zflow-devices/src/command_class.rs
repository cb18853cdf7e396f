/*!
 * Command class identifiers.
 *
 * A command class groups related properties of a node. The gateway only
 * needs the numeric id and the legacy snake-case name used in named topics.
 */
use std::fmt;

use serde::{Deserialize, Serialize};

/// A protocol command class, identified by its numeric id
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CommandClass(pub u8);

#[allow(missing_docs)]
impl CommandClass {
    pub const BASIC: Self = Self(0x20);
    pub const SWITCH_BINARY: Self = Self(0x25);
    pub const SWITCH_MULTILEVEL: Self = Self(0x26);
    pub const SWITCH_ALL: Self = Self(0x27);
    pub const SWITCH_TOGGLE_BINARY: Self = Self(0x28);
    pub const SWITCH_TOGGLE_MULTILEVEL: Self = Self(0x29);
    pub const SCENE_ACTIVATION: Self = Self(0x2b);
    pub const SENSOR_BINARY: Self = Self(0x30);
    pub const SENSOR_MULTILEVEL: Self = Self(0x31);
    pub const METER: Self = Self(0x32);
    pub const SWITCH_COLOR: Self = Self(0x33);
    pub const METER_PULSE: Self = Self(0x35);
    pub const THERMOSTAT_MODE: Self = Self(0x40);
    pub const THERMOSTAT_OPERATING_STATE: Self = Self(0x42);
    pub const THERMOSTAT_SETPOINT: Self = Self(0x43);
    pub const THERMOSTAT_FAN_MODE: Self = Self(0x44);
    pub const THERMOSTAT_FAN_STATE: Self = Self(0x45);
    pub const CENTRAL_SCENE: Self = Self(0x5b);
    pub const DOOR_LOCK: Self = Self(0x62);
    pub const BARRIER_OPERATOR: Self = Self(0x66);
    pub const CONFIGURATION: Self = Self(0x70);
    pub const NOTIFICATION: Self = Self(0x71);
    pub const MANUFACTURER_SPECIFIC: Self = Self(0x72);
    pub const SOUND_SWITCH: Self = Self(0x79);
    pub const BATTERY: Self = Self(0x80);
    pub const WAKE_UP: Self = Self(0x84);
    pub const ASSOCIATION: Self = Self(0x85);
    pub const VERSION: Self = Self(0x86);
    pub const INDICATOR: Self = Self(0x87);
    pub const TIME: Self = Self(0x8a);
    pub const SENSOR_ALARM: Self = Self(0x9c);
}

impl CommandClass {
    /// Numeric id
    pub fn id(&self) -> u8 {
        self.0
    }

    /// Snake-case name used as the class segment of named topics.
    ///
    /// Unknown classes map to `unknownClass_<id>`.
    pub fn topic_name(&self) -> String {
        let name = match *self {
            Self::BASIC => "basic",
            Self::SWITCH_BINARY => "switch_binary",
            Self::SWITCH_MULTILEVEL => "switch_multilevel",
            Self::SWITCH_ALL => "switch_all",
            Self::SWITCH_TOGGLE_BINARY => "switch_toggle_binary",
            Self::SWITCH_TOGGLE_MULTILEVEL => "switch_toggle_multilevel",
            Self::SCENE_ACTIVATION => "scene_activation",
            Self::SENSOR_BINARY => "sensor_binary",
            Self::SENSOR_MULTILEVEL => "sensor_multilevel",
            Self::METER => "meter",
            Self::SWITCH_COLOR => "switch_color",
            Self::METER_PULSE => "meter_pulse",
            Self::THERMOSTAT_MODE => "thermostat_mode",
            Self::THERMOSTAT_OPERATING_STATE => "thermostat_operating_state",
            Self::THERMOSTAT_SETPOINT => "thermostat_setpoint",
            Self::THERMOSTAT_FAN_MODE => "thermostat_fan_mode",
            Self::THERMOSTAT_FAN_STATE => "thermostat_fan_state",
            Self::CENTRAL_SCENE => "central_scene",
            Self::DOOR_LOCK => "door_lock",
            Self::BARRIER_OPERATOR => "barrier_operator",
            Self::CONFIGURATION => "configuration",
            Self::NOTIFICATION => "notification",
            Self::MANUFACTURER_SPECIFIC => "manufacturer_specific",
            Self::SOUND_SWITCH => "sound_switch",
            Self::BATTERY => "battery",
            Self::WAKE_UP => "wake_up",
            Self::ASSOCIATION => "association",
            Self::VERSION => "version",
            Self::INDICATOR => "indicator",
            Self::TIME => "time",
            Self::SENSOR_ALARM => "sensor_alarm",
            _ => return format!("unknownClass_{}", self.0),
        };
        name.to_string()
    }
}

impl fmt::Display for CommandClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u8> for CommandClass {
    fn from(id: u8) -> Self {
        Self(id)
    }
}
