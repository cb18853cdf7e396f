/*!
 * Discovery engine.
 *
 * Turns values (and multi-value device templates) into descriptors ready to
 * be published to the discovery consumer. The engine only reads the
 * discovered store: registering and publishing the result is up to the
 * gateway.
 *
 * Per-value discovery runs in four steps:
 *
 * 1. classify the value through the rule table ([`rules`])
 * 2. build a draft from the classification's preset ([`presets`], [`color`])
 * 3. resolve topic sentinels into absolute topics
 * 4. disambiguate the object id and stamp the fields every entity carries
 *
 * Thermostats are handled by synthesizing a template ([`climate`]).
 */
pub mod climate;
pub mod color;
pub mod naming;
pub mod presets;
pub mod rules;

use serde_json::{json, Value as JsonValue};
use tracing::debug;

use zflow_core::config::{GatewayConfig, PayloadMode};
use zflow_devices::{CommandClass, Node, Transport, Value, NODE_PREFIX};

use crate::descriptor::{Category, Descriptor};
use crate::error::{Error, Result};
use crate::store::DiscoveredStore;
use crate::topic::{TopicResolver, ValueTopic};

use naming::{entity_name, NameParts};

/// Builds descriptors for one gateway configuration and transport
#[derive(Clone, Copy)]
pub struct DiscoveryEngine<'a> {
    config: &'a GatewayConfig,
    transport: &'a dyn Transport,
    home_hex: &'a str,
}

/// Whether a payload key carries a command topic
pub fn is_command_key(key: &str) -> bool {
    key.contains("command") || key == "set_position_topic"
}

/// Value ids of a node in discovery order: composite color values first, so
/// the light claims its companions before they are discovered on their own
pub fn discovery_order(node: &Node) -> Vec<String> {
    let (mut first, rest): (Vec<&Value>, Vec<&Value>) = node.values.values().partition(|v| {
        v.command_class == CommandClass::SWITCH_COLOR
            && v.is_property("currentColor")
            && v.property_key.is_none()
    });
    first.extend(rest);
    first.into_iter().map(Value::id).collect()
}

impl<'a> DiscoveryEngine<'a> {
    /// Create an engine
    pub fn new(config: &'a GatewayConfig, transport: &'a dyn Transport, home_hex: &'a str) -> Self {
        Self {
            config,
            transport,
            home_hex,
        }
    }

    /// Descriptor for a single value.
    ///
    /// `None` when the node is not ready, the value is already owned, no
    /// topic is derivable or no rule accepts the value.
    pub fn discover_value(&self, node: &Node, value_id: &str, store: &DiscoveredStore) -> Result<Option<Descriptor>> {
        if !node.ready {
            return Ok(None);
        }
        let value = node
            .value(value_id)
            .ok_or_else(|| Error::not_found(format!("Value {}-{}", node.id, value_id)))?;
        if store.is_discovered(node.id, value_id) {
            return Ok(None);
        }
        let Some(primary) = TopicResolver::new(self.config).value_topic_details(node, value) else {
            return Ok(None);
        };
        let Some(classification) = rules::classify(node, value) else {
            return Ok(None);
        };

        let mut descriptor = presets::draft(&classification, node, value);
        if !descriptor.values.contains(&value.id()) {
            descriptor.values.insert(0, value.id());
        }
        if let Some(target) = &value.target_value {
            descriptor.values.push(target.clone());
        }
        if let Some(conf) = &primary.conf {
            if let Some(icon) = &conf.icon {
                descriptor.set("icon", icon.as_str());
            }
            if let Some(device_class) = &conf.device_class {
                descriptor.set("device_class", device_class.as_str());
            }
        }

        self.resolve_topics(&mut descriptor, node, &primary);
        self.disambiguate(&mut descriptor, node.id, value.endpoint, store);
        self.finish(&mut descriptor, node, Some(value), store);
        Ok(Some(descriptor))
    }

    /// Descriptor for a device template.
    ///
    /// The first value of the template is its primary value; templates whose
    /// primary value is missing or owned elsewhere are skipped.
    pub fn discover_template(
        &self,
        node: &Node,
        template: &Descriptor,
        store: &DiscoveredStore,
    ) -> Result<Option<Descriptor>> {
        if !node.ready || store.contains(node.id, &template.key()) {
            return Ok(None);
        }
        let primary_id = template
            .values
            .first()
            .ok_or_else(|| Error::template(format!("Template {} has no values", template.key())))?;
        let Some(value) = node.value(primary_id) else {
            debug!("Template {} does not apply to node {}", template.key(), node.id);
            return Ok(None);
        };
        if store.is_discovered(node.id, primary_id) {
            return Ok(None);
        }
        let Some(primary) = TopicResolver::new(self.config).value_topic_details(node, value) else {
            return Ok(None);
        };

        let mut descriptor = template.clone();
        self.resolve_topics(&mut descriptor, node, &primary);
        self.finish(&mut descriptor, node, Some(value), store);
        Ok(Some(descriptor))
    }

    /// Climate descriptor with its temperature topics pointed at the setpoint
    /// of the current mode, when they changed
    pub fn rewire_climate(&self, node: &Node, descriptor: &Descriptor, mode: &Value) -> Option<Descriptor> {
        if descriptor.category != Category::Climate || mode.command_class != CommandClass::THERMOSTAT_MODE {
            return None;
        }
        let ordinal = mode.number()? as i64;
        let setpoint = node.value(climate::active_setpoint(descriptor, ordinal)?)?;
        let details = TopicResolver::new(self.config).value_topic_details(node, setpoint)?;

        let state_topic = self.transport.get_topic(&details.topic, false);
        if descriptor.get_str("temperature_state_topic") == Some(state_topic.as_str()) {
            return None;
        }
        let command_topic = self
            .transport
            .get_topic(details.target_topic.as_deref().unwrap_or(&details.topic), true);

        let mut updated = descriptor.clone();
        updated.set("temperature_state_topic", state_topic);
        updated.set("temperature_command_topic", command_topic);
        Some(updated)
    }

    /// Payload published for a descriptor.
    ///
    /// With the raw envelope the consumer receives bare values, so
    /// `value_json.value` references are rewritten: to a boolean comparison
    /// when the descriptor has on/off payloads, else to the bare value.
    pub fn discovery_payload(&self, descriptor: &Descriptor) -> JsonValue {
        let mut payload = descriptor.discovery_payload.clone();
        if self.config.payload == PayloadMode::Raw {
            let on_off = descriptor.has_on_off();
            for entry in payload.values_mut() {
                if let JsonValue::String(text) = entry {
                    *text = rewrite_raw_template(text, on_off);
                }
            }
        }
        JsonValue::Object(payload)
    }

    fn resolve_topics(&self, descriptor: &mut Descriptor, node: &Node, primary: &ValueTopic) {
        let resolver = TopicResolver::new(self.config);
        let keys: Vec<String> = descriptor
            .discovery_payload
            .keys()
            .filter(|k| k.ends_with("_topic"))
            .cloned()
            .collect();

        for key in keys {
            let command = is_command_key(&key);
            let entry = descriptor.discovery_payload.get(&key).cloned();
            match entry {
                Some(JsonValue::Bool(true)) => {
                    let topic = self.pick(primary, command);
                    descriptor.set(key, topic);
                }
                Some(JsonValue::Bool(false)) => {
                    descriptor.discovery_payload.remove(&key);
                }
                Some(JsonValue::String(value_id)) => {
                    let Some(value) = node.value(&value_id) else {
                        continue;
                    };
                    match resolver.value_topic_details(node, value) {
                        Some(details) => {
                            let topic = self.pick(&details, command);
                            descriptor.set(key, topic);
                            let referenced = std::iter::once(value_id).chain(value.target_value.clone());
                            for id in referenced {
                                if !descriptor.values.contains(&id) {
                                    descriptor.values.push(id);
                                }
                            }
                        }
                        None => {
                            debug!("No topic for {} referenced by {}", value_id, key);
                            descriptor.discovery_payload.remove(&key);
                        }
                    }
                }
                _ => {}
            }
        }
    }

    fn pick(&self, details: &ValueTopic, command: bool) -> String {
        let topic = if command {
            details.target_topic.as_deref().unwrap_or(&details.topic)
        } else {
            &details.topic
        };
        self.transport.get_topic(topic, command)
    }

    fn disambiguate(&self, descriptor: &mut Descriptor, node_id: u32, endpoint: u8, store: &DiscoveredStore) {
        if endpoint != 0 || store.contains(node_id, &descriptor.key()) {
            descriptor.object_id = format!("{}_{}", descriptor.object_id, endpoint);
        }
        let stem = descriptor.object_id.clone();
        let mut n = 2;
        while store.contains(node_id, &descriptor.key()) {
            descriptor.object_id = format!("{}_{}", stem, n);
            n += 1;
        }
    }

    fn finish(&self, descriptor: &mut Descriptor, node: &Node, value: Option<&Value>, store: &DiscoveredStore) {
        let key = descriptor.key();
        let mut values: Vec<String> = Vec::new();
        for id in descriptor.values.drain(..) {
            if values.contains(&id) || node.value(&id).is_none() {
                continue;
            }
            match store.owner_of(node.id, &id) {
                Some((owner_node, owner_key)) if *owner_node != node.id || *owner_key != key => {
                    debug!("{}-{} is owned by {}, leaving it out of {}", node.id, id, owner_key, key);
                }
                _ => values.push(id),
            }
        }
        descriptor.values = values;

        self.stamp(descriptor, node, value);
    }

    fn stamp(&self, descriptor: &mut Descriptor, node: &Node, value: Option<&Value>) {
        let resolver = TopicResolver::new(self.config);
        let node_name = resolver.discovery_node_name(node);
        let device_id = format!("zflow_{}_node{}", self.home_hex, node.id);

        let model = match (&node.product_description, &node.product_label) {
            (Some(description), Some(label)) => format!("{} ({})", description, label),
            (Some(text), None) | (None, Some(text)) => text.clone(),
            (None, None) => node.device_id(),
        };
        descriptor.set(
            "device",
            json!({
                "identifiers": [device_id],
                "manufacturer": node.manufacturer.clone().unwrap_or_else(|| "Unknown".to_string()),
                "model": model,
                "name": node_name,
                "sw_version": node.firmware_version.clone().unwrap_or_default(),
            }),
        );

        if !descriptor.discovery_payload.contains_key("name") {
            let parts = NameParts {
                node_id: format!("{}{}", NODE_PREFIX, node.id),
                location: node.location().unwrap_or_default().to_string(),
                location_name: node_name.clone(),
                name: node.display_name(),
                property: value.map(Value::property_name).unwrap_or_default(),
                property_key: value.and_then(Value::key_name).unwrap_or_default(),
                label: value.map(Value::label).unwrap_or_default(),
                object_id: descriptor.object_id.clone(),
            };
            descriptor.set("name", entity_name(&self.config.discovery.entity_template, &parts));
        }

        descriptor.set(
            "unique_id",
            format!("{}_{}_{}", device_id, descriptor.category, descriptor.object_id),
        );

        if !self.config.ignore_status {
            let status = format!("{}/status", resolver.node_topic(node));
            descriptor.set("availability_topic", self.transport.get_topic(&status, false));
            if self.config.payload == PayloadMode::Raw {
                descriptor.set("payload_available", "true");
                descriptor.set("payload_not_available", "false");
            } else {
                descriptor.set(
                    "availability_template",
                    "{{ 'online' if value_json.value else 'offline' }}",
                );
                descriptor.set("payload_available", "online");
                descriptor.set("payload_not_available", "offline");
            }
        }

        if descriptor.category.has_attributes() && self.config.payload != PayloadMode::Raw {
            if let Some(state_topic) = descriptor.discovery_payload.get("state_topic").cloned() {
                descriptor.set("json_attributes_topic", state_topic);
            }
        }

        descriptor.discovery_topic = format!(
            "{}/{}/{}/config",
            descriptor.category, node_name, descriptor.object_id
        );
    }
}

/// Rewrite `value_json.value` references for bare payloads
pub fn rewrite_raw_template(template: &str, on_off: bool) -> String {
    if on_off {
        template.replace("value_json.value", "value == 'true'")
    } else {
        template
            .replace("value_json.value.", "value_json.")
            .replace("value_json.value", "value")
    }
}
