/*!
 * Topic resolution.
 *
 * Topics are derived deterministically from a node, a value and the gateway
 * configuration. Two addressing schemes are supported (named and raw), plus a
 * manual mode where only configured topics exist.
 *
 * Resolution never fails: a value without a derivable topic yields `None`
 * and callers skip it.
 */
use zflow_core::config::{AddressingMode, GatewayConfig, ValueOverride};
use zflow_devices::{Node, PropertyKey, Value, NODE_PREFIX};

/// Sanitize one topic segment.
///
/// Whitespace becomes `_`, `/` becomes `-` when `replace_slash` is set, and
/// anything outside `[A-Za-z0-9-_/]` and the Latin-1 letters is stripped.
pub fn sanitize(segment: &str, replace_slash: bool) -> String {
    segment
        .chars()
        .map(|c| match c {
            '/' if replace_slash => '-',
            c if c.is_whitespace() => '_',
            c => c,
        })
        .filter(|c| is_allowed(*c))
        .collect()
}

/// Sanitize a property or key; numeric keys pass through unchanged
pub fn sanitize_key(key: &PropertyKey, replace_slash: bool) -> String {
    match key {
        PropertyKey::Number(n) => n.to_string(),
        PropertyKey::Name(name) => sanitize(name, replace_slash),
    }
}

fn is_allowed(c: char) -> bool {
    c.is_ascii_alphanumeric()
        || matches!(c, '-' | '_' | '/')
        || ('\u{C0}'..='\u{D6}').contains(&c)
        || ('\u{D8}'..='\u{F6}').contains(&c)
        || ('\u{F8}'..='\u{FF}').contains(&c)
}

/// A value topic with the override that produced it and the paired target topic
#[derive(Debug, Clone, PartialEq)]
pub struct ValueTopic {
    /// Topic of the value, relative to the transport prefix
    pub topic: String,
    /// Override configured for the value
    pub conf: Option<ValueOverride>,
    /// Topic of the paired target value
    pub target_topic: Option<String>,
}

/// Computes node and value topics for one configuration
#[derive(Debug, Clone, Copy)]
pub struct TopicResolver<'a> {
    config: &'a GatewayConfig,
}

impl<'a> TopicResolver<'a> {
    /// Create a resolver
    pub fn new(config: &'a GatewayConfig) -> Self {
        Self { config }
    }

    /// Topic of a node: `[location/]nodeSegment`
    pub fn node_topic(&self, node: &Node) -> String {
        let node_segment = match self.config.addressing {
            AddressingMode::Named | AddressingMode::Manual => sanitize(&node.display_name(), true),
            AddressingMode::Raw => match node.name.as_deref() {
                Some(name) if self.config.node_names && !name.is_empty() => sanitize(name, true),
                _ => node.id.to_string(),
            },
        };
        let node_segment = if node_segment.is_empty() {
            format!("{}{}", NODE_PREFIX, node.id)
        } else {
            node_segment
        };

        match self.location(node) {
            Some(location) => format!("{}/{}", location, node_segment),
            None => node_segment,
        }
    }

    /// Node name used in discovery topics and device blocks: `[location-]name`
    pub fn discovery_node_name(&self, node: &Node) -> String {
        let name = match self.location(node) {
            Some(location) => format!("{}-{}", location, node.display_name()),
            None => node.display_name(),
        };
        sanitize(&name, true)
    }

    /// Topic of a value, if one is derivable
    pub fn value_topic(&self, node: &Node, value: &Value) -> Option<String> {
        self.resolve(node, value).map(|(topic, _)| topic)
    }

    /// Topic of a value with its override and paired target topic
    pub fn value_topic_details(&self, node: &Node, value: &Value) -> Option<ValueTopic> {
        let (topic, conf) = self.resolve(node, value)?;
        let target_topic = value
            .target_value
            .as_deref()
            .and_then(|id| node.value(id))
            .and_then(|target| self.value_topic(node, target));

        Some(ValueTopic {
            topic,
            conf: conf.cloned(),
            target_topic,
        })
    }

    fn resolve(&self, node: &Node, value: &Value) -> Option<(String, Option<&'a ValueOverride>)> {
        let conf = self.config.value_override(&node.device_id(), &value.id());

        if let Some(topic) = conf.and_then(|c| c.topic.as_deref()) {
            let topic = sanitize(topic, false);
            if !topic.is_empty() {
                return Some((format!("{}/{}", self.node_topic(node), topic), conf));
            }
        }

        let mut segments = vec![self.node_topic(node)];
        match self.config.addressing {
            AddressingMode::Named => {
                segments.push(value.command_class.topic_name());
                segments.push(format!("endpoint_{}", value.endpoint));
                segments.push(sanitize(&value.property_name(), true));
            }
            AddressingMode::Raw => {
                segments.push(value.command_class.to_string());
                segments.push(value.endpoint.to_string());
                segments.push(sanitize_key(&value.property, true));
            }
            AddressingMode::Manual => return None,
        }
        if let Some(key) = &value.property_key {
            segments.push(sanitize_key(key, true));
        }

        if segments.iter().any(String::is_empty) {
            return None;
        }
        Some((segments.join("/"), conf))
    }

    fn location(&self, node: &Node) -> Option<String> {
        if self.config.ignore_location {
            return None;
        }
        node.location()
            .map(|l| sanitize(l, true))
            .filter(|l| !l.is_empty())
    }
}
