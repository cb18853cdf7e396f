/*!
 * Pub/sub transport abstraction.
 *
 * This module defines the [`Transport`] seam the gateway publishes through,
 * and [`MemoryTransport`], a loopback implementation that records traffic.
 */
use std::sync::Mutex;

use serde_json::Value as JsonValue;
use tracing::trace;

use crate::device::{DeviceError, Result};

/// Suffix of command topics
pub const SET_SUFFIX: &str = "set";

/// Message body
#[derive(Debug, Clone, PartialEq)]
pub enum Payload {
    /// JSON document
    Json(JsonValue),
    /// Empty body (removes retained messages)
    Empty,
}

impl Payload {
    /// Serialized bytes of the payload
    pub fn to_bytes(&self) -> Vec<u8> {
        match self {
            Payload::Json(JsonValue::String(s)) => s.as_bytes().to_vec(),
            Payload::Json(value) => value.to_string().into_bytes(),
            Payload::Empty => Vec::new(),
        }
    }

    /// The JSON body, if any
    pub fn json(&self) -> Option<&JsonValue> {
        match self {
            Payload::Json(value) => Some(value),
            Payload::Empty => None,
        }
    }
}

/// Per-message publish options
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PublishOptions {
    /// Quality of service (0, 1, 2)
    pub qos: u8,
    /// Whether the broker retains the message
    pub retain: bool,
}

impl Default for PublishOptions {
    fn default() -> Self {
        Self { qos: 1, retain: true }
    }
}

impl PublishOptions {
    /// Options for a non-retained message
    pub fn transient() -> Self {
        Self {
            qos: 1,
            retain: false,
        }
    }
}

/// Pub/sub client the gateway publishes and subscribes through
pub trait Transport: Send + Sync {
    /// Publish `payload` to `topic`, under `prefix_override` or the client prefix
    fn publish(
        &self,
        topic: &str,
        payload: &Payload,
        options: PublishOptions,
        prefix_override: Option<&str>,
    ) -> Result<()>;

    /// Subscribe to the command topics matching a pattern relative to the client prefix
    fn subscribe(&self, pattern: &str) -> Result<()>;

    /// Absolute topic for `topic`, with the command suffix when `set` is true
    fn get_topic(&self, topic: &str, set: bool) -> String;
}

/// Join a prefix and a topic, as every transport does
pub fn prefixed_topic(prefix: &str, topic: &str, set: bool) -> String {
    let mut full = if prefix.is_empty() {
        topic.to_string()
    } else {
        format!("{}/{}", prefix, topic)
    };
    if set {
        full.push('/');
        full.push_str(SET_SUFFIX);
    }
    full
}

/// A published message, as recorded by [`MemoryTransport`]
#[derive(Debug, Clone, PartialEq)]
pub struct Published {
    /// Absolute topic
    pub topic: String,
    /// Body
    pub payload: Payload,
    /// Options
    pub options: PublishOptions,
}

/// Loopback transport that records everything it is asked to do
#[derive(Debug)]
pub struct MemoryTransport {
    prefix: String,
    published: Mutex<Vec<Published>>,
    subscriptions: Mutex<Vec<String>>,
}

impl MemoryTransport {
    /// Create a transport with the given topic prefix
    pub fn new<S: Into<String>>(prefix: S) -> Self {
        Self {
            prefix: prefix.into(),
            published: Mutex::new(Vec::new()),
            subscriptions: Mutex::new(Vec::new()),
        }
    }

    /// Every message published so far
    pub fn published(&self) -> Vec<Published> {
        self.published
            .lock()
            .map(|p| p.clone())
            .unwrap_or_default()
    }

    /// Messages published to an absolute topic
    pub fn published_to(&self, topic: &str) -> Vec<Published> {
        self.published()
            .into_iter()
            .filter(|p| p.topic == topic)
            .collect()
    }

    /// Last message published to an absolute topic
    pub fn last(&self, topic: &str) -> Option<Published> {
        self.published_to(topic).pop()
    }

    /// Drain the recorded messages
    pub fn take(&self) -> Vec<Published> {
        self.published
            .lock()
            .map(|mut p| std::mem::take(&mut *p))
            .unwrap_or_default()
    }

    /// Every subscription issued so far
    pub fn subscriptions(&self) -> Vec<String> {
        self.subscriptions
            .lock()
            .map(|s| s.clone())
            .unwrap_or_default()
    }
}

impl Transport for MemoryTransport {
    fn publish(
        &self,
        topic: &str,
        payload: &Payload,
        options: PublishOptions,
        prefix_override: Option<&str>,
    ) -> Result<()> {
        let topic = prefixed_topic(prefix_override.unwrap_or(&self.prefix), topic, false);
        trace!("Publishing to {}", topic);

        let mut published = self
            .published
            .lock()
            .map_err(|_| DeviceError::transport("Failed to acquire publish log lock"))?;
        published.push(Published {
            topic,
            payload: payload.clone(),
            options,
        });
        Ok(())
    }

    fn subscribe(&self, pattern: &str) -> Result<()> {
        let pattern = prefixed_topic(&self.prefix, pattern, true);
        let mut subscriptions = self
            .subscriptions
            .lock()
            .map_err(|_| DeviceError::transport("Failed to acquire subscription lock"))?;
        subscriptions.push(pattern);
        Ok(())
    }

    fn get_topic(&self, topic: &str, set: bool) -> String {
        prefixed_topic(&self.prefix, topic, set)
    }
}
