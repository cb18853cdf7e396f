/*!
 * Events flowing into the gateway from the device driver and the transport.
 */
use serde_json::Value as JsonValue;

use crate::node::NodeId;

/// Events emitted by the device driver
#[derive(Debug, Clone, PartialEq)]
pub enum DriverEvent {
    /// A value was reported, `changed` when it differs from the previous one
    ValueChanged {
        /// Node
        node_id: NodeId,
        /// Node-less value id
        value_id: String,
        /// Whether the value changed
        changed: bool,
    },
    /// Readiness or status of a node changed
    NodeStatus {
        /// Node
        node_id: NodeId,
    },
    /// A node sent a notification
    Notification {
        /// Node
        node_id: NodeId,
        /// Notification label
        label: String,
        /// Notification parameters
        params: JsonValue,
    },
    /// A node left the network
    NodeRemoved {
        /// Node
        node_id: NodeId,
    },
    /// Any other driver event
    Event {
        /// Emitter (driver, controller, node)
        source: String,
        /// Event name
        name: String,
        /// Event arguments
        args: Vec<JsonValue>,
    },
}

/// Events emitted by the transport client
#[derive(Debug, Clone, PartialEq)]
pub enum TransportEvent {
    /// A message arrived on a value's command topic
    WriteRequest {
        /// Topic segments, without prefix and command suffix
        topic_parts: Vec<String>,
        /// Decoded JSON body
        payload: JsonValue,
    },
    /// A message arrived on the broadcast topic
    BroadcastRequest {
        /// Topic segments after the broadcast marker, without command suffix
        topic_parts: Vec<String>,
        /// Decoded JSON body
        payload: JsonValue,
    },
    /// A message arrived on an API topic
    ApiCall {
        /// Topic the response is published to
        topic: String,
        /// API name
        name: String,
        /// Decoded JSON body
        payload: JsonValue,
    },
    /// Broker connection went up or down
    BrokerStatus(bool),
    /// The discovery consumer went online or offline
    DiscoveryConsumerStatus(bool),
}

/// Any event the gateway handles
#[derive(Debug, Clone, PartialEq)]
pub enum GatewayEvent {
    /// From the device driver
    Driver(DriverEvent),
    /// From the transport
    Transport(TransportEvent),
}

impl From<DriverEvent> for GatewayEvent {
    fn from(event: DriverEvent) -> Self {
        GatewayEvent::Driver(event)
    }
}

impl From<TransportEvent> for GatewayEvent {
    fn from(event: TransportEvent) -> Self {
        GatewayEvent::Transport(event)
    }
}

impl DriverEvent {
    /// Node the event concerns, if any
    pub fn node_id(&self) -> Option<NodeId> {
        match self {
            DriverEvent::ValueChanged { node_id, .. }
            | DriverEvent::NodeStatus { node_id }
            | DriverEvent::Notification { node_id, .. }
            | DriverEvent::NodeRemoved { node_id } => Some(*node_id),
            DriverEvent::Event { .. } => None,
        }
    }
}
