/*!
 * zflow Devices
 *
 * This crate provides the device-value model shared by the gateway and the
 * seams to its two external collaborators: the device driver and the
 * pub/sub transport.
 */

#![warn(missing_docs)]

pub mod command_class;
pub mod device;
pub mod event;
pub mod node;
pub mod protocol;
pub mod protocols;
pub mod registry;
pub mod value;

pub use command_class::CommandClass;
pub use device::{ApiResponse, DeviceDriver, DeviceError, Result};
pub use event::{DriverEvent, GatewayEvent, TransportEvent};
pub use node::{DeviceClass, Node, NodeId, NodeStatus, NODE_PREFIX};
pub use protocol::{MemoryTransport, Payload, PublishOptions, Transport};
pub use registry::NodeRegistry;
pub use value::{value_id, PropertyKey, Value, ValueState, ValueType};

/// zflow devices crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Information about available transports
pub fn available_transports() -> Vec<&'static str> {
    let mut transports = vec!["memory"];

    #[cfg(feature = "mqtt")]
    transports.push("mqtt");

    transports
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_available_transports() {
        let transports = available_transports();
        assert!(transports.contains(&"memory"));
        #[cfg(feature = "mqtt")]
        assert!(transports.contains(&"mqtt"));
    }
}
