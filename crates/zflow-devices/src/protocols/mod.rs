/*!
 * Transport implementations for zflow.
 */

#[cfg(feature = "mqtt")]
pub mod mqtt;

#[cfg(feature = "mqtt")]
pub use mqtt::{ClientTopics, MqttTransport};
