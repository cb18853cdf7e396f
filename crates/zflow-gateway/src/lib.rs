/*!
 * zflow Gateway
 *
 * This crate provides the gateway between a device-value network and a
 * pub/sub transport: topic resolution, the payload transform pipeline,
 * consumer auto-discovery and the orchestrator that ties them to device
 * and transport events.
 */

#![warn(missing_docs)]

// Re-export core types
pub use zflow_core::prelude;

pub mod descriptor;
pub mod discovery;
pub mod error;
pub mod expression;
pub mod gateway;
pub mod scheduler;
pub mod store;
pub mod subscriptions;
pub mod templates;
pub mod topic;
pub mod transform;

// Re-export main types for convenience
pub use descriptor::{Category, Descriptor};
pub use discovery::DiscoveryEngine;
pub use error::{Error, Result};
pub use expression::{Hook, InverseOperation, PostOperation};
pub use gateway::Gateway;
pub use scheduler::PollScheduler;
pub use store::DiscoveredStore;
pub use subscriptions::{SubscriptionManager, TopicValue};
pub use templates::{DeviceTemplates, TemplateRegistry};
pub use topic::{TopicResolver, ValueTopic};
pub use transform::Transformer;

/// zflow gateway crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Initialize the gateway crate
pub fn init() -> Result<()> {
    tracing::info!("zflow Gateway {} initialized", VERSION);
    Ok(())
}
