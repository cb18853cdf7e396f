/*!
 * Prelude module for zflow Core.
 *
 * This module re-exports commonly used types and functions from the zflow Core crate
 * to make them easier to import.
 */

// Re-export error types
pub use crate::error::{Error, Result};

// Re-export config types
pub use crate::config::{
    AddressingMode, Config, ConfigBuilder, DiscoveryConfig, GatewayConfig, MqttConfig,
    PayloadMode, SharedConfig, ValueOverride,
};

// Re-export utility functions
pub use crate::utils::{interval_from_secs, now_millis};

// Re-export logging helpers
pub use crate::logging::{node_span, operation_span};
pub use tracing::{debug, error, info, trace, warn};

// Re-export core initialization
pub use crate::init;
