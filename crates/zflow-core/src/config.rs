/*!
 * Configuration management for zflow.
 *
 * This module loads, layers, and exposes the configuration consumed by the
 * gateway: topic addressing, payload envelopes, discovery settings, and the
 * per-value override table.
 */
use std::path::Path;
use std::sync::Arc;

use config::{Config as ConfigLib, Environment, File};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::{Error, Result};

/// Core configuration for zflow
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// General configuration
    #[serde(default)]
    pub general: GeneralConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,

    /// Gateway configuration
    #[serde(default)]
    pub gateway: GatewayConfig,

    /// Transport client configuration
    #[serde(default)]
    pub mqtt: MqttConfig,
}

/// General configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeneralConfig {
    /// Application name
    #[serde(default = "default_app_name")]
    pub app_name: String,

    /// Data directory
    #[serde(default = "default_data_dir")]
    pub data_dir: String,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level or filter directive (trace, debug, info, "zflow_gateway=debug", ...)
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Whether to include the log target in each line
    #[serde(default = "default_true")]
    pub with_target: bool,
}

/// How topics are derived from nodes and values
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AddressingMode {
    /// `[location/]nodeName/className/endpoint_N/propertyName[/propertyKey]`
    #[default]
    Named,
    /// `[location/]nodeIdOrName/classNumber/endpoint/property[/propertyKey]`
    Raw,
    /// Only explicitly configured topics are used
    Manual,
}

/// Outer wrapping applied to a published value
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PayloadMode {
    /// The value metadata plus the value
    FullObject,
    /// `{ "time": <millis>, "value": <value> }`
    #[default]
    Timestamped,
    /// The bare value
    Raw,
}

/// Consumer auto-discovery settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiscoveryConfig {
    /// Whether discovery descriptors are generated and published
    #[serde(default)]
    pub enabled: bool,

    /// Topic prefix the discovery consumer listens on
    #[serde(default = "default_discovery_prefix")]
    pub prefix: String,

    /// Whether discovery payloads are retained
    #[serde(default)]
    pub retained: bool,

    /// Entity name template (`%nid`, `%ln`, `%loc`, `%pk`, `%pn`, `%n`, `%o`, `%l`)
    #[serde(default = "default_entity_template")]
    pub entity_template: String,
}

/// Per-value overrides, keyed by device model id and node-less value id
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ValueOverride {
    /// Device model id (`manufacturerId-productId-productType`)
    pub device: String,

    /// Node-less value id (`class-endpoint-property[-propertyKey]`)
    pub value: String,

    /// Explicit topic, relative to the node topic
    #[serde(default)]
    pub topic: Option<String>,

    /// Arithmetic post-operation applied on encode, e.g. `/10`
    #[serde(default)]
    pub post_operation: Option<String>,

    /// Encode hook expression
    #[serde(default)]
    pub encode_hook: Option<String>,

    /// Decode hook expression
    #[serde(default)]
    pub decode_hook: Option<String>,

    /// Discovery icon
    #[serde(default)]
    pub icon: Option<String>,

    /// Discovery device class
    #[serde(default)]
    pub device_class: Option<String>,

    /// Poll interval in seconds
    #[serde(default)]
    pub poll_interval: Option<u64>,

    /// Publish QoS
    #[serde(default)]
    pub qos: Option<u8>,

    /// Publish retain flag
    #[serde(default)]
    pub retain: Option<bool>,
}

/// Gateway configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayConfig {
    /// Topic addressing mode
    #[serde(default)]
    pub addressing: AddressingMode,

    /// Payload envelope mode
    #[serde(default)]
    pub payload: PayloadMode,

    /// Use node names instead of ids in raw addressing when a name is set
    #[serde(default = "default_true")]
    pub node_names: bool,

    /// Leave node locations out of topics
    #[serde(default)]
    pub ignore_location: bool,

    /// Do not publish node status
    #[serde(default)]
    pub ignore_status: bool,

    /// Add node name and location to object payloads
    #[serde(default)]
    pub include_node_info: bool,

    /// Publish generic driver events
    #[serde(default)]
    pub send_events: bool,

    /// Discovery settings
    #[serde(default)]
    pub discovery: DiscoveryConfig,

    /// Optional JSON file with extra device templates
    #[serde(default)]
    pub templates_file: Option<String>,

    /// Per-value override table
    #[serde(default)]
    pub values: Vec<ValueOverride>,
}

/// Transport client configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MqttConfig {
    /// Gateway name, used in the client topics
    #[serde(default = "default_gateway_name")]
    pub name: String,

    /// Topic prefix for every published value
    #[serde(default = "default_topic_prefix")]
    pub prefix: String,

    /// Broker host
    #[serde(default = "default_mqtt_host")]
    pub host: String,

    /// Broker port
    #[serde(default = "default_mqtt_port")]
    pub port: u16,

    /// Default QoS
    #[serde(default = "default_qos")]
    pub qos: u8,

    /// Let the broker retain messages published with the retain flag.
    /// When false, nothing this client publishes is retained.
    #[serde(default = "default_true")]
    pub retain: bool,

    /// Keep-alive interval in seconds
    #[serde(default = "default_keep_alive")]
    pub keep_alive_secs: u64,
}

impl GatewayConfig {
    /// Look up the override for a value of a given device model
    pub fn value_override(&self, device_id: &str, value_id: &str) -> Option<&ValueOverride> {
        self.values
            .iter()
            .find(|v| v.device == device_id && v.value == value_id)
    }
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            app_name: default_app_name(),
            data_dir: default_data_dir(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            with_target: true,
        }
    }
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            prefix: default_discovery_prefix(),
            retained: false,
            entity_template: default_entity_template(),
        }
    }
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            addressing: AddressingMode::default(),
            payload: PayloadMode::default(),
            node_names: true,
            ignore_location: false,
            ignore_status: false,
            include_node_info: false,
            send_events: false,
            discovery: DiscoveryConfig::default(),
            templates_file: None,
            values: Vec::new(),
        }
    }
}

impl Default for MqttConfig {
    fn default() -> Self {
        Self {
            name: default_gateway_name(),
            prefix: default_topic_prefix(),
            host: default_mqtt_host(),
            port: default_mqtt_port(),
            qos: default_qos(),
            retain: true,
            keep_alive_secs: default_keep_alive(),
        }
    }
}

fn default_app_name() -> String {
    "zflow".to_string()
}

fn default_data_dir() -> String {
    "./store".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_true() -> bool {
    true
}

fn default_discovery_prefix() -> String {
    "homeassistant".to_string()
}

fn default_entity_template() -> String {
    "%ln_%o".to_string()
}

fn default_gateway_name() -> String {
    "zflow".to_string()
}

fn default_topic_prefix() -> String {
    "zwave".to_string()
}

fn default_mqtt_host() -> String {
    "localhost".to_string()
}

fn default_mqtt_port() -> u16 {
    1883
}

fn default_qos() -> u8 {
    1
}

fn default_keep_alive() -> u64 {
    30
}

/// A builder for creating a configuration
#[derive(Debug, Default)]
pub struct ConfigBuilder {
    config_file: Option<String>,
    environment_prefix: Option<String>,
}

impl ConfigBuilder {
    /// Create a new ConfigBuilder
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the config file path
    pub fn with_config_file<P: AsRef<Path>>(mut self, path: P) -> Self {
        self.config_file = Some(path.as_ref().to_string_lossy().to_string());
        self
    }

    /// Set the environment variable prefix for configuration
    pub fn with_environment_prefix<S: AsRef<str>>(mut self, prefix: S) -> Self {
        self.environment_prefix = Some(prefix.as_ref().to_string());
        self
    }

    /// Build the configuration
    pub fn build(self) -> Result<Config> {
        let mut config_builder = ConfigLib::builder();

        // Start with default values
        let default_config = Config::default();
        config_builder = config_builder.add_source(
            ConfigLib::try_from(&default_config)
                .map_err(|e| Error::config(format!("Failed to create default config: {}", e)))?,
        );

        if let Some(config_file) = self.config_file {
            let path = Path::new(&config_file);
            if path.exists() {
                debug!("Loading configuration from {}", config_file);
                config_builder = config_builder.add_source(File::with_name(&config_file));
            } else {
                debug!("Configuration file {} does not exist, using defaults", config_file);
            }
        }

        if let Some(prefix) = self.environment_prefix {
            debug!("Loading configuration from environment variables with prefix {}", prefix);
            config_builder = config_builder.add_source(
                Environment::with_prefix(&prefix)
                    .separator("__")
                    .try_parsing(true),
            );
        }

        let config_lib = config_builder
            .build()
            .map_err(|e| Error::config(format!("Failed to build configuration: {}", e)))?;

        let config: Config = config_lib
            .try_deserialize()
            .map_err(|e| Error::config(format!("Failed to deserialize configuration: {}", e)))?;

        info!("Configuration loaded successfully");
        Ok(config)
    }
}

/// A thread-safe reference to a configuration
#[derive(Debug, Clone)]
pub struct SharedConfig(Arc<Config>);

impl SharedConfig {
    /// Create a new SharedConfig
    pub fn new(config: Config) -> Self {
        Self(Arc::new(config))
    }

    /// Get a reference to the config
    pub fn get(&self) -> &Config {
        &self.0
    }
}

impl From<Config> for SharedConfig {
    fn from(config: Config) -> Self {
        Self::new(config)
    }
}

impl AsRef<Config> for SharedConfig {
    fn as_ref(&self) -> &Config {
        self.get()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::env;
    use std::fs::File;
    use std::io::Write;
    use tempfile::tempdir;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.general.app_name, "zflow");
        assert_eq!(config.logging.level, "info");
        assert_eq!(config.gateway.addressing, AddressingMode::Named);
        assert_eq!(config.gateway.payload, PayloadMode::Timestamped);
        assert_eq!(config.gateway.discovery.prefix, "homeassistant");
        assert_eq!(config.gateway.discovery.entity_template, "%ln_%o");
        assert!(config.gateway.node_names);
        assert_eq!(config.mqtt.prefix, "zwave");
    }

    #[test]
    fn test_config_builder_defaults() {
        let config = ConfigBuilder::new().build().unwrap();
        assert_eq!(config.general.app_name, "zflow");
        assert!(!config.gateway.discovery.enabled);
        assert!(config.gateway.values.is_empty());
    }

    #[test]
    fn test_config_builder_with_file() -> Result<()> {
        let dir = tempdir().map_err(|e| Error::other(e.to_string()))?;
        let file_path = dir.path().join("config.toml");

        {
            let mut file = File::create(&file_path)?;
            file.write_all(
                br#"
                [logging]
                level = "debug"

                [gateway]
                addressing = "raw"
                payload = "raw"
                ignore_location = true

                [gateway.discovery]
                enabled = true
                retained = true

                [[gateway.values]]
                device = "134-3-100"
                value = "49-0-Air temperature"
                post_operation = "/10"
                poll_interval = 30
            "#,
            )?;
        }

        let config = ConfigBuilder::new().with_config_file(file_path).build()?;

        assert_eq!(config.logging.level, "debug");
        assert_eq!(config.gateway.addressing, AddressingMode::Raw);
        assert_eq!(config.gateway.payload, PayloadMode::Raw);
        assert!(config.gateway.ignore_location);
        assert!(config.gateway.discovery.enabled);
        assert!(config.gateway.discovery.retained);
        assert_eq!(config.gateway.discovery.prefix, "homeassistant");

        let conf = config
            .gateway
            .value_override("134-3-100", "49-0-Air temperature")
            .unwrap();
        assert_eq!(conf.post_operation.as_deref(), Some("/10"));
        assert_eq!(conf.poll_interval, Some(30));
        assert!(conf.topic.is_none());

        assert!(config.gateway.value_override("134-3-100", "49-0-Humidity").is_none());

        Ok(())
    }

    #[test]
    fn test_config_builder_with_env() -> Result<()> {
        env::set_var("ZFLOWENVTEST__GATEWAY__ADDRESSING", "manual");
        env::set_var("ZFLOWENVTEST__LOGGING__LEVEL", "trace");

        let config = ConfigBuilder::new()
            .with_environment_prefix("zflowenvtest")
            .build()?;

        assert_eq!(config.gateway.addressing, AddressingMode::Manual);
        assert_eq!(config.logging.level, "trace");

        // Clean up
        env::remove_var("ZFLOWENVTEST__GATEWAY__ADDRESSING");
        env::remove_var("ZFLOWENVTEST__LOGGING__LEVEL");

        Ok(())
    }

    #[test]
    fn test_missing_file_uses_defaults() {
        let config = ConfigBuilder::new()
            .with_config_file("/nonexistent/zflow.toml")
            .build()
            .unwrap();
        assert_eq!(config.gateway.addressing, AddressingMode::Named);
    }

    #[test]
    fn test_shared_config() {
        let shared = SharedConfig::new(Config::default());
        let shared2 = shared.clone();
        assert_eq!(shared2.get().general.app_name, "zflow");
        assert_eq!(shared.as_ref().mqtt.port, 1883);
    }
}
