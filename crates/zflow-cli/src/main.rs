//! zflow gateway runner
//!
//! Runs the gateway against a node snapshot (in-memory driver) and an MQTT
//! broker until Ctrl-C.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tokio::sync::{broadcast::error::RecvError, mpsc};
use tracing::{info, warn};

use zflow_core::config::ConfigBuilder;
use zflow_core::logging;
use zflow_devices::protocols::mqtt::MqttTransport;
use zflow_devices::{DeviceDriver, DriverEvent, GatewayEvent, NodeRegistry};
use zflow_gateway::{Gateway, TemplateRegistry};

/// Device-value to MQTT gateway with consumer auto-discovery
#[derive(Parser, Debug)]
#[command(name = "zflow")]
#[command(version)]
#[command(about = "Device-value to MQTT gateway with consumer auto-discovery", long_about = None)]
struct Args {
    /// Configuration file (TOML, YAML or JSON)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Node snapshot file (JSON)
    #[arg(short, long)]
    nodes: PathBuf,

    /// Log filter, overrides the configured level
    #[arg(long)]
    log_level: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let mut builder = ConfigBuilder::new().with_environment_prefix("ZFLOW");
    if let Some(path) = &args.config {
        builder = builder.with_config_file(path);
    }
    let config = builder.build().context("Failed to load configuration")?;

    match &args.log_level {
        Some(filter) => logging::init_with_filter(filter)?,
        None => logging::init_from_config(&config.logging)?,
    }
    info!(version = zflow_gateway::VERSION, nodes = %args.nodes.display(), "Starting zflow");

    let registry = Arc::new(
        NodeRegistry::from_json_file(&args.nodes)
            .with_context(|| format!("Failed to load nodes from {}", args.nodes.display()))?,
    );
    let templates = match &config.gateway.templates_file {
        Some(path) => TemplateRegistry::with_file(path)?,
        None => TemplateRegistry::new()?,
    };

    let (sender, receiver) = mpsc::channel::<GatewayEvent>(256);
    let (transport, mqtt_task) =
        MqttTransport::connect(&config.mqtt, &config.gateway.discovery.prefix, sender.clone());

    let gateway = Arc::new(Gateway::new(
        Arc::new(config.gateway.clone()),
        registry.clone(),
        Arc::new(transport),
        templates,
    ));
    let runner = tokio::spawn(Arc::clone(&gateway).run(receiver));

    let mut driver_events = registry.subscribe();
    let forward = sender.clone();
    let forwarder = tokio::spawn(async move {
        loop {
            match driver_events.recv().await {
                Ok(event) => {
                    if forward.send(event.into()).await.is_err() {
                        break;
                    }
                }
                Err(RecvError::Lagged(skipped)) => warn!("Dropped {} driver events", skipped),
                Err(RecvError::Closed) => break,
            }
        }
    });

    // Announce the snapshot as if the driver had just finished interviewing
    for node_id in registry.node_ids() {
        sender.send(DriverEvent::NodeStatus { node_id }.into()).await?;
        let value_ids: Vec<String> = registry
            .node(node_id)
            .map(|node| node.values.into_keys().collect())
            .unwrap_or_default();
        for value_id in value_ids {
            sender
                .send(
                    DriverEvent::ValueChanged {
                        node_id,
                        value_id,
                        changed: true,
                    }
                    .into(),
                )
                .await?;
        }
    }
    drop(sender);

    tokio::signal::ctrl_c().await?;
    info!("Shutting down");

    forwarder.abort();
    mqtt_task.abort();
    runner.abort();
    Ok(())
}
