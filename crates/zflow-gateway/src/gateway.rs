/*!
 * Gateway orchestrator.
 *
 * The gateway receives device driver and transport events, runs discovery,
 * publishes values through the transform pipeline and routes inbound
 * writes back to the driver. It exclusively owns the discovered store, the
 * write-back subscriptions and the poll schedule.
 *
 * Handlers for the same node are serialized through a per-node lock, so a
 * rediscovery never interleaves with a value change of that node. Handlers
 * for different nodes only contend on the short store and subscription
 * critical sections.
 */
use std::collections::HashMap;
use std::sync::{Arc, Mutex, RwLock};
use std::time::{Duration, Instant};

use serde_json::{json, Value as JsonValue};
use tokio::sync::mpsc;
use tracing::{debug, error, info, trace, warn};

use zflow_core::config::{GatewayConfig, PayloadMode, ValueOverride};
use zflow_core::error::Error as CoreError;
use zflow_core::logging::{node_span, operation_span};
use zflow_core::utils::{interval_from_secs, now_millis};
use zflow_devices::{
    ApiResponse, CommandClass, DeviceDriver, DriverEvent, GatewayEvent, Node, NodeId, Payload,
    PublishOptions, Transport, TransportEvent, Value,
};

use crate::descriptor::{Category, Descriptor};
use crate::discovery::{climate, discovery_order, DiscoveryEngine};
use crate::error::{Error, Result};
use crate::scheduler::PollScheduler;
use crate::store::{DiscoveredStore, Owner};
use crate::subscriptions::{wildcard_pattern, SubscriptionManager, TopicValue};
use crate::templates::TemplateRegistry;
use crate::topic::{sanitize, TopicResolver};
use crate::transform::Transformer;

/// Prefix of the topics driver events are published to
pub const EVENTS_PREFIX: &str = "_EVENTS";

const TICK: Duration = Duration::from_secs(1);

fn lock_error(what: &str) -> Error {
    CoreError::runtime(format!("Failed to acquire {} lock", what)).into()
}

fn node_arg(args: &[JsonValue]) -> Option<NodeId> {
    args.first()
        .and_then(JsonValue::as_u64)
        .and_then(|id| NodeId::try_from(id).ok())
}

/// The gateway between a device driver and a pub/sub transport
pub struct Gateway {
    config: Arc<GatewayConfig>,
    driver: Arc<dyn DeviceDriver>,
    transport: Arc<dyn Transport>,
    templates: TemplateRegistry,
    home_hex: String,
    store: RwLock<DiscoveredStore>,
    subscriptions: RwLock<SubscriptionManager>,
    scheduler: Mutex<PollScheduler>,
    climate_templates: RwLock<HashMap<String, Descriptor>>,
    node_locks: Mutex<HashMap<NodeId, Arc<Mutex<()>>>>,
}

impl Gateway {
    /// Create a gateway
    pub fn new(
        config: Arc<GatewayConfig>,
        driver: Arc<dyn DeviceDriver>,
        transport: Arc<dyn Transport>,
        templates: TemplateRegistry,
    ) -> Self {
        let home_hex = driver.home_hex();
        Self {
            config,
            driver,
            transport,
            templates,
            home_hex,
            store: RwLock::new(DiscoveredStore::new()),
            subscriptions: RwLock::new(SubscriptionManager::new()),
            scheduler: Mutex::new(PollScheduler::new()),
            climate_templates: RwLock::new(HashMap::new()),
            node_locks: Mutex::new(HashMap::new()),
        }
    }

    /// Gateway configuration
    pub fn config(&self) -> &GatewayConfig {
        &self.config
    }

    fn engine(&self) -> DiscoveryEngine<'_> {
        DiscoveryEngine::new(&self.config, self.transport.as_ref(), &self.home_hex)
    }

    fn node_lock(&self, node_id: NodeId) -> Result<Arc<Mutex<()>>> {
        let mut locks = self.node_locks.lock().map_err(|_| lock_error("node table"))?;
        Ok(Arc::clone(locks.entry(node_id).or_default()))
    }

    fn load_node(&self, node_id: NodeId) -> Result<Node> {
        self.driver
            .node(node_id)
            .ok_or_else(|| Error::not_found(format!("Node {}", node_id)))
    }

    /// Dispatch one event to its handler. Errors are logged, never returned.
    pub fn handle(&self, event: GatewayEvent) {
        trace!("Handling {:?}", event);
        let result = match event {
            GatewayEvent::Driver(event) => match event {
                DriverEvent::ValueChanged {
                    node_id,
                    value_id,
                    changed,
                } => self.on_value_changed(node_id, &value_id, changed),
                DriverEvent::NodeStatus { node_id } => self.on_node_status(node_id),
                DriverEvent::Notification {
                    node_id,
                    label,
                    params,
                } => self.on_notification(node_id, &label, params),
                DriverEvent::NodeRemoved { node_id } => self.on_node_removed(node_id),
                DriverEvent::Event { source, name, args } => self.on_driver_event(&source, &name, args),
            },
            GatewayEvent::Transport(event) => match event {
                TransportEvent::WriteRequest { topic_parts, payload } => {
                    self.on_write_request(&topic_parts, &payload)
                }
                TransportEvent::BroadcastRequest { topic_parts, payload } => {
                    self.on_broadcast_request(&topic_parts, &payload)
                }
                TransportEvent::ApiCall { topic, name, payload } => {
                    self.on_api_call(&topic, &name, payload);
                    Ok(())
                }
                TransportEvent::BrokerStatus(online) => self.on_broker_status(online),
                TransportEvent::DiscoveryConsumerStatus(online) => self.on_discovery_consumer_status(online),
            },
        };
        if let Err(e) = result {
            warn!("Event handling failed: {}", e);
        }
    }

    /// Consume events until the channel closes, polling due values every second
    pub async fn run(self: Arc<Self>, mut events: mpsc::Receiver<GatewayEvent>) {
        info!("Gateway started for home {}", self.home_hex);
        let mut ticker = tokio::time::interval(TICK);
        loop {
            tokio::select! {
                event = events.recv() => match event {
                    Some(event) => self.handle(event),
                    None => break,
                },
                _ = ticker.tick() => self.poll_tick(Instant::now()),
            }
        }
        info!("Gateway event loop stopped");
    }

    /// A value was reported by the driver
    pub fn on_value_changed(&self, node_id: NodeId, value_id: &str, changed: bool) -> Result<()> {
        let _span = node_span(node_id).entered();
        let lock = self.node_lock(node_id)?;
        let _guard = lock.lock().map_err(|_| lock_error("node"))?;

        let node = self.load_node(node_id)?;
        let value = node
            .value(value_id)
            .ok_or_else(|| Error::not_found(format!("Value {}-{}", node_id, value_id)))?;

        // Discovery runs ahead of the first topic lookup
        if self.config.discovery.enabled && node.ready {
            self.discover_value(&node, value_id);
            if value.command_class == CommandClass::THERMOSTAT_MODE {
                self.rewire_climate(&node, value)?;
            }
        }

        let resolver = TopicResolver::new(&self.config);
        let Some(details) = resolver.value_topic_details(&node, value) else {
            trace!("No topic for {}", value.full_id());
            return Ok(());
        };

        if value.writable {
            self.track(&details.topic, node_id, value_id, details.conf.clone())?;
        }
        if let Some(target) = value.target_value.as_deref().and_then(|id| node.value(id)) {
            if let Some(target_details) = resolver.value_topic_details(&node, target) {
                self.track(&target_details.topic, node_id, &target.id(), target_details.conf)?;
            }
        }

        if !value.readable || (value.stateless && !changed) {
            return Ok(());
        }

        let conf = details.conf.as_ref();
        let payload = Transformer::new(&self.config).encode(&node, value, conf)?;
        self.transport
            .publish(&details.topic, &Payload::Json(payload), publish_options(value, conf), None)?;

        if let Some(interval) = conf.and_then(|c| c.poll_interval).and_then(interval_from_secs) {
            let mut scheduler = self.scheduler.lock().map_err(|_| lock_error("scheduler"))?;
            scheduler.register(node_id, value_id, interval, Instant::now());
        }
        Ok(())
    }

    /// Readiness or status of a node changed
    pub fn on_node_status(&self, node_id: NodeId) -> Result<()> {
        let _span = node_span(node_id).entered();
        let lock = self.node_lock(node_id)?;
        let _guard = lock.lock().map_err(|_| lock_error("node"))?;

        let node = self.load_node(node_id)?;
        debug!("Node {} is {} (ready: {})", node_id, node.status, node.ready);

        if !self.config.ignore_status {
            let topic = format!("{}/status", TopicResolver::new(&self.config).node_topic(&node));
            let payload = match self.config.payload {
                PayloadMode::Raw => json!(node.ready),
                PayloadMode::FullObject | PayloadMode::Timestamped => json!({
                    "time": now_millis(),
                    "value": node.ready,
                    "status": node.status.to_string(),
                }),
            };
            self.transport
                .publish(&topic, &Payload::Json(payload), PublishOptions::default(), None)?;
        }

        if node.ready {
            self.discover_node(&node);
        }
        Ok(())
    }

    /// A node sent a notification
    pub fn on_notification(&self, node_id: NodeId, label: &str, params: JsonValue) -> Result<()> {
        let _span = node_span(node_id).entered();
        let node = self.load_node(node_id)?;
        let topic = format!(
            "{}/notification/{}",
            TopicResolver::new(&self.config).node_topic(&node),
            sanitize(label, true)
        );
        let payload = Transformer::new(&self.config).wrap(params);
        self.transport
            .publish(&topic, &Payload::Json(payload), PublishOptions::transient(), None)?;
        Ok(())
    }

    /// A node left the network: forget everything the gateway holds for it
    pub fn on_node_removed(&self, node_id: NodeId) -> Result<()> {
        let _span = node_span(node_id).entered();
        let lock = self.node_lock(node_id)?;
        {
            let _guard = lock.lock().map_err(|_| lock_error("node"))?;

            let removed = self.store.write().map_err(|_| lock_error("store"))?.clear_node(node_id);
            let topics = self
                .subscriptions
                .write()
                .map_err(|_| lock_error("subscriptions"))?
                .purge_node(node_id);
            self.scheduler
                .lock()
                .map_err(|_| lock_error("scheduler"))?
                .remove_node(node_id);
            info!(
                "Node {} removed: dropped {} descriptors and {} write-back topics",
                node_id,
                removed.len(),
                topics
            );
        }
        self.node_locks
            .lock()
            .map_err(|_| lock_error("node table"))?
            .remove(&node_id);
        Ok(())
    }

    /// Any other driver event, forwarded when `send_events` is set
    pub fn on_driver_event(&self, source: &str, name: &str, args: Vec<JsonValue>) -> Result<()> {
        if !self.config.send_events {
            return Ok(());
        }
        let topic = format!("{}/{}/{}", EVENTS_PREFIX, sanitize(source, true), sanitize(name, true));
        let payload = json!({ "time": now_millis(), "data": args });
        self.transport
            .publish(&topic, &Payload::Json(payload), PublishOptions::transient(), None)?;
        Ok(())
    }

    /// A message arrived on a value's command topic
    pub fn on_write_request(&self, topic_parts: &[String], payload: &JsonValue) -> Result<()> {
        let topic = topic_parts.join("/");
        let entry = self
            .subscriptions
            .read()
            .map_err(|_| lock_error("subscriptions"))?
            .lookup(&topic)
            .cloned();
        match entry {
            Some(entry) => self.write(&entry, payload),
            None => {
                debug!("No value behind {}", topic);
                Ok(())
            }
        }
    }

    /// A message arrived on the broadcast topic: write every matching value
    pub fn on_broadcast_request(&self, topic_parts: &[String], payload: &JsonValue) -> Result<()> {
        let suffix = topic_parts.join("/");
        let entries = self
            .subscriptions
            .read()
            .map_err(|_| lock_error("subscriptions"))?
            .matching_suffix(&suffix);
        debug!("Broadcast to {} values matching {}", entries.len(), suffix);
        for entry in entries {
            if let Err(e) = self.write(&entry, payload) {
                warn!("Broadcast write to {}-{} failed: {}", entry.node_id, entry.value_id, e);
            }
        }
        Ok(())
    }

    fn write(&self, entry: &TopicValue, payload: &JsonValue) -> Result<()> {
        let _span = node_span(entry.node_id).entered();
        let lock = self.node_lock(entry.node_id)?;
        let _guard = lock.lock().map_err(|_| lock_error("node"))?;

        let node = self.load_node(entry.node_id)?;
        let value = node
            .value(&entry.value_id)
            .ok_or_else(|| Error::not_found(format!("Value {}-{}", entry.node_id, entry.value_id)))?;
        let descriptor = self
            .store
            .read()
            .map_err(|_| lock_error("store"))?
            .descriptor_of(entry.node_id, &entry.value_id)
            .cloned();

        let data = Transformer::new(&self.config).decode(
            payload,
            &node,
            value,
            entry.conf.as_ref(),
            descriptor.as_ref(),
        )?;
        debug!("Writing {} to {}", data, value.full_id());
        self.driver.write_value(entry.node_id, &entry.value_id, data)?;
        Ok(())
    }

    /// Run an API call and publish its response to `topic`
    pub fn on_api_call(&self, topic: &str, name: &str, payload: JsonValue) -> ApiResponse {
        let args: Vec<JsonValue> = payload
            .get("args")
            .and_then(JsonValue::as_array)
            .cloned()
            .unwrap_or_default();

        let response = match name {
            "rediscoverNode" => match node_arg(&args) {
                Some(node_id) => match self.rediscover_node(node_id) {
                    Ok(count) => ApiResponse::ok(format!("Node {} rediscovered", node_id), Some(json!(count))),
                    Err(e) => ApiResponse::failure(e.to_string()),
                },
                None => ApiResponse::failure("Missing node id"),
            },
            "rediscoverAll" => match self.rediscover_all() {
                Ok(count) => ApiResponse::ok("Discovery republished", Some(json!(count))),
                Err(e) => ApiResponse::failure(e.to_string()),
            },
            "disableDiscovery" => match node_arg(&args) {
                Some(node_id) => match self.disable_discovery(node_id) {
                    Ok(count) => ApiResponse::ok(
                        format!("Discovery disabled for node {}", node_id),
                        Some(json!(count)),
                    ),
                    Err(e) => ApiResponse::failure(e.to_string()),
                },
                None => ApiResponse::failure("Missing node id"),
            },
            "reloadDeviceTemplates" => match self.templates.reload() {
                Ok(models) => ApiResponse::ok("Device templates reloaded", Some(json!(models))),
                Err(e) => ApiResponse::failure(e.to_string()),
            },
            _ => self.driver.call_api(name, &args),
        };

        if !response.success {
            warn!("API call {} failed: {}", name, response.message);
        }

        let mut body = json!({
            "success": response.success,
            "message": response.message,
            "origin": payload,
        });
        if let Some(result) = &response.result {
            body["result"] = result.clone();
        }
        if let Err(e) = self
            .transport
            .publish(topic, &Payload::Json(body), PublishOptions::transient(), None)
        {
            error!("Failed to publish API response to {}: {}", topic, e);
        }
        response
    }

    /// Broker connection went up or down
    pub fn on_broker_status(&self, online: bool) -> Result<()> {
        info!("Broker is {}", if online { "online" } else { "offline" });
        if !online {
            return Ok(());
        }

        let depths = self
            .subscriptions
            .read()
            .map_err(|_| lock_error("subscriptions"))?
            .depths();
        for depth in depths {
            if let Err(e) = self.transport.subscribe(&wildcard_pattern(depth)) {
                warn!("Failed to resubscribe depth {}: {}", depth, e);
            }
        }
        self.rediscover_all()?;
        Ok(())
    }

    /// The discovery consumer went online or offline
    pub fn on_discovery_consumer_status(&self, online: bool) -> Result<()> {
        info!("Discovery consumer is {}", if online { "online" } else { "offline" });
        if online {
            self.rediscover_all()?;
        }
        Ok(())
    }

    /// Update the store for a descriptor and publish it, or its removal.
    ///
    /// Ignored descriptors only update the store.
    pub fn publish_discovery(
        &self,
        node_id: NodeId,
        descriptor: &Descriptor,
        delete: bool,
        update_store: bool,
    ) -> Result<()> {
        if update_store {
            let mut store = self.store.write().map_err(|_| lock_error("store"))?;
            if delete {
                store.release(node_id, descriptor);
            } else {
                store.claim(node_id, descriptor);
            }
        }

        if descriptor.ignore_discovery {
            return Ok(());
        }
        self.emit(descriptor, delete)?;

        if descriptor.persistent {
            let snapshot = serde_json::to_value(descriptor)?;
            self.driver.persist_descriptor(node_id, &snapshot, delete);
        }
        Ok(())
    }

    fn emit(&self, descriptor: &Descriptor, delete: bool) -> Result<()> {
        let payload = if delete {
            Payload::Empty
        } else {
            Payload::Json(self.engine().discovery_payload(descriptor))
        };
        let options = PublishOptions {
            qos: 0,
            retain: self.config.discovery.retained,
        };
        debug!(
            "{} discovery {}",
            if delete { "Removing" } else { "Publishing" },
            descriptor.discovery_topic
        );
        self.transport.publish(
            &descriptor.discovery_topic,
            &payload,
            options,
            Some(&self.config.discovery.prefix),
        )?;
        Ok(())
    }

    /// Clear the discovery state of a node and discover it again.
    ///
    /// Returns the number of descriptors the node ends up with.
    pub fn rediscover_node(&self, node_id: NodeId) -> Result<usize> {
        let _span = node_span(node_id).entered();
        let lock = self.node_lock(node_id)?;
        let _guard = lock.lock().map_err(|_| lock_error("node"))?;

        let node = self.load_node(node_id)?;
        let previous = self.store.write().map_err(|_| lock_error("store"))?.clear_node(node_id);
        for descriptor in previous.iter().filter(|d| !d.ignore_discovery) {
            if let Err(e) = self.emit(descriptor, true) {
                warn!("Failed to remove {}: {}", descriptor.discovery_topic, e);
            }
        }

        self.discover_node(&node);
        let count = self
            .store
            .read()
            .map_err(|_| lock_error("store"))?
            .descriptors(node_id)
            .len();
        info!("Node {} rediscovered with {} descriptors", node_id, count);
        Ok(count)
    }

    /// Republish every stored descriptor. Returns how many were published.
    pub fn rediscover_all(&self) -> Result<usize> {
        if !self.config.discovery.enabled {
            return Ok(0);
        }
        let _span = operation_span("rediscover_all", "gateway").entered();
        let node_ids = self.store.read().map_err(|_| lock_error("store"))?.node_ids();
        let mut published = 0;
        for node_id in node_ids {
            let lock = self.node_lock(node_id)?;
            let _guard = lock.lock().map_err(|_| lock_error("node"))?;

            let descriptors = self.store.read().map_err(|_| lock_error("store"))?.descriptors(node_id);
            for descriptor in descriptors.iter().filter(|d| !d.ignore_discovery) {
                match self.emit(descriptor, false) {
                    Ok(()) => published += 1,
                    Err(e) => warn!("Failed to republish {}: {}", descriptor.discovery_topic, e),
                }
            }
        }
        info!("Republished {} discovery descriptors", published);
        Ok(published)
    }

    /// Withdraw the descriptors of a node from the consumer, keeping their
    /// value ownership. Returns how many were disabled.
    pub fn disable_discovery(&self, node_id: NodeId) -> Result<usize> {
        let _span = node_span(node_id).entered();
        let lock = self.node_lock(node_id)?;
        let _guard = lock.lock().map_err(|_| lock_error("node"))?;

        let ignored = self.store.write().map_err(|_| lock_error("store"))?.mark_ignored(node_id);
        for descriptor in &ignored {
            self.emit(descriptor, true)?;
            let snapshot = serde_json::to_value(descriptor)?;
            self.driver.persist_descriptor(node_id, &snapshot, false);
        }
        info!("Disabled discovery of {} descriptors on node {}", ignored.len(), node_id);
        Ok(ignored.len())
    }

    /// Poll every value that is due
    pub fn poll_tick(&self, now: Instant) {
        let due = match self.scheduler.lock() {
            Ok(mut scheduler) => scheduler.due(now),
            Err(_) => {
                error!("Failed to acquire scheduler lock");
                return;
            }
        };
        for (node_id, value_id) in due {
            if let Err(e) = self.driver.poll_value(node_id, &value_id) {
                warn!("Failed to poll {}-{}: {}", node_id, value_id, e);
            }
        }
    }

    fn track(&self, topic: &str, node_id: NodeId, value_id: &str, conf: Option<ValueOverride>) -> Result<()> {
        let new_depth = {
            let mut subscriptions = self.subscriptions.write().map_err(|_| lock_error("subscriptions"))?;
            if subscriptions.is_tracked(topic) {
                return Ok(());
            }
            subscriptions.track(
                topic,
                TopicValue {
                    node_id,
                    value_id: value_id.to_string(),
                    conf,
                },
            )
        };

        if let Some(depth) = new_depth {
            if let Err(e) = self.transport.subscribe(&wildcard_pattern(depth)) {
                warn!("Failed to subscribe to depth {}: {}", depth, e);
                self.subscriptions
                    .write()
                    .map_err(|_| lock_error("subscriptions"))?
                    .forget_depth(depth);
            }
        }
        Ok(())
    }

    fn discover_node(&self, node: &Node) {
        if !self.config.discovery.enabled || !node.ready {
            return;
        }

        let mut templates = self.templates.templates_for(&node.device_id());
        if node.device_class.is_thermostat() && templates.is_empty() {
            if let Some(template) = self.climate_template(node) {
                templates.push(template);
            }
        }

        for template in &templates {
            let result = {
                match self.store.read() {
                    Ok(store) => self.engine().discover_template(node, template, &store),
                    Err(_) => Err(lock_error("store")),
                }
            };
            match result {
                Ok(Some(descriptor)) => {
                    if let Err(e) = self.publish_discovery(node.id, &descriptor, false, true) {
                        warn!("Failed to publish template {}: {}", descriptor.key(), e);
                    }
                }
                Ok(None) => {}
                Err(e) => warn!("Failed to discover template {} on node {}: {}", template.key(), node.id, e),
            }
        }

        for value_id in discovery_order(node) {
            self.discover_value(node, &value_id);
        }

        let mode = node
            .values
            .values()
            .find(|v| v.command_class == CommandClass::THERMOSTAT_MODE);
        if let Some(mode) = mode {
            if let Err(e) = self.rewire_climate(node, mode) {
                warn!("Failed to rewire climate of node {}: {}", node.id, e);
            }
        }
    }

    fn discover_value(&self, node: &Node, value_id: &str) {
        let result = match self.store.read() {
            Ok(store) => self.engine().discover_value(node, value_id, &store),
            Err(_) => Err(lock_error("store")),
        };
        match result {
            Ok(Some(descriptor)) => {
                debug!("Discovered {} for {}-{}", descriptor.key(), node.id, value_id);
                if let Err(e) = self.publish_discovery(node.id, &descriptor, false, true) {
                    warn!("Failed to publish {}: {}", descriptor.key(), e);
                }
            }
            Ok(None) => {}
            Err(e) => warn!("Failed to discover {}-{}: {}", node.id, value_id, e),
        }
    }

    fn climate_template(&self, node: &Node) -> Option<Descriptor> {
        let device_id = node.device_id();
        if let Some(template) = self
            .climate_templates
            .read()
            .ok()
            .and_then(|t| t.get(&device_id).cloned())
        {
            return Some(template);
        }

        let template = climate::synthesize(node)?;
        info!("Synthesized climate template for device {}", device_id);
        if let Ok(mut templates) = self.climate_templates.write() {
            templates.insert(device_id, template.clone());
        }
        Some(template)
    }

    fn rewire_climate(&self, node: &Node, mode: &Value) -> Result<()> {
        let mode_id = mode.id();
        let climates: Vec<Descriptor> = self
            .store
            .read()
            .map_err(|_| lock_error("store"))?
            .descriptors(node.id)
            .into_iter()
            .filter(|d| d.category == Category::Climate && d.values.contains(&mode_id))
            .collect();

        for descriptor in climates {
            if let Some(updated) = self.engine().rewire_climate(node, &descriptor, mode) {
                info!(
                    "Climate {} of node {} now targets {}",
                    updated.key(),
                    node.id,
                    updated.get_str("temperature_state_topic").unwrap_or_default()
                );
                self.publish_discovery(node.id, &updated, false, true)?;
            }
        }
        Ok(())
    }

    /// Descriptors of a node
    pub fn descriptors(&self, node_id: NodeId) -> Vec<Descriptor> {
        self.store
            .read()
            .map(|s| s.descriptors(node_id))
            .unwrap_or_default()
    }

    /// Owner of a value
    pub fn owner_of(&self, node_id: NodeId, value_id: &str) -> Option<Owner> {
        self.store.read().ok()?.owner_of(node_id, value_id).cloned()
    }

    /// Value behind a write-back topic
    pub fn tracked(&self, topic: &str) -> Option<TopicValue> {
        self.subscriptions.read().ok()?.lookup(topic).cloned()
    }

    /// Number of write-back topics
    pub fn tracked_count(&self) -> usize {
        self.subscriptions.read().map(|s| s.len()).unwrap_or_default()
    }

    /// Number of scheduled polls
    pub fn scheduled_polls(&self) -> usize {
        self.scheduler.lock().map(|s| s.len()).unwrap_or_default()
    }
}

fn publish_options(value: &Value, conf: Option<&ValueOverride>) -> PublishOptions {
    PublishOptions {
        qos: conf.and_then(|c| c.qos).unwrap_or(1),
        retain: conf.and_then(|c| c.retain).unwrap_or(!value.stateless),
    }
}
