use std::io::Write;
use std::sync::Arc;
use std::time::{Duration, Instant};

use serde_json::json;
use tokio::sync::mpsc;

use zflow_core::config::{GatewayConfig, PayloadMode, ValueOverride};
use zflow_devices::{
    CommandClass, DeviceClass, DriverEvent, GatewayEvent, MemoryTransport, Node, NodeRegistry,
    Payload, Value, ValueType,
};
use zflow_gateway::{Category, Gateway, TemplateRegistry};

struct Harness {
    gateway: Arc<Gateway>,
    registry: Arc<NodeRegistry>,
    transport: Arc<MemoryTransport>,
}

fn config() -> GatewayConfig {
    let mut config = GatewayConfig::default();
    config.discovery.enabled = true;
    config.send_events = true;
    config
}

fn harness(config: GatewayConfig, nodes: Vec<Node>) -> Harness {
    harness_with(config, nodes, TemplateRegistry::new().unwrap())
}

fn harness_with(config: GatewayConfig, nodes: Vec<Node>, templates: TemplateRegistry) -> Harness {
    let registry = Arc::new(NodeRegistry::new("0xcafe"));
    for node in nodes {
        registry.insert_node(node).unwrap();
    }
    let transport = Arc::new(MemoryTransport::new("zwave"));
    let gateway = Arc::new(Gateway::new(
        Arc::new(config),
        registry.clone(),
        transport.clone(),
        templates,
    ));
    Harness {
        gateway,
        registry,
        transport,
    }
}

fn plug(id: u32, name: &str) -> Node {
    Node::new(id)
        .with_name(name)
        .with_product(134, 100, 3)
        .ready()
        .with_value(
            Value::new(id, CommandClass::SWITCH_BINARY, 0, "currentValue")
                .with_type(ValueType::Boolean)
                .with_target("37-0-targetValue")
                .with_value(false),
        )
        .with_value(
            Value::new(id, CommandClass::SWITCH_BINARY, 0, "targetValue")
                .with_type(ValueType::Boolean)
                .write_only(),
        )
}

fn sensor(id: u32) -> Node {
    Node::new(id)
        .with_name("Sensor")
        .with_location("Kitchen")
        .with_product(134, 200, 1)
        .ready()
        .with_value(
            Value::new(id, CommandClass::SENSOR_BINARY, 0, "Motion")
                .with_type(ValueType::Boolean)
                .with_value(false),
        )
        .with_value(
            Value::new(id, CommandClass::SENSOR_MULTILEVEL, 0, "Air temperature")
                .with_type(ValueType::Number)
                .with_unit("°C")
                .with_value(21.5),
        )
}

fn thermostat(id: u32) -> Node {
    Node::new(id)
        .with_name("Thermostat")
        .with_device_class(DeviceClass::new(4, 0x08, 0x06))
        .with_product(0x0148, 0x0003, 0x0001)
        .ready()
        .with_value(
            Value::new(id, CommandClass::THERMOSTAT_MODE, 0, "mode")
                .with_states(&[(0, "Off"), (1, "Heat"), (2, "Cool")])
                .writable()
                .with_value(1),
        )
        .with_value(
            Value::new(id, CommandClass::THERMOSTAT_SETPOINT, 0, "setpoint")
                .with_key(1)
                .with_type(ValueType::Number)
                .writable()
                .with_value(20),
        )
        .with_value(
            Value::new(id, CommandClass::THERMOSTAT_SETPOINT, 0, "setpoint")
                .with_key(2)
                .with_type(ValueType::Number)
                .writable()
                .with_value(24),
        )
}

fn parts(topic: &str) -> Vec<String> {
    topic.split('/').map(str::to_string).collect()
}

#[test_log::test]
fn test_node_ready_publishes_status_and_discovery() {
    let h = harness(config(), vec![plug(2, "Plug")]);
    h.gateway.on_node_status(2).unwrap();

    let status = h.transport.last("zwave/Plug/status").unwrap();
    assert!(status.options.retain);
    assert_eq!(status.payload.json().unwrap()["value"], json!(true));
    assert_eq!(status.payload.json().unwrap()["status"], json!("alive"));

    let discovery = h.transport.last("homeassistant/switch/Plug/switch/config").unwrap();
    let payload = discovery.payload.json().unwrap();
    assert_eq!(payload["command_topic"], json!("zwave/Plug/switch_binary/endpoint_0/targetValue/set"));
    assert_eq!(payload["unique_id"], json!("zflow_0xcafe_node2_switch_switch"));
    assert_eq!(payload["availability_topic"], json!("zwave/Plug/status"));

    assert_eq!(
        h.gateway.owner_of(2, "37-0-targetValue"),
        Some((2, "switch_switch".to_string()))
    );
}

#[test]
fn test_value_change_publishes_and_subscribes_once_per_depth() {
    let h = harness(config(), vec![plug(2, "Plug"), plug(3, "Lamp")]);
    h.gateway.on_value_changed(2, "37-0-currentValue", true).unwrap();
    h.gateway.on_value_changed(3, "37-0-currentValue", true).unwrap();

    let published = h.transport.last("zwave/Plug/switch_binary/endpoint_0/currentValue").unwrap();
    assert_eq!(published.payload.json().unwrap()["value"], json!(false));
    assert!(published.options.retain);

    assert_eq!(h.gateway.tracked_count(), 2);
    assert_eq!(h.transport.subscriptions(), vec!["zwave/+/+/+/+/set"]);
}

#[test]
fn test_write_request_decodes_and_writes() {
    let h = harness(config(), vec![plug(2, "Plug")]);
    h.gateway.on_value_changed(2, "37-0-currentValue", true).unwrap();

    h.gateway
        .on_write_request(&parts("Plug/switch_binary/endpoint_0/targetValue"), &json!("on"))
        .unwrap();
    h.gateway
        .on_write_request(&parts("Plug/switch_binary/endpoint_0/unknown"), &json!(true))
        .unwrap();

    let writes = h.registry.writes();
    assert_eq!(writes.len(), 1);
    assert_eq!(writes[0].node_id, 2);
    assert_eq!(writes[0].value_id, "37-0-targetValue");
    assert_eq!(writes[0].value, json!(true));
}

#[test]
fn test_broadcast_writes_every_matching_value() {
    let h = harness(config(), vec![plug(2, "Plug"), plug(3, "Lamp")]);
    h.gateway.on_value_changed(2, "37-0-currentValue", true).unwrap();
    h.gateway.on_value_changed(3, "37-0-currentValue", true).unwrap();

    h.gateway
        .on_broadcast_request(&parts("switch_binary/endpoint_0/targetValue"), &json!({"value": false}))
        .unwrap();

    let mut written: Vec<u32> = h.registry.writes().iter().map(|w| w.node_id).collect();
    written.sort_unstable();
    assert_eq!(written, vec![2, 3]);
}

#[test]
fn test_rediscover_node_leaves_other_nodes_untouched() {
    let h = harness(config(), vec![plug(2, "Plug"), sensor(3)]);
    h.gateway.on_node_status(2).unwrap();
    h.gateway.on_node_status(3).unwrap();
    let sensor_before = h.gateway.descriptors(3);
    assert_eq!(sensor_before.len(), 2);

    h.transport.take();
    assert_eq!(h.gateway.rediscover_node(2).unwrap(), 1);
    h.registry
        .update_value(3, "49-0-Air temperature", json!(22.0))
        .unwrap();
    h.gateway.on_value_changed(3, "49-0-Air temperature", true).unwrap();

    assert_eq!(h.gateway.descriptors(3), sensor_before);
    assert!(h.gateway.owner_of(3, "48-0-Motion").is_some());

    let removals: Vec<_> = h
        .transport
        .published()
        .into_iter()
        .filter(|p| p.payload == Payload::Empty)
        .collect();
    assert_eq!(removals.len(), 1);
    assert_eq!(removals[0].topic, "homeassistant/switch/Plug/switch/config");
    assert!(h.transport.last("homeassistant/switch/Plug/switch/config").unwrap().payload != Payload::Empty);
}

#[test]
fn test_disable_discovery_keeps_ownership() {
    let h = harness(config(), vec![sensor(3)]);
    h.gateway.on_node_status(3).unwrap();
    assert_eq!(h.gateway.disable_discovery(3).unwrap(), 2);

    let removed = h
        .transport
        .last("homeassistant/binary_sensor/Kitchen-Sensor/motion/config")
        .unwrap();
    assert_eq!(removed.payload, Payload::Empty);
    assert!(h.gateway.owner_of(3, "48-0-Motion").is_some());
    assert!(h.gateway.descriptors(3).iter().all(|d| d.ignore_discovery));
    assert_eq!(h.registry.persisted().len(), 2);

    // Ignored descriptors are not republished
    assert_eq!(h.gateway.rediscover_all().unwrap(), 0);
}

#[test]
fn test_node_removal_purges_everything() {
    let mut config = config();
    config.values.push(ValueOverride {
        device: "134-100-3".to_string(),
        value: "37-0-currentValue".to_string(),
        poll_interval: Some(30),
        ..Default::default()
    });
    let h = harness(config, vec![plug(2, "Plug")]);
    h.gateway.on_node_status(2).unwrap();
    h.gateway.on_value_changed(2, "37-0-currentValue", true).unwrap();
    assert_eq!(h.gateway.tracked_count(), 1);
    assert_eq!(h.gateway.scheduled_polls(), 1);

    h.gateway.on_node_removed(2).unwrap();

    assert!(h.gateway.descriptors(2).is_empty());
    assert!(h.gateway.owner_of(2, "37-0-currentValue").is_none());
    assert_eq!(h.gateway.tracked_count(), 0);
    assert_eq!(h.gateway.scheduled_polls(), 0);
}

#[test]
fn test_poll_tick_polls_due_values() {
    let mut config = config();
    config.values.push(ValueOverride {
        device: "134-200-1".to_string(),
        value: "49-0-Air temperature".to_string(),
        poll_interval: Some(5),
        ..Default::default()
    });
    let h = harness(config, vec![sensor(3)]);
    h.gateway.on_value_changed(3, "49-0-Air temperature", true).unwrap();

    h.gateway.poll_tick(Instant::now());
    assert!(h.registry.polls().is_empty());

    h.gateway.poll_tick(Instant::now() + Duration::from_secs(6));
    assert_eq!(h.registry.polls(), vec![(3, "49-0-Air temperature".to_string())]);
}

#[test]
fn test_climate_follows_mode() {
    let h = harness(config(), vec![thermostat(10)]);
    h.gateway.on_node_status(10).unwrap();

    let climate = h
        .gateway
        .descriptors(10)
        .into_iter()
        .find(|d| d.category == Category::Climate)
        .unwrap();
    assert_eq!(
        climate.get_str("temperature_state_topic"),
        Some("zwave/Thermostat/thermostat_setpoint/endpoint_0/setpoint/1")
    );

    h.registry.update_value(10, "64-0-mode", json!(2)).unwrap();
    h.gateway.on_value_changed(10, "64-0-mode", true).unwrap();

    let topic = "homeassistant/climate/Thermostat/thermostat/config";
    let published = h.transport.last(topic).unwrap();
    assert_eq!(
        published.payload.json().unwrap()["temperature_command_topic"],
        json!("zwave/Thermostat/thermostat_setpoint/endpoint_0/setpoint/2/set")
    );

    // Consumer mode tokens are mapped back to device ordinals
    h.gateway
        .on_write_request(&parts("Thermostat/thermostat_mode/endpoint_0/mode"), &json!("heat"))
        .unwrap();
    assert_eq!(h.registry.writes().last().unwrap().value, json!(1));
}

#[test]
fn test_registered_template_replaces_climate_synthesis() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    file.write_all(
        br#"{
            "328-3-1": [
                {"type": "sensor", "object_id": "mode_raw", "values": ["64-0-mode"],
                 "discovery_payload": {"state_topic": "64-0-mode"}}
            ]
        }"#,
    )
    .unwrap();
    let templates = TemplateRegistry::with_file(file.path()).unwrap();

    let h = harness_with(config(), vec![thermostat(10)], templates);
    h.gateway.on_node_status(10).unwrap();

    let descriptors = h.gateway.descriptors(10);
    assert!(descriptors.iter().all(|d| d.category != Category::Climate));
    assert_eq!(
        h.gateway.owner_of(10, "64-0-mode"),
        Some((10, "sensor_mode_raw".to_string()))
    );
}

#[test]
fn test_api_calls() {
    let h = harness(config(), vec![plug(2, "Plug")]);
    h.gateway.on_node_status(2).unwrap();

    let topic = "_CLIENTS/ZWAVE_GATEWAY-test/api/rediscoverNode";
    let response = h.gateway.on_api_call(topic, "rediscoverNode", json!({"args": [2]}));
    assert!(response.success);
    assert_eq!(response.result, Some(json!(1)));

    let published = h.transport.last(&format!("zwave/{}", topic)).unwrap();
    assert!(!published.options.retain);
    assert_eq!(published.payload.json().unwrap()["origin"], json!({"args": [2]}));

    let missing = h.gateway.on_api_call(topic, "rediscoverNode", json!({}));
    assert!(!missing.success);

    let forwarded = h.gateway.on_api_call("_CLIENTS/ZWAVE_GATEWAY-test/api/getNodes", "getNodes", json!({}));
    assert!(forwarded.success);

    let reload = h.gateway.on_api_call(
        "_CLIENTS/ZWAVE_GATEWAY-test/api/reloadDeviceTemplates",
        "reloadDeviceTemplates",
        json!({}),
    );
    assert!(reload.success);
}

#[test]
fn test_notifications_and_driver_events() {
    let mut config = config();
    config.payload = PayloadMode::Raw;
    let h = harness(config, vec![plug(2, "Plug")]);

    h.gateway
        .on_notification(2, "Access Control", json!({"event": 22}))
        .unwrap();
    let notification = h.transport.last("zwave/Plug/notification/Access_Control").unwrap();
    assert_eq!(notification.payload.json(), Some(&json!({"event": 22})));
    assert!(!notification.options.retain);

    h.gateway
        .on_driver_event("driver", "all nodes ready", vec![json!(1)])
        .unwrap();
    let event = h.transport.last("zwave/_EVENTS/driver/all_nodes_ready").unwrap();
    assert_eq!(event.payload.json().unwrap()["data"], json!([1]));
}

#[test]
fn test_broker_online_resubscribes_and_republishes() {
    let h = harness(config(), vec![plug(2, "Plug")]);
    h.gateway.on_node_status(2).unwrap();
    h.gateway.on_value_changed(2, "37-0-currentValue", true).unwrap();
    h.transport.take();

    h.gateway.on_broker_status(true).unwrap();
    assert_eq!(h.transport.subscriptions().len(), 2);
    assert_eq!(
        h.transport.published_to("homeassistant/switch/Plug/switch/config").len(),
        1
    );
}

#[tokio::test]
async fn test_run_loop_handles_events() {
    let h = harness(config(), vec![plug(2, "Plug")]);
    let (sender, receiver) = mpsc::channel(16);
    let handle = tokio::spawn(Arc::clone(&h.gateway).run(receiver));

    sender
        .send(GatewayEvent::from(DriverEvent::NodeStatus { node_id: 2 }))
        .await
        .unwrap();
    sender
        .send(GatewayEvent::from(DriverEvent::ValueChanged {
            node_id: 2,
            value_id: "37-0-currentValue".to_string(),
            changed: true,
        }))
        .await
        .unwrap();
    drop(sender);
    handle.await.unwrap();

    assert!(h.transport.last("homeassistant/switch/Plug/switch/config").is_some());
    assert!(h
        .transport
        .last("zwave/Plug/switch_binary/endpoint_0/currentValue")
        .is_some());
}
