/*!
 * MQTT transport for zflow.
 *
 * [`MqttTransport`] implements [`Transport`] on top of rumqttc. A background
 * task drives the rumqttc event loop and turns broker traffic into
 * [`TransportEvent`]s for the gateway.
 */
use std::time::Duration;

use rumqttc::{AsyncClient, Event, EventLoop, LastWill, MqttOptions, Packet, QoS};
use serde_json::Value as JsonValue;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use zflow_core::config::MqttConfig;

use crate::device::{DeviceError, Result};
use crate::event::{GatewayEvent, TransportEvent};
use crate::protocol::{prefixed_topic, Payload, PublishOptions, Transport, SET_SUFFIX};

/// Segment that holds the per-gateway client topics
pub const CLIENTS_PREFIX: &str = "_CLIENTS";

/// Prefix of the gateway's client id segment
pub const GATEWAY_PREFIX: &str = "ZWAVE_GATEWAY-";

const API_SEGMENT: &str = "api";
const BROADCAST_SEGMENT: &str = "broadcast";
const STATUS_SEGMENT: &str = "status";

/// Convert a numeric QoS into the rumqttc enum
pub fn qos_from_u8(qos: u8) -> QoS {
    match qos {
        0 => QoS::AtMostOnce,
        2 => QoS::ExactlyOnce,
        _ => QoS::AtLeastOnce,
    }
}

/// Topics owned by one gateway instance
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientTopics {
    prefix: String,
    client: String,
    discovery_prefix: String,
}

impl ClientTopics {
    /// Build the topic set for a gateway name
    pub fn new(prefix: &str, name: &str, discovery_prefix: &str) -> Self {
        Self {
            prefix: prefix.to_string(),
            client: format!("{}/{}{}", CLIENTS_PREFIX, GATEWAY_PREFIX, name),
            discovery_prefix: discovery_prefix.to_string(),
        }
    }

    /// Client topic, relative to the prefix
    pub fn client(&self) -> &str {
        &self.client
    }

    /// Absolute status topic of the gateway
    pub fn status(&self) -> String {
        prefixed_topic(&self.prefix, &format!("{}/{}", self.client, STATUS_SEGMENT), false)
    }

    /// Absolute topics to subscribe after every connection
    pub fn subscriptions(&self) -> Vec<String> {
        vec![
            prefixed_topic(&self.prefix, &format!("{}/{}/#", self.client, API_SEGMENT), false),
            prefixed_topic(&self.prefix, &format!("{}/{}/#", self.client, BROADCAST_SEGMENT), false),
            format!("{}/{}", self.discovery_prefix, STATUS_SEGMENT),
        ]
    }

    /// Map an inbound message to a gateway event
    pub fn parse(&self, topic: &str, payload: &[u8]) -> Option<TransportEvent> {
        if topic == format!("{}/{}", self.discovery_prefix, STATUS_SEGMENT) {
            let text = String::from_utf8_lossy(payload);
            return Some(TransportEvent::DiscoveryConsumerStatus(
                text.trim().eq_ignore_ascii_case("online"),
            ));
        }

        let relative = if self.prefix.is_empty() {
            topic
        } else {
            topic.strip_prefix(&self.prefix)?.strip_prefix('/')?
        };
        let relative = relative.strip_suffix(SET_SUFFIX)?.strip_suffix('/')?;
        let payload = parse_payload(payload);

        if let Some(rest) = relative
            .strip_prefix(&self.client)
            .and_then(|r| r.strip_prefix('/'))
        {
            let mut parts = rest.split('/');
            return match parts.next() {
                Some(API_SEGMENT) => {
                    let name = parts.next()?.to_string();
                    Some(TransportEvent::ApiCall {
                        topic: format!("{}/{}/{}", self.client, API_SEGMENT, name),
                        name,
                        payload,
                    })
                }
                Some(BROADCAST_SEGMENT) => Some(TransportEvent::BroadcastRequest {
                    topic_parts: parts.map(str::to_string).collect(),
                    payload,
                }),
                _ => None,
            };
        }

        Some(TransportEvent::WriteRequest {
            topic_parts: relative.split('/').map(str::to_string).collect(),
            payload,
        })
    }
}

fn parse_payload(payload: &[u8]) -> JsonValue {
    serde_json::from_slice(payload)
        .unwrap_or_else(|_| JsonValue::String(String::from_utf8_lossy(payload).into_owned()))
}

/// Request queued for the publisher task
#[derive(Debug, Clone, PartialEq, Eq)]
enum Outbound {
    Publish {
        topic: String,
        qos: QoS,
        retain: bool,
        payload: Vec<u8>,
    },
    Subscribe {
        topic: String,
        qos: QoS,
    },
}

/// MQTT transport backed by rumqttc.
///
/// Publishes and subscriptions go through an unbounded queue drained by a
/// task that awaits the client, so bursts wait for the event loop instead
/// of failing.
#[derive(Debug, Clone)]
pub struct MqttTransport {
    outbound: mpsc::UnboundedSender<Outbound>,
    prefix: String,
    qos: QoS,
    retain: bool,
}

impl MqttTransport {
    /// Connect to the broker and spawn the event loop and publisher tasks.
    ///
    /// Inbound traffic is forwarded to `events`.
    pub fn connect(
        config: &MqttConfig,
        discovery_prefix: &str,
        events: mpsc::Sender<GatewayEvent>,
    ) -> (Self, JoinHandle<()>) {
        let topics = ClientTopics::new(&config.prefix, &config.name, discovery_prefix);
        let client_id = format!("{}{}", GATEWAY_PREFIX, uuid::Uuid::new_v4());

        let mut options = MqttOptions::new(client_id, config.host.clone(), config.port);
        options.set_keep_alive(Duration::from_secs(config.keep_alive_secs.max(5)));
        options.set_last_will(LastWill::new(
            topics.status(),
            "false",
            QoS::AtLeastOnce,
            true,
        ));

        let (client, eventloop) = AsyncClient::new(options, 100);
        info!("Connecting to MQTT broker at {}:{}", config.host, config.port);

        let (transport, queue) = Self::queued(config);
        let publisher = client.clone();
        let handle = tokio::spawn(async move {
            tokio::join!(
                run_event_loop(eventloop, client, topics, events),
                run_publisher(publisher, queue),
            );
        });
        (transport, handle)
    }

    fn queued(config: &MqttConfig) -> (Self, mpsc::UnboundedReceiver<Outbound>) {
        let (outbound, queue) = mpsc::unbounded_channel();
        let transport = Self {
            outbound,
            prefix: config.prefix.clone(),
            qos: qos_from_u8(config.qos),
            retain: config.retain,
        };
        (transport, queue)
    }

    fn enqueue(&self, request: Outbound) -> Result<()> {
        self.outbound
            .send(request)
            .map_err(|_| DeviceError::transport("MQTT publisher has stopped"))
    }
}

async fn run_publisher(client: AsyncClient, mut queue: mpsc::UnboundedReceiver<Outbound>) {
    while let Some(request) = queue.recv().await {
        match request {
            Outbound::Publish {
                topic,
                qos,
                retain,
                payload,
            } => {
                if let Err(e) = client.publish(topic.clone(), qos, retain, payload).await {
                    warn!("Failed to publish to {}: {}", topic, e);
                }
            }
            Outbound::Subscribe { topic, qos } => {
                debug!("Subscribing to {}", topic);
                if let Err(e) = client.subscribe(topic.clone(), qos).await {
                    warn!("Failed to subscribe to {}: {}", topic, e);
                }
            }
        }
    }
    info!("MQTT publisher stopped");
}

async fn run_event_loop(
    mut eventloop: EventLoop,
    client: AsyncClient,
    topics: ClientTopics,
    events: mpsc::Sender<GatewayEvent>,
) {
    let mut connected = false;
    loop {
        match eventloop.poll().await {
            Ok(Event::Incoming(Packet::ConnAck(_))) => {
                info!("Connected to MQTT broker");
                connected = true;
                for topic in topics.subscriptions() {
                    if let Err(e) = client.subscribe(topic.clone(), QoS::AtLeastOnce).await {
                        warn!("Failed to subscribe to {}: {}", topic, e);
                    }
                }
                if let Err(e) = client
                    .publish(topics.status(), QoS::AtLeastOnce, true, "true")
                    .await
                {
                    warn!("Failed to publish gateway status: {}", e);
                }
                if events.send(TransportEvent::BrokerStatus(true).into()).await.is_err() {
                    break;
                }
            }
            Ok(Event::Incoming(Packet::Publish(publish))) => {
                debug!("Message received on {}", publish.topic);
                if let Some(event) = topics.parse(&publish.topic, &publish.payload) {
                    if events.send(event.into()).await.is_err() {
                        break;
                    }
                }
            }
            Ok(_) => {}
            Err(e) => {
                error!("MQTT connection error: {}", e);
                if connected {
                    connected = false;
                    if events.send(TransportEvent::BrokerStatus(false).into()).await.is_err() {
                        break;
                    }
                }
                tokio::time::sleep(Duration::from_secs(1)).await;
            }
        }
    }
    info!("MQTT event loop stopped");
}

impl Transport for MqttTransport {
    fn publish(
        &self,
        topic: &str,
        payload: &Payload,
        options: PublishOptions,
        prefix_override: Option<&str>,
    ) -> Result<()> {
        self.enqueue(Outbound::Publish {
            topic: prefixed_topic(prefix_override.unwrap_or(&self.prefix), topic, false),
            qos: qos_from_u8(options.qos),
            retain: options.retain && self.retain,
            payload: payload.to_bytes(),
        })
    }

    fn subscribe(&self, pattern: &str) -> Result<()> {
        self.enqueue(Outbound::Subscribe {
            topic: prefixed_topic(&self.prefix, pattern, true),
            qos: self.qos,
        })
    }

    fn get_topic(&self, topic: &str, set: bool) -> String {
        prefixed_topic(&self.prefix, topic, set)
    }
}
