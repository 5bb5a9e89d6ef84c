//! rumqttc-backed transport
//!
//! Each `open` builds a fresh rumqttc client/event-loop pair and spawns a
//! poller task that translates protocol events into [`LinkEvent`]s. The poller
//! stops on the first connection error instead of re-polling, so reconnection
//! stays under the connection manager's backoff policy rather than rumqttc's.

use super::{BrokerAddress, InboundMessage, LinkError, LinkEvent, QosLevel, Transport, TransportLink};
use bytes::Bytes;
use rumqttc::v5::mqttbytes::v5::{ConnectReturnCode, Packet};
use rumqttc::v5::{mqttbytes::QoS, AsyncClient, Event, EventLoop, MqttOptions};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::debug;
use uuid::Uuid;

const EVENT_CHANNEL_CAPACITY: usize = 64;
const REQUEST_CHANNEL_CAPACITY: usize = 32;

/// Dialer producing rumqttc-backed links.
pub struct MqttTransport {
    client_id_prefix: String,
    username: Option<String>,
    password: Option<String>,
    keep_alive: Duration,
}

impl MqttTransport {
    pub fn new(client_id_prefix: impl Into<String>) -> Self {
        Self {
            client_id_prefix: client_id_prefix.into(),
            username: None,
            password: None,
            keep_alive: Duration::from_secs(60),
        }
    }

    /// Set broker credentials applied to every connection attempt.
    pub fn with_credentials(mut self, username: String, password: String) -> Self {
        self.username = Some(username);
        self.password = Some(password);
        self
    }

    fn options(&self, address: &BrokerAddress) -> MqttOptions {
        let client_id = attempt_client_id(&self.client_id_prefix);
        let mut options = MqttOptions::new(client_id, address.host(), address.port());

        if address.tls() {
            options.set_transport(rumqttc::Transport::tls_with_default_config());
        }
        if let (Some(user), Some(pass)) = (&self.username, &self.password) {
            options.set_credentials(user, pass);
        }
        options.set_keep_alive(self.keep_alive);
        options
    }
}

impl Transport for MqttTransport {
    type Link = MqttLink;

    fn open(
        &mut self,
        address: &BrokerAddress,
    ) -> Result<(Self::Link, mpsc::Receiver<LinkEvent>), LinkError> {
        let options = self.options(address);
        let (client, event_loop) = AsyncClient::new(options, REQUEST_CHANNEL_CAPACITY);
        let (event_tx, event_rx) = mpsc::channel(EVENT_CHANNEL_CAPACITY);
        let poller = tokio::spawn(poll_loop(event_loop, event_tx));

        Ok((MqttLink { client, poller }, event_rx))
    }
}

/// One rumqttc connection attempt.
pub struct MqttLink {
    client: AsyncClient,
    poller: JoinHandle<()>,
}

#[async_trait::async_trait]
impl TransportLink for MqttLink {
    async fn subscribe(&mut self, filter: &str, qos: QosLevel) -> Result<(), LinkError> {
        self.client
            .subscribe(filter, wire_qos(qos))
            .await
            .map_err(|e| LinkError::Request(Box::new(e)))
    }

    async fn unsubscribe(&mut self, filter: &str) -> Result<(), LinkError> {
        self.client
            .unsubscribe(filter)
            .await
            .map_err(|e| LinkError::Request(Box::new(e)))
    }

    async fn publish(
        &mut self,
        topic: &str,
        payload: Bytes,
        qos: QosLevel,
        retain: bool,
    ) -> Result<(), LinkError> {
        self.client
            .publish(topic, wire_qos(qos), retain, payload)
            .await
            .map_err(|e| LinkError::Request(Box::new(e)))
    }

    async fn close(&mut self) {
        // Best effort: the broker may already be gone.
        let _ = self.client.disconnect().await;
        self.poller.abort();
    }
}

impl Drop for MqttLink {
    fn drop(&mut self) {
        self.poller.abort();
    }
}

async fn poll_loop(mut event_loop: EventLoop, events: mpsc::Sender<LinkEvent>) {
    loop {
        match event_loop.poll().await {
            Ok(event) => {
                if let Some(link_event) = translate_event(&event) {
                    if events.send(link_event).await.is_err() {
                        // Receiver dropped: the attempt was superseded.
                        break;
                    }
                }
            }
            Err(e) => {
                let _ = events
                    .send(LinkEvent::Down {
                        reason: e.to_string(),
                    })
                    .await;
                break;
            }
        }
    }
}

/// Map a rumqttc event onto the link event vocabulary. Protocol bookkeeping
/// (acks, pings, outgoing echoes) is logged and swallowed.
fn translate_event(event: &Event) -> Option<LinkEvent> {
    match event {
        Event::Incoming(incoming) => match incoming {
            Packet::ConnAck(ack) => {
                if ack.code == ConnectReturnCode::Success {
                    Some(LinkEvent::Up)
                } else {
                    Some(LinkEvent::Down {
                        reason: format!("broker refused connection: {:?}", ack.code),
                    })
                }
            }
            Packet::Publish(publish) => Some(LinkEvent::Message(InboundMessage {
                topic: String::from_utf8_lossy(&publish.topic).to_string(),
                payload: publish.payload.clone(),
                qos: from_wire_qos(publish.qos),
            })),
            Packet::Disconnect(_) => Some(LinkEvent::Down {
                reason: "broker closed the connection".to_string(),
            }),
            other => {
                debug!(target: "teleop_transport", packet = ?other, "protocol event");
                None
            }
        },
        Event::Outgoing(_) => None,
    }
}

/// Unique client id per connection attempt so the broker never sees two
/// sessions fighting over the same id during a reconnect overlap.
fn attempt_client_id(prefix: &str) -> String {
    format!("{prefix}-{}", Uuid::new_v4().as_simple())
}

fn wire_qos(qos: QosLevel) -> QoS {
    match qos {
        QosLevel::AtMostOnce => QoS::AtMostOnce,
        QosLevel::AtLeastOnce => QoS::AtLeastOnce,
        QosLevel::ExactlyOnce => QoS::ExactlyOnce,
    }
}

fn from_wire_qos(qos: QoS) -> QosLevel {
    match qos {
        QoS::AtMostOnce => QosLevel::AtMostOnce,
        QoS::AtLeastOnce => QosLevel::AtLeastOnce,
        QoS::ExactlyOnce => QosLevel::ExactlyOnce,
    }
}
