//! Session controller
//!
//! The public face of the crate: composes the connection manager, the
//! subscription registry, the publish queue and the message router behind the
//! five imperative operations (`connect`, `disconnect`, `subscribe`,
//! `unsubscribe`, `publish`) plus callback registration for the external UI
//! collaborator.
//!
//! Every operation returns immediately. Completion and connection changes are
//! observed through the registered callbacks and the state watch channel; the
//! only synchronous failures are caller-input errors.

use crate::config::SessionSection;
use crate::error::{SessionError, SessionResult};
use crate::observability::metrics::SessionMetrics;
use crate::topic::{validate_topic_name, TopicFilter};
use crate::transport::mqtt::MqttTransport;
use crate::transport::{BrokerAddress, QosLevel, Transport};
use bytes::Bytes;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};

mod manager;
mod queue;
mod registry;
mod router;
mod state;

pub use queue::{PendingPublish, PublishQueue};
pub use registry::{Subscription, SubscriptionRegistry};
pub use router::{MessageHandlerFn, MessageRouter};
pub use state::{ConnectResult, ConnectionState, DisconnectReason, ReconnectPolicy};

use manager::{Command, ConnectionManager};

/// An explicitly constructed broker session.
///
/// Owns the manager task for its lifetime; dropping the controller shuts the
/// session down. Multiple independent sessions can coexist in one process.
pub struct SessionController {
    commands: mpsc::UnboundedSender<Command>,
    state_rx: watch::Receiver<ConnectionState>,
    metrics: Arc<SessionMetrics>,
    default_qos: QosLevel,
}

impl SessionController {
    /// Create a session backed by the MQTT transport, configured from the
    /// `[session]` config section. Must be called within a tokio runtime.
    pub fn new(client_id: &str, config: &SessionSection) -> SessionResult<Self> {
        let mut transport = MqttTransport::new(client_id);
        if let (Some(user), Some(pass)) = (config.username(), config.password()) {
            transport = transport.with_credentials(user, pass);
        }
        let mut controller = Self::with_transport(
            config.reconnect.policy(),
            config.publish_queue_capacity,
            transport,
        );
        // default_qos outside 0..=2 is rejected at config load.
        controller.default_qos =
            QosLevel::try_from(config.default_qos).unwrap_or(QosLevel::AtMostOnce);
        Ok(controller)
    }

    /// Create a session over any transport. Used directly by tests to drive
    /// the session with a scripted mock link.
    pub fn with_transport<T: Transport>(
        policy: ReconnectPolicy,
        queue_capacity: usize,
        transport: T,
    ) -> Self {
        let (command_tx, command_rx) = mpsc::unbounded_channel();
        let (state_tx, state_rx) = watch::channel(ConnectionState::Disconnected);
        let metrics = Arc::new(SessionMetrics::default());

        let manager = ConnectionManager::new(
            transport,
            command_rx,
            state_tx,
            policy,
            queue_capacity,
            metrics.clone(),
        );
        tokio::spawn(manager.run());

        Self {
            commands: command_tx,
            state_rx,
            metrics,
            default_qos: QosLevel::AtMostOnce,
        }
    }

    /// Begin connecting to a broker endpoint.
    ///
    /// Returns immediately; the outcome arrives via `on_connect`. A repeated
    /// call for the endpoint already connected or being connected is a no-op,
    /// and a call with a different endpoint supersedes the previous attempt.
    pub fn connect(&self, address: &str) -> SessionResult<()> {
        let address = BrokerAddress::parse(address)?;
        self.send(Command::Connect(address))
    }

    /// Close the connection and stay down until `connect` is called again.
    /// Cancels any pending reconnection. Callable from any state.
    pub fn disconnect(&self) -> SessionResult<()> {
        self.send(Command::Disconnect)
    }

    /// Add a topic filter to the desired subscription set. Issued on the wire
    /// immediately when connected, otherwise on the next connection.
    pub fn subscribe(&self, filter: &str, qos: QosLevel) -> SessionResult<()> {
        let filter = TopicFilter::parse(filter)?;
        self.send(Command::Subscribe { filter, qos })
    }

    /// Remove a topic filter from the desired set.
    pub fn unsubscribe(&self, filter: &str) -> SessionResult<()> {
        let filter = TopicFilter::parse(filter)?;
        self.send(Command::Unsubscribe { filter })
    }

    /// Publish a message. Sent immediately when connected; buffered in the
    /// bounded queue otherwise, where the oldest entry gives way when full.
    pub fn publish(
        &self,
        topic: &str,
        payload: impl Into<Bytes>,
        qos: QosLevel,
        retain: bool,
    ) -> SessionResult<()> {
        validate_topic_name(topic)?;
        self.send(Command::Publish(PendingPublish {
            topic: topic.to_string(),
            payload: payload.into(),
            qos,
            retain,
        }))
    }

    /// Register a callback fired with the outcome of connection attempts:
    /// `Connected` on every transition into the connected state, `Failed` when
    /// an explicitly requested connect does not come up.
    pub fn on_connect<F>(&self, hook: F) -> SessionResult<()>
    where
        F: Fn(&ConnectResult) + Send + 'static,
    {
        self.send(Command::AddConnectHook(Box::new(hook)))
    }

    /// Register a callback fired when the connection goes away, with the
    /// reason (explicit request or link failure).
    pub fn on_disconnect<F>(&self, hook: F) -> SessionResult<()>
    where
        F: Fn(&DisconnectReason) + Send + 'static,
    {
        self.send(Command::AddDisconnectHook(Box::new(hook)))
    }

    /// Register a message handler for a topic filter. Every handler whose
    /// filter matches an inbound message is invoked, in registration order.
    /// Handlers run on the session task and must not block.
    pub fn on_message<F>(&self, filter: &str, handler: F) -> SessionResult<()>
    where
        F: Fn(&str, &[u8], QosLevel) + Send + 'static,
    {
        let filter = TopicFilter::parse(filter)?;
        self.send(Command::AddRoute {
            filter,
            handler: Box::new(handler),
        })
    }

    /// Current connection state.
    pub fn state(&self) -> ConnectionState {
        *self.state_rx.borrow()
    }

    /// A watch receiver observing connection state changes.
    pub fn state_watch(&self) -> watch::Receiver<ConnectionState> {
        self.state_rx.clone()
    }

    /// Wait until the session is connected or the timeout passes.
    pub async fn wait_connected(&self, timeout: Duration) -> SessionResult<()> {
        let mut state_rx = self.state_rx.clone();
        let wait = async move {
            loop {
                if state_rx.borrow().is_connected() {
                    return Ok(());
                }
                if state_rx.changed().await.is_err() {
                    return Err(SessionError::SessionClosed);
                }
            }
        };
        tokio::time::timeout(timeout, wait)
            .await
            .map_err(|_| SessionError::ConnectTimeout)?
    }

    /// Counters for this session (attempts, publishes, queue drops, ...).
    pub fn metrics(&self) -> &SessionMetrics {
        &self.metrics
    }

    /// QoS applied by callers that do not pick one explicitly.
    pub fn default_qos(&self) -> QosLevel {
        self.default_qos
    }

    fn send(&self, command: Command) -> SessionResult<()> {
        self.commands
            .send(command)
            .map_err(|_| SessionError::SessionClosed)
    }
}
