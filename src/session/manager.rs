//! Connection manager
//!
//! A single task owns the transport link, the state machine, the desired
//! subscriptions, the publish buffer and the router. API calls arrive as
//! commands on a channel and every transition happens here, so session state
//! needs no locks. The task exits when the controller owning the command
//! channel is dropped.
//!
//! Reconnection is driven by the backoff timer and happens only after an
//! unsolicited link loss; an explicit `Disconnect` command cancels the timer
//! and is the one thing that stops the session from coming back.

use super::queue::{PendingPublish, PublishQueue};
use super::registry::SubscriptionRegistry;
use super::router::{MessageHandlerFn, MessageRouter};
use super::state::{
    log_transition, ConnectResult, ConnectionState, DisconnectReason, ReconnectPolicy,
};
use crate::observability::metrics::SessionMetrics;
use crate::topic::TopicFilter;
use crate::transport::{BrokerAddress, InboundMessage, LinkEvent, QosLevel, Transport, TransportLink};
use std::sync::Arc;
use tokio::sync::{mpsc, watch};
use tokio::time::{sleep_until, Instant};
use tracing::{debug, info, warn};

/// Requests sent from the controller facade to the manager task.
pub(crate) enum Command {
    Connect(BrokerAddress),
    Disconnect,
    Subscribe { filter: TopicFilter, qos: QosLevel },
    Unsubscribe { filter: TopicFilter },
    Publish(PendingPublish),
    AddConnectHook(Box<dyn Fn(&ConnectResult) + Send>),
    AddDisconnectHook(Box<dyn Fn(&DisconnectReason) + Send>),
    AddRoute { filter: TopicFilter, handler: MessageHandlerFn },
}

enum Wake {
    Command(Command),
    Link(Option<LinkEvent>),
    RetryDue,
    Shutdown,
}

pub(crate) struct ConnectionManager<T: Transport> {
    transport: T,
    commands: mpsc::UnboundedReceiver<Command>,
    state_tx: watch::Sender<ConnectionState>,
    state: ConnectionState,
    policy: ReconnectPolicy,
    metrics: Arc<SessionMetrics>,

    registry: SubscriptionRegistry,
    queue: PublishQueue,
    router: MessageRouter,
    connect_hooks: Vec<Box<dyn Fn(&ConnectResult) + Send>>,
    disconnect_hooks: Vec<Box<dyn Fn(&DisconnectReason) + Send>>,

    /// Endpoint of the current or most recent `connect` request.
    address: Option<BrokerAddress>,
    link: Option<T::Link>,
    events: Option<mpsc::Receiver<LinkEvent>>,
    retry_at: Option<Instant>,
    attempt: u32,
    /// Whether the next attempt outcome should be announced to
    /// `on_connect` hooks as the result of an explicit `connect` call.
    announce_failure: bool,
}

impl<T: Transport> ConnectionManager<T> {
    pub(crate) fn new(
        transport: T,
        commands: mpsc::UnboundedReceiver<Command>,
        state_tx: watch::Sender<ConnectionState>,
        policy: ReconnectPolicy,
        queue_capacity: usize,
        metrics: Arc<SessionMetrics>,
    ) -> Self {
        Self {
            transport,
            commands,
            state_tx,
            state: ConnectionState::Disconnected,
            policy,
            metrics,
            registry: SubscriptionRegistry::new(),
            queue: PublishQueue::new(queue_capacity),
            router: MessageRouter::new(),
            connect_hooks: Vec::new(),
            disconnect_hooks: Vec::new(),
            address: None,
            link: None,
            events: None,
            retry_at: None,
            attempt: 0,
            announce_failure: false,
        }
    }

    pub(crate) async fn run(mut self) {
        debug!("session manager started");
        loop {
            // At most one of the link event stream (Connecting/Connected) and
            // the retry timer (Reconnecting) exists at a time.
            let wake = if let Some(events) = self.events.as_mut() {
                tokio::select! {
                    biased;
                    cmd = self.commands.recv() => match cmd {
                        Some(cmd) => Wake::Command(cmd),
                        None => Wake::Shutdown,
                    },
                    event = events.recv() => Wake::Link(event),
                }
            } else if let Some(retry_at) = self.retry_at {
                tokio::select! {
                    biased;
                    cmd = self.commands.recv() => match cmd {
                        Some(cmd) => Wake::Command(cmd),
                        None => Wake::Shutdown,
                    },
                    _ = sleep_until(retry_at) => Wake::RetryDue,
                }
            } else {
                match self.commands.recv().await {
                    Some(cmd) => Wake::Command(cmd),
                    None => Wake::Shutdown,
                }
            };

            match wake {
                Wake::Command(cmd) => self.handle_command(cmd).await,
                Wake::Link(Some(LinkEvent::Up)) => self.handle_link_up().await,
                Wake::Link(Some(LinkEvent::Down { reason })) => self.handle_link_down(reason).await,
                Wake::Link(Some(LinkEvent::Message(message))) => self.handle_message(message),
                Wake::Link(None) => self.handle_link_down("link closed".to_string()).await,
                Wake::RetryDue => {
                    self.retry_at = None;
                    self.dial().await;
                }
                Wake::Shutdown => {
                    self.drop_link(true).await;
                    break;
                }
            }
        }
        debug!("session manager stopped");
    }

    async fn handle_command(&mut self, cmd: Command) {
        match cmd {
            Command::Connect(address) => self.handle_connect(address).await,
            Command::Disconnect => self.handle_disconnect().await,
            Command::Subscribe { filter, qos } => self.handle_subscribe(filter, qos).await,
            Command::Unsubscribe { filter } => self.handle_unsubscribe(filter).await,
            Command::Publish(message) => self.handle_publish(message).await,
            Command::AddConnectHook(hook) => self.connect_hooks.push(hook),
            Command::AddDisconnectHook(hook) => self.disconnect_hooks.push(hook),
            Command::AddRoute { filter, handler } => self.router.register(filter, handler),
        }
    }

    async fn handle_connect(&mut self, address: BrokerAddress) {
        let same_address = self.address.as_ref() == Some(&address);
        if same_address
            && matches!(
                self.state,
                ConnectionState::Connected | ConnectionState::Connecting
            )
        {
            debug!(%address, "connect ignored, already connected or connecting");
            return;
        }

        // Supersede whatever is in flight: pending retry, a connection
        // attempt to another endpoint, or an established connection.
        self.cancel_retry();
        let was_connected = self.state.is_connected();
        self.drop_link(true).await;
        if was_connected {
            self.fire_disconnect(&DisconnectReason::Requested);
        }

        self.address = Some(address);
        self.attempt = 0;
        self.announce_failure = true;
        self.dial().await;
    }

    async fn handle_disconnect(&mut self) {
        self.cancel_retry();
        let was = self.state;
        self.drop_link(true).await;
        self.attempt = 0;
        self.announce_failure = false;
        if was != ConnectionState::Disconnected {
            self.set_state(ConnectionState::Disconnected);
            self.fire_disconnect(&DisconnectReason::Requested);
        }
    }

    async fn handle_subscribe(&mut self, filter: TopicFilter, qos: QosLevel) {
        self.registry.upsert(filter.clone(), qos);
        if !self.state.is_connected() {
            debug!(filter = %filter, "subscribe deferred until connected");
            return;
        }
        if let Some(link) = self.link.as_mut() {
            if let Err(e) = link.subscribe(filter.as_str(), qos).await {
                warn!(filter = %filter, error = %e, "subscribe request failed");
            }
        }
    }

    async fn handle_unsubscribe(&mut self, filter: TopicFilter) {
        let was_desired = self.registry.remove(filter.as_str());
        if !was_desired || !self.state.is_connected() {
            return;
        }
        if let Some(link) = self.link.as_mut() {
            if let Err(e) = link.unsubscribe(filter.as_str()).await {
                warn!(filter = %filter, error = %e, "unsubscribe request failed");
            }
        }
    }

    async fn handle_publish(&mut self, message: PendingPublish) {
        if self.state.is_connected() {
            if let Some(link) = self.link.as_mut() {
                match link
                    .publish(
                        &message.topic,
                        message.payload.clone(),
                        message.qos,
                        message.retain,
                    )
                    .await
                {
                    Ok(()) => {
                        self.metrics.record_published();
                        return;
                    }
                    Err(e) => {
                        // The link is on its way down; keep the message for
                        // the post-reconnect flush.
                        warn!(topic = %message.topic, error = %e, "publish request failed, buffering");
                    }
                }
            }
        }

        self.metrics.record_queued();
        if let Some(dropped) = self.queue.push(message) {
            self.metrics.record_overflow_drop();
            warn!(
                topic = %dropped.topic,
                queued = self.queue.len(),
                "publish queue full, dropped oldest message"
            );
        }
    }

    async fn handle_link_up(&mut self) {
        self.set_state(ConnectionState::Connected);
        self.attempt = 0;
        self.metrics.record_connected();
        self.reassert_subscriptions().await;
        self.flush_queue().await;
        self.announce_failure = false;
        self.fire_connect(&ConnectResult::Connected);
    }

    async fn handle_link_down(&mut self, reason: String) {
        let was = self.state;
        self.drop_link(false).await;

        if was == ConnectionState::Connected {
            self.metrics.record_unsolicited_drop();
            self.fire_disconnect(&DisconnectReason::Link(reason.clone()));
        }
        if was == ConnectionState::Connecting && self.announce_failure {
            self.announce_failure = false;
            self.fire_connect(&ConnectResult::Failed(reason.clone()));
        }

        if self.policy.enabled {
            self.schedule_retry();
        } else {
            info!(%reason, "link lost and reconnection disabled");
            self.set_state(ConnectionState::Disconnected);
        }
    }

    fn handle_message(&self, message: InboundMessage) {
        self.metrics.record_received();
        if self.router.dispatch(&message) == 0 {
            self.metrics.record_unrouted();
        }
    }

    async fn dial(&mut self) {
        let Some(address) = self.address.clone() else {
            return;
        };
        self.metrics.record_connection_attempt();
        self.set_state(ConnectionState::Connecting);
        match self.transport.open(&address) {
            Ok((link, events)) => {
                debug!(%address, "transport attempt started");
                self.link = Some(link);
                self.events = Some(events);
            }
            Err(e) => {
                warn!(%address, error = %e, "failed to start transport attempt");
                if self.announce_failure {
                    self.announce_failure = false;
                    self.fire_connect(&ConnectResult::Failed(e.to_string()));
                }
                if self.policy.enabled {
                    self.schedule_retry();
                } else {
                    self.set_state(ConnectionState::Disconnected);
                }
            }
        }
    }

    /// Re-issue every desired subscription, each filter exactly once.
    async fn reassert_subscriptions(&mut self) {
        let Some(link) = self.link.as_mut() else {
            return;
        };
        for sub in self.registry.iter() {
            if let Err(e) = link.subscribe(sub.filter.as_str(), sub.qos).await {
                warn!(filter = %sub.filter, error = %e, "re-subscribe failed");
            }
        }
    }

    /// Send everything buffered while away, in the order it was published.
    async fn flush_queue(&mut self) {
        if self.queue.is_empty() {
            return;
        }
        let buffered = self.queue.drain();
        info!(count = buffered.len(), "flushing queued publishes");
        let Some(link) = self.link.as_mut() else {
            return;
        };
        for message in buffered {
            match link
                .publish(&message.topic, message.payload, message.qos, message.retain)
                .await
            {
                Ok(()) => self.metrics.record_published(),
                Err(e) => warn!(topic = %message.topic, error = %e, "queued publish failed"),
            }
        }
    }

    fn schedule_retry(&mut self) {
        let delay = self.policy.delay_for(self.attempt);
        self.attempt = self.attempt.saturating_add(1);
        self.retry_at = Some(Instant::now() + delay);
        self.set_state(ConnectionState::Reconnecting);
        info!(
            attempt = self.attempt,
            delay_ms = delay.as_millis() as u64,
            "reconnect scheduled"
        );
    }

    fn cancel_retry(&mut self) {
        self.retry_at = None;
    }

    async fn drop_link(&mut self, graceful: bool) {
        self.events = None;
        if let Some(mut link) = self.link.take() {
            if graceful {
                link.close().await;
            }
        }
    }

    fn set_state(&mut self, next: ConnectionState) {
        if self.state == next {
            return;
        }
        log_transition(self.state, next);
        self.state = next;
        let _ = self.state_tx.send(next);
    }

    fn fire_connect(&self, result: &ConnectResult) {
        for hook in &self.connect_hooks {
            hook(result);
        }
    }

    fn fire_disconnect(&self, reason: &DisconnectReason) {
        for hook in &self.disconnect_hooks {
            hook(reason);
        }
    }
}
