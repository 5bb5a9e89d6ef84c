//! Transport layer for broker communication
//!
//! A [`Transport`] dials a broker address and yields a fresh [`TransportLink`]
//! per connection attempt, together with the event stream for that attempt.
//! Links are cheap to discard: superseding or abandoning an attempt is done by
//! dropping the pair, never by awaiting it.

use crate::error::SessionError;
use bytes::Bytes;
use thiserror::Error;
use tokio::sync::mpsc;
use url::Url;

pub mod mqtt;

/// Quality-of-service level negotiated per subscribe/publish.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum QosLevel {
    /// At most once (fire and forget).
    #[default]
    AtMostOnce,
    /// At least once (acknowledged delivery).
    AtLeastOnce,
    /// Exactly once (assured delivery).
    ExactlyOnce,
}

impl QosLevel {
    /// Numeric wire value (0, 1 or 2).
    pub fn as_u8(self) -> u8 {
        match self {
            QosLevel::AtMostOnce => 0,
            QosLevel::AtLeastOnce => 1,
            QosLevel::ExactlyOnce => 2,
        }
    }
}

impl TryFrom<u8> for QosLevel {
    type Error = u8;

    fn try_from(value: u8) -> Result<Self, u8> {
        match value {
            0 => Ok(QosLevel::AtMostOnce),
            1 => Ok(QosLevel::AtLeastOnce),
            2 => Ok(QosLevel::ExactlyOnce),
            other => Err(other),
        }
    }
}

/// A parsed broker endpoint.
///
/// Accepts `mqtt://host[:port]` and `mqtts://host[:port]` URIs; the default
/// port is 1883 (8883 with TLS). Equality is by host/port/TLS so a repeated
/// `connect` to the same endpoint can be detected as a no-op.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BrokerAddress {
    host: String,
    port: u16,
    tls: bool,
}

impl BrokerAddress {
    /// Parse a broker endpoint URI.
    pub fn parse(address: &str) -> Result<Self, SessionError> {
        let url = Url::parse(address)
            .map_err(|e| SessionError::invalid_address(address, e.to_string()))?;

        let tls = match url.scheme() {
            "mqtt" => false,
            "mqtts" => true,
            other => {
                return Err(SessionError::invalid_address(
                    address,
                    format!("unsupported scheme '{other}'"),
                ));
            }
        };

        let host = match url.host_str() {
            Some(host) if !host.is_empty() => host.to_string(),
            _ => return Err(SessionError::invalid_address(address, "missing host")),
        };
        let port = url.port().unwrap_or(if tls { 8883 } else { 1883 });

        Ok(Self { host, port, tls })
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn tls(&self) -> bool {
        self.tls
    }
}

impl std::fmt::Display for BrokerAddress {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let scheme = if self.tls { "mqtts" } else { "mqtt" };
        write!(f, "{scheme}://{}:{}", self.host, self.port)
    }
}

/// An inbound message delivered by a link. Consumed once by the router.
#[derive(Debug, Clone)]
pub struct InboundMessage {
    pub topic: String,
    pub payload: Bytes,
    pub qos: QosLevel,
}

/// Events emitted on a link's event stream.
#[derive(Debug, Clone)]
pub enum LinkEvent {
    /// The broker acknowledged the connection; the link is usable.
    Up,
    /// The link failed or the broker closed it. The link is dead afterwards;
    /// recovery is the connection manager's decision, never the link's.
    Down { reason: String },
    /// A message arrived on a subscribed topic.
    Message(InboundMessage),
}

/// Errors reported by link requests.
#[derive(Debug, Error)]
pub enum LinkError {
    #[error("link request failed")]
    Request(#[source] Box<dyn std::error::Error + Send + Sync>),
    #[error("link is closed")]
    Closed,
}

/// One broker connection attempt.
///
/// A link only reports request-submission failures; delivery outcomes and the
/// connection handshake arrive on the event stream returned by
/// [`Transport::open`].
#[async_trait::async_trait]
pub trait TransportLink: Send {
    async fn subscribe(&mut self, filter: &str, qos: QosLevel) -> Result<(), LinkError>;

    async fn unsubscribe(&mut self, filter: &str) -> Result<(), LinkError>;

    async fn publish(
        &mut self,
        topic: &str,
        payload: Bytes,
        qos: QosLevel,
        retain: bool,
    ) -> Result<(), LinkError>;

    /// Gracefully close the link. Dropping the link without calling this is
    /// also allowed and abandons the attempt immediately.
    async fn close(&mut self);
}

/// Dials broker addresses, producing one link per connection attempt.
///
/// `open` must not block awaiting the network handshake: it sets the attempt
/// up and returns, and the outcome arrives as `LinkEvent::Up` or
/// `LinkEvent::Down` on the returned stream.
pub trait Transport: Send + 'static {
    type Link: TransportLink + 'static;

    fn open(
        &mut self,
        address: &BrokerAddress,
    ) -> Result<(Self::Link, mpsc::Receiver<LinkEvent>), LinkError>;
}
