//! Mock transport for testing
//!
//! [`MockTransport`] plugs into `SessionController::with_transport` and
//! records every frame the session puts on the wire. The paired
//! [`MockHandle`] is the scripted broker: it observes connection attempts and
//! injects link events (up, down, inbound messages) for the current attempt.

use crate::transport::{
    BrokerAddress, InboundMessage, LinkError, LinkEvent, QosLevel, Transport, TransportLink,
};
use bytes::Bytes;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc;

/// A frame the session submitted to the link.
#[derive(Debug, Clone, PartialEq)]
pub enum Frame {
    Subscribe {
        filter: String,
        qos: QosLevel,
    },
    Unsubscribe {
        filter: String,
    },
    Publish {
        topic: String,
        payload: Vec<u8>,
        qos: QosLevel,
        retain: bool,
    },
    Close,
}

#[derive(Default)]
struct MockShared {
    frames: Mutex<Vec<Frame>>,
    current_events: Mutex<Option<mpsc::Sender<LinkEvent>>>,
    open_count: AtomicUsize,
    fail_next_open: AtomicBool,
}

/// Transport whose links record frames instead of touching the network.
pub struct MockTransport {
    shared: Arc<MockShared>,
    opened_tx: mpsc::UnboundedSender<BrokerAddress>,
}

impl MockTransport {
    /// Create a transport and the handle scripting it.
    pub fn new() -> (Self, MockHandle) {
        let shared = Arc::new(MockShared::default());
        let (opened_tx, opened_rx) = mpsc::unbounded_channel();
        (
            Self {
                shared: shared.clone(),
                opened_tx,
            },
            MockHandle { shared, opened_rx },
        )
    }
}

impl Transport for MockTransport {
    type Link = MockLink;

    fn open(
        &mut self,
        address: &BrokerAddress,
    ) -> Result<(Self::Link, mpsc::Receiver<LinkEvent>), LinkError> {
        if self.shared.fail_next_open.swap(false, Ordering::SeqCst) {
            return Err(LinkError::Request("mock open refused".into()));
        }

        self.shared.open_count.fetch_add(1, Ordering::SeqCst);
        let (event_tx, event_rx) = mpsc::channel(64);
        *self.shared.current_events.lock().unwrap() = Some(event_tx);
        let _ = self.opened_tx.send(address.clone());

        Ok((
            MockLink {
                shared: self.shared.clone(),
            },
            event_rx,
        ))
    }
}

/// Link half handed to the session; records frames into the shared log.
pub struct MockLink {
    shared: Arc<MockShared>,
}

#[async_trait::async_trait]
impl TransportLink for MockLink {
    async fn subscribe(&mut self, filter: &str, qos: QosLevel) -> Result<(), LinkError> {
        self.shared.frames.lock().unwrap().push(Frame::Subscribe {
            filter: filter.to_string(),
            qos,
        });
        Ok(())
    }

    async fn unsubscribe(&mut self, filter: &str) -> Result<(), LinkError> {
        self.shared.frames.lock().unwrap().push(Frame::Unsubscribe {
            filter: filter.to_string(),
        });
        Ok(())
    }

    async fn publish(
        &mut self,
        topic: &str,
        payload: Bytes,
        qos: QosLevel,
        retain: bool,
    ) -> Result<(), LinkError> {
        self.shared.frames.lock().unwrap().push(Frame::Publish {
            topic: topic.to_string(),
            payload: payload.to_vec(),
            qos,
            retain,
        });
        Ok(())
    }

    async fn close(&mut self) {
        self.shared.frames.lock().unwrap().push(Frame::Close);
    }
}

/// The scripted broker side of a [`MockTransport`].
pub struct MockHandle {
    shared: Arc<MockShared>,
    opened_rx: mpsc::UnboundedReceiver<BrokerAddress>,
}

impl MockHandle {
    /// Wait for the session's next connection attempt and return the dialed
    /// address. Panics after five seconds; only for use in tests.
    pub async fn await_open(&mut self) -> BrokerAddress {
        tokio::time::timeout(Duration::from_secs(5), self.opened_rx.recv())
            .await
            .expect("timed out waiting for a transport open")
            .expect("transport dropped")
    }

    /// Acknowledge the current attempt as connected.
    pub fn link_up(&self) {
        self.send(LinkEvent::Up);
    }

    /// Fail the current attempt or drop the established connection.
    pub fn link_down(&self, reason: &str) {
        self.send(LinkEvent::Down {
            reason: reason.to_string(),
        });
    }

    /// Deliver an inbound message on the current link.
    pub fn deliver(&self, topic: &str, payload: &[u8], qos: QosLevel) {
        self.send(LinkEvent::Message(InboundMessage {
            topic: topic.to_string(),
            payload: Bytes::copy_from_slice(payload),
            qos,
        }));
    }

    /// Make the next `open` call fail at setup time.
    pub fn fail_next_open(&self) {
        self.shared.fail_next_open.store(true, Ordering::SeqCst);
    }

    /// Number of connection attempts observed so far.
    pub fn open_count(&self) -> usize {
        self.shared.open_count.load(Ordering::SeqCst)
    }

    /// Everything the session has put on the wire, in order.
    pub fn frames(&self) -> Vec<Frame> {
        self.shared.frames.lock().unwrap().clone()
    }

    pub fn clear_frames(&self) {
        self.shared.frames.lock().unwrap().clear();
    }

    /// Poll until at least `count` frames were recorded, returning them.
    /// Panics after five seconds; only for use in tests.
    pub async fn frames_eventually(&self, count: usize) -> Vec<Frame> {
        let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
        loop {
            let frames = self.frames();
            if frames.len() >= count {
                return frames;
            }
            if tokio::time::Instant::now() >= deadline {
                panic!(
                    "timed out waiting for {count} frames, got {}: {frames:?}",
                    frames.len()
                );
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    }

    fn send(&self, event: LinkEvent) {
        let guard = self.shared.current_events.lock().unwrap();
        if let Some(sender) = guard.as_ref() {
            // A full or closed channel means the attempt was abandoned;
            // the scripted broker does not care.
            let _ = sender.try_send(event);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_mock_records_frames_and_events() {
        let (mut transport, mut handle) = MockTransport::new();
        let address = BrokerAddress::parse("mqtt://localhost:1883").unwrap();

        let (mut link, mut events) = transport.open(&address).unwrap();
        assert_eq!(handle.await_open().await, address);
        assert_eq!(handle.open_count(), 1);

        handle.link_up();
        assert!(matches!(events.recv().await, Some(LinkEvent::Up)));

        link.subscribe("a/#", QosLevel::AtMostOnce).await.unwrap();
        link.publish("a/b", Bytes::from_static(b"F"), QosLevel::AtMostOnce, false)
            .await
            .unwrap();
        link.close().await;

        let frames = handle.frames();
        assert_eq!(frames.len(), 3);
        assert!(matches!(frames[0], Frame::Subscribe { .. }));
        assert!(matches!(frames[2], Frame::Close));
    }

    #[tokio::test]
    async fn test_fail_next_open() {
        let (mut transport, handle) = MockTransport::new();
        let address = BrokerAddress::parse("mqtt://localhost:1883").unwrap();

        handle.fail_next_open();
        assert!(transport.open(&address).is_err());
        assert_eq!(handle.open_count(), 0);
        assert!(transport.open(&address).is_ok());
        assert_eq!(handle.open_count(), 1);
    }
}
