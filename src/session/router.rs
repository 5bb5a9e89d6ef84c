//! Inbound message dispatch
//!
//! Routes each inbound message to every handler whose topic filter matches.
//! Handlers for the same message run in registration order. A message no
//! handler wants is logged and dropped, never an error.

use crate::topic::TopicFilter;
use crate::transport::{InboundMessage, QosLevel};
use tracing::debug;

/// Handler invoked with `(topic, payload, qos)` for each matching message.
/// Runs on the manager task and must not block.
pub type MessageHandlerFn = Box<dyn Fn(&str, &[u8], QosLevel) + Send>;

struct Route {
    filter: TopicFilter,
    handler: MessageHandlerFn,
}

/// Registered message handlers keyed by topic filter.
#[derive(Default)]
pub struct MessageRouter {
    routes: Vec<Route>,
}

impl MessageRouter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a handler. Multiple handlers may share a filter; each keeps
    /// its registration position.
    pub fn register(&mut self, filter: TopicFilter, handler: MessageHandlerFn) {
        self.routes.push(Route { filter, handler });
    }

    /// Deliver a message to every matching handler, in registration order.
    /// Returns the number of handlers invoked.
    pub fn dispatch(&self, message: &InboundMessage) -> usize {
        let mut hits = 0;
        for route in &self.routes {
            if route.filter.matches(&message.topic) {
                (route.handler)(&message.topic, &message.payload, message.qos);
                hits += 1;
            }
        }
        if hits == 0 {
            debug!(topic = %message.topic, "no handler for inbound message, dropping");
        }
        hits
    }

    pub fn len(&self) -> usize {
        self.routes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};

    fn inbound(topic: &str) -> InboundMessage {
        InboundMessage {
            topic: topic.to_string(),
            payload: Bytes::from_static(b"F"),
            qos: QosLevel::AtMostOnce,
        }
    }

    fn recording_handler(log: Arc<Mutex<Vec<String>>>, tag: &'static str) -> MessageHandlerFn {
        Box::new(move |topic, _payload, _qos| {
            log.lock().unwrap().push(format!("{tag}:{topic}"));
        })
    }

    #[test]
    fn test_dispatch_to_matching_handler() {
        let mut router = MessageRouter::new();
        let log = Arc::new(Mutex::new(Vec::new()));
        router.register(
            TopicFilter::parse("devices/+/status").unwrap(),
            recording_handler(log.clone(), "a"),
        );

        assert_eq!(router.dispatch(&inbound("devices/rover/status")), 1);
        assert_eq!(router.dispatch(&inbound("devices/rover/cmd")), 0);
        assert_eq!(&*log.lock().unwrap(), &["a:devices/rover/status"]);
    }

    #[test]
    fn test_multiple_matches_run_in_registration_order() {
        let mut router = MessageRouter::new();
        let log = Arc::new(Mutex::new(Vec::new()));
        router.register(
            TopicFilter::parse("devices/#").unwrap(),
            recording_handler(log.clone(), "wide"),
        );
        router.register(
            TopicFilter::parse("devices/rover/status").unwrap(),
            recording_handler(log.clone(), "exact"),
        );

        assert_eq!(router.dispatch(&inbound("devices/rover/status")), 2);
        assert_eq!(
            &*log.lock().unwrap(),
            &["wide:devices/rover/status", "exact:devices/rover/status"]
        );
    }

    #[test]
    fn test_no_match_is_silent() {
        let router = MessageRouter::new();
        assert_eq!(router.dispatch(&inbound("anything")), 0);
    }

    #[test]
    fn test_handler_receives_payload_and_qos() {
        let mut router = MessageRouter::new();
        let seen = Arc::new(AtomicUsize::new(0));
        let seen_clone = seen.clone();
        router.register(
            TopicFilter::parse("#").unwrap(),
            Box::new(move |_topic, payload, qos| {
                assert_eq!(payload, b"F");
                assert_eq!(qos, QosLevel::AtMostOnce);
                seen_clone.fetch_add(1, Ordering::SeqCst);
            }),
        );

        router.dispatch(&inbound("devices/rover/status"));
        assert_eq!(seen.load(Ordering::SeqCst), 1);
    }
}
