//! Bounded outbound publish buffer
//!
//! Publishes issued while the session is away from the broker land here.
//! Overflow drops the oldest entry: a stale directional command re-sent to a
//! physical device is worse than a lost one, so the freshest commands win.

use crate::transport::QosLevel;
use bytes::Bytes;
use std::collections::VecDeque;

/// An outbound publish waiting for a connection.
#[derive(Debug, Clone, PartialEq)]
pub struct PendingPublish {
    pub topic: String,
    pub payload: Bytes,
    pub qos: QosLevel,
    pub retain: bool,
}

/// FIFO queue with a fixed capacity and oldest-drop overflow policy.
#[derive(Debug)]
pub struct PublishQueue {
    items: VecDeque<PendingPublish>,
    capacity: usize,
}

impl PublishQueue {
    /// Capacity is clamped to at least one entry.
    pub fn new(capacity: usize) -> Self {
        Self {
            items: VecDeque::new(),
            capacity: capacity.max(1),
        }
    }

    /// Append a message, returning the dropped oldest entry when full.
    pub fn push(&mut self, message: PendingPublish) -> Option<PendingPublish> {
        let dropped = if self.items.len() == self.capacity {
            self.items.pop_front()
        } else {
            None
        };
        self.items.push_back(message);
        dropped
    }

    /// Take every buffered message in FIFO order, leaving the queue empty.
    pub fn drain(&mut self) -> Vec<PendingPublish> {
        self.items.drain(..).collect()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn message(n: usize) -> PendingPublish {
        PendingPublish {
            topic: "devices/rover/cmd".to_string(),
            payload: Bytes::from(n.to_string()),
            qos: QosLevel::AtMostOnce,
            retain: false,
        }
    }

    #[test]
    fn test_fifo_order() {
        let mut queue = PublishQueue::new(10);
        for n in 0..5 {
            assert!(queue.push(message(n)).is_none());
        }
        let drained = queue.drain();
        assert!(queue.is_empty());
        let payloads: Vec<_> = drained.iter().map(|m| m.payload.clone()).collect();
        assert_eq!(payloads, vec!["0", "1", "2", "3", "4"]);
    }

    #[test]
    fn test_overflow_drops_oldest() {
        let mut queue = PublishQueue::new(3);
        for n in 0..3 {
            assert!(queue.push(message(n)).is_none());
        }
        let dropped = queue.push(message(3)).expect("oldest should be dropped");
        assert_eq!(dropped.payload, "0");

        let payloads: Vec<_> = queue.drain().into_iter().map(|m| m.payload).collect();
        assert_eq!(payloads, vec!["1", "2", "3"]);
    }

    #[test]
    fn test_zero_capacity_clamped_to_one() {
        let mut queue = PublishQueue::new(0);
        assert_eq!(queue.capacity(), 1);
        assert!(queue.push(message(0)).is_none());
        let dropped = queue.push(message(1)).unwrap();
        assert_eq!(dropped.payload, "0");
        assert_eq!(queue.len(), 1);
    }

    #[test]
    fn test_drain_empties_queue() {
        let mut queue = PublishQueue::new(4);
        queue.push(message(0));
        assert_eq!(queue.drain().len(), 1);
        assert!(queue.drain().is_empty());
    }

    proptest! {
        #[test]
        fn last_capacity_messages_survive(total in 1usize..40, capacity in 1usize..10) {
            // Pushing N messages through capacity C keeps exactly the last
            // min(N, C) in original order.
            let mut queue = PublishQueue::new(capacity);
            for n in 0..total {
                queue.push(message(n));
            }
            let kept: Vec<_> = queue
                .drain()
                .into_iter()
                .map(|m| String::from_utf8(m.payload.to_vec()).unwrap())
                .collect();
            let expected: Vec<_> = (total.saturating_sub(capacity)..total)
                .map(|n| n.to_string())
                .collect();
            prop_assert_eq!(kept, expected);
        }
    }
}
