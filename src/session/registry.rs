//! Desired-subscription bookkeeping
//!
//! Tracks what the caller wants subscribed independently of connection state.
//! The manager re-asserts this set on the wire after every transition into
//! `Connected`, each filter exactly once.

use crate::topic::TopicFilter;
use crate::transport::QosLevel;

/// A desired subscription, unique by filter text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Subscription {
    pub filter: TopicFilter,
    pub qos: QosLevel,
}

/// The set of subscriptions the session wants, connection or no connection.
#[derive(Debug, Default)]
pub struct SubscriptionRegistry {
    desired: Vec<Subscription>,
}

impl SubscriptionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add or update a desired subscription. Returns false when an identical
    /// entry already existed.
    pub fn upsert(&mut self, filter: TopicFilter, qos: QosLevel) -> bool {
        if let Some(existing) = self
            .desired
            .iter_mut()
            .find(|s| s.filter.as_str() == filter.as_str())
        {
            if existing.qos == qos {
                return false;
            }
            existing.qos = qos;
            return true;
        }
        self.desired.push(Subscription { filter, qos });
        true
    }

    /// Remove a filter from the desired set. Returns whether it was present.
    pub fn remove(&mut self, filter: &str) -> bool {
        let before = self.desired.len();
        self.desired.retain(|s| s.filter.as_str() != filter);
        self.desired.len() != before
    }

    pub fn iter(&self) -> impl Iterator<Item = &Subscription> {
        self.desired.iter()
    }

    pub fn len(&self) -> usize {
        self.desired.len()
    }

    pub fn is_empty(&self) -> bool {
        self.desired.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn filter(s: &str) -> TopicFilter {
        TopicFilter::parse(s).unwrap()
    }

    #[test]
    fn test_upsert_deduplicates_by_filter() {
        let mut registry = SubscriptionRegistry::new();
        assert!(registry.upsert(filter("a/b"), QosLevel::AtMostOnce));
        assert!(!registry.upsert(filter("a/b"), QosLevel::AtMostOnce));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_upsert_updates_qos_in_place() {
        let mut registry = SubscriptionRegistry::new();
        registry.upsert(filter("a/b"), QosLevel::AtMostOnce);
        assert!(registry.upsert(filter("a/b"), QosLevel::AtLeastOnce));
        assert_eq!(registry.len(), 1);
        assert_eq!(
            registry.iter().next().unwrap().qos,
            QosLevel::AtLeastOnce
        );
    }

    #[test]
    fn test_remove() {
        let mut registry = SubscriptionRegistry::new();
        registry.upsert(filter("a/b"), QosLevel::AtMostOnce);
        registry.upsert(filter("c/#"), QosLevel::AtLeastOnce);

        assert!(registry.remove("a/b"));
        assert!(!registry.remove("a/b"));
        assert_eq!(registry.len(), 1);
        assert_eq!(registry.iter().next().unwrap().filter.as_str(), "c/#");
    }

    #[test]
    fn test_net_set_after_churn() {
        // subscribe/unsubscribe churn while away must leave exactly the net
        // desired set for the next re-assertion.
        let mut registry = SubscriptionRegistry::new();
        registry.upsert(filter("status/#"), QosLevel::AtMostOnce);
        registry.upsert(filter("telemetry/+"), QosLevel::AtMostOnce);
        registry.remove("status/#");
        registry.upsert(filter("status/#"), QosLevel::AtLeastOnce);
        registry.remove("telemetry/+");

        let desired: Vec<_> = registry.iter().map(|s| s.filter.as_str()).collect();
        assert_eq!(desired, vec!["status/#"]);
        assert_eq!(registry.iter().next().unwrap().qos, QosLevel::AtLeastOnce);
    }
}
