//! Per-session metrics
//!
//! Atomic counters owned by a session instance, not a process-wide
//! collector: each independently constructed session carries its own numbers.
//! Queue overflow is reported here (and as a warning log) rather than as an
//! error to the publishing caller.

use std::sync::atomic::{AtomicU64, Ordering};

/// Counters tracking one session's activity.
#[derive(Debug, Default)]
pub struct SessionMetrics {
    connection_attempts: AtomicU64,
    connections_established: AtomicU64,
    unsolicited_drops: AtomicU64,
    messages_published: AtomicU64,
    messages_queued: AtomicU64,
    queue_overflow_drops: AtomicU64,
    messages_received: AtomicU64,
    messages_unrouted: AtomicU64,
}

impl SessionMetrics {
    pub fn record_connection_attempt(&self) {
        self.connection_attempts.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_connected(&self) {
        self.connections_established.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_unsolicited_drop(&self) {
        self.unsolicited_drops.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_published(&self) {
        self.messages_published.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_queued(&self) {
        self.messages_queued.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_overflow_drop(&self) {
        self.queue_overflow_drops.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_received(&self) {
        self.messages_received.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_unrouted(&self) {
        self.messages_unrouted.fetch_add(1, Ordering::Relaxed);
    }

    /// A point-in-time copy of all counters.
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            connection_attempts: self.connection_attempts.load(Ordering::Relaxed),
            connections_established: self.connections_established.load(Ordering::Relaxed),
            unsolicited_drops: self.unsolicited_drops.load(Ordering::Relaxed),
            messages_published: self.messages_published.load(Ordering::Relaxed),
            messages_queued: self.messages_queued.load(Ordering::Relaxed),
            queue_overflow_drops: self.queue_overflow_drops.load(Ordering::Relaxed),
            messages_received: self.messages_received.load(Ordering::Relaxed),
            messages_unrouted: self.messages_unrouted.load(Ordering::Relaxed),
        }
    }
}

/// Frozen view of [`SessionMetrics`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MetricsSnapshot {
    pub connection_attempts: u64,
    pub connections_established: u64,
    pub unsolicited_drops: u64,
    pub messages_published: u64,
    pub messages_queued: u64,
    pub queue_overflow_drops: u64,
    pub messages_received: u64,
    pub messages_unrouted: u64,
}
