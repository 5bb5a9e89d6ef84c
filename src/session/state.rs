//! Connection state and reconnect policy
//!
//! Pure types consumed by the connection manager: the four-state lifecycle
//! and the backoff computation. The manager owns the only mutable instance of
//! the state; everyone else observes it through a watch channel.

use rand::Rng;
use std::time::Duration;
use tracing::{info, warn};

/// Lifecycle of the broker connection.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ConnectionState {
    /// No connection and none wanted (initial state, or after an explicit
    /// `disconnect`). Terminal until `connect` is called again.
    #[default]
    Disconnected,
    /// A transport attempt is in flight, awaiting broker acknowledgement.
    Connecting,
    /// Connected and ready for wire operations.
    Connected,
    /// Connection lost unsolicited; a backoff timer is pending.
    Reconnecting,
}

impl ConnectionState {
    pub fn is_connected(self) -> bool {
        self == ConnectionState::Connected
    }
}

/// Outcome delivered to `on_connect` callbacks.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectResult {
    Connected,
    Failed(String),
}

/// Reason delivered to `on_disconnect` callbacks.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DisconnectReason {
    /// The caller asked for it; no reconnection will follow.
    Requested,
    /// The transport failed or the broker closed the connection.
    Link(String),
}

/// Backoff-governed reconnection policy.
///
/// Exponential doubling from `base_delay` up to `max_delay`, a multiplicative
/// jitter factor drawn from `[1 - jitter, 1 + jitter]`, and an unbounded
/// retry count: a device-control session never gives up on its own. Only
/// unsolicited disconnects are retried; an explicit `disconnect` always wins.
#[derive(Debug, Clone, PartialEq)]
pub struct ReconnectPolicy {
    pub enabled: bool,
    pub base_delay: Duration,
    pub max_delay: Duration,
    pub jitter: f64,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            enabled: true,
            base_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(30),
            jitter: 0.25,
        }
    }
}

impl ReconnectPolicy {
    /// Delay before reconnection attempt number `attempt` (0-based: the first
    /// retry waits roughly `base_delay`). Always within
    /// `[base_delay * (1 - jitter), max_delay]`.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let base = self.base_delay.as_millis() as u64;
        let max = self.max_delay.as_millis() as u64;
        // Cap the exponent so the shift cannot overflow.
        let exponent = attempt.min(16);
        let exponential = base.saturating_mul(1u64 << exponent).min(max);

        let jittered = if self.jitter > 0.0 {
            let factor = rand::thread_rng()
                .gen_range((1.0 - self.jitter)..=(1.0 + self.jitter));
            ((exponential as f64) * factor) as u64
        } else {
            exponential
        };

        Duration::from_millis(jittered.min(max).max(1))
    }

    /// Reject nonsensical policies before they reach the manager.
    pub fn validate(&self) -> Result<(), String> {
        if !(0.0..=1.0).contains(&self.jitter) {
            return Err(format!("jitter must be within [0, 1], got {}", self.jitter));
        }
        if self.base_delay.is_zero() {
            return Err("base_delay must be greater than zero".to_string());
        }
        if self.base_delay > self.max_delay {
            return Err("base_delay must not exceed max_delay".to_string());
        }
        Ok(())
    }
}

/// Log a state transition at a severity matching its meaning.
pub(crate) fn log_transition(from: ConnectionState, to: ConnectionState) {
    match (from, to) {
        (ConnectionState::Connecting, ConnectionState::Connected) => {
            info!("broker connection established");
        }
        (ConnectionState::Connected, ConnectionState::Reconnecting) => {
            warn!("broker connection lost, reconnecting");
        }
        (ConnectionState::Reconnecting, ConnectionState::Connecting) => {
            info!("retrying broker connection");
        }
        _ => {
            info!(?from, ?to, "connection state change");
        }
    }
}
