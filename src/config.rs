//! TOML configuration for the session controller and the operator CLI
//!
//! Broker credentials are never stored in the file; the config names
//! environment variables and they are resolved at connect time.

use crate::session::ReconnectPolicy;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

/// Top-level configuration file.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TeleopConfig {
    pub session: SessionSection,
    #[serde(default)]
    pub device: DeviceSection,
}

/// `[session]` - everything the session controller consumes.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SessionSection {
    /// Broker endpoint URI (`mqtt://host:port` or `mqtts://host:port`)
    pub broker_url: String,
    /// QoS applied when the caller does not pick one (0, 1 or 2)
    #[serde(default)]
    pub default_qos: u8,
    /// Publishes buffered while away from the broker before the oldest drops
    #[serde(default = "default_queue_capacity")]
    pub publish_queue_capacity: usize,
    /// Environment variable containing the broker username
    pub username_env: Option<String>,
    /// Environment variable containing the broker password
    pub password_env: Option<String>,
    #[serde(default)]
    pub reconnect: ReconnectSection,
}

fn default_queue_capacity() -> usize {
    100
}

/// `[session.reconnect]` - backoff policy for unsolicited disconnects.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ReconnectSection {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,
    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,
    #[serde(default = "default_jitter")]
    pub jitter: f64,
}

fn default_true() -> bool {
    true
}

fn default_base_delay_ms() -> u64 {
    500
}

fn default_max_delay_ms() -> u64 {
    30_000
}

fn default_jitter() -> f64 {
    0.25
}

impl Default for ReconnectSection {
    fn default() -> Self {
        Self {
            enabled: true,
            base_delay_ms: default_base_delay_ms(),
            max_delay_ms: default_max_delay_ms(),
            jitter: default_jitter(),
        }
    }
}

impl ReconnectSection {
    /// Convert into the policy consumed by the connection manager.
    pub fn policy(&self) -> ReconnectPolicy {
        ReconnectPolicy {
            enabled: self.enabled,
            base_delay: Duration::from_millis(self.base_delay_ms),
            max_delay: Duration::from_millis(self.max_delay_ms),
            jitter: self.jitter,
        }
    }
}

/// `[device]` - topics the operator CLI uses to drive one device.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DeviceSection {
    /// Device name, also used as the client id prefix
    #[serde(default = "default_device_name")]
    pub name: String,
    /// Topic directional commands are published to
    #[serde(default = "default_command_topic")]
    pub command_topic: String,
    /// Filter the CLI subscribes to for device status reports
    #[serde(default = "default_status_filter")]
    pub status_filter: String,
}

fn default_device_name() -> String {
    "rover".to_string()
}

fn default_command_topic() -> String {
    "devices/rover/cmd".to_string()
}

fn default_status_filter() -> String {
    "devices/rover/status/#".to_string()
}

impl Default for DeviceSection {
    fn default() -> Self {
        Self {
            name: default_device_name(),
            command_topic: default_command_topic(),
            status_filter: default_status_filter(),
        }
    }
}

/// Configuration loading errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    FileRead(#[from] std::io::Error),
    #[error("failed to parse TOML: {0}")]
    TomlParse(#[from] toml::de::Error),
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}

impl TeleopConfig {
    /// Load and validate configuration from a TOML file.
    pub fn load_from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        let config: TeleopConfig = toml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Reject out-of-range values before they reach the session.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.session.default_qos > 2 {
            return Err(ConfigError::InvalidConfig(format!(
                "default_qos must be 0, 1 or 2, got {}",
                self.session.default_qos
            )));
        }
        if self.session.publish_queue_capacity == 0 {
            return Err(ConfigError::InvalidConfig(
                "publish_queue_capacity must be at least 1".to_string(),
            ));
        }
        self.session
            .reconnect
            .policy()
            .validate()
            .map_err(ConfigError::InvalidConfig)?;
        Ok(())
    }
}

impl SessionSection {
    /// Broker username resolved from the configured environment variable.
    pub fn username(&self) -> Option<String> {
        resolve_env(self.username_env.as_ref())
    }

    /// Broker password resolved from the configured environment variable.
    pub fn password(&self) -> Option<String> {
        resolve_env(self.password_env.as_ref())
    }
}

fn resolve_env(name: Option<&String>) -> Option<String> {
    name.and_then(|n| std::env::var(n).ok())
}
