//! teleop - MQTT session controller for tele-operating remote devices
//!
//! An operator drives a remote device (forward/left/right/stop) and watches
//! its reported status through an MQTT broker. This crate is the session
//! layer between the operator surface and the broker:
//!
//! - Connection lifecycle with backoff-governed reconnection
//! - Subscription bookkeeping that survives reconnects
//! - Bounded buffering of publishes issued while away from the broker
//! - Wildcard routing of inbound messages to registered handlers
//!
//! Sessions are explicitly constructed values, not process singletons:
//! create as many [`session::SessionController`]s as you have brokers to
//! talk to.
//!
//! # Quick Start
//!
//! ```rust
//! use teleop::drive::DriveCommand;
//! use teleop::transport::{BrokerAddress, QosLevel};
//!
//! // Parse the broker endpoint an operator typed in.
//! let address = BrokerAddress::parse("mqtt://broker.example:1883").unwrap();
//! assert_eq!(address.host(), "broker.example");
//!
//! // Directional commands travel as single-byte payloads.
//! let command = DriveCommand::parse("forward").unwrap();
//! assert_eq!(command.payload(), b"F");
//! assert_eq!(QosLevel::AtMostOnce.as_u8(), 0);
//! ```

pub mod config;
pub mod drive;
pub mod error;
pub mod observability;
pub mod session;
pub mod testing;
pub mod topic;
pub mod transport;

pub use config::{ConfigError, DeviceSection, ReconnectSection, SessionSection, TeleopConfig};
pub use drive::DriveCommand;
pub use error::{SessionError, SessionResult};
pub use session::{
    ConnectResult, ConnectionState, DisconnectReason, ReconnectPolicy, SessionController,
};
pub use topic::TopicFilter;
pub use transport::{BrokerAddress, InboundMessage, LinkEvent, QosLevel};
