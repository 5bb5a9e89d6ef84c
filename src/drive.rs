//! Directional command vocabulary
//!
//! The device firmware understands single-byte command codes; the session
//! treats them as opaque payloads. Interpretation of inbound status payloads
//! (first byte echoes the active command) stays on this side of the API too.

use std::fmt;

/// A directional command for the remote device.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DriveCommand {
    Forward,
    Left,
    Right,
    Stop,
}

impl DriveCommand {
    /// Wire payload: the single-byte code the device firmware expects.
    pub const fn payload(self) -> &'static [u8] {
        match self {
            DriveCommand::Forward => b"F",
            DriveCommand::Left => b"E",
            DriveCommand::Right => b"D",
            DriveCommand::Stop => b"P",
        }
    }

    /// Recover a command from a payload's leading byte, as echoed in device
    /// status reports.
    pub fn from_payload(payload: &[u8]) -> Option<Self> {
        match payload.first() {
            Some(b'F') => Some(DriveCommand::Forward),
            Some(b'E') => Some(DriveCommand::Left),
            Some(b'D') => Some(DriveCommand::Right),
            Some(b'P') => Some(DriveCommand::Stop),
            _ => None,
        }
    }

    /// Parse operator input: a full word or its first letter.
    pub fn parse(input: &str) -> Option<Self> {
        match input.trim().to_ascii_lowercase().as_str() {
            "forward" | "f" => Some(DriveCommand::Forward),
            "left" | "l" => Some(DriveCommand::Left),
            "right" | "r" => Some(DriveCommand::Right),
            "stop" | "s" => Some(DriveCommand::Stop),
            _ => None,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            DriveCommand::Forward => "forward",
            DriveCommand::Left => "left",
            DriveCommand::Right => "right",
            DriveCommand::Stop => "stop",
        }
    }
}

impl fmt::Display for DriveCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_payload_codes() {
        assert_eq!(DriveCommand::Forward.payload(), b"F");
        assert_eq!(DriveCommand::Left.payload(), b"E");
        assert_eq!(DriveCommand::Right.payload(), b"D");
        assert_eq!(DriveCommand::Stop.payload(), b"P");
    }

    #[test]
    fn test_payload_round_trip() {
        for cmd in [
            DriveCommand::Forward,
            DriveCommand::Left,
            DriveCommand::Right,
            DriveCommand::Stop,
        ] {
            assert_eq!(DriveCommand::from_payload(cmd.payload()), Some(cmd));
        }
    }

    #[test]
    fn test_from_payload_uses_leading_byte() {
        assert_eq!(
            DriveCommand::from_payload(b"F-extra"),
            Some(DriveCommand::Forward)
        );
        assert_eq!(DriveCommand::from_payload(b""), None);
        assert_eq!(DriveCommand::from_payload(b"X"), None);
    }

    #[test]
    fn test_parse_operator_input() {
        assert_eq!(DriveCommand::parse("forward"), Some(DriveCommand::Forward));
        assert_eq!(DriveCommand::parse(" F "), Some(DriveCommand::Forward));
        assert_eq!(DriveCommand::parse("Left"), Some(DriveCommand::Left));
        assert_eq!(DriveCommand::parse("r"), Some(DriveCommand::Right));
        assert_eq!(DriveCommand::parse("STOP"), Some(DriveCommand::Stop));
        assert_eq!(DriveCommand::parse("backwards"), None);
        assert_eq!(DriveCommand::parse(""), None);
    }
}
