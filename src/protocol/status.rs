//! Status codes carried by response frames and their display names.

use std::fmt;

/// Status byte of an AT command response (local or remote).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandStatus {
    Ok,
    Error,
    InvalidCommand,
    InvalidParameter,
    RemoteTransmissionFailed,
    Unknown(u8),
}

impl CommandStatus {
    pub fn code(self) -> u8 {
        match self {
            CommandStatus::Ok => 0x00,
            CommandStatus::Error => 0x01,
            CommandStatus::InvalidCommand => 0x02,
            CommandStatus::InvalidParameter => 0x03,
            CommandStatus::RemoteTransmissionFailed => 0x04,
            CommandStatus::Unknown(code) => code,
        }
    }

    #[inline]
    pub fn is_ok(self) -> bool {
        self == CommandStatus::Ok
    }

    fn name(self) -> &'static str {
        match self {
            CommandStatus::Ok => "OK",
            CommandStatus::Error => "ERROR",
            CommandStatus::InvalidCommand => "Invalid Command",
            CommandStatus::InvalidParameter => "Invalid Parameter",
            CommandStatus::RemoteTransmissionFailed => "Remote Command Transmission Failed",
            CommandStatus::Unknown(_) => "Unknown",
        }
    }
}

impl From<u8> for CommandStatus {
    fn from(code: u8) -> Self {
        match code {
            0x00 => CommandStatus::Ok,
            0x01 => CommandStatus::Error,
            0x02 => CommandStatus::InvalidCommand,
            0x03 => CommandStatus::InvalidParameter,
            0x04 => CommandStatus::RemoteTransmissionFailed,
            other => CommandStatus::Unknown(other),
        }
    }
}

impl fmt::Display for CommandStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (0x{:02X})", self.name(), self.code())
    }
}

/// Delivery status byte of a transmit status frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeliveryStatus(pub u8);

impl DeliveryStatus {
    pub const SUCCESS: DeliveryStatus = DeliveryStatus(0x00);

    #[inline]
    pub fn is_success(self) -> bool {
        self == Self::SUCCESS
    }

    pub fn name(self) -> &'static str {
        match self.0 {
            0x00 => "Success",
            0x01 => "MAC ACK Failure",
            0x02 => "CCA Failure",
            0x03 => "Transmission Purged",
            0x15 => "Invalid destination endpoint",
            0x21 => "Network ACK Failure",
            0x22 => "Not Joined to Network",
            0x23 => "Self-addressed",
            0x24 => "Address Not Found",
            0x25 => "Route Not Found",
            0x26 => "Broadcast source failed to hear a neighbor relay the message",
            0x2B => "Invalid binding table index",
            0x2C | 0x32 => "Resource error lack of free buffers, timers, etc.",
            0x2D => "Attempted broadcast with APS transmission",
            0x2E => "Attempted unicast with APS transmission, but EE=0",
            0x74 => "Data payload too large",
            0x75 => "Indirect message unrequested",
            _ => "Unknown",
        }
    }
}

impl fmt::Display for DeliveryStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (0x{:02X})", self.name(), self.0)
    }
}
