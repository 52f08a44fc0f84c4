//! Settings for the client's operations.
//!
//! Each operation takes a small settings struct built fluently:
//!
//! ```
//! use std::time::Duration;
//! use xbee_client::{Destination, LocalCommand, RemoteCommand};
//!
//! let ni = LocalCommand::new("NI").timeout(Duration::from_millis(500));
//! let ir = RemoteCommand::new("IR", Destination::node_id("PUMP")).parameter(vec![0x00, 0x64]);
//! # let _ = (ni, ir);
//! ```
//!
//! Everything checked here is checked before any frame is written.

use std::time::Duration;

use bytes::Bytes;

use crate::error::{Result, XBeeError};
use crate::protocol::{Address16, Address64, Module};

/// Shortest accepted per-operation timeout.
pub const MIN_TIMEOUT: Duration = Duration::from_millis(10);

/// Where an addressed operation goes. Exactly one form, always.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Destination {
    Address64(Address64),
    Address16(Address16),
    /// Node identifier (`NI`), resolved to a 64-bit address before sending.
    NodeId(String),
}

impl Destination {
    /// 64-bit address from 16 hex digits.
    pub fn address64(hex: &str) -> Result<Self> {
        hex.parse().map(Destination::Address64)
    }

    /// 16-bit address from 4 hex digits.
    pub fn address16(hex: &str) -> Result<Self> {
        hex.parse().map(Destination::Address16)
    }

    pub fn node_id(node_id: impl Into<String>) -> Self {
        Destination::NodeId(node_id.into())
    }

    pub(crate) fn check(&self, module: Module) -> Result<()> {
        match self {
            Destination::NodeId(_) if module.is_802_15_4() => Err(XBeeError::invalid(
                "Node identifier destinations are not supported by 802.15.4 modules. \
                 Use a 16-bit or 64-bit address instead.",
            )),
            Destination::NodeId(id) if id.is_empty() => {
                Err(XBeeError::invalid("Node identifier must not be empty"))
            }
            _ => Ok(()),
        }
    }
}

impl From<Address64> for Destination {
    fn from(address: Address64) -> Self {
        Destination::Address64(address)
    }
}

impl From<Address16> for Destination {
    fn from(address: Address16) -> Self {
        Destination::Address16(address)
    }
}

impl std::fmt::Display for Destination {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Destination::Address64(addr) => write!(f, "{}", addr),
            Destination::Address16(addr) => write!(f, "{}", addr),
            Destination::NodeId(id) => write!(f, "'{}'", id),
        }
    }
}

/// Parse an AT command name: exactly two ASCII letters.
pub fn parse_command(name: &str) -> Result<[u8; 2]> {
    match name.as_bytes() {
        &[a, b] if a.is_ascii_alphabetic() && b.is_ascii_alphabetic() => Ok([a, b]),
        _ => Err(XBeeError::invalid(format!(
            "'{}' is not an AT command. It must be two letters.",
            name
        ))),
    }
}

/// The operation's timeout, or `default` when none was given.
pub(crate) fn effective_timeout(timeout: Option<Duration>, default: Duration) -> Result<Duration> {
    match timeout {
        Some(t) if t < MIN_TIMEOUT => Err(XBeeError::invalid(format!(
            "Timeout of {} ms is below the minimum of {} ms",
            t.as_millis(),
            MIN_TIMEOUT.as_millis()
        ))),
        Some(t) => Ok(t),
        None => Ok(default),
    }
}

/// A command for the radio attached to the serial port.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalCommand {
    pub command: String,
    pub parameter: Bytes,
    pub timeout: Option<Duration>,
}

impl LocalCommand {
    pub fn new(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
            parameter: Bytes::new(),
            timeout: None,
        }
    }

    /// Parameter bytes; a `&str`/`String` parameter is sent as its text.
    pub fn parameter(mut self, parameter: impl Into<Bytes>) -> Self {
        self.parameter = parameter.into();
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }
}

impl From<&str> for LocalCommand {
    fn from(command: &str) -> Self {
        LocalCommand::new(command)
    }
}

/// A command for a radio elsewhere on the network.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteCommand {
    pub command: String,
    pub parameter: Bytes,
    pub destination: Destination,
    pub timeout: Option<Duration>,
}

impl RemoteCommand {
    pub fn new(command: impl Into<String>, destination: impl Into<Destination>) -> Self {
        Self {
            command: command.into(),
            parameter: Bytes::new(),
            destination: destination.into(),
            timeout: None,
        }
    }

    pub fn parameter(mut self, parameter: impl Into<Bytes>) -> Self {
        self.parameter = parameter.into();
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }
}

/// Application data for a remote radio.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteTransmit {
    pub destination: Destination,
    pub data: Bytes,
    pub timeout: Option<Duration>,
}

impl RemoteTransmit {
    pub fn new(destination: impl Into<Destination>, data: impl Into<Bytes>) -> Self {
        Self {
            destination: destination.into(),
            data: data.into(),
            timeout: None,
        }
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }
}

/// Application data for a specific endpoint, cluster and profile.
///
/// Not available on 802.15.4 modules.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExplicitTransmit {
    pub destination: Destination,
    pub source_endpoint: u8,
    pub destination_endpoint: u8,
    pub cluster_id: u16,
    pub profile_id: u16,
    pub broadcast_radius: u8,
    pub data: Bytes,
    pub timeout: Option<Duration>,
}

impl ExplicitTransmit {
    pub fn new(
        destination: impl Into<Destination>,
        source_endpoint: u8,
        destination_endpoint: u8,
        cluster_id: u16,
        profile_id: u16,
    ) -> Self {
        Self {
            destination: destination.into(),
            source_endpoint,
            destination_endpoint,
            cluster_id,
            profile_id,
            broadcast_radius: 0,
            data: Bytes::new(),
            timeout: None,
        }
    }

    pub fn data(mut self, data: impl Into<Bytes>) -> Self {
        self.data = data.into();
        self
    }

    /// Maximum hops for a broadcast; 0 means the network maximum.
    pub fn broadcast_radius(mut self, radius: u8) -> Self {
        self.broadcast_radius = radius;
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }
}
