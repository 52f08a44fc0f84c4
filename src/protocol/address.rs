//! 64-bit and 16-bit network addresses.
//!
//! Both parse from a hex string (16 or 4 digits) or a byte slice (8 or 2
//! bytes) and print as lowercase hex.

use std::fmt;
use std::str::FromStr;

use crate::error::{Result, XBeeError};

/// 64-bit (extended, factory-assigned) address.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Address64(pub [u8; 8]);

/// 16-bit (network-assigned) address.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Address16(pub [u8; 2]);

impl Address64 {
    /// Coordinator address.
    pub const COORDINATOR: Address64 = Address64([0; 8]);
    /// Broadcast address.
    pub const BROADCAST: Address64 = Address64([0, 0, 0, 0, 0, 0, 0xFF, 0xFF]);
    /// Placeholder sent when only the 16-bit address is known.
    pub const UNKNOWN: Address64 = Self::BROADCAST;

    pub fn as_bytes(&self) -> &[u8; 8] {
        &self.0
    }
}

impl Address16 {
    /// Placeholder sent when only the 64-bit address is known.
    pub const UNKNOWN: Address16 = Address16([0xFF, 0xFE]);
    /// Broadcast address.
    pub const BROADCAST: Address16 = Address16([0xFF, 0xFF]);

    pub fn as_bytes(&self) -> &[u8; 2] {
        &self.0
    }
}

fn parse_hex<const N: usize>(s: &str, field: &str) -> Result<[u8; N]> {
    let shape = format!(
        "It must be a hex string of length {} or a byte array of length {}.",
        N * 2,
        N
    );

    if s.len() != N * 2 {
        return Err(XBeeError::invalid(format!(
            "'{}' is not the correct length. {}",
            field, shape
        )));
    }
    if !s.bytes().all(|b| b.is_ascii_hexdigit()) {
        return Err(XBeeError::invalid(format!(
            "'{}' is not a hex string. {}",
            field, shape
        )));
    }

    let mut out = [0u8; N];
    for (i, slot) in out.iter_mut().enumerate() {
        *slot = u8::from_str_radix(&s[i * 2..i * 2 + 2], 16)
            .map_err(|e| XBeeError::invalid(format!("'{}': {}", field, e)))?;
    }
    Ok(out)
}

fn from_slice<const N: usize>(bytes: &[u8], field: &str) -> Result<[u8; N]> {
    bytes.try_into().map_err(|_| {
        XBeeError::invalid(format!(
            "'{}' is not the correct length. It must be a hex string of length {} or a byte array of length {}.",
            field,
            N * 2,
            N
        ))
    })
}

impl FromStr for Address64 {
    type Err = XBeeError;

    fn from_str(s: &str) -> Result<Self> {
        parse_hex(s, "destination64").map(Address64)
    }
}

impl FromStr for Address16 {
    type Err = XBeeError;

    fn from_str(s: &str) -> Result<Self> {
        parse_hex(s, "destination16").map(Address16)
    }
}

impl TryFrom<&[u8]> for Address64 {
    type Error = XBeeError;

    fn try_from(bytes: &[u8]) -> Result<Self> {
        from_slice(bytes, "destination64").map(Address64)
    }
}

impl TryFrom<&[u8]> for Address16 {
    type Error = XBeeError;

    fn try_from(bytes: &[u8]) -> Result<Self> {
        from_slice(bytes, "destination16").map(Address16)
    }
}

impl From<u64> for Address64 {
    fn from(value: u64) -> Self {
        Address64(value.to_be_bytes())
    }
}

impl From<u16> for Address16 {
    fn from(value: u16) -> Self {
        Address16(value.to_be_bytes())
    }
}

impl fmt::Display for Address64 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.iter().try_for_each(|b| write!(f, "{:02x}", b))
    }
}

impl fmt::Display for Address16 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.iter().try_for_each(|b| write!(f, "{:02x}", b))
    }
}
