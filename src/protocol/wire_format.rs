//! API frame envelope encoding.
//!
//! Every API frame on the serial line looks like:
//! ```text
//! ┌───────────┬──────────┬──────────────────┬──────────┐
//! │ Delimiter │ Length   │ Frame data       │ Checksum │
//! │ 0x7E      │ uint16 BE│ type, id, fields │ 1 byte   │
//! └───────────┴──────────┴──────────────────┴──────────┘
//! ```
//!
//! In API mode 2 every byte after the delimiter that collides with a
//! control character is escaped as `0x7D, byte ^ 0x20`.

use bytes::{BufMut, Bytes, BytesMut};
use serde::{Deserialize, Serialize};

use crate::error::{Result, XBeeError};

/// Start-of-frame delimiter.
pub const START_DELIMITER: u8 = 0x7E;

/// Escape marker (API mode 2 only).
pub const ESCAPE: u8 = 0x7D;

/// Software flow control bytes, escaped in API mode 2.
pub const XON: u8 = 0x11;
pub const XOFF: u8 = 0x13;

/// Value XOR-ed into an escaped byte.
pub const ESCAPE_XOR: u8 = 0x20;

/// Largest frame data length the 16-bit length field can carry.
pub const MAX_FRAME_DATA_SIZE: usize = u16::MAX as usize;

/// API operating mode of the radio (`AP` parameter).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub enum ApiMode {
    /// API mode 1: no escaping.
    #[default]
    Plain,
    /// API mode 2: control characters escaped.
    Escaped,
}

impl TryFrom<u8> for ApiMode {
    type Error = XBeeError;

    fn try_from(value: u8) -> Result<Self> {
        match value {
            1 => Ok(ApiMode::Plain),
            2 => Ok(ApiMode::Escaped),
            other => Err(XBeeError::invalid(format!(
                "'api_mode' must be 1 or 2, got {}",
                other
            ))),
        }
    }
}

impl From<ApiMode> for u8 {
    fn from(mode: ApiMode) -> u8 {
        match mode {
            ApiMode::Plain => 1,
            ApiMode::Escaped => 2,
        }
    }
}

/// Radio firmware family. Decides which transmit frames are used and how
/// node discovery payloads are laid out.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Module {
    #[serde(rename = "802.15.4")]
    Ieee802154,
    ZNet,
    ZigBee,
}

impl Module {
    /// Whether this module speaks plain 802.15.4 (no mesh, no node ids).
    #[inline]
    pub fn is_802_15_4(self) -> bool {
        matches!(self, Module::Ieee802154)
    }
}

/// Whether a byte must be escaped in API mode 2.
#[inline]
pub fn needs_escape(byte: u8) -> bool {
    matches!(byte, START_DELIMITER | ESCAPE | XON | XOFF)
}

/// Checksum over frame data: `0xFF` minus the low byte of the sum.
pub fn checksum(frame_data: &[u8]) -> u8 {
    let sum = frame_data
        .iter()
        .fold(0u8, |acc, &byte| acc.wrapping_add(byte));
    0xFF - sum
}

/// Wrap frame data in a complete API envelope ready for the wire.
///
/// # Errors
///
/// Returns error if the frame data does not fit the 16-bit length field.
pub fn encode_envelope(frame_data: &[u8], mode: ApiMode) -> Result<Bytes> {
    if frame_data.len() > MAX_FRAME_DATA_SIZE {
        return Err(XBeeError::Protocol(format!(
            "Frame data size {} exceeds maximum {}",
            frame_data.len(),
            MAX_FRAME_DATA_SIZE
        )));
    }

    let length = (frame_data.len() as u16).to_be_bytes();
    let check = checksum(frame_data);

    let mut buf = BytesMut::with_capacity(frame_data.len() + 8);
    buf.put_u8(START_DELIMITER);

    let body = length
        .iter()
        .chain(frame_data.iter())
        .chain(std::iter::once(&check));

    match mode {
        ApiMode::Plain => body.for_each(|&byte| buf.put_u8(byte)),
        ApiMode::Escaped => {
            for &byte in body {
                if needs_escape(byte) {
                    buf.put_u8(ESCAPE);
                    buf.put_u8(byte ^ ESCAPE_XOR);
                } else {
                    buf.put_u8(byte);
                }
            }
        }
    }

    Ok(buf.freeze())
}
