//! Decoded inbound frames with typed accessors.
//!
//! Represents the frame data of one API envelope. Response kinds the client
//! correlates on are decoded into structs; everything else is kept opaque.
//! Uses `bytes::Bytes` so command data shares the read buffer.
//!
//! # Example
//!
//! ```
//! use xbee_client::protocol::{Frame, FrameType, Module};
//! use bytes::Bytes;
//!
//! let data = Bytes::from_static(&[0x88, 0x05, b'S', b'L', 0x00, 0x40, 0x9F]);
//! let frame = Frame::decode(data, Module::ZigBee).unwrap();
//!
//! assert!(frame.is_kind(FrameType::AtCommandResponse));
//! assert_eq!(frame.id(), Some(5));
//! ```

use bytes::Bytes;

use super::address::{Address16, Address64};
use super::status::{CommandStatus, DeliveryStatus};
use super::wire_format::Module;
use crate::error::{Result, XBeeError};

/// API frame type byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum FrameType {
    TxRequest64 = 0x00,
    TxRequest16 = 0x01,
    AtCommand = 0x08,
    ZigbeeTransmitRequest = 0x10,
    ExplicitAddressingCommand = 0x11,
    RemoteAtCommandRequest = 0x17,
    AtCommandResponse = 0x88,
    TxStatus = 0x89,
    ZigbeeTransmitStatus = 0x8B,
    RemoteCommandResponse = 0x97,
}

impl FrameType {
    pub fn from_u8(byte: u8) -> Option<Self> {
        let kind = match byte {
            0x00 => FrameType::TxRequest64,
            0x01 => FrameType::TxRequest16,
            0x08 => FrameType::AtCommand,
            0x10 => FrameType::ZigbeeTransmitRequest,
            0x11 => FrameType::ExplicitAddressingCommand,
            0x17 => FrameType::RemoteAtCommandRequest,
            0x88 => FrameType::AtCommandResponse,
            0x89 => FrameType::TxStatus,
            0x8B => FrameType::ZigbeeTransmitStatus,
            0x97 => FrameType::RemoteCommandResponse,
            _ => return None,
        };
        Some(kind)
    }

    #[inline]
    pub fn as_u8(self) -> u8 {
        self as u8
    }
}

/// Local AT command response (0x88).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AtCommandResponse {
    pub id: u8,
    pub command: [u8; 2],
    pub status: CommandStatus,
    pub data: Bytes,
    /// Parsed node descriptor when this answers an `ND` command.
    pub node: Option<NodeIdentification>,
}

/// Remote AT command response (0x97).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteCommandResponse {
    pub id: u8,
    pub remote64: Address64,
    pub remote16: Address16,
    pub command: [u8; 2],
    pub status: CommandStatus,
    pub data: Bytes,
}

/// ZigBee transmit status (0x8B).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransmitStatus {
    pub id: u8,
    pub remote16: Address16,
    pub retry_count: u8,
    pub delivery_status: DeliveryStatus,
    pub discovery_status: u8,
}

/// 802.15.4 TX status (0x89).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TxStatus {
    pub id: u8,
    pub delivery_status: DeliveryStatus,
}

/// Device role reported in node discovery.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceType {
    Coordinator,
    Router,
    EndDevice,
    Unknown(u8),
}

impl From<u8> for DeviceType {
    fn from(byte: u8) -> Self {
        match byte {
            0 => DeviceType::Coordinator,
            1 => DeviceType::Router,
            2 => DeviceType::EndDevice,
            other => DeviceType::Unknown(other),
        }
    }
}

/// One node found by discovery.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeIdentification {
    pub remote16: Address16,
    pub remote64: Address64,
    pub node_identifier: String,
    /// Signal strength of the last hop (802.15.4 only).
    pub rssi: Option<u8>,
    pub parent16: Option<Address16>,
    pub device_type: Option<DeviceType>,
    pub status: Option<u8>,
    pub profile_id: Option<u16>,
    pub manufacturer_id: Option<u16>,
}

impl NodeIdentification {
    /// Parse an `ND` response payload.
    pub fn parse(data: &Bytes, module: Module) -> Result<Self> {
        let mut cursor = Cursor::new(data, "node identification");

        let remote16 = Address16(cursor.array()?);
        let remote64 = Address64(cursor.array()?);

        if module.is_802_15_4() {
            let rssi = cursor.u8()?;
            let node_identifier = cursor.c_string()?;
            return Ok(Self {
                remote16,
                remote64,
                node_identifier,
                rssi: Some(rssi),
                parent16: None,
                device_type: None,
                status: None,
                profile_id: None,
                manufacturer_id: None,
            });
        }

        let node_identifier = cursor.c_string()?;
        Ok(Self {
            remote16,
            remote64,
            node_identifier,
            rssi: None,
            parent16: cursor.array().ok().map(Address16),
            device_type: cursor.u8().ok().map(DeviceType::from),
            status: cursor.u8().ok(),
            profile_id: cursor.array().ok().map(u16::from_be_bytes),
            manufacturer_id: cursor.array().ok().map(u16::from_be_bytes),
        })
    }
}

/// A decoded inbound frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    AtCommandResponse(AtCommandResponse),
    RemoteCommandResponse(RemoteCommandResponse),
    TransmitStatus(TransmitStatus),
    TxStatus(TxStatus),
    /// Any frame type the client does not correlate on.
    Other { frame_type: u8, data: Bytes },
}

impl Frame {
    /// Decode the frame data of one envelope.
    ///
    /// # Errors
    ///
    /// Returns error if a known frame type is truncated.
    pub fn decode(data: Bytes, module: Module) -> Result<Self> {
        let Some(&type_byte) = data.first() else {
            return Err(XBeeError::Protocol("empty frame".to_string()));
        };

        let mut cursor = Cursor::new(&data, "frame");
        cursor.u8()?;

        let frame = match FrameType::from_u8(type_byte) {
            Some(FrameType::AtCommandResponse) => {
                let id = cursor.u8()?;
                let command = cursor.array()?;
                let status = CommandStatus::from(cursor.u8()?);
                let data = cursor.rest();
                let node = if &command == b"ND" && !data.is_empty() {
                    Some(NodeIdentification::parse(&data, module)?)
                } else {
                    None
                };
                Frame::AtCommandResponse(AtCommandResponse {
                    id,
                    command,
                    status,
                    data,
                    node,
                })
            }
            Some(FrameType::RemoteCommandResponse) => {
                Frame::RemoteCommandResponse(RemoteCommandResponse {
                    id: cursor.u8()?,
                    remote64: Address64(cursor.array()?),
                    remote16: Address16(cursor.array()?),
                    command: cursor.array()?,
                    status: CommandStatus::from(cursor.u8()?),
                    data: cursor.rest(),
                })
            }
            Some(FrameType::ZigbeeTransmitStatus) => Frame::TransmitStatus(TransmitStatus {
                id: cursor.u8()?,
                remote16: Address16(cursor.array()?),
                retry_count: cursor.u8()?,
                delivery_status: DeliveryStatus(cursor.u8()?),
                discovery_status: cursor.u8()?,
            }),
            Some(FrameType::TxStatus) => Frame::TxStatus(TxStatus {
                id: cursor.u8()?,
                delivery_status: DeliveryStatus(cursor.u8()?),
            }),
            _ => Frame::Other {
                frame_type: type_byte,
                data: data.slice(1..),
            },
        };

        Ok(frame)
    }

    /// Raw frame type byte.
    pub fn frame_type(&self) -> u8 {
        match self {
            Frame::AtCommandResponse(_) => FrameType::AtCommandResponse.as_u8(),
            Frame::RemoteCommandResponse(_) => FrameType::RemoteCommandResponse.as_u8(),
            Frame::TransmitStatus(_) => FrameType::ZigbeeTransmitStatus.as_u8(),
            Frame::TxStatus(_) => FrameType::TxStatus.as_u8(),
            Frame::Other { frame_type, .. } => *frame_type,
        }
    }

    /// Check the frame type.
    #[inline]
    pub fn is_kind(&self, kind: FrameType) -> bool {
        self.frame_type() == kind.as_u8()
    }

    /// Frame id echoed from the request, for response kinds.
    pub fn id(&self) -> Option<u8> {
        match self {
            Frame::AtCommandResponse(f) => Some(f.id),
            Frame::RemoteCommandResponse(f) => Some(f.id),
            Frame::TransmitStatus(f) => Some(f.id),
            Frame::TxStatus(f) => Some(f.id),
            Frame::Other { .. } => None,
        }
    }

    /// Node descriptor carried by an `ND` response.
    pub fn node_identification(&self) -> Option<&NodeIdentification> {
        match self {
            Frame::AtCommandResponse(f) => f.node.as_ref(),
            _ => None,
        }
    }
}

/// Bounds-checked reader over frame data.
struct Cursor<'a> {
    data: &'a Bytes,
    pos: usize,
    what: &'static str,
}

impl<'a> Cursor<'a> {
    fn new(data: &'a Bytes, what: &'static str) -> Self {
        Self { data, pos: 0, what }
    }

    fn truncated(&self) -> XBeeError {
        XBeeError::Protocol(format!(
            "truncated {} ({} bytes)",
            self.what,
            self.data.len()
        ))
    }

    fn u8(&mut self) -> Result<u8> {
        let byte = *self.data.get(self.pos).ok_or_else(|| self.truncated())?;
        self.pos += 1;
        Ok(byte)
    }

    fn array<const N: usize>(&mut self) -> Result<[u8; N]> {
        let end = self.pos + N;
        let slice = self.data.get(self.pos..end).ok_or_else(|| self.truncated())?;
        let mut out = [0u8; N];
        out.copy_from_slice(slice);
        self.pos = end;
        Ok(out)
    }

    /// Null-terminated string; a missing terminator ends at the data end.
    fn c_string(&mut self) -> Result<String> {
        let rest = &self.data[self.pos.min(self.data.len())..];
        let len = rest.iter().position(|&b| b == 0).unwrap_or(rest.len());
        let text = String::from_utf8_lossy(&rest[..len]).into_owned();
        self.pos += (len + 1).min(rest.len());
        Ok(text)
    }

    fn rest(&mut self) -> Bytes {
        let start = self.pos.min(self.data.len());
        self.pos = self.data.len();
        self.data.slice(start..)
    }
}
