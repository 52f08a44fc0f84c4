//! Outgoing frame descriptions.
//!
//! A [`FrameRequest`] is everything about an outgoing frame except its id;
//! the id is assigned at send time and passed to [`FrameRequest::encode`].

use bytes::{BufMut, Bytes, BytesMut};

use super::address::{Address16, Address64};
use super::frame::FrameType;

/// Remote AT option: apply changes immediately.
pub const REMOTE_OPTION_APPLY_CHANGES: u8 = 0x02;

/// Where a frame is addressed once any node identifier has been resolved.
///
/// Exactly one address form is carried; the other travels as its
/// "unknown" placeholder.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResolvedDestination {
    Address64(Address64),
    Address16(Address16),
}

impl ResolvedDestination {
    /// Both wire fields, with the missing one set to its placeholder.
    pub fn wire_pair(self) -> (Address64, Address16) {
        match self {
            ResolvedDestination::Address64(addr) => (addr, Address16::UNKNOWN),
            ResolvedDestination::Address16(addr) => (Address64::UNKNOWN, addr),
        }
    }
}

impl std::fmt::Display for ResolvedDestination {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ResolvedDestination::Address64(addr) => write!(f, "{}", addr),
            ResolvedDestination::Address16(addr) => write!(f, "{}", addr),
        }
    }
}

/// Description of an outgoing API frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FrameRequest {
    AtCommand {
        command: [u8; 2],
        parameter: Bytes,
    },
    RemoteAtCommand {
        destination: ResolvedDestination,
        options: u8,
        command: [u8; 2],
        parameter: Bytes,
    },
    ZigbeeTransmit {
        destination: ResolvedDestination,
        broadcast_radius: u8,
        options: u8,
        data: Bytes,
    },
    ExplicitAddressing {
        destination: ResolvedDestination,
        source_endpoint: u8,
        destination_endpoint: u8,
        cluster_id: u16,
        profile_id: u16,
        broadcast_radius: u8,
        options: u8,
        data: Bytes,
    },
    TxRequest64 {
        destination: Address64,
        options: u8,
        data: Bytes,
    },
    TxRequest16 {
        destination: Address16,
        options: u8,
        data: Bytes,
    },
}

impl FrameRequest {
    pub fn frame_type(&self) -> FrameType {
        match self {
            FrameRequest::AtCommand { .. } => FrameType::AtCommand,
            FrameRequest::RemoteAtCommand { .. } => FrameType::RemoteAtCommandRequest,
            FrameRequest::ZigbeeTransmit { .. } => FrameType::ZigbeeTransmitRequest,
            FrameRequest::ExplicitAddressing { .. } => FrameType::ExplicitAddressingCommand,
            FrameRequest::TxRequest64 { .. } => FrameType::TxRequest64,
            FrameRequest::TxRequest16 { .. } => FrameType::TxRequest16,
        }
    }

    /// Build the frame data (type byte first) with the given frame id.
    pub fn encode(&self, id: u8) -> Bytes {
        let mut buf = BytesMut::with_capacity(32);
        buf.put_u8(self.frame_type().as_u8());
        buf.put_u8(id);

        match self {
            FrameRequest::AtCommand { command, parameter } => {
                buf.put_slice(command);
                buf.put_slice(parameter);
            }
            FrameRequest::RemoteAtCommand {
                destination,
                options,
                command,
                parameter,
            } => {
                let (addr64, addr16) = destination.wire_pair();
                buf.put_slice(addr64.as_bytes());
                buf.put_slice(addr16.as_bytes());
                buf.put_u8(*options);
                buf.put_slice(command);
                buf.put_slice(parameter);
            }
            FrameRequest::ZigbeeTransmit {
                destination,
                broadcast_radius,
                options,
                data,
            } => {
                let (addr64, addr16) = destination.wire_pair();
                buf.put_slice(addr64.as_bytes());
                buf.put_slice(addr16.as_bytes());
                buf.put_u8(*broadcast_radius);
                buf.put_u8(*options);
                buf.put_slice(data);
            }
            FrameRequest::ExplicitAddressing {
                destination,
                source_endpoint,
                destination_endpoint,
                cluster_id,
                profile_id,
                broadcast_radius,
                options,
                data,
            } => {
                let (addr64, addr16) = destination.wire_pair();
                buf.put_slice(addr64.as_bytes());
                buf.put_slice(addr16.as_bytes());
                buf.put_u8(*source_endpoint);
                buf.put_u8(*destination_endpoint);
                buf.put_u16(*cluster_id);
                buf.put_u16(*profile_id);
                buf.put_u8(*broadcast_radius);
                buf.put_u8(*options);
                buf.put_slice(data);
            }
            FrameRequest::TxRequest64 {
                destination,
                options,
                data,
            } => {
                buf.put_slice(destination.as_bytes());
                buf.put_u8(*options);
                buf.put_slice(data);
            }
            FrameRequest::TxRequest16 {
                destination,
                options,
                data,
            } => {
                buf.put_slice(destination.as_bytes());
                buf.put_u8(*options);
                buf.put_slice(data);
            }
        }

        buf.freeze()
    }
}
