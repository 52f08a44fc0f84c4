//! Protocol module - API frame envelope, framing, and frame types.
//!
//! This module implements the radio's binary API:
//! - envelope encoding with checksum and optional escaping
//! - frame buffer for accumulating partial serial reads
//! - decoded response frames and outgoing frame requests

mod address;
mod frame;
mod frame_buffer;
mod request;
mod status;
mod wire_format;

pub use address::{Address16, Address64};
pub use frame::{
    AtCommandResponse, DeviceType, Frame, FrameType, NodeIdentification, RemoteCommandResponse,
    TransmitStatus, TxStatus,
};
pub use frame_buffer::FrameBuffer;
pub use request::{FrameRequest, ResolvedDestination, REMOTE_OPTION_APPLY_CHANGES};
pub use status::{CommandStatus, DeliveryStatus};
pub use wire_format::{
    checksum, encode_envelope, needs_escape, ApiMode, Module, ESCAPE, ESCAPE_XOR,
    MAX_FRAME_DATA_SIZE, START_DELIMITER, XOFF, XON,
};
