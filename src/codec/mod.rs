//! Codec module - turning frame requests into wire bytes and wire bytes
//! into decoded frames.
//!
//! - [`FrameCodec`] - encodes a [`FrameRequest`] with its id for the link's API mode
//! - [`FrameDecoder`] - accumulates serial reads and yields decoded [`Frame`]s
//! - [`FrameIdAllocator`] - hands out correlation ids
//!
//! # Example
//!
//! ```
//! use xbee_client::codec::FrameCodec;
//! use xbee_client::protocol::{ApiMode, FrameRequest, Module};
//! use bytes::Bytes;
//!
//! let codec = FrameCodec::new(ApiMode::Plain, Module::ZigBee);
//! let request = FrameRequest::AtCommand { command: *b"NJ", parameter: Bytes::new() };
//!
//! let wire = codec.encode(&request, 0x52).unwrap();
//! assert_eq!(wire.as_ref(), &[0x7E, 0x00, 0x04, 0x08, 0x52, 0x4E, 0x4A, 0x0D]);
//! ```

mod frame_id;

pub use frame_id::{FrameIdAllocator, FrameIdLease, FRAME_ID_COUNT};

use bytes::Bytes;

use crate::error::Result;
use crate::protocol::{encode_envelope, ApiMode, Frame, FrameBuffer, FrameRequest, Module};

/// Link settings shared by encoder and decoder.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameCodec {
    mode: ApiMode,
    module: Module,
}

impl FrameCodec {
    pub fn new(mode: ApiMode, module: Module) -> Self {
        Self { mode, module }
    }

    #[inline]
    pub fn api_mode(&self) -> ApiMode {
        self.mode
    }

    #[inline]
    pub fn module(&self) -> Module {
        self.module
    }

    /// Encode a request with the given frame id into a complete envelope.
    pub fn encode(&self, request: &FrameRequest, id: u8) -> Result<Bytes> {
        encode_envelope(&request.encode(id), self.mode)
    }

    /// Create a decoder for the inbound side of the link.
    pub fn decoder(&self) -> FrameDecoder {
        FrameDecoder {
            buffer: FrameBuffer::new(self.mode),
            module: self.module,
        }
    }
}

/// Inbound half of the codec: raw bytes in, decoded frames out.
pub struct FrameDecoder {
    buffer: FrameBuffer,
    module: Module,
}

impl FrameDecoder {
    /// Push a serial read and decode every frame it completes.
    ///
    /// Frames that pass the checksum but cannot be decoded are dropped
    /// with a warning.
    pub fn push(&mut self, data: &[u8]) -> Vec<Frame> {
        self.buffer
            .push(data)
            .into_iter()
            .filter_map(|frame_data| match Frame::decode(frame_data, self.module) {
                Ok(frame) => Some(frame),
                Err(e) => {
                    tracing::warn!("Dropping undecodable frame: {}", e);
                    None
                }
            })
            .collect()
    }
}
