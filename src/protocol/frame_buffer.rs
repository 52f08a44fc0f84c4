//! Frame buffer for accumulating partial serial reads.
//!
//! Uses `bytes::BytesMut` for the frame data being assembled.
//! Implements a state machine over the (unescaped) byte stream:
//! - `WaitingForDelimiter`: skipping noise until `0x7E`
//! - `WaitingForLength`: need two length bytes
//! - `WaitingForData`: length known, collecting frame data
//! - `WaitingForChecksum`: one trailing checksum byte
//!
//! # Example
//!
//! ```
//! use xbee_client::protocol::{encode_envelope, ApiMode, FrameBuffer};
//!
//! let mut buffer = FrameBuffer::new(ApiMode::Plain);
//! let wire = encode_envelope(&[0x88, 0x01, b'N', b'I', 0x00], ApiMode::Plain).unwrap();
//!
//! // Data arrives in chunks from the serial port
//! assert!(buffer.push(&wire[..3]).is_empty());
//! let frames = buffer.push(&wire[3..]);
//! assert_eq!(frames.len(), 1);
//! assert_eq!(frames[0][0], 0x88);
//! ```

use bytes::{Bytes, BytesMut};

use super::wire_format::{checksum, ApiMode, ESCAPE, ESCAPE_XOR, START_DELIMITER};

/// State machine for envelope parsing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    /// Skipping bytes until a start delimiter.
    WaitingForDelimiter,
    /// Delimiter seen; `high` holds the first length byte once read.
    WaitingForLength { high: Option<u8> },
    /// Collecting `remaining` more frame data bytes.
    WaitingForData { remaining: usize },
    /// All frame data read, checksum byte next.
    WaitingForChecksum,
}

/// Buffer that turns raw serial bytes into verified frame data.
///
/// Each returned `Bytes` is the frame data of one envelope (frame type byte
/// first), with escaping removed and the checksum already verified. Frames
/// with a bad checksum are dropped with a warning.
pub struct FrameBuffer {
    /// Frame data of the envelope being assembled.
    data: BytesMut,
    /// Current parsing state.
    state: State,
    /// Escaping mode of the link.
    mode: ApiMode,
    /// An escape byte was the last byte of the previous push.
    escape_pending: bool,
    /// Frames dropped because the checksum did not match.
    checksum_errors: u64,
}

impl FrameBuffer {
    /// Create a new frame buffer for the given API mode.
    pub fn new(mode: ApiMode) -> Self {
        Self {
            data: BytesMut::with_capacity(256),
            state: State::WaitingForDelimiter,
            mode,
            escape_pending: false,
            checksum_errors: 0,
        }
    }

    /// Push data into the buffer and extract all complete frames.
    ///
    /// Partial envelopes (including an escape sequence split across two
    /// reads) are kept for the next push.
    pub fn push(&mut self, input: &[u8]) -> Vec<Bytes> {
        let mut frames = Vec::new();

        for &raw in input {
            let byte = match self.mode {
                ApiMode::Plain => raw,
                ApiMode::Escaped => {
                    if raw == START_DELIMITER {
                        // An unescaped delimiter always starts a new frame.
                        if self.state != State::WaitingForDelimiter {
                            tracing::warn!(
                                "Discarding truncated frame ({} bytes)",
                                self.data.len()
                            );
                        }
                        self.escape_pending = false;
                        self.start_frame();
                        continue;
                    }
                    if self.escape_pending {
                        self.escape_pending = false;
                        raw ^ ESCAPE_XOR
                    } else if raw == ESCAPE {
                        self.escape_pending = true;
                        continue;
                    } else {
                        raw
                    }
                }
            };

            if let Some(frame) = self.advance(byte) {
                frames.push(frame);
            }
        }

        frames
    }

    /// Feed one unescaped byte through the state machine.
    fn advance(&mut self, byte: u8) -> Option<Bytes> {
        match self.state {
            State::WaitingForDelimiter => {
                if byte == START_DELIMITER {
                    self.start_frame();
                } else {
                    tracing::trace!("Skipping byte 0x{:02x} outside a frame", byte);
                }
                None
            }

            State::WaitingForLength { high: None } => {
                self.state = State::WaitingForLength { high: Some(byte) };
                None
            }

            State::WaitingForLength { high: Some(high) } => {
                let length = u16::from_be_bytes([high, byte]) as usize;
                self.state = if length == 0 {
                    State::WaitingForChecksum
                } else {
                    self.data.reserve(length);
                    State::WaitingForData { remaining: length }
                };
                None
            }

            State::WaitingForData { remaining } => {
                self.data.extend_from_slice(&[byte]);
                self.state = if remaining == 1 {
                    State::WaitingForChecksum
                } else {
                    State::WaitingForData {
                        remaining: remaining - 1,
                    }
                };
                None
            }

            State::WaitingForChecksum => {
                self.state = State::WaitingForDelimiter;
                let data = self.data.split().freeze();

                if checksum(&data) != byte {
                    self.checksum_errors += 1;
                    tracing::warn!(
                        "Dropping frame with bad checksum (got 0x{:02x}, expected 0x{:02x})",
                        byte,
                        checksum(&data)
                    );
                    return None;
                }

                if data.is_empty() {
                    tracing::warn!("Dropping empty frame");
                    return None;
                }

                Some(data)
            }
        }
    }

    fn start_frame(&mut self) {
        self.data.clear();
        self.state = State::WaitingForLength { high: None };
    }

    /// Number of frames dropped for checksum mismatches so far.
    pub fn checksum_errors(&self) -> u64 {
        self.checksum_errors
    }

    /// Whether no partial frame is buffered.
    pub fn is_idle(&self) -> bool {
        self.state == State::WaitingForDelimiter && !self.escape_pending
    }

    /// Drop any partial frame and reset state.
    pub fn clear(&mut self) {
        self.data.clear();
        self.state = State::WaitingForDelimiter;
        self.escape_pending = false;
    }
}
