//! Error types for xbee-client.

use std::time::Duration;

use thiserror::Error;

use crate::protocol::{CommandStatus, DeliveryStatus};

/// Main error type for all XBee operations.
#[derive(Debug, Error)]
pub enum XBeeError {
    /// I/O error on the serial stream.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Serial port could not be opened or configured.
    #[error("Serial port error: {0}")]
    Serial(#[from] tokio_serial::Error),

    /// Configuration file could not be parsed.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// No matching response frame arrived in time.
    #[error("operation timed out after {} ms", .0.as_millis())]
    Timeout(Duration),

    /// The radio answered an AT command with a non-OK status.
    #[error("{0}")]
    CommandFailed(CommandStatus),

    /// The radio reported a failed transmission.
    #[error("{0}")]
    DeliveryFailed(DeliveryStatus),

    /// A node identifier could not be resolved to an address.
    ///
    /// The message stays "Node not found" whatever went wrong; the
    /// underlying failure is kept as the error source.
    #[error("Node not found")]
    NodeNotFound {
        /// The node identifier that was looked up.
        node_id: String,
        /// What actually failed.
        #[source]
        source: Box<XBeeError>,
    },

    /// Caller-supplied arguments were rejected before any I/O.
    #[error("{0}")]
    InvalidArgument(String),

    /// Malformed or unexpected frame contents.
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// Every frame id is held by an in-flight request.
    #[error("No free frame id: all 255 ids are in flight")]
    FrameIdsExhausted,

    /// Serial link closed (or the client was shut down).
    #[error("Connection closed")]
    ConnectionClosed,
}

impl XBeeError {
    /// Returns true for the timeout category.
    pub fn is_timeout(&self) -> bool {
        matches!(self, XBeeError::Timeout(_))
    }

    pub(crate) fn invalid(message: impl Into<String>) -> Self {
        XBeeError::InvalidArgument(message.into())
    }
}

/// Result type alias using XBeeError.
pub type Result<T> = std::result::Result<T, XBeeError>;
