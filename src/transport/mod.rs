//! Transport module - the byte channel underneath the API frames.
//!
//! Provides:
//! - [`Transport`] - any async byte stream plus its open/ready state
//! - [`OpenSignal`] - the one-time "port opened" notification
//! - [`SerialConfig`] - line settings for opening a real serial port

mod serial;

pub use serial::{
    DataBits, FlowControl, OpenSignal, Parity, SerialConfig, StopBits, Transport, DEFAULT_BAUD_RATE,
};
pub(crate) use serial::BoxedReader;
