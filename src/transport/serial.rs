//! Serial port transport.
//!
//! A [`Transport`] is split into read and write halves when a client starts:
//! the reader task owns the read half, the writer task owns the write half.
//! The ready flag is a `watch` channel so the writer task can wait on it.
//!
//! # Example
//!
//! ```ignore
//! use xbee_client::transport::{SerialConfig, Transport};
//!
//! let transport = Transport::open_serial("/dev/ttyUSB0", &SerialConfig::default())?;
//! assert!(transport.is_ready());
//! ```

use serde::{Deserialize, Serialize};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::watch;
use tokio_serial::SerialPortBuilderExt;

use crate::error::{Result, XBeeError};

/// Factory default baud rate of the radios.
pub const DEFAULT_BAUD_RATE: u32 = 9600;

pub(crate) type BoxedReader = Box<dyn AsyncRead + Send + Unpin>;
pub(crate) type BoxedWriter = Box<dyn AsyncWrite + Send + Unpin>;

/// Bits per character.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub enum DataBits {
    Five,
    Six,
    Seven,
    #[default]
    Eight,
}

impl TryFrom<u8> for DataBits {
    type Error = XBeeError;

    fn try_from(bits: u8) -> Result<Self> {
        match bits {
            5 => Ok(DataBits::Five),
            6 => Ok(DataBits::Six),
            7 => Ok(DataBits::Seven),
            8 => Ok(DataBits::Eight),
            other => Err(XBeeError::invalid(format!("{} data bits", other))),
        }
    }
}

impl From<DataBits> for u8 {
    fn from(bits: DataBits) -> u8 {
        match bits {
            DataBits::Five => 5,
            DataBits::Six => 6,
            DataBits::Seven => 7,
            DataBits::Eight => 8,
        }
    }
}

impl From<DataBits> for tokio_serial::DataBits {
    fn from(bits: DataBits) -> Self {
        match bits {
            DataBits::Five => tokio_serial::DataBits::Five,
            DataBits::Six => tokio_serial::DataBits::Six,
            DataBits::Seven => tokio_serial::DataBits::Seven,
            DataBits::Eight => tokio_serial::DataBits::Eight,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Parity {
    #[default]
    None,
    Odd,
    Even,
}

impl From<Parity> for tokio_serial::Parity {
    fn from(parity: Parity) -> Self {
        match parity {
            Parity::None => tokio_serial::Parity::None,
            Parity::Odd => tokio_serial::Parity::Odd,
            Parity::Even => tokio_serial::Parity::Even,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub enum StopBits {
    #[default]
    One,
    Two,
}

impl TryFrom<u8> for StopBits {
    type Error = XBeeError;

    fn try_from(bits: u8) -> Result<Self> {
        match bits {
            1 => Ok(StopBits::One),
            2 => Ok(StopBits::Two),
            other => Err(XBeeError::invalid(format!("{} stop bits", other))),
        }
    }
}

impl From<StopBits> for u8 {
    fn from(bits: StopBits) -> u8 {
        match bits {
            StopBits::One => 1,
            StopBits::Two => 2,
        }
    }
}

impl From<StopBits> for tokio_serial::StopBits {
    fn from(bits: StopBits) -> Self {
        match bits {
            StopBits::One => tokio_serial::StopBits::One,
            StopBits::Two => tokio_serial::StopBits::Two,
        }
    }
}

/// Handshaking on the serial line. Radios wired with RTS/CTS want
/// `Hardware`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FlowControl {
    #[default]
    None,
    Software,
    Hardware,
}

impl From<FlowControl> for tokio_serial::FlowControl {
    fn from(flow: FlowControl) -> Self {
        match flow {
            FlowControl::None => tokio_serial::FlowControl::None,
            FlowControl::Software => tokio_serial::FlowControl::Software,
            FlowControl::Hardware => tokio_serial::FlowControl::Hardware,
        }
    }
}

/// Settings for opening a serial port. Defaults to 9600 8N1 without flow
/// control, the radios' factory setting.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SerialConfig {
    pub baud_rate: u32,
    pub data_bits: DataBits,
    pub parity: Parity,
    pub stop_bits: StopBits,
    pub flow_control: FlowControl,
}

impl Default for SerialConfig {
    fn default() -> Self {
        Self {
            baud_rate: DEFAULT_BAUD_RATE,
            data_bits: DataBits::default(),
            parity: Parity::default(),
            stop_bits: StopBits::default(),
            flow_control: FlowControl::default(),
        }
    }
}

/// A byte stream to the radio, with its open state.
pub struct Transport {
    pub(crate) reader: BoxedReader,
    pub(crate) writer: BoxedWriter,
    pub(crate) ready: watch::Receiver<bool>,
}

impl Transport {
    /// Wrap a stream that is already open.
    pub fn new<S>(stream: S) -> Self
    where
        S: AsyncRead + AsyncWrite + Send + 'static,
    {
        let (transport, signal) = Self::pending(stream);
        signal.open();
        transport
    }

    /// Wrap a stream that is still opening.
    ///
    /// Writes are held until [`OpenSignal::open`] is called.
    pub fn pending<S>(stream: S) -> (Self, OpenSignal)
    where
        S: AsyncRead + AsyncWrite + Send + 'static,
    {
        let (reader, writer) = tokio::io::split(stream);
        let (ready_tx, ready_rx) = watch::channel(false);

        let transport = Self {
            reader: Box::new(reader),
            writer: Box::new(writer),
            ready: ready_rx,
        };
        (transport, OpenSignal { ready: ready_tx })
    }

    /// Open a serial port with the given line settings.
    pub fn open_serial(path: &str, config: &SerialConfig) -> Result<Self> {
        tracing::debug!(
            "Connecting to serial port {} at {} baud ({:?}, {:?}, {:?}, {:?})",
            path,
            config.baud_rate,
            config.data_bits,
            config.parity,
            config.stop_bits,
            config.flow_control
        );

        let port = tokio_serial::new(path, config.baud_rate)
            .data_bits(config.data_bits.into())
            .parity(config.parity.into())
            .stop_bits(config.stop_bits.into())
            .flow_control(config.flow_control.into())
            .open_native_async()?;

        Ok(Self::new(port))
    }

    /// Whether the open notification has fired.
    pub fn is_ready(&self) -> bool {
        *self.ready.borrow()
    }
}

/// Fires the transport's one-time open notification.
///
/// Dropping it without calling [`open`](OpenSignal::open) means the port
/// never opened; queued writes then fail with `ConnectionClosed`.
pub struct OpenSignal {
    ready: watch::Sender<bool>,
}

impl OpenSignal {
    /// Mark the port open. Consumes the signal, so it fires at most once.
    pub fn open(self) {
        // Receivers keep seeing the value after the sender is gone.
        self.ready.send_replace(true);
    }
}
