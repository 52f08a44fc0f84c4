//! Client builder and runtime tasks.
//!
//! The [`XBeeBuilder`] collects link settings. [`XBeeBuilder::connect`]
//! starts the client over a [`Transport`]:
//! 1. Split the transport into read and write halves
//! 2. Spawn the writer task (gated on the transport's open notification)
//! 3. Spawn the reader task: decode frames, offer each to the observers
//!
//! # Example
//!
//! ```ignore
//! use xbee_client::{ApiMode, Module, SerialConfig, XBeeBuilder};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let xbee = XBeeBuilder::new(Module::ZigBee)
//!         .api_mode(ApiMode::Escaped)
//!         .open("/dev/ttyUSB0", &SerialConfig::default())?;
//!
//!     let ni = xbee.local_command("NI").await?;
//!     println!("Local node: {}", String::from_utf8_lossy(&ni));
//!
//!     xbee.close().await?;
//!     Ok(())
//! }
//! ```

use std::sync::{Arc, Mutex};
use std::time::Duration;

use bytes::Bytes;
use tokio::io::AsyncReadExt;
use tokio::task::JoinHandle;

use crate::codec::{FrameCodec, FrameDecoder};
use crate::command::{
    effective_timeout, parse_command, Destination, ExplicitTransmit, LocalCommand, RemoteCommand,
    RemoteTransmit, MIN_TIMEOUT,
};
use crate::config::{XBeeConfig, DEFAULT_TIMEOUT};
use crate::correlation::{
    command_outcome, delivery_outcome, discover, Correlator, ObserverRegistry,
    DEFAULT_DISCOVERY_GRACE,
};
use crate::error::{Result, XBeeError};
use crate::protocol::{
    Address64, ApiMode, FrameRequest, FrameType, Module, NodeIdentification, ResolvedDestination,
    REMOTE_OPTION_APPLY_CHANGES,
};
use crate::transport::{BoxedReader, SerialConfig, Transport};
use crate::writer::{spawn_writer_task, WriterConfig};

/// Read buffer size for the serial port.
const READ_BUFFER_SIZE: usize = 1024;

/// Builder for configuring and starting an [`XBee`] client.
#[derive(Debug, Clone)]
pub struct XBeeBuilder {
    module: Module,
    api_mode: ApiMode,
    default_timeout: Duration,
    discovery_grace: Duration,
    writer_config: WriterConfig,
}

impl XBeeBuilder {
    /// Create a builder for a radio of the given firmware family.
    pub fn new(module: Module) -> Self {
        Self {
            module,
            api_mode: ApiMode::default(),
            default_timeout: DEFAULT_TIMEOUT,
            discovery_grace: DEFAULT_DISCOVERY_GRACE,
            writer_config: WriterConfig::default(),
        }
    }

    /// Builder carrying the client settings of a loaded configuration.
    pub fn from_config(config: &XBeeConfig) -> Self {
        Self::new(config.module)
            .api_mode(config.api_mode)
            .default_timeout(config.default_timeout())
            .discovery_grace(config.discovery_grace())
    }

    /// Set the radio's API mode (`AP` parameter).
    ///
    /// Default: mode 1 (no escaping)
    pub fn api_mode(mut self, mode: ApiMode) -> Self {
        self.api_mode = mode;
        self
    }

    /// Timeout for operations that do not set their own.
    ///
    /// Default: 5 seconds
    pub fn default_timeout(mut self, timeout: Duration) -> Self {
        self.default_timeout = timeout;
        self
    }

    /// Time added to the radio's `NT` window before discovery closes.
    ///
    /// Default: 1 second
    pub fn discovery_grace(mut self, grace: Duration) -> Self {
        self.discovery_grace = grace;
        self
    }

    /// Set the writer channel capacity.
    ///
    /// Default: 64
    pub fn channel_capacity(mut self, capacity: usize) -> Self {
        self.writer_config.channel_capacity = capacity;
        self
    }

    /// Start the client over a transport.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn connect(self, transport: Transport) -> Result<XBee> {
        if self.default_timeout < MIN_TIMEOUT {
            return Err(XBeeError::invalid(format!(
                "Default timeout must be at least {} ms",
                MIN_TIMEOUT.as_millis()
            )));
        }
        if self.writer_config.channel_capacity == 0 {
            return Err(XBeeError::invalid("Channel capacity must be at least 1"));
        }
        XBee::start(self, transport)
    }

    /// Open a serial port and start the client on it.
    pub fn open(self, path: &str, serial: &SerialConfig) -> Result<XBee> {
        let transport = Transport::open_serial(path, serial)?;
        self.connect(transport)
    }
}

/// A running client bound to one radio.
///
/// All operations take `&self` and may run concurrently; each has its own
/// frame id and deadline.
pub struct XBee {
    correlator: Correlator,
    module: Module,
    default_timeout: Duration,
    discovery_grace: Duration,
    reader_task: JoinHandle<()>,
    writer_task: Mutex<Option<JoinHandle<Result<()>>>>,
}

impl XBee {
    /// Create a new client builder.
    pub fn builder(module: Module) -> XBeeBuilder {
        XBeeBuilder::new(module)
    }

    /// Open the serial port named by a configuration.
    pub fn open(config: &XBeeConfig) -> Result<Self> {
        config.validate()?;
        XBeeBuilder::from_config(config).open(&config.serial_port, &config.serial)
    }

    fn start(builder: XBeeBuilder, transport: Transport) -> Result<Self> {
        let codec = FrameCodec::new(builder.api_mode, builder.module);
        let Transport {
            reader,
            writer,
            ready,
        } = transport;

        let (writer, writer_task) = spawn_writer_task(writer, ready, builder.writer_config);

        let registry = Arc::new(ObserverRegistry::new());
        let reader_task = tokio::spawn(Self::read_loop(reader, codec.decoder(), registry.clone()));

        tracing::debug!(
            "XBee client started ({:?}, API mode {})",
            builder.module,
            u8::from(builder.api_mode)
        );

        Ok(XBee {
            correlator: Correlator::new(registry, writer, codec),
            module: builder.module,
            default_timeout: builder.default_timeout,
            discovery_grace: builder.discovery_grace,
            reader_task,
            writer_task: Mutex::new(Some(writer_task)),
        })
    }

    /// Reader loop - decodes inbound bytes and offers every frame to the
    /// observers, in arrival order.
    async fn read_loop(
        mut reader: BoxedReader,
        mut decoder: FrameDecoder,
        registry: Arc<ObserverRegistry>,
    ) {
        let _closing = CloseOnExit(registry.clone());
        let mut buf = vec![0u8; READ_BUFFER_SIZE];

        loop {
            let n = match reader.read(&mut buf).await {
                Ok(0) => {
                    tracing::debug!("Serial port closed");
                    break;
                }
                Ok(n) => n,
                Err(e) => {
                    tracing::error!("Read loop error: {}", e);
                    break;
                }
            };
            tracing::trace!("Read {} bytes: {:02x?}", n, &buf[..n]);

            for frame in decoder.push(&buf[..n]) {
                registry.dispatch(&frame);
            }
        }
    }

    #[inline]
    pub fn module(&self) -> Module {
        self.module
    }

    #[inline]
    pub fn api_mode(&self) -> ApiMode {
        self.correlator.codec().api_mode()
    }

    /// Whether the transport has reported open.
    pub fn is_ready(&self) -> bool {
        self.correlator.writer().is_ready()
    }

    /// Number of requests waiting for a response (plus a discovery in
    /// progress, if any).
    pub fn in_flight(&self) -> usize {
        self.correlator.in_flight()
    }

    /// Address of a node identifier already resolved, without any I/O.
    pub fn cached_node(&self, node_id: &str) -> Option<Address64> {
        self.correlator.nodes().get(node_id)
    }

    /// Send an AT command to the local radio and return its data.
    ///
    /// ```ignore
    /// let pan_id = xbee.local_command("ID").await?;
    /// xbee.local_command(LocalCommand::new("NI").parameter("HUB")).await?;
    /// ```
    ///
    /// # Errors
    ///
    /// - `InvalidArgument` if the command is not two letters or the timeout
    ///   is below 10 ms
    /// - `CommandFailed` if the radio answers with a non-OK status
    /// - `Timeout` if no answer arrives in time
    pub async fn local_command(&self, command: impl Into<LocalCommand>) -> Result<Bytes> {
        let command = command.into();
        let name = parse_command(&command.command)?;
        let timeout = effective_timeout(command.timeout, self.default_timeout)?;

        tracing::debug!("Local command {}", command.command);
        let request = FrameRequest::AtCommand {
            command: name,
            parameter: command.parameter,
        };
        let frame = self
            .correlator
            .send(&request, FrameType::AtCommandResponse, timeout)
            .await?;
        command_outcome(frame)
    }

    /// Send an AT command to a remote radio, applying changes immediately.
    pub async fn remote_command(&self, command: RemoteCommand) -> Result<Bytes> {
        let name = parse_command(&command.command)?;
        let timeout = effective_timeout(command.timeout, self.default_timeout)?;
        command.destination.check(self.module)?;

        let destination = self.resolve(&command.destination, timeout).await?;
        tracing::debug!("Remote command {} to {}", command.command, destination);

        let request = FrameRequest::RemoteAtCommand {
            destination,
            options: REMOTE_OPTION_APPLY_CHANGES,
            command: name,
            parameter: command.parameter,
        };
        let frame = self
            .correlator
            .send(&request, FrameType::RemoteCommandResponse, timeout)
            .await?;
        command_outcome(frame)
    }

    /// Send data to a remote radio and wait for its delivery status.
    pub async fn remote_transmit(&self, transmit: RemoteTransmit) -> Result<()> {
        let timeout = effective_timeout(transmit.timeout, self.default_timeout)?;
        transmit.destination.check(self.module)?;

        let destination = self.resolve(&transmit.destination, timeout).await?;
        tracing::debug!("Transmitting {} bytes to {}", transmit.data.len(), destination);

        let (request, expected) = if self.module.is_802_15_4() {
            let request = match destination {
                ResolvedDestination::Address64(address) => FrameRequest::TxRequest64 {
                    destination: address,
                    options: 0,
                    data: transmit.data,
                },
                ResolvedDestination::Address16(address) => FrameRequest::TxRequest16 {
                    destination: address,
                    options: 0,
                    data: transmit.data,
                },
            };
            (request, FrameType::TxStatus)
        } else {
            let request = FrameRequest::ZigbeeTransmit {
                destination,
                broadcast_radius: 0,
                options: 0,
                data: transmit.data,
            };
            (request, FrameType::ZigbeeTransmitStatus)
        };

        let frame = self.correlator.send(&request, expected, timeout).await?;
        delivery_outcome(&frame)
    }

    /// Send data to a specific endpoint, cluster and profile of a remote
    /// radio. Not available on 802.15.4 modules.
    pub async fn explicit_transmit(&self, transmit: ExplicitTransmit) -> Result<()> {
        let timeout = effective_timeout(transmit.timeout, self.default_timeout)?;
        if self.module.is_802_15_4() {
            return Err(XBeeError::invalid(
                "Can not send explicit transmits with 802.15.4 modules",
            ));
        }
        transmit.destination.check(self.module)?;

        let destination = self.resolve(&transmit.destination, timeout).await?;
        tracing::debug!(
            "Explicit transmit to {} src:{:02x} dest:{:02x} cluster:{:04x} profile:{:04x}",
            destination,
            transmit.source_endpoint,
            transmit.destination_endpoint,
            transmit.cluster_id,
            transmit.profile_id
        );

        let request = FrameRequest::ExplicitAddressing {
            destination,
            source_endpoint: transmit.source_endpoint,
            destination_endpoint: transmit.destination_endpoint,
            cluster_id: transmit.cluster_id,
            profile_id: transmit.profile_id,
            broadcast_radius: transmit.broadcast_radius,
            options: 0,
            data: transmit.data,
        };
        let frame = self
            .correlator
            .send(&request, FrameType::ZigbeeTransmitStatus, timeout)
            .await?;
        delivery_outcome(&frame)
    }

    /// Discover the nodes on the network.
    ///
    /// `on_node` is called once per node descriptor, in arrival order, from
    /// the task awaiting this future; a panicking callback takes down that
    /// task only. The window lasts the radio's `NT` setting plus the
    /// configured grace; when it closes, every node seen is returned.
    pub async fn discover_nodes<F>(&self, on_node: F) -> Result<Vec<NodeIdentification>>
    where
        F: FnMut(NodeIdentification) + Send,
    {
        discover(
            &self.correlator,
            self.default_timeout,
            self.discovery_grace,
            on_node,
        )
        .await
    }

    /// Resolve a node identifier to its 64-bit address.
    pub async fn lookup_node(&self, node_id: &str) -> Result<Address64> {
        Destination::node_id(node_id).check(self.module)?;
        self.correlator.resolve(node_id, self.default_timeout).await
    }

    async fn resolve(
        &self,
        destination: &Destination,
        timeout: Duration,
    ) -> Result<ResolvedDestination> {
        match destination {
            Destination::Address64(address) => Ok(ResolvedDestination::Address64(*address)),
            Destination::Address16(address) => Ok(ResolvedDestination::Address16(*address)),
            Destination::NodeId(node_id) => self
                .correlator
                .resolve(node_id, timeout)
                .await
                .map(ResolvedDestination::Address64),
        }
    }

    /// Shut down: write out everything queued, flush, then close the port.
    ///
    /// Requests still waiting for an answer fail with `ConnectionClosed`,
    /// as does every operation started afterwards.
    pub async fn close(&self) -> Result<()> {
        tracing::debug!("Closing XBee client");
        let result = self.correlator.writer().close().await;

        self.reader_task.abort();
        self.correlator.registry().close();

        let writer_task = self
            .writer_task
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .take();
        if let Some(task) = writer_task {
            match task.await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => tracing::error!("Writer task error: {}", e),
                Err(e) => tracing::error!("Writer task failed: {}", e),
            }
        }

        result
    }
}

/// Closes the registry however the reader ends, so nothing waits on a
/// link that can no longer answer.
struct CloseOnExit(Arc<ObserverRegistry>);

impl Drop for CloseOnExit {
    fn drop(&mut self) {
        self.0.close();
    }
}

impl Drop for XBee {
    fn drop(&mut self) {
        self.reader_task.abort();
    }
}
