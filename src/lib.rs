//! # xbee-client
//!
//! Async request/response client for XBee radios in API mode.
//!
//! The radio answers every request with a frame carrying the request's frame
//! id, interleaved with everything else it reports on the serial link. This
//! crate turns that stream back into one awaited result per request:
//!
//! - **Correlation**: each request leases a frame id and waits for the
//!   response of the expected kind with the same id, bounded by a timeout
//! - **Discovery**: node descriptors are collected over the radio's `NT`
//!   window and reported through a callback as they arrive
//! - **Node cache**: node identifiers are resolved once (`DN`) and remembered
//!
//! ## Example
//!
//! ```ignore
//! use xbee_client::{Destination, Module, RemoteTransmit, SerialConfig, XBeeBuilder};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let xbee = XBeeBuilder::new(Module::ZigBee).open("/dev/ttyUSB0", &SerialConfig::default())?;
//!
//!     let nodes = xbee
//!         .discover_nodes(|node| println!("found {}", node.node_identifier))
//!         .await?;
//!
//!     xbee.remote_transmit(RemoteTransmit::new(Destination::node_id("PUMP"), "on"))
//!         .await?;
//!
//!     xbee.close().await?;
//!     Ok(())
//! }
//! ```

pub mod cache;
pub mod codec;
pub mod command;
pub mod config;
pub mod correlation;
pub mod error;
pub mod protocol;
pub mod transport;
pub mod writer;

mod client;

pub use client::{XBee, XBeeBuilder};
pub use command::{Destination, ExplicitTransmit, LocalCommand, RemoteCommand, RemoteTransmit};
pub use config::XBeeConfig;
pub use error::{Result, XBeeError};
pub use protocol::{Address16, Address64, ApiMode, Module, NodeIdentification};
pub use transport::{DataBits, FlowControl, OpenSignal, Parity, SerialConfig, StopBits, Transport};
