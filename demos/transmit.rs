//! Transmit - send data to a node by name.
//!
//! The node identifier is resolved once and cached, so only the first
//! transmission costs an extra round trip.
//!
//! # Running
//!
//! ```text
//! cargo run --example transmit -- /dev/ttyUSB0 PUMP "on"
//! ```

use std::time::Duration;

use xbee_client::{Destination, Module, RemoteTransmit, SerialConfig, XBeeBuilder, XBeeError};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let mut args = std::env::args().skip(1);
    let port = args.next().unwrap_or_else(|| "/dev/ttyUSB0".to_string());
    let node = args.next().unwrap_or_else(|| "PUMP".to_string());
    let data = args.next().unwrap_or_else(|| "hello".to_string());

    let xbee = XBeeBuilder::new(Module::ZigBee)
        .default_timeout(Duration::from_secs(10))
        .open(&port, &SerialConfig::default())?;

    for attempt in 1..=3 {
        let transmit = RemoteTransmit::new(Destination::node_id(node.as_str()), data.clone());
        match xbee.remote_transmit(transmit).await {
            Ok(()) => println!("Attempt {}: delivered", attempt),
            Err(XBeeError::NodeNotFound { node_id, source }) => {
                println!("No node named {} ({})", node_id, source);
                break;
            }
            Err(e) => println!("Attempt {}: {}", attempt, e),
        }
    }

    if let Some(address) = xbee.cached_node(&node) {
        println!("{} is {}", node, address);
    }

    xbee.close().await?;
    Ok(())
}
