//! Discover - list the nodes on the network.
//!
//! Nodes are printed as they answer; the full list is printed again when the
//! discovery window closes.
//!
//! # Running
//!
//! ```text
//! cargo run --example discover -- /dev/ttyUSB0 ZigBee
//! ```

use std::time::Duration;

use xbee_client::{Module, SerialConfig, XBeeBuilder};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let mut args = std::env::args().skip(1);
    let port = args.next().unwrap_or_else(|| "/dev/ttyUSB0".to_string());
    let module: Module = serde_json::from_value(serde_json::Value::String(
        args.next().unwrap_or_else(|| "ZigBee".to_string()),
    ))?;

    let xbee = XBeeBuilder::new(module)
        .discovery_grace(Duration::from_millis(500))
        .open(&port, &SerialConfig::default())?;

    let nodes = xbee
        .discover_nodes(|node| {
            println!(
                "Found {:<20} {} / {}",
                node.node_identifier, node.remote64, node.remote16
            );
        })
        .await?;

    println!("Discovery finished: {} nodes", nodes.len());
    for node in &nodes {
        println!("  {:?}", node);
    }

    xbee.close().await?;
    Ok(())
}
