//! Local Command - read settings from the attached radio.
//!
//! This example demonstrates:
//! - Opening a serial port from a JSON configuration file
//! - Sending AT commands to the local radio
//! - Logging correlation with `RUST_LOG=xbee_client=debug`
//!
//! # Running
//!
//! ```text
//! cat > xbee.json <<EOF
//! { "serial_port": "/dev/ttyUSB0", "module": "ZigBee", "api_mode": 2 }
//! EOF
//! RUST_LOG=xbee_client=debug cargo run --example local_command -- xbee.json
//! ```

use xbee_client::{LocalCommand, XBee, XBeeConfig};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let path = std::env::args().nth(1).unwrap_or_else(|| "xbee.json".to_string());
    let config = XBeeConfig::from_file(&path)?;
    let xbee = XBee::open(&config)?;

    let ni = xbee.local_command("NI").await?;
    println!("Node identifier: {}", String::from_utf8_lossy(&ni));

    for command in ["SH", "SL", "MY", "ID"] {
        match xbee.local_command(LocalCommand::new(command)).await {
            Ok(value) => println!("{}: {:02x?}", command, value.as_ref()),
            Err(e) => println!("{}: {}", command, e),
        }
    }

    xbee.close().await?;
    Ok(())
}
