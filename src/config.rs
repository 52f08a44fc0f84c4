//! Client configuration.
//!
//! Settings can be given in code through [`XBeeBuilder`](crate::XBeeBuilder)
//! or loaded from JSON:
//!
//! ```
//! use xbee_client::{FlowControl, XBeeConfig};
//!
//! let config = XBeeConfig::from_json(r#"{
//!     "serial_port": "/dev/ttyUSB0",
//!     "module": "ZigBee",
//!     "api_mode": 2,
//!     "flow_control": "hardware"
//! }"#).unwrap();
//!
//! assert_eq!(config.serial.baud_rate, 9600);
//! assert_eq!(config.serial.flow_control, FlowControl::Hardware);
//! assert_eq!(config.default_timeout_ms, 5000);
//! ```

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::command::MIN_TIMEOUT;
use crate::error::{Result, XBeeError};
use crate::protocol::{ApiMode, Module};
use crate::transport::SerialConfig;

/// Default per-operation timeout.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_millis(5000);

/// Serial link and client settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct XBeeConfig {
    /// Serial device path, e.g. `/dev/ttyUSB0` or `COM3`.
    pub serial_port: String,
    /// Line settings, given inline (`baud_rate`, `parity`, ...).
    #[serde(flatten)]
    pub serial: SerialConfig,
    pub module: Module,
    #[serde(default)]
    pub api_mode: ApiMode,
    #[serde(default = "default_timeout_ms")]
    pub default_timeout_ms: u64,
    #[serde(default = "default_discovery_grace_ms")]
    pub discovery_grace_ms: u64,
}

fn default_timeout_ms() -> u64 {
    DEFAULT_TIMEOUT.as_millis() as u64
}

fn default_discovery_grace_ms() -> u64 {
    crate::correlation::DEFAULT_DISCOVERY_GRACE.as_millis() as u64
}

impl XBeeConfig {
    pub fn new(serial_port: impl Into<String>, module: Module) -> Self {
        Self {
            serial_port: serial_port.into(),
            serial: SerialConfig::default(),
            module,
            api_mode: ApiMode::default(),
            default_timeout_ms: default_timeout_ms(),
            discovery_grace_ms: default_discovery_grace_ms(),
        }
    }

    /// Parse and validate a JSON configuration.
    pub fn from_json(json: &str) -> Result<Self> {
        let config: XBeeConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Read a JSON configuration file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let json = std::fs::read_to_string(path)?;
        Self::from_json(&json)
    }

    pub fn validate(&self) -> Result<()> {
        if self.serial_port.is_empty() {
            return Err(XBeeError::invalid("serial_port must not be empty"));
        }
        if self.serial.baud_rate == 0 {
            return Err(XBeeError::invalid("baud_rate must not be zero"));
        }
        if self.default_timeout() < MIN_TIMEOUT {
            return Err(XBeeError::invalid(format!(
                "default_timeout_ms must be at least {}",
                MIN_TIMEOUT.as_millis()
            )));
        }
        Ok(())
    }

    #[inline]
    pub fn default_timeout(&self) -> Duration {
        Duration::from_millis(self.default_timeout_ms)
    }

    #[inline]
    pub fn discovery_grace(&self) -> Duration {
        Duration::from_millis(self.discovery_grace_ms)
    }
}
