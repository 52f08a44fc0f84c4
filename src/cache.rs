//! Node identifier to 64-bit address cache.
//!
//! Resolving a node identifier costs a `DN` round trip; once resolved the
//! address is remembered for the lifetime of the client. Entries are never
//! evicted or invalidated.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use bytes::Bytes;

use crate::correlation::{command_outcome, Correlator};
use crate::error::{Result, XBeeError};
use crate::protocol::{Address64, FrameRequest, FrameType};

/// Remembered node addresses, keyed by node identifier.
#[derive(Debug, Default)]
pub struct NodeCache {
    entries: Mutex<HashMap<String, Address64>>,
}

impl NodeCache {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, Address64>> {
        self.entries.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn get(&self, node_id: &str) -> Option<Address64> {
        self.lock().get(node_id).copied()
    }

    pub fn insert(&self, node_id: impl Into<String>, address: Address64) {
        self.lock().insert(node_id.into(), address);
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Address for `node_id`, asking the local radio on a miss.
    ///
    /// A hit performs no I/O. On a miss a `DN` command is sent; its answer
    /// carries the 16-bit address followed by the 64-bit address.
    ///
    /// # Errors
    ///
    /// Every failure is reported as `NodeNotFound`, with the real cause
    /// (timeout, command status, short answer) as its source.
    pub async fn resolve(
        &self,
        correlator: &Correlator,
        node_id: &str,
        timeout: Duration,
    ) -> Result<Address64> {
        if let Some(address) = self.get(node_id) {
            tracing::trace!("Node {} cached as {}", node_id, address);
            return Ok(address);
        }

        match lookup(correlator, node_id, timeout).await {
            Ok(address) => {
                tracing::debug!("Resolved node {} to {}", node_id, address);
                self.insert(node_id, address);
                Ok(address)
            }
            Err(source) => {
                tracing::debug!("Could not resolve node {}: {}", node_id, source);
                Err(XBeeError::NodeNotFound {
                    node_id: node_id.to_string(),
                    source: Box::new(source),
                })
            }
        }
    }
}

async fn lookup(correlator: &Correlator, node_id: &str, timeout: Duration) -> Result<Address64> {
    let request = FrameRequest::AtCommand {
        command: *b"DN",
        parameter: Bytes::copy_from_slice(node_id.as_bytes()),
    };
    let frame = correlator
        .send(&request, FrameType::AtCommandResponse, timeout)
        .await?;
    let data = command_outcome(frame)?;

    data.get(2..10)
        .and_then(|bytes| Address64::try_from(bytes).ok())
        .ok_or_else(|| XBeeError::Protocol(format!("DN response has {} bytes", data.len())))
}
