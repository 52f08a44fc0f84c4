//! Node discovery window.
//!
//! Discovery answers arrive as any number of `ND` command responses over a
//! time window whose length the radio decides (its `NT` setting). A
//! [`DiscoveryWindow`] forwards every node descriptor seen while it is open
//! over a channel; the reader task only queues them, the caller's callback
//! runs in the discovering task. Closing the window detaches it; descriptors
//! that arrive afterwards reach nobody.

use std::pin::pin;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use tokio::sync::mpsc;

use super::pending::{command_outcome, Correlator};
use super::registry::{Disposition, Observer, ObserverGuard, ObserverRegistry};
use crate::error::{Result, XBeeError};
use crate::protocol::{Frame, FrameRequest, FrameType, NodeIdentification};

/// Default time added to the radio's `NT` window.
pub const DEFAULT_DISCOVERY_GRACE: Duration = Duration::from_millis(1000);

/// Units of the `NT` setting.
const NT_UNIT: Duration = Duration::from_millis(100);

struct NodeForwarder {
    tx: mpsc::UnboundedSender<NodeIdentification>,
}

impl Observer for NodeForwarder {
    fn observe(&self, frame: &Frame) -> Disposition {
        if let Some(node) = discovered_node(frame) {
            tracing::debug!(
                "Discovered node {} ({})",
                node.node_identifier,
                node.remote64
            );
            // The window may have closed between snapshot and delivery.
            let _ = self.tx.send(node.clone());
        }
        Disposition::Keep
    }
}

/// Node descriptor of a discovery answer, whatever its frame id.
fn discovered_node(frame: &Frame) -> Option<&NodeIdentification> {
    match frame {
        Frame::AtCommandResponse(f) if &f.command == b"ND" => f.node.as_ref(),
        _ => None,
    }
}

/// An open discovery window.
pub struct DiscoveryWindow {
    nodes: mpsc::UnboundedReceiver<NodeIdentification>,
    guard: Option<ObserverGuard>,
}

impl DiscoveryWindow {
    /// Start collecting node descriptors.
    pub fn open(registry: &Arc<ObserverRegistry>) -> Self {
        let (tx, nodes) = mpsc::unbounded_channel();
        let guard = registry.register(Arc::new(NodeForwarder { tx }));

        Self {
            nodes,
            guard: Some(guard),
        }
    }

    /// Next descriptor, in arrival order.
    ///
    /// Returns `None` once the window is closed and drained, or when the
    /// registry was closed under it (the link is gone).
    pub async fn next_node(&mut self) -> Option<NodeIdentification> {
        self.nodes.recv().await
    }

    /// Descriptors already queued.
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Stop collecting and return every descriptor still queued.
    pub fn close(mut self) -> Vec<NodeIdentification> {
        self.guard.take();
        self.nodes.close();
        let mut rest = Vec::new();
        while let Ok(node) = self.nodes.try_recv() {
            rest.push(node);
        }
        rest
    }
}

/// Length of the discovery window for a given `NT` setting.
pub fn window_length(nt: u64, grace: Duration) -> Duration {
    NT_UNIT * u32::try_from(nt).unwrap_or(u32::MAX) + grace
}

/// Parse the `NT` answer: a big-endian integer of one or more bytes.
pub fn parse_discovery_timeout(data: &Bytes) -> Result<u64> {
    if data.is_empty() || data.len() > 8 {
        return Err(XBeeError::Protocol(format!(
            "NT response has {} bytes",
            data.len()
        )));
    }
    Ok(data.iter().fold(0u64, |acc, &b| (acc << 8) | u64::from(b)))
}

/// Run one discovery round.
///
/// 1. Ask the radio for its `NT` setting.
/// 2. Open a window, then write `ND` without waiting for an answer.
/// 3. Hand every descriptor to `on_node` for `NT` x 100 ms plus `grace`.
/// 4. Close the window and return what was collected.
///
/// # Errors
///
/// `ConnectionClosed` if the link goes away while the window is open.
pub async fn discover<F>(
    correlator: &Correlator,
    command_timeout: Duration,
    grace: Duration,
    mut on_node: F,
) -> Result<Vec<NodeIdentification>>
where
    F: FnMut(NodeIdentification) + Send,
{
    let nt_request = FrameRequest::AtCommand {
        command: *b"NT",
        parameter: Bytes::new(),
    };
    let frame = correlator
        .send(&nt_request, FrameType::AtCommandResponse, command_timeout)
        .await?;
    let nt = parse_discovery_timeout(&command_outcome(frame)?)?;
    let window_len = window_length(nt, grace);

    tracing::info!("Discovering nodes for {:?} (NT={})", window_len, nt);

    let mut window = DiscoveryWindow::open(correlator.registry());
    let nd_request = FrameRequest::AtCommand {
        command: *b"ND",
        parameter: Bytes::new(),
    };
    // The lease keeps the ND id reserved for the whole window.
    let _lease = correlator.send_detached(&nd_request).await?;

    let mut nodes = Vec::new();
    let mut deadline = pin!(tokio::time::sleep(window_len));
    loop {
        tokio::select! {
            biased;
            _ = &mut deadline => break,
            node = window.next_node() => match node {
                Some(node) => {
                    nodes.push(node.clone());
                    on_node(node);
                }
                None => {
                    tracing::warn!("Link closed during discovery");
                    return Err(XBeeError::ConnectionClosed);
                }
            },
        }
    }

    // Descriptors queued right at the deadline still count.
    for node in window.close() {
        nodes.push(node.clone());
        on_node(node);
    }
    tracing::info!("Discovery finished, {} nodes found", nodes.len());
    Ok(nodes)
}
