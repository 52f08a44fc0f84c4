//! Request/response correlation with a per-request deadline.
//!
//! Each request leases a frame id, attaches a [`ResponseObserver`] for that
//! id and response kind, queues its frame with the writer task and then
//! races the response against the deadline. The observer guard and the id
//! lease are locals of [`Correlator::send`], so whichever way the request
//! ends (response, timeout, write failure, or the caller dropping the
//! future) the observer detaches first and the id is released after it.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use bytes::Bytes;
use tokio::sync::oneshot;

use super::registry::{Disposition, Observer, ObserverRegistry};
use crate::cache::NodeCache;
use crate::codec::{FrameCodec, FrameIdAllocator, FrameIdLease};
use crate::error::{Result, XBeeError};
use crate::protocol::{Address64, Frame, FrameRequest, FrameType};
use crate::writer::{OutboundFrame, WriterHandle};

/// Observer waiting for the one response carrying its id and kind.
///
/// The outcome slot is a one-shot latch: the first matching frame takes the
/// sender, later frames (duplicates) find it empty and are ignored.
pub struct ResponseObserver {
    id: u8,
    kind: FrameType,
    slot: Mutex<Option<oneshot::Sender<Frame>>>,
}

impl ResponseObserver {
    pub fn new(id: u8, kind: FrameType) -> (Self, oneshot::Receiver<Frame>) {
        let (tx, rx) = oneshot::channel();
        let observer = Self {
            id,
            kind,
            slot: Mutex::new(Some(tx)),
        };
        (observer, rx)
    }

    fn matches(&self, frame: &Frame) -> bool {
        frame.is_kind(self.kind) && frame.id() == Some(self.id)
    }
}

impl Observer for ResponseObserver {
    fn observe(&self, frame: &Frame) -> Disposition {
        if !self.matches(frame) {
            return Disposition::Keep;
        }

        let sender = self
            .slot
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .take();
        if let Some(sender) = sender {
            // The receiver may already be gone after a timeout.
            let _ = sender.send(frame.clone());
        }
        Disposition::Detach
    }
}

/// Correlation engine shared by every operation of one client.
///
/// Owns the id allocator and the node cache; two clients never share them.
pub struct Correlator {
    registry: Arc<ObserverRegistry>,
    ids: FrameIdAllocator,
    nodes: NodeCache,
    writer: WriterHandle,
    codec: FrameCodec,
}

impl Correlator {
    pub fn new(registry: Arc<ObserverRegistry>, writer: WriterHandle, codec: FrameCodec) -> Self {
        Self {
            registry,
            ids: FrameIdAllocator::new(),
            nodes: NodeCache::new(),
            writer,
            codec,
        }
    }

    #[inline]
    pub fn registry(&self) -> &Arc<ObserverRegistry> {
        &self.registry
    }

    #[inline]
    pub fn codec(&self) -> FrameCodec {
        self.codec
    }

    #[inline]
    pub fn writer(&self) -> &WriterHandle {
        &self.writer
    }

    #[inline]
    pub fn nodes(&self) -> &NodeCache {
        &self.nodes
    }

    /// Resolve a node identifier through the cache.
    pub async fn resolve(&self, node_id: &str, timeout: Duration) -> Result<Address64> {
        self.nodes.resolve(self, node_id, timeout).await
    }

    /// Number of frame ids currently held by requests.
    pub fn in_flight(&self) -> usize {
        self.ids.in_flight()
    }

    /// Send a request and wait for the response of kind `expected` that
    /// echoes its frame id.
    ///
    /// The deadline covers queueing the write as well as the wait, so a
    /// request made while the port is still opening can time out.
    ///
    /// # Errors
    ///
    /// - `Timeout` if no matching frame arrives within `timeout`
    /// - `FrameIdsExhausted` if 255 requests are already pending
    /// - `ConnectionClosed` if the writer or reader is gone, or the client shut down
    pub async fn send(
        &self,
        request: &FrameRequest,
        expected: FrameType,
        timeout: Duration,
    ) -> Result<Frame> {
        if self.registry.is_closed() {
            return Err(XBeeError::ConnectionClosed);
        }
        let lease = self.ids.next_id()?;
        let id = lease.id();
        let bytes = self.codec.encode(request, id)?;

        let (observer, response) = ResponseObserver::new(id, expected);
        let _guard = self.registry.register(Arc::new(observer));

        tracing::debug!(
            "Sending {:?} frame {}, awaiting {:?}",
            request.frame_type(),
            id,
            expected
        );

        let exchange = async {
            self.writer.send(OutboundFrame::new(id, bytes)).await?;
            response.await.map_err(|_| XBeeError::ConnectionClosed)
        };

        match tokio::time::timeout(timeout, exchange).await {
            Ok(outcome) => outcome,
            Err(_) => {
                tracing::debug!("Frame {} timed out after {:?}", id, timeout);
                Err(XBeeError::Timeout(timeout))
            }
        }
    }

    /// Write a request without waiting for any answer.
    ///
    /// The returned lease keeps the id reserved; drop it once answers
    /// carrying that id are no longer of interest.
    pub async fn send_detached(&self, request: &FrameRequest) -> Result<FrameIdLease> {
        if self.registry.is_closed() {
            return Err(XBeeError::ConnectionClosed);
        }
        let lease = self.ids.next_id()?;
        let bytes = self.codec.encode(request, lease.id())?;

        tracing::debug!("Sending {:?} frame {}", request.frame_type(), lease.id());
        self.writer
            .send(OutboundFrame::new(lease.id(), bytes))
            .await?;
        Ok(lease)
    }
}

/// Turn a command response into its data, or `CommandFailed`.
pub fn command_outcome(frame: Frame) -> Result<Bytes> {
    let (status, data) = match frame {
        Frame::AtCommandResponse(f) => (f.status, f.data),
        Frame::RemoteCommandResponse(f) => (f.status, f.data),
        other => {
            return Err(XBeeError::Protocol(format!(
                "expected a command response, got frame type 0x{:02X}",
                other.frame_type()
            )))
        }
    };

    if status.is_ok() {
        Ok(data)
    } else {
        Err(XBeeError::CommandFailed(status))
    }
}

/// Turn a transmit status into success, or `DeliveryFailed`.
pub fn delivery_outcome(frame: &Frame) -> Result<()> {
    let status = match frame {
        Frame::TransmitStatus(f) => f.delivery_status,
        Frame::TxStatus(f) => f.delivery_status,
        other => {
            return Err(XBeeError::Protocol(format!(
                "expected a transmit status, got frame type 0x{:02X}",
                other.frame_type()
            )))
        }
    };

    if status.is_success() {
        Ok(())
    } else {
        Err(XBeeError::DeliveryFailed(status))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::{ApiMode, CommandStatus, DeliveryStatus, Module};
    use crate::writer::{spawn_writer_task, WriterConfig};
    use tokio::io::{duplex, AsyncReadExt, DuplexStream};
    use tokio::sync::watch;

    fn at_response(id: u8, command: &[u8; 2], status: u8, data: &[u8]) -> Frame {
        let mut raw = vec![0x88, id, command[0], command[1], status];
        raw.extend_from_slice(data);
        Frame::decode(Bytes::from(raw), Module::ZigBee).unwrap()
    }

    fn correlator() -> (Correlator, DuplexStream) {
        let (client, device) = duplex(4096);
        let (_ready_tx, ready_rx) = watch::channel(true);
        let (writer, _task) = spawn_writer_task(client, ready_rx, WriterConfig::default());
        let codec = FrameCodec::new(ApiMode::Plain, Module::ZigBee);
        (
            Correlator::new(Arc::new(ObserverRegistry::new()), writer, codec),
            device,
        )
    }

    fn ni_request() -> FrameRequest {
        FrameRequest::AtCommand {
            command: *b"NI",
            parameter: Bytes::new(),
        }
    }

    #[test]
    fn test_observer_matches_id_and_kind() {
        let (observer, mut rx) = ResponseObserver::new(4, FrameType::AtCommandResponse);

        let wrong_id = at_response(5, b"NI", 0, b"");
        assert_eq!(observer.observe(&wrong_id), Disposition::Keep);

        let wrong_kind = Frame::decode(Bytes::from_static(&[0x89, 0x04, 0x00]), Module::ZigBee)
            .unwrap();
        assert_eq!(observer.observe(&wrong_kind), Disposition::Keep);
        assert!(rx.try_recv().is_err());

        let hit = at_response(4, b"NI", 0, b"A");
        assert_eq!(observer.observe(&hit), Disposition::Detach);
        assert_eq!(rx.try_recv().unwrap(), hit);
    }

    #[test]
    fn test_observer_settles_once() {
        let (observer, mut rx) = ResponseObserver::new(1, FrameType::AtCommandResponse);
        let first = at_response(1, b"NI", 0, b"first");
        let second = at_response(1, b"NI", 0, b"second");

        observer.observe(&first);
        observer.observe(&second);
        assert_eq!(rx.try_recv().unwrap(), first);
    }

    #[tokio::test]
    async fn test_send_resolves_on_matching_response() {
        let (correlator, mut device) = correlator();
        let registry = correlator.registry().clone();

        let request = ni_request();
        let pending = correlator.send(&request, FrameType::AtCommandResponse, Duration::from_secs(1));
        let device_side = async {
            let mut wire = [0u8; 8];
            device.read_exact(&mut wire).await.unwrap();
            let id = wire[4];
            registry.dispatch(&at_response(id.wrapping_add(1), b"NI", 0, b"other"));
            registry.dispatch(&at_response(id, b"NI", 0, b"HUB"));
        };

        let (frame, _) = tokio::join!(pending, device_side);
        assert_eq!(command_outcome(frame.unwrap()).unwrap().as_ref(), b"HUB");
        assert!(correlator.registry().is_empty());
        assert_eq!(correlator.in_flight(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_send_times_out_and_cleans_up() {
        let (correlator, _device) = correlator();

        let err = correlator
            .send(&ni_request(), FrameType::AtCommandResponse, Duration::from_millis(100))
            .await
            .unwrap_err();

        assert!(matches!(err, XBeeError::Timeout(d) if d == Duration::from_millis(100)));
        assert!(correlator.registry().is_empty());
        assert_eq!(correlator.in_flight(), 0);
    }

    #[tokio::test]
    async fn test_closed_registry_fails_pending_and_new_requests() {
        let (correlator, mut device) = correlator();
        let registry = correlator.registry().clone();

        let request = ni_request();
        let pending = correlator.send(&request, FrameType::AtCommandResponse, Duration::from_secs(5));
        let shutdown = async {
            let mut wire = [0u8; 8];
            device.read_exact(&mut wire).await.unwrap();
            registry.close();
        };

        let (result, _) = tokio::join!(pending, shutdown);
        assert!(matches!(result, Err(XBeeError::ConnectionClosed)));

        let late = correlator
            .send(&request, FrameType::AtCommandResponse, Duration::from_secs(5))
            .await;
        assert!(matches!(late, Err(XBeeError::ConnectionClosed)));
        assert!(matches!(
            correlator.send_detached(&request).await,
            Err(XBeeError::ConnectionClosed)
        ));
        assert_eq!(correlator.in_flight(), 0);
    }

    #[tokio::test]
    async fn test_send_detached_holds_lease() {
        let (correlator, _device) = correlator();
        let lease = correlator.send_detached(&ni_request()).await.unwrap();
        assert_eq!(correlator.in_flight(), 1);
        drop(lease);
        assert_eq!(correlator.in_flight(), 0);
    }

    #[test]
    fn test_command_outcome_maps_status() {
        let err = command_outcome(at_response(1, b"ZZ", 0x02, b"")).unwrap_err();
        assert!(matches!(err, XBeeError::CommandFailed(CommandStatus::InvalidCommand)));
        assert_eq!(err.to_string(), "Invalid Command (0x02)");
    }

    #[test]
    fn test_delivery_outcome_maps_status() {
        let ok = Frame::decode(Bytes::from_static(&[0x89, 0x01, 0x00]), Module::Ieee802154).unwrap();
        assert!(delivery_outcome(&ok).is_ok());

        let failed = Frame::decode(
            Bytes::from_static(&[0x8B, 0x01, 0xFF, 0xFE, 0x00, 0x21, 0x00]),
            Module::ZigBee,
        )
        .unwrap();
        let err = delivery_outcome(&failed).unwrap_err();
        assert!(matches!(err, XBeeError::DeliveryFailed(DeliveryStatus(0x21))));
    }
}
