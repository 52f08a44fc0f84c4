//! Dedicated writer task for the serial link.
//!
//! Requests never touch the serial port directly. They hand encoded frames to
//! a writer task through an mpsc channel, so callers are never blocked by the
//! port, and the task is the only place that knows whether the port is open.
//!
//! # Architecture
//!
//! ```text
//! Request 1 ─┐
//! Request 2 ─┼─► mpsc::Sender<WriterCommand> ─► Writer Task ─► Serial port
//! Request N ─┘                                    ▲
//!                                  ready (watch) ─┘
//! ```
//!
//! - **Readiness gate**: frames queued before the port reports open are held
//!   and written once the open notification fires.
//! - **Batching**: frames already queued are written together, then flushed.
//! - **Shutdown**: `close()` drains (flush) and only then closes the port.

use bytes::Bytes;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;

use crate::error::{Result, XBeeError};

/// Default channel capacity.
pub const DEFAULT_CHANNEL_CAPACITY: usize = 64;

/// Maximum frames to batch in a single write pass.
const MAX_BATCH_SIZE: usize = 16;

/// An encoded frame ready to be written to the port.
#[derive(Debug, Clone)]
pub struct OutboundFrame {
    /// Frame id, for logging.
    pub id: u8,
    /// Complete envelope bytes.
    pub bytes: Bytes,
}

impl OutboundFrame {
    #[inline]
    pub fn new(id: u8, bytes: Bytes) -> Self {
        Self { id, bytes }
    }

    #[inline]
    pub fn size(&self) -> usize {
        self.bytes.len()
    }
}

/// Messages understood by the writer task.
enum WriterCommand {
    Frame(OutboundFrame),
    Close(oneshot::Sender<Result<()>>),
}

/// Configuration for the writer task.
#[derive(Debug, Clone)]
pub struct WriterConfig {
    /// Channel capacity for the frame queue.
    pub channel_capacity: usize,
}

impl Default for WriterConfig {
    fn default() -> Self {
        Self {
            channel_capacity: DEFAULT_CHANNEL_CAPACITY,
        }
    }
}

/// Handle for sending frames to the writer task.
///
/// This is cheaply cloneable and shared by every request of a client.
#[derive(Clone)]
pub struct WriterHandle {
    tx: mpsc::Sender<WriterCommand>,
    ready: watch::Receiver<bool>,
}

impl WriterHandle {
    /// Queue a frame for writing.
    ///
    /// Returns as soon as the frame is queued; if the port is not open yet
    /// the write happens later, when it opens.
    pub async fn send(&self, frame: OutboundFrame) -> Result<()> {
        self.tx
            .send(WriterCommand::Frame(frame))
            .await
            .map_err(|_| XBeeError::ConnectionClosed)
    }

    /// Whether the port has reported open.
    #[inline]
    pub fn is_ready(&self) -> bool {
        *self.ready.borrow()
    }

    /// Drain queued frames, flush the port, then close it.
    ///
    /// Frames queued before this call are written first.
    pub async fn close(&self) -> Result<()> {
        let (ack_tx, ack_rx) = oneshot::channel();
        self.tx
            .send(WriterCommand::Close(ack_tx))
            .await
            .map_err(|_| XBeeError::ConnectionClosed)?;
        ack_rx.await.map_err(|_| XBeeError::ConnectionClosed)?
    }
}

/// Spawn the writer task and return a handle for sending frames.
///
/// # Arguments
///
/// * `writer` - The async writer (serial port write half)
/// * `ready` - Open state of the port; writes wait until it is `true`
/// * `config` - Writer configuration
pub fn spawn_writer_task<W>(
    writer: W,
    ready: watch::Receiver<bool>,
    config: WriterConfig,
) -> (WriterHandle, JoinHandle<Result<()>>)
where
    W: AsyncWrite + Unpin + Send + 'static,
{
    let (tx, rx) = mpsc::channel(config.channel_capacity);

    let handle = WriterHandle {
        tx,
        ready: ready.clone(),
    };

    let task = tokio::spawn(writer_loop(rx, writer, ready));

    (handle, task)
}

/// Main writer loop - receives frames and writes them once the port is open.
async fn writer_loop<W>(
    mut rx: mpsc::Receiver<WriterCommand>,
    mut writer: W,
    mut ready: watch::Receiver<bool>,
) -> Result<()>
where
    W: AsyncWrite + Unpin,
{
    loop {
        let first = match rx.recv().await {
            Some(WriterCommand::Frame(frame)) => frame,
            Some(WriterCommand::Close(ack)) => {
                let _ = ack.send(drain_and_close(&mut writer).await);
                return Ok(());
            }
            // Every handle dropped, clean shutdown
            None => return Ok(()),
        };

        wait_until_ready(&mut ready).await?;

        // Collect additional ready frames (non-blocking)
        let mut batch = Vec::with_capacity(MAX_BATCH_SIZE);
        batch.push(first);
        let mut close = None;

        while batch.len() < MAX_BATCH_SIZE {
            match rx.try_recv() {
                Ok(WriterCommand::Frame(frame)) => batch.push(frame),
                Ok(WriterCommand::Close(ack)) => {
                    close = Some(ack);
                    break;
                }
                Err(_) => break,
            }
        }

        write_batch(&mut writer, &batch).await?;

        if let Some(ack) = close {
            let _ = ack.send(drain_and_close(&mut writer).await);
            return Ok(());
        }
    }
}

/// Suspend until the port reports open.
async fn wait_until_ready(ready: &mut watch::Receiver<bool>) -> Result<()> {
    if *ready.borrow_and_update() {
        return Ok(());
    }

    tracing::debug!("Serial port not open yet, deferring writes");
    while !*ready.borrow_and_update() {
        ready
            .changed()
            .await
            .map_err(|_| XBeeError::ConnectionClosed)?;
    }
    tracing::debug!("Serial port open, writing deferred frames");
    Ok(())
}

/// Write a batch of frames back to back, then flush once.
async fn write_batch<W>(writer: &mut W, batch: &[OutboundFrame]) -> Result<()>
where
    W: AsyncWrite + Unpin,
{
    for frame in batch {
        tracing::trace!("Writing frame {} ({} bytes)", frame.id, frame.size());
        writer.write_all(&frame.bytes).await?;
    }
    writer.flush().await?;
    Ok(())
}

/// Drain, then close. Closing first would truncate in-flight output.
async fn drain_and_close<W>(writer: &mut W) -> Result<()>
where
    W: AsyncWrite + Unpin,
{
    tracing::debug!("Closing serial port");
    writer.flush().await?;
    writer.shutdown().await?;
    Ok(())
}
