//! Dedicated writer task for outbound commands.
//!
//! All commands go through one task that owns the write side of the
//! transport, so concurrent callers never interleave radio writes.
//!
//! # Architecture
//!
//! ```text
//! identify()        ─┐
//! start_streaming() ─┼─► mpsc::Sender<OutboundCommand> ─► Writer Task ─► Transport::write
//! send()            ─┘                                        │
//!                        oneshot ack ◄────────────────────────┘
//! ```
//!
//! Each command is written on its own; the device expects exactly one
//! command per radio write, so nothing is coalesced.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use bytes::{BufMut, Bytes, BytesMut};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::Instant;

use crate::codec::Command;
use crate::error::{NeocoreError, Result};
use crate::protocol::{CommandHeader, HEADER_SIZE};
use crate::transport::Transport;

/// Default maximum queued commands before backpressure kicks in.
pub const DEFAULT_MAX_PENDING_COMMANDS: usize = 32;

/// Default channel capacity.
pub const DEFAULT_CHANNEL_CAPACITY: usize = 64;

/// Default backpressure timeout.
pub const DEFAULT_BACKPRESSURE_TIMEOUT: Duration = Duration::from_secs(5);

/// A command ready to be written.
#[derive(Debug)]
pub struct OutboundCommand {
    /// Pre-encoded header (2 bytes).
    pub header: [u8; HEADER_SIZE],
    /// Payload bytes.
    pub payload: Bytes,
    ack: Option<oneshot::Sender<Result<()>>>,
}

impl OutboundCommand {
    /// Create a new outbound command.
    #[inline]
    pub fn new(header: &CommandHeader, payload: Bytes) -> Self {
        Self {
            header: header.encode(),
            payload,
            ack: None,
        }
    }

    /// Total size on the wire.
    #[inline]
    pub fn size(&self) -> usize {
        HEADER_SIZE + self.payload.len()
    }

    /// Contiguous wire bytes.
    pub fn to_bytes(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(self.size());
        buf.put_slice(&self.header);
        buf.put_slice(&self.payload);
        buf.freeze()
    }
}

impl From<&Command> for OutboundCommand {
    fn from(command: &Command) -> Self {
        OutboundCommand::new(&command.header(), command.payload())
    }
}

/// Configuration for the writer task.
#[derive(Debug, Clone)]
pub struct WriterConfig {
    /// Maximum queued commands before backpressure kicks in.
    pub max_pending_commands: usize,
    /// Channel capacity for the command queue.
    pub channel_capacity: usize,
    /// Timeout when waiting for backpressure to clear.
    pub backpressure_timeout: Duration,
}

impl Default for WriterConfig {
    fn default() -> Self {
        Self {
            max_pending_commands: DEFAULT_MAX_PENDING_COMMANDS,
            channel_capacity: DEFAULT_CHANNEL_CAPACITY,
            backpressure_timeout: DEFAULT_BACKPRESSURE_TIMEOUT,
        }
    }
}

/// Handle for queuing commands on the writer task.
///
/// This is cheaply cloneable.
#[derive(Clone)]
pub struct WriterHandle {
    /// Channel sender for commands.
    tx: mpsc::Sender<OutboundCommand>,
    /// Queued command count (for backpressure).
    pending: Arc<AtomicUsize>,
    /// Maximum queued commands.
    max_pending: usize,
    /// Backpressure timeout.
    timeout: Duration,
}

impl WriterHandle {
    fn new(
        tx: mpsc::Sender<OutboundCommand>,
        pending: Arc<AtomicUsize>,
        max_pending: usize,
        timeout: Duration,
    ) -> Self {
        Self {
            tx,
            pending,
            max_pending,
            timeout,
        }
    }

    /// Queue a command and wait until the transport acknowledged the write.
    pub async fn send(&self, mut command: OutboundCommand) -> Result<()> {
        if self.pending.load(Ordering::Acquire) >= self.max_pending {
            self.wait_for_backpressure().await?;
        }

        let (ack_tx, ack_rx) = oneshot::channel();
        command.ack = Some(ack_tx);

        // Increment pending count BEFORE sending
        self.pending.fetch_add(1, Ordering::AcqRel);
        if self.tx.send(command).await.is_err() {
            self.pending.fetch_sub(1, Ordering::Release);
            return Err(NeocoreError::ConnectionClosed);
        }

        ack_rx.await.map_err(|_| NeocoreError::ConnectionClosed)?
    }

    /// Wait for backpressure to clear with timeout.
    async fn wait_for_backpressure(&self) -> Result<()> {
        let start = Instant::now();
        let check_interval = Duration::from_millis(1);

        loop {
            if self.pending.load(Ordering::Acquire) < self.max_pending {
                return Ok(());
            }

            if start.elapsed() > self.timeout {
                return Err(NeocoreError::BackpressureTimeout);
            }

            tokio::time::sleep(check_interval).await;
        }
    }

    /// Check if backpressure is currently active.
    #[inline]
    pub fn is_backpressure_active(&self) -> bool {
        self.pending.load(Ordering::Acquire) >= self.max_pending
    }

    /// Get current queued command count.
    #[inline]
    pub fn pending_count(&self) -> usize {
        self.pending.load(Ordering::Acquire)
    }
}

/// Spawn the writer task and return a handle for queuing commands.
///
/// The task ends cleanly once every handle is dropped.
pub fn spawn_writer_task(
    transport: Arc<dyn Transport>,
    config: WriterConfig,
) -> (WriterHandle, JoinHandle<()>) {
    let (tx, rx) = mpsc::channel(config.channel_capacity);
    let pending = Arc::new(AtomicUsize::new(0));

    let handle = WriterHandle::new(
        tx,
        pending.clone(),
        config.max_pending_commands,
        config.backpressure_timeout,
    );

    let task = tokio::spawn(writer_loop(rx, transport, pending));

    (handle, task)
}

/// Main writer loop. A failed write is reported to its sender only; the loop
/// keeps serving later commands.
async fn writer_loop(
    mut rx: mpsc::Receiver<OutboundCommand>,
    transport: Arc<dyn Transport>,
    pending: Arc<AtomicUsize>,
) {
    while let Some(mut command) = rx.recv().await {
        let bytes = command.to_bytes();
        tracing::debug!(
            "Sending command 0x{:04X} -> {}",
            u16::from_be_bytes(command.header),
            hex::encode(&bytes)
        );

        let result = transport.write(bytes).await;
        if let Err(ref e) = result {
            tracing::warn!("Write failed: {}", e);
        }

        pending.fetch_sub(1, Ordering::Release);
        if let Some(ack) = command.ack.take() {
            let _ = ack.send(result);
        }
    }
    tracing::debug!("Writer task finished");
}
