//! In-memory transport.
//!
//! [`memory_pair`] returns a [`MemoryTransport`] for the client, the
//! notification receiver the client reads from, and a [`MemoryDevice`] that
//! plays the device: it sees every written command and injects notifications.
//!
//! # Example
//!
//! ```
//! use bytes::Bytes;
//! use neocore_client::transport::memory::memory_pair;
//! use neocore_client::transport::Transport;
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() {
//! let (transport, mut notifications, mut device) = memory_pair(16);
//!
//! transport.write(Bytes::from_static(&[0x00, 0x01])).await.unwrap();
//! assert_eq!(device.next_command().await.unwrap(), Bytes::from_static(&[0x00, 0x01]));
//!
//! device.notify(Bytes::from_static(&[0x07, 0x00, 0x5A])).await.unwrap();
//! assert_eq!(notifications.recv().await.unwrap().len(), 3);
//! # }
//! ```

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use bytes::Bytes;
use tokio::sync::mpsc;

use super::{BoxFuture, Transport};
use crate::error::{NeocoreError, Result};

#[derive(Debug)]
struct Link {
    connected: AtomicBool,
    fail_writes: AtomicBool,
    // Dropped on disconnect so the client's notification stream ends.
    notify_tx: Mutex<Option<mpsc::Sender<Bytes>>>,
}

/// Client side of an in-memory link.
#[derive(Debug, Clone)]
pub struct MemoryTransport {
    link: Arc<Link>,
    written_tx: mpsc::UnboundedSender<Bytes>,
}

/// Device side of an in-memory link.
#[derive(Debug)]
pub struct MemoryDevice {
    link: Arc<Link>,
    written_rx: mpsc::UnboundedReceiver<Bytes>,
}

/// Create a connected transport/device pair.
///
/// `capacity` bounds the notification channel.
pub fn memory_pair(capacity: usize) -> (MemoryTransport, mpsc::Receiver<Bytes>, MemoryDevice) {
    let (notify_tx, notify_rx) = mpsc::channel(capacity);
    let (written_tx, written_rx) = mpsc::unbounded_channel();
    let link = Arc::new(Link {
        connected: AtomicBool::new(true),
        fail_writes: AtomicBool::new(false),
        notify_tx: Mutex::new(Some(notify_tx)),
    });

    (
        MemoryTransport {
            link: link.clone(),
            written_tx,
        },
        notify_rx,
        MemoryDevice { link, written_rx },
    )
}

impl Link {
    fn sender(&self) -> Option<mpsc::Sender<Bytes>> {
        self.notify_tx.lock().ok().and_then(|guard| guard.clone())
    }

    fn close(&self) {
        self.connected.store(false, Ordering::Release);
        if let Ok(mut guard) = self.notify_tx.lock() {
            guard.take();
        }
    }
}

impl Transport for MemoryTransport {
    fn write(&self, data: Bytes) -> BoxFuture<'_, Result<()>> {
        Box::pin(async move {
            if !self.link.connected.load(Ordering::Acquire) {
                return Err(NeocoreError::NotConnected);
            }
            if self.link.fail_writes.load(Ordering::Acquire) {
                return Err(NeocoreError::Transport("write rejected".to_string()));
            }
            self.written_tx
                .send(data)
                .map_err(|_| NeocoreError::ConnectionClosed)
        })
    }

    fn disconnect(&self) -> BoxFuture<'_, Result<()>> {
        Box::pin(async move {
            self.link.close();
            Ok(())
        })
    }

    fn is_connected(&self) -> bool {
        self.link.connected.load(Ordering::Acquire)
    }
}

impl MemoryDevice {
    /// Next command written by the client, or `None` once the client side is gone.
    pub async fn next_command(&mut self) -> Option<Bytes> {
        self.written_rx.recv().await
    }

    /// Command already written, if any.
    pub fn try_next_command(&mut self) -> Option<Bytes> {
        self.written_rx.try_recv().ok()
    }

    /// Deliver a notification frame to the client.
    pub async fn notify(&self, frame: Bytes) -> Result<()> {
        let tx = self.link.sender().ok_or(NeocoreError::ConnectionClosed)?;
        tx.send(frame).await.map_err(|_| NeocoreError::ConnectionClosed)
    }

    /// Make subsequent writes fail (or succeed again).
    pub fn set_fail_writes(&self, fail: bool) {
        self.link.fail_writes.store(fail, Ordering::Release);
    }

    /// Drop the link from the device side.
    pub fn drop_link(&self) {
        self.link.close();
    }

    /// Whether the link is up.
    pub fn is_connected(&self) -> bool {
        self.link.connected.load(Ordering::Acquire)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_write_reaches_device() {
        let (transport, _rx, mut device) = memory_pair(4);
        transport.write(Bytes::from_static(b"\x06\x00")).await.unwrap();
        assert_eq!(device.try_next_command().unwrap(), Bytes::from_static(b"\x06\x00"));
        assert!(device.try_next_command().is_none());
    }

    #[tokio::test]
    async fn test_write_failure() {
        let (transport, _rx, device) = memory_pair(4);
        device.set_fail_writes(true);
        let err = transport.write(Bytes::new()).await.unwrap_err();
        assert!(matches!(err, NeocoreError::Transport(_)));
    }

    #[tokio::test]
    async fn test_disconnect_ends_notifications() {
        let (transport, mut rx, device) = memory_pair(4);
        device.notify(Bytes::from_static(b"\x04\x00\x00\x00")).await.unwrap();

        transport.disconnect().await.unwrap();
        assert!(!transport.is_connected());
        assert!(!device.is_connected());

        // queued frame still delivered, then the stream ends
        assert!(rx.recv().await.is_some());
        assert!(rx.recv().await.is_none());

        assert!(matches!(
            transport.write(Bytes::new()).await,
            Err(NeocoreError::NotConnected)
        ));
        assert!(matches!(
            device.notify(Bytes::new()).await,
            Err(NeocoreError::ConnectionClosed)
        ));
    }
}
