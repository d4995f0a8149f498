//! Transport module - the radio link underneath the protocol.
//!
//! The client never talks to a radio directly. It needs:
//! - a [`Transport`] to write command bytes and tear the link down
//! - an `mpsc::Receiver<Bytes>` carrying notifications, one frame per item
//!
//! Implementations:
//! - [`memory`]: in-process pair for tests and simulations
//! - [`ble`]: btleplug central over the Nordic UART service (requires `ble` feature)

use std::future::Future;
use std::pin::Pin;

use bytes::Bytes;

use crate::error::Result;

pub mod memory;

#[cfg(feature = "ble")]
pub mod ble;

/// Boxed future for transport operations.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Write side of a device link.
///
/// Reads are not part of the trait: notifications are delivered through the
/// channel handed to the client alongside the transport.
pub trait Transport: Send + Sync + 'static {
    /// Write one command. Resolves once the link acknowledged the write.
    fn write(&self, data: Bytes) -> BoxFuture<'_, Result<()>>;

    /// Close the link. The notification channel ends afterwards.
    fn disconnect(&self) -> BoxFuture<'_, Result<()>>;

    /// Whether the link is believed to be up.
    fn is_connected(&self) -> bool;
}
