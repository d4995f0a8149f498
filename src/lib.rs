//! # neocore-client
//!
//! Host-side driver for the Neocore two-channel EEG headset.
//!
//! The device speaks a small binary command protocol tunnelled through one
//! write and one notify characteristic. This crate encodes commands, sorts
//! incoming notifications into EEG frames and command replies, decodes both,
//! and runs the session (identify, stream, stop, disconnect).
//!
//! ## Layers
//!
//! - [`protocol`]: header bit layout, frame classification, reply and EEG decoding
//! - [`codec`]: typed commands and serial-number text handling
//! - [`session`]: the connection state machine
//! - [`transport`]: the byte link (BLE behind the `ble` feature, in-memory for tests)
//! - [`Client`]: writer task plus notification loop tying it all together
//!
//! ## Example
//!
//! ```ignore
//! use neocore_client::{Client, DeviceEvent};
//! use neocore_client::config::BleConfig;
//! use neocore_client::transport::ble::scan_and_connect;
//!
//! #[tokio::main]
//! async fn main() -> neocore_client::Result<()> {
//!     let (transport, notifications) = scan_and_connect(&BleConfig::default(), 256).await?;
//!     let (events_tx, mut events) = tokio::sync::mpsc::channel(1024);
//!
//!     let client = Client::builder()
//!         .sink(events_tx)
//!         .start(transport, notifications)
//!         .await?;
//!
//!     client.identify().await?;
//!     client.start_streaming(true).await?;
//!     while let Some(event) = events.recv().await {
//!         if let DeviceEvent::Eeg(packet) = event {
//!             println!("EEG idx={} samples={}", packet.index, packet.len());
//!         }
//!     }
//!     Ok(())
//! }
//! ```

pub mod codec;
pub mod config;
pub mod error;
pub mod protocol;
pub mod session;
pub mod sink;
pub mod transport;

mod client;
mod writer;

pub use client::{Client, ClientBuilder, LinkStats, LinkStatsSnapshot};
pub use codec::Command;
pub use error::{NeocoreError, Result};
pub use session::{DeviceSession, SessionSnapshot, SessionState, SessionUpdate};
pub use sink::{DeviceEvent, EventSink};
pub use writer::{WriterConfig, DEFAULT_CHANNEL_CAPACITY, DEFAULT_MAX_PENDING_COMMANDS};
