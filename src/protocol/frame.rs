//! Notification demultiplexing.
//!
//! Every inbound notification is one discrete frame. The first byte decides
//! which decoder sees it; no decoding happens here.
//!
//! # Example
//!
//! ```
//! use bytes::Bytes;
//! use neocore_client::protocol::{classify, Notification};
//!
//! let frame = Bytes::from_static(&[0x04, 0x00, 0x05, 0x00]);
//! assert!(matches!(classify(frame), Notification::Eeg(_)));
//!
//! assert!(matches!(classify(Bytes::new()), Notification::Empty));
//! ```

use bytes::Bytes;

use super::wire_format::EEG_PACKET_TYPE;

/// A classified inbound frame.
///
/// Frames are carried as `bytes::Bytes`, so routing never copies.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Notification {
    /// Zero-length notification (keep-alive). Nothing to do.
    Empty,
    /// EEG sample frame (first byte `0x04`).
    Eeg(Bytes),
    /// Command reply frame; starts with a command header.
    Generic(Bytes),
}

impl Notification {
    /// Raw frame bytes (empty for [`Notification::Empty`]).
    pub fn as_bytes(&self) -> &[u8] {
        match self {
            Notification::Empty => &[],
            Notification::Eeg(frame) | Notification::Generic(frame) => frame,
        }
    }

    /// Check if this is an EEG frame.
    #[inline]
    pub fn is_eeg(&self) -> bool {
        matches!(self, Notification::Eeg(_))
    }
}

/// Route a frame by its first byte.
pub fn classify(frame: Bytes) -> Notification {
    match frame.first() {
        None => Notification::Empty,
        Some(&EEG_PACKET_TYPE) => Notification::Eeg(frame),
        Some(_) => Notification::Generic(frame),
    }
}
