//! Event delivery to the caller.
//!
//! The notification loop hands every decoded frame to an [`EventSink`]
//! synchronously and never waits on it. Buffering, storage and backpressure
//! are the sink's business.
//!
//! # Example
//!
//! ```
//! use neocore_client::sink::{DeviceEvent, EventSink, FnSink};
//!
//! let mut count = 0usize;
//! let mut sink = FnSink::new(move |event: DeviceEvent| {
//!     if let DeviceEvent::Eeg(packet) = event {
//!         count += packet.len();
//!     }
//! });
//! sink.on_event(DeviceEvent::Disconnected);
//! ```

use tokio::sync::mpsc;

use crate::error::NeocoreError;
use crate::protocol::{CommandHeader, DecodedResponse, EegPacket};
use crate::session::SessionUpdate;

/// Everything the client reports while a session is live.
#[derive(Debug)]
pub enum DeviceEvent {
    /// One decoded EEG frame.
    Eeg(EegPacket),
    /// A command reply, whatever its feature (errors included).
    Response(DecodedResponse),
    /// A reply changed the session.
    SessionUpdated(SessionUpdate),
    /// The device answered with PDU_ERROR.
    DeviceError(DecodedResponse),
    /// A frame failed to decode and was dropped.
    FrameDropped {
        /// First byte of the frame, if any.
        packet_type: Option<u8>,
        /// Why it was dropped.
        error: NeocoreError,
    },
    /// Notification stream ended.
    Disconnected,
}

impl DeviceEvent {
    /// Header of the reply carried by this event, if any.
    pub fn header(&self) -> Option<&CommandHeader> {
        match self {
            DeviceEvent::Response(r) | DeviceEvent::DeviceError(r) => Some(&r.header),
            _ => None,
        }
    }
}

/// Receiver of [`DeviceEvent`]s.
pub trait EventSink: Send + 'static {
    /// Take one event. Must not block.
    fn on_event(&mut self, event: DeviceEvent);
}

/// Discards everything.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullSink;

impl EventSink for NullSink {
    fn on_event(&mut self, _event: DeviceEvent) {}
}

/// Wraps a closure as a sink.
pub struct FnSink<F>(F);

impl<F> FnSink<F>
where
    F: FnMut(DeviceEvent) + Send + 'static,
{
    /// Create a new closure sink.
    pub fn new(f: F) -> Self {
        Self(f)
    }
}

impl<F> EventSink for FnSink<F>
where
    F: FnMut(DeviceEvent) + Send + 'static,
{
    fn on_event(&mut self, event: DeviceEvent) {
        (self.0)(event)
    }
}

/// Bounded channel sink. Events are dropped with a warning when the
/// receiver falls behind.
impl EventSink for mpsc::Sender<DeviceEvent> {
    fn on_event(&mut self, event: DeviceEvent) {
        match self.try_send(event) {
            Ok(()) => {}
            Err(mpsc::error::TrySendError::Full(event)) => {
                tracing::warn!("Event sink full, dropping {:?}", kind(&event));
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                tracing::trace!("Event sink closed");
            }
        }
    }
}

impl EventSink for mpsc::UnboundedSender<DeviceEvent> {
    fn on_event(&mut self, event: DeviceEvent) {
        let _ = self.send(event);
    }
}

impl EventSink for Box<dyn EventSink> {
    fn on_event(&mut self, event: DeviceEvent) {
        (**self).on_event(event)
    }
}

fn kind(event: &DeviceEvent) -> &'static str {
    match event {
        DeviceEvent::Eeg(_) => "eeg",
        DeviceEvent::Response(_) => "response",
        DeviceEvent::SessionUpdated(_) => "session_updated",
        DeviceEvent::DeviceError(_) => "device_error",
        DeviceEvent::FrameDropped { .. } => "frame_dropped",
        DeviceEvent::Disconnected => "disconnected",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;

    use crate::protocol::decode_response;

    fn eeg(index: u16) -> DeviceEvent {
        DeviceEvent::Eeg(EegPacket {
            index,
            channel1: vec![1],
            channel2: vec![2],
        })
    }

    #[test]
    fn test_fn_sink() {
        let (tx, rx) = std::sync::mpsc::channel();
        let mut sink = FnSink::new(move |event| {
            if let DeviceEvent::Eeg(p) = event {
                tx.send(p.index).unwrap();
            }
        });
        sink.on_event(eeg(7));
        sink.on_event(DeviceEvent::Disconnected);
        assert_eq!(rx.try_iter().collect::<Vec<_>>(), vec![7]);
    }

    #[test]
    fn test_bounded_sink_drops_when_full() {
        let (mut tx, mut rx) = mpsc::channel(1);
        tx.on_event(eeg(1));
        tx.on_event(eeg(2));
        assert!(matches!(rx.try_recv(), Ok(DeviceEvent::Eeg(p)) if p.index == 1));
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_closed_sink_is_silent() {
        let (mut tx, rx) = mpsc::unbounded_channel();
        drop(rx);
        tx.on_event(eeg(1));
    }

    #[test]
    fn test_event_header() {
        let reply = decode_response(&Bytes::from_static(&[0x07, 0x00, 0x5A])).unwrap();
        let event = DeviceEvent::Response(reply);
        assert_eq!(event.header().map(|h| h.feature_id()), Some(3));
        assert!(eeg(0).header().is_none());
    }
}
