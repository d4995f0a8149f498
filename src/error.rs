//! Error types for neocore-client.

use thiserror::Error;

/// Main error type for all Neocore operations.
///
/// Codec failures (`OutOfRange`, `TooShort`, `LengthMismatch`) are scoped to a
/// single call or frame. The notification loop drops the offending frame and
/// keeps going; nothing in this enum tears a session down on its own.
#[derive(Debug, Error)]
pub enum NeocoreError {
    /// A header field does not fit its bit width.
    #[error("{field} value {value} out of range (max {max})")]
    OutOfRange {
        /// Name of the offending field.
        field: &'static str,
        /// Value that was supplied.
        value: u32,
        /// Largest value the field can carry.
        max: u32,
    },

    /// Frame is shorter than its format requires.
    #[error("frame too short: need at least {expected} bytes, got {actual}")]
    TooShort {
        /// Minimum number of bytes required.
        expected: usize,
        /// Number of bytes received.
        actual: usize,
    },

    /// EEG length byte disagrees with the bytes actually received.
    #[error("EEG length byte declares {declared} sample bytes, frame carries {actual}")]
    LengthMismatch {
        /// Length announced by the frame.
        declared: usize,
        /// Sample bytes present after the 4-byte EEG header.
        actual: usize,
    },

    /// Device answered a command with a PDU_ERROR reply.
    #[error("device error for feature {feature_id:#04x} pdu {pdu_id:#04x} (payload {})", hex::encode(.payload))]
    Device {
        /// Feature the failing command addressed.
        feature_id: u8,
        /// Command id that failed.
        pdu_id: u8,
        /// Raw error payload, if any.
        payload: Vec<u8>,
    },

    /// Operation is not allowed in the current session state.
    #[error("cannot {operation} while {state}")]
    InvalidState {
        /// Operation that was attempted.
        operation: &'static str,
        /// State the session was in.
        state: crate::session::SessionState,
    },

    /// No live link to the device.
    #[error("Not connected")]
    NotConnected,

    /// Link or notification loop went away underneath the caller.
    #[error("Connection closed")]
    ConnectionClosed,

    /// Backpressure timeout - command queue full.
    #[error("Backpressure timeout")]
    BackpressureTimeout,

    /// Transport-specific failure reported by a [`Transport`](crate::transport::Transport).
    #[error("Transport error: {0}")]
    Transport(String),

    /// I/O error (configuration files).
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON error while loading configuration.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Bluetooth stack error.
    #[cfg(feature = "ble")]
    #[error("BLE error: {0}")]
    Ble(#[from] btleplug::Error),
}

impl NeocoreError {
    /// Whether this error only invalidates the frame that produced it.
    pub fn is_frame_error(&self) -> bool {
        matches!(
            self,
            NeocoreError::TooShort { .. } | NeocoreError::LengthMismatch { .. }
        )
    }
}

/// Result type alias using NeocoreError.
pub type Result<T> = std::result::Result<T, NeocoreError>;
