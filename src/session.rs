//! Device session state.
//!
//! [`DeviceSession`] is a plain value with no interior mutability. The client
//! keeps exactly one, owned by its notification loop, and publishes read-only
//! [`SessionSnapshot`]s to everybody else.
//!
//! ```text
//! Disconnected → Connected → Identifying → Idle ⇄ Streaming
//!       ↑______________________________________________|  (any state on link loss)
//! ```

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::codec::TextCodec;
use crate::error::{NeocoreError, Result};
use crate::protocol::{command, feature, DecodedResponse};

/// Lifecycle state of a session.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    /// No link.
    #[default]
    Disconnected,
    /// Link up and notifications subscribed.
    Connected,
    /// Serial/battery queries in flight.
    Identifying,
    /// Identified, not streaming.
    Idle,
    /// EEG stream enabled.
    Streaming,
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Disconnected => "disconnected",
            Self::Connected => "connected",
            Self::Identifying => "identifying",
            Self::Idle => "idle",
            Self::Streaming => "streaming",
        };
        f.write_str(name)
    }
}

/// A session field changed by a reply.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionUpdate {
    /// Serial number learned from `CORE / GET_SERIAL`.
    SerialNumber(String),
    /// Battery level learned from `BATTERY / GET_BATTERY`.
    BatteryLevel(u8),
}

/// Read-only copy of the session.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionSnapshot {
    /// Lifecycle state.
    pub state: SessionState,
    /// Last known serial number.
    pub serial_number: Option<String>,
    /// Last known battery level (0-255, as reported).
    pub battery_level: Option<u8>,
    /// Whether the EEG stream is enabled.
    pub streaming: bool,
}

/// Mutable session state for one device.
#[derive(Debug, Default)]
pub struct DeviceSession {
    state: SessionState,
    serial_number: Option<String>,
    battery_level: Option<u8>,
}

impl DeviceSession {
    /// Create a disconnected session.
    pub fn new() -> Self {
        Self::default()
    }

    /// Current state.
    #[inline]
    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Last known serial number.
    pub fn serial_number(&self) -> Option<&str> {
        self.serial_number.as_deref()
    }

    /// Last known battery level.
    #[inline]
    pub fn battery_level(&self) -> Option<u8> {
        self.battery_level
    }

    /// Check if the EEG stream is enabled.
    #[inline]
    pub fn is_streaming(&self) -> bool {
        self.state == SessionState::Streaming
    }

    /// Check if both identity fields are known.
    #[inline]
    pub fn is_identified(&self) -> bool {
        self.serial_number.is_some() && self.battery_level.is_some()
    }

    /// Copy out the current state.
    pub fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            state: self.state,
            serial_number: self.serial_number.clone(),
            battery_level: self.battery_level,
            streaming: self.is_streaming(),
        }
    }

    fn transition(
        &mut self,
        operation: &'static str,
        allowed: &[SessionState],
        next: SessionState,
    ) -> Result<()> {
        if !allowed.contains(&self.state) {
            return Err(NeocoreError::InvalidState {
                operation,
                state: self.state,
            });
        }
        tracing::debug!("Session {} -> {}", self.state, next);
        self.state = next;
        Ok(())
    }

    /// Link established and notifications subscribed.
    pub fn connect(&mut self) -> Result<()> {
        self.transition("connect", &[SessionState::Disconnected], SessionState::Connected)
    }

    /// Identification queries are about to be sent.
    ///
    /// Re-identifying an idle session is allowed (e.g. to refresh the battery).
    pub fn begin_identification(&mut self) -> Result<()> {
        self.transition(
            "identify",
            &[SessionState::Connected, SessionState::Idle],
            SessionState::Identifying,
        )
    }

    /// Identification finished, fully or partially.
    pub fn finish_identification(&mut self) -> Result<()> {
        self.transition("finish identification", &[SessionState::Identifying], SessionState::Idle)
    }

    /// Stream enable is about to be sent.
    pub fn begin_streaming(&mut self) -> Result<()> {
        self.transition("start streaming", &[SessionState::Idle], SessionState::Streaming)
    }

    /// Stream disable is about to be sent. Stopping while idle is allowed
    /// since the disable commands are idempotent.
    pub fn end_streaming(&mut self) -> Result<()> {
        self.transition(
            "stop streaming",
            &[SessionState::Streaming, SessionState::Idle],
            SessionState::Idle,
        )
    }

    /// Link lost or closed. Identity fields are kept as last-known values.
    pub fn disconnect(&mut self) {
        if self.state != SessionState::Disconnected {
            tracing::debug!("Session {} -> {}", self.state, SessionState::Disconnected);
        }
        self.state = SessionState::Disconnected;
    }

    /// Apply a decoded reply.
    ///
    /// Only successful replies to `GET_SERIAL` and `GET_BATTERY` change the
    /// session; every other reply (errors included) is left to the caller.
    pub fn apply_response(&mut self, response: &DecodedResponse) -> Option<SessionUpdate> {
        if !response.is_response() {
            return None;
        }

        match (response.feature_id(), response.pdu_id()) {
            (feature::CORE, command::GET_SERIAL) => {
                let serial = TextCodec::decode_or_hex(response.payload());
                self.serial_number = Some(serial.clone());
                Some(SessionUpdate::SerialNumber(serial))
            }
            (feature::BATTERY, command::GET_BATTERY) => {
                let level = *response.payload().first()?;
                self.battery_level = Some(level);
                Some(SessionUpdate::BatteryLevel(level))
            }
            _ => None,
        }
    }
}
