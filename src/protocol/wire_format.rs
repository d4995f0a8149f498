//! Wire format encoding and decoding.
//!
//! Every command and every generic reply starts with a 2-byte header:
//! ```text
//! ┌────────────┬──────────┬──────────┐
//! │ Feature ID │ PDU type │ PDU ID   │
//! │ 7 bits     │ 2 bits   │ 7 bits   │
//! └────────────┴──────────┴──────────┘
//!  uint16 BE = (feature_id << 9) | (pdu_type << 7) | pdu_id
//! ```
//!
//! EEG sample frames use a different layout (see [`super::eeg`]) and mix in
//! little-endian fields, so byte order is spelled out at every call site.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{NeocoreError, Result};

/// Command header size in bytes.
pub const HEADER_SIZE: usize = 2;

/// First byte of every EEG sample frame.
pub const EEG_PACKET_TYPE: u8 = 0x04;

/// Largest feature id (7 bits).
pub const MAX_FEATURE_ID: u8 = 0x7F;

/// Largest PDU type (2 bits).
pub const MAX_PDU_TYPE: u8 = 0b11;

/// Largest PDU id (7 bits).
pub const MAX_PDU_ID: u8 = 0x7F;

/// Feature identifiers (logical device subsystems).
pub mod feature {
    /// Core identity (serial number).
    pub const CORE: u8 = 0x00;
    /// Sensor configuration (stream and test-signal switches).
    pub const SENSOR_CONFIG: u8 = 0x01;
    /// Sensor streaming.
    pub const SENSOR_STREAM: u8 = 0x02;
    /// Battery gauge.
    pub const BATTERY: u8 = 0x03;
}

/// Command identifiers, scoped by feature.
pub mod command {
    /// `CORE`: read the serial number.
    pub const GET_SERIAL: u8 = 0x01;
    /// `BATTERY`: read the battery level.
    pub const GET_BATTERY: u8 = 0x00;
    /// `SENSOR_CONFIG`: enable/disable EEG streaming.
    pub const STREAM_CTRL: u8 = 0x00;
    /// `SENSOR_CONFIG`: enable/disable the internal test signal.
    pub const TEST_SIGNAL_CTRL: u8 = 0x01;

    /// Switch payload: on.
    pub const ENABLE: u8 = 0x01;
    /// Switch payload: off.
    pub const DISABLE: u8 = 0x00;
}

/// Role of a transmitted unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[repr(u8)]
pub enum PduType {
    /// Host → device request.
    Command = 0,
    /// Unsolicited device → host message.
    Notification = 1,
    /// Successful reply to a command.
    Response = 2,
    /// Failed reply to a command.
    Error = 3,
}

impl PduType {
    /// Map the two low bits of `bits` to a PDU type. Never fails.
    #[inline]
    pub const fn from_bits(bits: u8) -> Self {
        match bits & MAX_PDU_TYPE {
            0 => Self::Command,
            1 => Self::Notification,
            2 => Self::Response,
            _ => Self::Error,
        }
    }

    /// Raw 2-bit value.
    #[inline]
    pub const fn bits(self) -> u8 {
        self as u8
    }
}

impl TryFrom<u8> for PduType {
    type Error = NeocoreError;

    fn try_from(value: u8) -> Result<Self> {
        if value > MAX_PDU_TYPE {
            return Err(NeocoreError::OutOfRange {
                field: "pdu_type",
                value: value.into(),
                max: MAX_PDU_TYPE.into(),
            });
        }
        Ok(Self::from_bits(value))
    }
}

impl fmt::Display for PduType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Command => "command",
            Self::Notification => "notification",
            Self::Response => "response",
            Self::Error => "error",
        };
        f.write_str(name)
    }
}

/// Decoded command header.
///
/// Fields are only reachable through constructors that keep them in range,
/// so every header encodes without touching neighbouring bits:
///
/// ```compile_fail
/// use neocore_client::protocol::{CommandHeader, PduType};
///
/// let header = CommandHeader { feature_id: 0x81, pdu_type: PduType::Command, pdu_id: 0x85 };
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct CommandHeader {
    feature_id: u8,
    pdu_type: PduType,
    pdu_id: u8,
}

impl CommandHeader {
    /// Create a header, rejecting ids that would spill into neighbouring bits.
    ///
    /// # Example
    ///
    /// ```
    /// use neocore_client::protocol::{feature, command, CommandHeader, PduType};
    ///
    /// let header = CommandHeader::new(feature::BATTERY, PduType::Command, command::GET_BATTERY).unwrap();
    /// assert_eq!(header.encode(), [0x06, 0x00]);
    /// assert!(CommandHeader::new(128, PduType::Command, 0).is_err());
    /// ```
    pub fn new(feature_id: u8, pdu_type: PduType, pdu_id: u8) -> Result<Self> {
        check_field("feature_id", feature_id, MAX_FEATURE_ID)?;
        check_field("pdu_id", pdu_id, MAX_PDU_ID)?;
        Ok(Self {
            feature_id,
            pdu_type,
            pdu_id,
        })
    }

    /// Host command header for constant ids; out-of-range ids fail at
    /// compile time when used in a `const`.
    pub(crate) const fn command(feature_id: u8, pdu_id: u8) -> Self {
        assert!(feature_id <= MAX_FEATURE_ID && pdu_id <= MAX_PDU_ID);
        Self {
            feature_id,
            pdu_type: PduType::Command,
            pdu_id,
        }
    }

    /// Rebuild the fields from a packed 16-bit command id.
    #[inline]
    pub const fn from_command_id(command_id: u16) -> Self {
        Self {
            feature_id: (command_id >> 9) as u8,
            pdu_type: PduType::from_bits((command_id >> 7) as u8),
            pdu_id: (command_id & MAX_PDU_ID as u16) as u8,
        }
    }

    /// Feature identifier (0-127).
    #[inline]
    pub const fn feature_id(&self) -> u8 {
        self.feature_id
    }

    /// PDU type.
    #[inline]
    pub const fn pdu_type(&self) -> PduType {
        self.pdu_type
    }

    /// PDU identifier (0-127).
    #[inline]
    pub const fn pdu_id(&self) -> u8 {
        self.pdu_id
    }

    /// Packed 16-bit command id.
    #[inline]
    pub const fn command_id(&self) -> u16 {
        ((self.feature_id as u16) << 9) | ((self.pdu_type as u16) << 7) | self.pdu_id as u16
    }

    /// Encode header to bytes (Big Endian).
    #[inline]
    pub fn encode(&self) -> [u8; HEADER_SIZE] {
        self.command_id().to_be_bytes()
    }

    /// Decode header from the first two bytes of `buf`.
    ///
    /// ```
    /// use neocore_client::protocol::{CommandHeader, PduType};
    ///
    /// let header = CommandHeader::decode(&[0x01, 0x01]).unwrap();
    /// assert_eq!(header.feature_id(), 0);
    /// assert_eq!(header.pdu_type(), PduType::Response);
    /// assert_eq!(header.pdu_id(), 1);
    /// ```
    pub fn decode(buf: &[u8]) -> Result<Self> {
        match buf {
            [hi, lo, ..] => Ok(Self::from_command_id(u16::from_be_bytes([*hi, *lo]))),
            _ => Err(NeocoreError::TooShort {
                expected: HEADER_SIZE,
                actual: buf.len(),
            }),
        }
    }

    /// Whether this header answers a command addressed by `feature_id`/`pdu_id`.
    #[inline]
    pub fn answers(&self, feature_id: u8, pdu_id: u8) -> bool {
        self.feature_id == feature_id
            && self.pdu_id == pdu_id
            && matches!(self.pdu_type, PduType::Response | PduType::Error)
    }
}

impl fmt::Display for CommandHeader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "0x{:04X} (feature={} type={} id={})",
            self.command_id(),
            self.feature_id,
            self.pdu_type,
            self.pdu_id
        )
    }
}

fn check_field(field: &'static str, value: u8, max: u8) -> Result<()> {
    if value > max {
        return Err(NeocoreError::OutOfRange {
            field,
            value: value.into(),
            max: max.into(),
        });
    }
    Ok(())
}

/// Encode a command: 2-byte big-endian header followed verbatim by `payload`.
///
/// All three ids are range-checked; nothing is masked or wrapped.
///
/// ```
/// use neocore_client::protocol::encode_command;
///
/// assert_eq!(encode_command(0x01, 0, 0x00, &[0x01]).unwrap(), vec![0x02, 0x00, 0x01]);
/// assert!(encode_command(0x01, 4, 0x00, &[]).is_err());
/// ```
pub fn encode_command(feature_id: u8, pdu_type: u8, pdu_id: u8, payload: &[u8]) -> Result<Vec<u8>> {
    let header = CommandHeader::new(feature_id, PduType::try_from(pdu_type)?, pdu_id)?;
    Ok(build_command(&header, payload))
}

/// Build a command from an already validated header.
pub fn build_command(header: &CommandHeader, payload: &[u8]) -> Vec<u8> {
    let mut buf = Vec::with_capacity(HEADER_SIZE + payload.len());
    buf.extend_from_slice(&header.encode());
    buf.extend_from_slice(payload);
    buf
}
