//! Typed commands for the ids the device understands.
//!
//! # Example
//!
//! ```
//! use neocore_client::codec::Command;
//!
//! assert_eq!(Command::GetBattery.encode(), vec![0x06, 0x00]);
//! assert_eq!(Command::StreamControl(true).encode(), vec![0x02, 0x00, 0x01]);
//! ```
//!
//! Raw commands only come out of [`Command::raw`], which range-checks the ids:
//!
//! ```compile_fail
//! use neocore_client::codec::{Command, RawCommand};
//!
//! let cmd = Command::Raw(RawCommand { header: todo!(), payload: bytes::Bytes::new() });
//! ```

use bytes::Bytes;

use crate::error::Result;
use crate::protocol::{build_command, command, feature, CommandHeader, PduType};

/// An outbound command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// `CORE / GET_SERIAL`.
    GetSerial,
    /// `BATTERY / GET_BATTERY`.
    GetBattery,
    /// `SENSOR_CONFIG / STREAM_CTRL` with an enable flag.
    StreamControl(bool),
    /// `SENSOR_CONFIG / TEST_SIGNAL_CTRL` with an enable flag.
    TestSignalControl(bool),
    /// Any other header/payload pair. Built with [`Command::raw`].
    Raw(RawCommand),
}

/// Header and payload of a [`Command::Raw`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawCommand {
    header: CommandHeader,
    payload: Bytes,
}

impl RawCommand {
    /// Validated header.
    pub fn header(&self) -> CommandHeader {
        self.header
    }

    /// Payload appended verbatim.
    pub fn payload(&self) -> &Bytes {
        &self.payload
    }
}

const GET_SERIAL: CommandHeader = CommandHeader::command(feature::CORE, command::GET_SERIAL);
const GET_BATTERY: CommandHeader = CommandHeader::command(feature::BATTERY, command::GET_BATTERY);
const STREAM_CTRL: CommandHeader =
    CommandHeader::command(feature::SENSOR_CONFIG, command::STREAM_CTRL);
const TEST_SIGNAL_CTRL: CommandHeader =
    CommandHeader::command(feature::SENSOR_CONFIG, command::TEST_SIGNAL_CTRL);

impl Command {
    /// Build a raw command from unchecked ids.
    pub fn raw(feature_id: u8, pdu_id: u8, payload: impl Into<Bytes>) -> Result<Self> {
        Ok(Command::Raw(RawCommand {
            header: CommandHeader::new(feature_id, PduType::Command, pdu_id)?,
            payload: payload.into(),
        }))
    }

    /// Header this command is sent with.
    pub fn header(&self) -> CommandHeader {
        match self {
            Command::GetSerial => GET_SERIAL,
            Command::GetBattery => GET_BATTERY,
            Command::StreamControl(_) => STREAM_CTRL,
            Command::TestSignalControl(_) => TEST_SIGNAL_CTRL,
            Command::Raw(raw) => raw.header,
        }
    }

    /// Payload bytes following the header.
    pub fn payload(&self) -> Bytes {
        match self {
            Command::GetSerial | Command::GetBattery => Bytes::new(),
            Command::StreamControl(on) | Command::TestSignalControl(on) => {
                Bytes::from_static(if *on { &[command::ENABLE] } else { &[command::DISABLE] })
            }
            Command::Raw(raw) => raw.payload.clone(),
        }
    }

    /// Full wire bytes.
    pub fn encode(&self) -> Vec<u8> {
        build_command(&self.header(), &self.payload())
    }
}
