//! Protocol module - wire format, demultiplexing, and frame decoders.
//!
//! This module implements the device's binary protocol:
//! - 2-byte bit-packed command header encoding/decoding
//! - First-byte classification of inbound notifications
//! - Generic reply decoding
//! - Two-channel EEG sample frame decoding

mod eeg;
mod frame;
mod response;
mod wire_format;

pub use eeg::{
    decode_eeg, decode_eeg_with, EegPacket, IndexTracker, LengthPolicy, EEG_HEADER_SIZE,
    EEG_STRIDE,
};
pub use frame::{classify, Notification};
pub use response::{decode_response, DecodedResponse};
pub use wire_format::{
    build_command, command, encode_command, feature, CommandHeader, PduType, EEG_PACKET_TYPE,
    HEADER_SIZE, MAX_FEATURE_ID, MAX_PDU_ID, MAX_PDU_TYPE,
};
