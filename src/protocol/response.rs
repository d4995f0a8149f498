//! Generic command-reply decoding.
//!
//! The decoder only rebuilds the header and slices off the payload. What the
//! payload means depends on the feature and is left to the session layer.

use bytes::Bytes;
use serde::Serialize;

use super::wire_format::{CommandHeader, PduType, HEADER_SIZE};
use crate::error::Result;

/// A decoded command reply.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DecodedResponse {
    /// Decoded header.
    pub header: CommandHeader,
    /// Bytes after the header (zero-copy slice of the frame).
    #[serde(serialize_with = "serialize_hex")]
    pub payload: Bytes,
}

impl DecodedResponse {
    /// Get the feature id.
    #[inline]
    pub fn feature_id(&self) -> u8 {
        self.header.feature_id()
    }

    /// Get the PDU type.
    #[inline]
    pub fn pdu_type(&self) -> PduType {
        self.header.pdu_type()
    }

    /// Get the PDU id.
    #[inline]
    pub fn pdu_id(&self) -> u8 {
        self.header.pdu_id()
    }

    /// Get a reference to the payload bytes.
    #[inline]
    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    /// Check if this is a successful reply.
    #[inline]
    pub fn is_response(&self) -> bool {
        self.header.pdu_type() == PduType::Response
    }

    /// Check if this is an error reply.
    #[inline]
    pub fn is_error(&self) -> bool {
        self.header.pdu_type() == PduType::Error
    }
}

fn serialize_hex<S: serde::Serializer>(payload: &Bytes, serializer: S) -> std::result::Result<S::Ok, S::Error> {
    serializer.serialize_str(&hex::encode(payload))
}

/// Decode a generic reply frame.
///
/// Any PDU type decodes, including `Error`; surfacing device errors is the
/// caller's job.
///
/// # Example
///
/// ```
/// use bytes::Bytes;
/// use neocore_client::protocol::{decode_response, PduType};
///
/// let reply = decode_response(&Bytes::from_static(&[0x07, 0x00, 0x5A])).unwrap();
/// assert_eq!(reply.feature_id(), 3);
/// assert_eq!(reply.pdu_type(), PduType::Response);
/// assert_eq!(reply.payload(), &[0x5A]);
/// ```
pub fn decode_response(frame: &Bytes) -> Result<DecodedResponse> {
    let header = CommandHeader::decode(frame)?;
    Ok(DecodedResponse {
        header,
        payload: frame.slice(HEADER_SIZE..),
    })
}
