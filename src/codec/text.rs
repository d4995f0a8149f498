//! Text payload conversion.
//!
//! Serial numbers arrive as raw bytes. Valid UTF-8 becomes text; anything else
//! is represented as lowercase hex instead of failing the decode.
//!
//! # Example
//!
//! ```
//! use neocore_client::codec::TextCodec;
//!
//! assert_eq!(TextCodec::decode_or_hex(b"NC-0042"), "NC-0042");
//! assert_eq!(TextCodec::decode_or_hex(&[0xFF, 0x10]), "ff10");
//! ```

use std::str::Utf8Error;

/// Marker codec for device text payloads.
pub struct TextCodec;

impl TextCodec {
    /// Strict UTF-8 decode.
    #[inline]
    pub fn decode(payload: &[u8]) -> Result<&str, Utf8Error> {
        std::str::from_utf8(payload)
    }

    /// Decode as UTF-8, falling back to a hex rendering of the bytes.
    pub fn decode_or_hex(payload: &[u8]) -> String {
        match Self::decode(payload) {
            Ok(text) => text.to_owned(),
            Err(e) => {
                tracing::debug!("Payload is not UTF-8 ({}), using hex", e);
                hex::encode(payload)
            }
        }
    }
}
