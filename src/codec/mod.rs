//! Codec module - typed command payloads and text conversion.
//!
//! - [`Command`] - the command set of the device, encoded on demand
//! - [`TextCodec`] - UTF-8 payloads with a hex fallback
//!
//! # Design
//!
//! Like the protocol layer, codecs are plain values and marker structs with
//! static methods; nothing here touches the transport.

mod command;
mod text;

pub use command::{Command, RawCommand};
pub use text::TextCodec;
