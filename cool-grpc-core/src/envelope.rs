//! gRPC length-prefixed message framing.
//!
//! Every message on a gRPC stream, in either direction, is framed as:
//!
//! ```text
//! [compressed:1][length:4 big-endian][payload:length]
//! ```
//!
//! This module provides constants and functions for working with envelopes.

use bytes::{BufMut, Bytes, BytesMut};

use crate::error::EnvelopeError;

/// gRPC envelope flags.
pub mod envelope_flags {
    /// Uncompressed message.
    pub const MESSAGE: u8 = 0x00;
    /// Compressed message.
    pub const COMPRESSED: u8 = 0x01;
}

/// Envelope header size (flag + length).
pub const ENVELOPE_HEADER_SIZE: usize = 5;

/// Wrap payload in an uncompressed gRPC frame.
pub fn wrap_envelope(payload: &[u8]) -> Bytes {
    let mut frame = BytesMut::with_capacity(ENVELOPE_HEADER_SIZE + payload.len());
    frame.put_u8(envelope_flags::MESSAGE);
    frame.put_u32(payload.len() as u32);
    frame.put_slice(payload);
    frame.freeze()
}

/// Parse envelope header from bytes.
///
/// Returns `(flags, length)` if successful.
///
/// # Errors
/// Returns an error if there aren't enough bytes for the header.
pub fn parse_envelope_header(data: &[u8]) -> Result<(u8, u32), EnvelopeError> {
    if data.len() < ENVELOPE_HEADER_SIZE {
        return Err(EnvelopeError::IncompleteHeader {
            expected: ENVELOPE_HEADER_SIZE,
            actual: data.len(),
        });
    }

    let flags = data[0];
    let length = u32::from_be_bytes([data[1], data[2], data[3], data[4]]);

    Ok((flags, length))
}

/// Validate the flag byte of a received frame.
///
/// Only uncompressed frames are accepted since no message compression is
/// negotiated.
pub fn check_envelope_flags(flags: u8) -> Result<(), EnvelopeError> {
    match flags {
        envelope_flags::MESSAGE => Ok(()),
        envelope_flags::COMPRESSED => Err(EnvelopeError::UnsupportedCompression),
        other => Err(EnvelopeError::InvalidFlags(other)),
    }
}
