//! gRPC message framing over a response body.
//!
//! [`FrameDecoder`] buffers body chunks as they arrive and splits them into
//! length-prefixed messages:
//!
//! ```text
//! [compressed:1][length:4][payload:length]
//! ```
//!
//! Chunk boundaries are arbitrary; a message may span several chunks and a
//! chunk may carry several messages.

use bytes::{Buf, Bytes, BytesMut};
use cool_grpc_core::{ENVELOPE_HEADER_SIZE, EnvelopeError, check_envelope_flags, parse_envelope_header};

/// Default receive limit, matching common gRPC implementations.
pub const DEFAULT_MAX_RECEIVE_MESSAGE_SIZE: usize = 4 * 1024 * 1024;

/// Incremental decoder for length-prefixed messages.
#[derive(Debug)]
pub struct FrameDecoder {
    /// Buffer for incomplete frames.
    buffer: BytesMut,
    /// Largest payload accepted.
    max_message_size: usize,
}

impl FrameDecoder {
    /// Create a decoder with an optional receive limit.
    pub fn new(max_message_size: Option<usize>) -> Self {
        Self {
            buffer: BytesMut::new(),
            max_message_size: max_message_size.unwrap_or(DEFAULT_MAX_RECEIVE_MESSAGE_SIZE),
        }
    }

    /// Append a body chunk.
    pub fn push(&mut self, chunk: Bytes) {
        self.buffer.extend_from_slice(&chunk);
    }

    /// Take the next complete message payload.
    ///
    /// Returns:
    /// - `Ok(Some(payload))` if a complete message was buffered
    /// - `Ok(None)` if more data is needed
    /// - `Err(e)` for compressed or oversize messages
    pub fn next_message(&mut self) -> Result<Option<Bytes>, EnvelopeError> {
        // Need at least the header
        if self.buffer.len() < ENVELOPE_HEADER_SIZE {
            return Ok(None);
        }

        let (flags, length) = parse_envelope_header(&self.buffer)?;
        check_envelope_flags(flags)?;

        let length = length as usize;
        if length > self.max_message_size {
            return Err(EnvelopeError::MessageTooLarge {
                actual: length,
                limit: self.max_message_size,
            });
        }

        if self.buffer.len() < ENVELOPE_HEADER_SIZE + length {
            return Ok(None);
        }

        self.buffer.advance(ENVELOPE_HEADER_SIZE);
        Ok(Some(self.buffer.split_to(length).freeze()))
    }

    /// Check that the body ended on a message boundary.
    pub fn finish(&self) -> Result<(), EnvelopeError> {
        match self.buffer.len() {
            0 => Ok(()),
            n if n < ENVELOPE_HEADER_SIZE => Err(EnvelopeError::IncompleteHeader {
                expected: ENVELOPE_HEADER_SIZE,
                actual: n,
            }),
            n => {
                let (_, length) = parse_envelope_header(&self.buffer)?;
                Err(EnvelopeError::IncompleteHeader {
                    expected: ENVELOPE_HEADER_SIZE + length as usize,
                    actual: n,
                })
            }
        }
    }
}
