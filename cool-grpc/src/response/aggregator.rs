//! Accumulates call events into a [`ResponseEnvelope`].

use cool_grpc_core::{Code, Status};
use http::HeaderMap;
use serde_json::Value;

use super::{ResponseData, ResponseEnvelope};
use crate::metadata;
use crate::{CallShape, DispatchError};

/// Decode raw messages in order, summing their raw lengths.
///
/// # Errors
///
/// Stops at the first message `decode` rejects.
pub fn aggregate<I, B, F>(messages: I, mut decode: F) -> Result<(Vec<Value>, usize), DispatchError>
where
    I: IntoIterator<Item = B>,
    B: AsRef<[u8]>,
    F: FnMut(&[u8]) -> Result<Value, DispatchError>,
{
    let mut values = Vec::new();
    let mut total = 0;
    for raw in messages {
        push_decoded(raw.as_ref(), &mut decode, &mut values, &mut total)?;
    }
    Ok((values, total))
}

/// Decode one message and count its raw length, leaving both untouched on
/// failure.
fn push_decoded<F>(
    raw: &[u8],
    decode: F,
    values: &mut Vec<Value>,
    total: &mut usize,
) -> Result<(), DispatchError>
where
    F: FnOnce(&[u8]) -> Result<Value, DispatchError>,
{
    let value = decode(raw)?;
    values.push(value);
    *total += raw.len();
    Ok(())
}

/// Builds the envelope of one call as its events arrive.
///
/// Status and metadata may come before, between or after messages; they all
/// land in the same envelope.
#[derive(Debug)]
pub struct ResponseAggregator {
    shape: CallShape,
    envelope: ResponseEnvelope,
    messages: Vec<Value>,
}

impl ResponseAggregator {
    /// Start with a zeroed envelope.
    pub fn new(shape: CallShape) -> Self {
        Self {
            shape,
            envelope: ResponseEnvelope::default(),
            messages: Vec::new(),
        }
    }

    /// Record response headers.
    pub fn on_metadata(&mut self, headers: &HeaderMap) {
        metadata::decode_into(&mut self.envelope.metadata, headers);
    }

    /// Record the final status and its trailers.
    pub fn on_status(&mut self, status: &Status) {
        self.envelope.status_code = status.code();
        self.envelope.status_message = status.message().to_string();
        metadata::decode_into(&mut self.envelope.metadata, status.metadata());
    }

    /// Decode and record one message.
    pub fn on_message<F>(&mut self, raw: &[u8], decode: F) -> Result<(), DispatchError>
    where
        F: FnOnce(&[u8]) -> Result<Value, DispatchError>,
    {
        push_decoded(raw, decode, &mut self.messages, &mut self.envelope.size)
    }

    /// Messages recorded so far.
    pub(crate) fn received(&self) -> usize {
        self.messages.len()
    }

    /// Close the envelope.
    ///
    /// # Errors
    ///
    /// A non-OK recorded status becomes a transport error. Unary and
    /// client-streaming calls must have produced exactly one message.
    pub fn finish(self) -> Result<ResponseEnvelope, DispatchError> {
        let Self {
            shape,
            mut envelope,
            mut messages,
        } = self;

        if envelope.status_code != Code::Ok {
            return Err(DispatchError::transport(
                envelope.status_code,
                envelope.status_message,
            ));
        }

        envelope.data = match shape {
            CallShape::Unary | CallShape::ClientStreaming => {
                if messages.len() != 1 {
                    return Err(DispatchError::transport(
                        Code::Internal,
                        format!(
                            "expected exactly one response message for a {shape} call, got {}",
                            messages.len()
                        ),
                    ));
                }
                ResponseData::Single(messages.remove(0))
            }
            CallShape::ServerStreaming | CallShape::BidiStreaming => {
                ResponseData::Sequence(messages)
            }
        };

        Ok(envelope)
    }
}
