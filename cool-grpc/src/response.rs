//! The normalized result of a call.
//!
//! Every call shape produces the same [`ResponseEnvelope`]; only the shape of
//! [`ResponseData`] differs.

mod aggregator;

use cool_grpc_core::Code;
use serde::Serialize;
use serde_json::Value;

pub use aggregator::{ResponseAggregator, aggregate};

use crate::metadata::ResponseMetadata;

/// Decoded response payload.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(untagged)]
pub enum ResponseData {
    /// The only message of a unary or client-streaming call.
    Single(Value),
    /// Every message of a server-streaming call, in arrival order.
    Sequence(Vec<Value>),
}

impl ResponseData {
    pub fn as_single(&self) -> Option<&Value> {
        match self {
            ResponseData::Single(value) => Some(value),
            ResponseData::Sequence(_) => None,
        }
    }

    pub fn as_sequence(&self) -> Option<&[Value]> {
        match self {
            ResponseData::Single(_) => None,
            ResponseData::Sequence(values) => Some(values),
        }
    }
}

impl Default for ResponseData {
    fn default() -> Self {
        ResponseData::Single(Value::Object(Default::default()))
    }
}

/// The value every dispatch resolves with.
///
/// Serializes with camelCase keys:
///
/// ```
/// use cool_grpc::ResponseEnvelope;
///
/// let json = serde_json::to_value(ResponseEnvelope::default()).unwrap();
/// assert_eq!(
///     json,
///     serde_json::json!({
///         "data": {},
///         "size": 0,
///         "statusCode": 0,
///         "statusMessage": "",
///         "metadata": {}
///     })
/// );
/// ```
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResponseEnvelope {
    pub data: ResponseData,
    /// Sum of the raw encoded lengths of every message received.
    pub size: usize,
    pub status_code: Code,
    pub status_message: String,
    /// Response headers followed by trailers.
    pub metadata: ResponseMetadata,
}
