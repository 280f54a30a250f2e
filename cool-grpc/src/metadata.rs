//! Translation between application metadata and HTTP/2 headers.
//!
//! Request metadata is a map from lowercase header name to a text or binary
//! value. Binary entries use the `-bin` suffix and travel base64 encoded, as
//! gRPC requires. Response headers and trailers come back as a map from name
//! to every value received under that name.

use std::collections::BTreeMap;

use base64::Engine;
use bytes::Bytes;
use http::{HeaderMap, HeaderName, HeaderValue};
use serde::{Serialize, Serializer};

use crate::DispatchError;

/// Suffix marking a binary metadata key.
pub const BINARY_SUFFIX: &str = "-bin";

/// A single metadata value.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum MetadataValue {
    Text(String),
    Binary(Bytes),
}

impl MetadataValue {
    /// Get the text value, if this is a text entry.
    pub fn as_text(&self) -> Option<&str> {
        match self {
            MetadataValue::Text(text) => Some(text),
            MetadataValue::Binary(_) => None,
        }
    }

    /// Get the raw bytes, if this is a binary entry.
    pub fn as_binary(&self) -> Option<&Bytes> {
        match self {
            MetadataValue::Text(_) => None,
            MetadataValue::Binary(bytes) => Some(bytes),
        }
    }
}

impl From<String> for MetadataValue {
    fn from(value: String) -> Self {
        MetadataValue::Text(value)
    }
}

impl From<&str> for MetadataValue {
    fn from(value: &str) -> Self {
        MetadataValue::Text(value.to_string())
    }
}

impl From<Bytes> for MetadataValue {
    fn from(value: Bytes) -> Self {
        MetadataValue::Binary(value)
    }
}

impl From<Vec<u8>> for MetadataValue {
    fn from(value: Vec<u8>) -> Self {
        MetadataValue::Binary(Bytes::from(value))
    }
}

/// Text serializes as-is, binary as padded base64.
impl Serialize for MetadataValue {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match self {
            MetadataValue::Text(text) => serializer.serialize_str(text),
            MetadataValue::Binary(bytes) => serializer
                .serialize_str(&base64::engine::general_purpose::STANDARD.encode(bytes)),
        }
    }
}

/// Request metadata: one value per key.
pub type MetadataMap = BTreeMap<String, MetadataValue>;

/// Response metadata: every value received per key, in arrival order.
pub type ResponseMetadata = BTreeMap<String, Vec<MetadataValue>>;

/// Headers owned by the transport.
///
/// These are never written from request metadata and never reported back as
/// response metadata.
pub fn is_reserved_header(name: &str) -> bool {
    matches!(name, "content-type" | "te" | "user-agent") || name.starts_with("grpc-")
}

/// Encode request metadata into a header map.
///
/// Every entry is appended. Keys are lowercased before validation.
///
/// # Errors
///
/// Returns [`DispatchError::InvalidMetadata`] when a key is not a valid header
/// name, when binary and text values use the wrong key suffix, or when a text
/// value is not a valid header value.
pub fn encode(metadata: &MetadataMap) -> Result<HeaderMap, DispatchError> {
    let mut headers = HeaderMap::with_capacity(metadata.len());

    for (key, value) in metadata {
        let lower = key.to_ascii_lowercase();
        if is_reserved_header(&lower) {
            tracing::warn!(key = %lower, "skipping reserved metadata key");
            continue;
        }

        let name = HeaderName::from_bytes(lower.as_bytes())
            .map_err(|e| DispatchError::invalid_metadata(key, e.to_string()))?;

        let value = match value {
            MetadataValue::Text(text) => {
                if lower.ends_with(BINARY_SUFFIX) {
                    return Err(DispatchError::invalid_metadata(
                        key,
                        "text value under a -bin key",
                    ));
                }
                HeaderValue::from_str(text)
                    .map_err(|e| DispatchError::invalid_metadata(key, e.to_string()))?
            }
            MetadataValue::Binary(bytes) => {
                if !lower.ends_with(BINARY_SUFFIX) {
                    return Err(DispatchError::invalid_metadata(
                        key,
                        "binary value requires a -bin key",
                    ));
                }
                let encoded = base64::engine::general_purpose::STANDARD_NO_PAD.encode(bytes);
                HeaderValue::from_str(&encoded)
                    .map_err(|e| DispatchError::invalid_metadata(key, e.to_string()))?
            }
        };

        headers.append(name, value);
    }

    Ok(headers)
}

/// Decode a header (or trailer) block into response metadata.
pub fn decode(headers: &HeaderMap) -> ResponseMetadata {
    let mut metadata = ResponseMetadata::new();
    decode_into(&mut metadata, headers);
    metadata
}

/// Decode a header block, appending to existing metadata.
///
/// Trailers are merged into headers this way, so a key present in both keeps
/// the header values first.
pub fn decode_into(metadata: &mut ResponseMetadata, headers: &HeaderMap) {
    for (name, value) in headers {
        let key = name.as_str();
        if is_reserved_header(key) {
            continue;
        }

        let value = if key.ends_with(BINARY_SUFFIX) {
            MetadataValue::Binary(decode_binary(key, value))
        } else {
            MetadataValue::Text(String::from_utf8_lossy(value.as_bytes()).into_owned())
        };

        metadata.entry(key.to_string()).or_default().push(value);
    }
}

fn decode_binary(key: &str, value: &HeaderValue) -> Bytes {
    // Peers may or may not pad
    let raw = value.as_bytes();
    base64::engine::general_purpose::STANDARD_NO_PAD
        .decode(raw)
        .or_else(|_| base64::engine::general_purpose::STANDARD.decode(raw))
        .map(Bytes::from)
        .unwrap_or_else(|e| {
            tracing::debug!(key, error = %e, "binary metadata is not base64, keeping raw bytes");
            Bytes::copy_from_slice(raw)
        })
}
