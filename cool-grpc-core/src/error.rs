//! gRPC status codes and types.
//!
//! This module provides the core status types used on the wire:
//! - [`Code`]: Canonical gRPC status codes
//! - [`Status`]: A code, message and trailing metadata
//! - [`EnvelopeError`]: Message framing errors

use std::str::FromStr;

use http::HeaderMap;
use percent_encoding::percent_decode_str;
use serde::{Serialize, Serializer};

/// Header carrying the numeric status code.
pub const GRPC_STATUS_HEADER: &str = "grpc-status";

/// Header carrying the percent-encoded status message.
pub const GRPC_MESSAGE_HEADER: &str = "grpc-message";

/// gRPC status codes, numbered as on the wire.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum Code {
    #[default]
    Ok = 0,
    Cancelled = 1,
    Unknown = 2,
    InvalidArgument = 3,
    DeadlineExceeded = 4,
    NotFound = 5,
    AlreadyExists = 6,
    PermissionDenied = 7,
    ResourceExhausted = 8,
    FailedPrecondition = 9,
    Aborted = 10,
    OutOfRange = 11,
    Unimplemented = 12,
    Internal = 13,
    Unavailable = 14,
    DataLoss = 15,
    Unauthenticated = 16,
}

impl Code {
    /// Get the canonical name of this code.
    pub fn as_str(&self) -> &'static str {
        match self {
            Code::Ok => "OK",
            Code::Cancelled => "CANCELLED",
            Code::Unknown => "UNKNOWN",
            Code::InvalidArgument => "INVALID_ARGUMENT",
            Code::DeadlineExceeded => "DEADLINE_EXCEEDED",
            Code::NotFound => "NOT_FOUND",
            Code::AlreadyExists => "ALREADY_EXISTS",
            Code::PermissionDenied => "PERMISSION_DENIED",
            Code::ResourceExhausted => "RESOURCE_EXHAUSTED",
            Code::FailedPrecondition => "FAILED_PRECONDITION",
            Code::Aborted => "ABORTED",
            Code::OutOfRange => "OUT_OF_RANGE",
            Code::Unimplemented => "UNIMPLEMENTED",
            Code::Internal => "INTERNAL",
            Code::Unavailable => "UNAVAILABLE",
            Code::DataLoss => "DATA_LOSS",
            Code::Unauthenticated => "UNAUTHENTICATED",
        }
    }

    /// Map a numeric code to a [`Code`].
    ///
    /// Values outside the canonical range map to [`Code::Unknown`].
    pub fn from_i32(value: i32) -> Code {
        match value {
            0 => Code::Ok,
            1 => Code::Cancelled,
            2 => Code::Unknown,
            3 => Code::InvalidArgument,
            4 => Code::DeadlineExceeded,
            5 => Code::NotFound,
            6 => Code::AlreadyExists,
            7 => Code::PermissionDenied,
            8 => Code::ResourceExhausted,
            9 => Code::FailedPrecondition,
            10 => Code::Aborted,
            11 => Code::OutOfRange,
            12 => Code::Unimplemented,
            13 => Code::Internal,
            14 => Code::Unavailable,
            15 => Code::DataLoss,
            16 => Code::Unauthenticated,
            _ => Code::Unknown,
        }
    }

    /// The numeric value sent in `grpc-status`.
    pub fn as_i32(&self) -> i32 {
        *self as i32
    }

    /// Map an HTTP status of a non-gRPC response to a code.
    ///
    /// Follows the table in the gRPC HTTP/2 protocol description.
    pub fn from_http_status(status: http::StatusCode) -> Code {
        match status.as_u16() {
            400 => Code::Internal,
            401 => Code::Unauthenticated,
            403 => Code::PermissionDenied,
            404 => Code::Unimplemented,
            429 | 502 | 503 | 504 => Code::Unavailable,
            _ => Code::Unknown,
        }
    }
}

impl std::fmt::Display for Code {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Codes serialize as their wire number.
impl Serialize for Code {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_i32(self.as_i32())
    }
}

/// Error returned when parsing a [`Code`] from a `grpc-status` value fails.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ParseCodeError(());

impl std::fmt::Display for ParseCodeError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "invalid grpc-status value")
    }
}

impl std::error::Error for ParseCodeError {}

impl FromStr for Code {
    type Err = ParseCodeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.trim()
            .parse::<i32>()
            .map(Code::from_i32)
            .map_err(|_| ParseCodeError(()))
    }
}

/// Message framing errors.
#[derive(Clone, Debug, thiserror::Error)]
pub enum EnvelopeError {
    /// Incomplete envelope header.
    #[error("incomplete envelope header: expected {expected} bytes, got {actual}")]
    IncompleteHeader { expected: usize, actual: usize },

    /// Invalid compressed-flag byte.
    #[error("invalid frame flags: 0x{0:02x}")]
    InvalidFlags(u8),

    /// The peer sent a compressed message; no decompressor is configured.
    #[error("received a compressed message but no compression was negotiated")]
    UnsupportedCompression,

    /// The message exceeds the configured receive limit.
    #[error("received message larger than max ({actual} vs. {limit})")]
    MessageTooLarge { actual: usize, limit: usize },
}

// ============================================================================
// Status
// ============================================================================

/// Final status of a call.
///
/// Holds the code and message from `grpc-status`/`grpc-message` and the
/// remaining trailing metadata.
///
/// # Example
///
/// ```
/// use cool_grpc_core::{Code, Status};
///
/// let status = Status::new(Code::NotFound, "user not found");
/// assert_eq!(status.code(), Code::NotFound);
/// assert_eq!(status.message(), "user not found");
/// assert_eq!(status.to_string(), "5 NOT_FOUND: user not found");
/// ```
#[derive(Clone, Debug, Default)]
pub struct Status {
    code: Code,
    message: String,
    metadata: HeaderMap,
}

impl Status {
    /// Create a new status with a code and message.
    pub fn new<S: Into<String>>(code: Code, message: S) -> Self {
        Self {
            code,
            message: message.into(),
            metadata: HeaderMap::new(),
        }
    }

    /// The OK status with an empty message.
    pub fn ok() -> Self {
        Self::default()
    }

    /// Attach trailing metadata.
    pub fn with_metadata(mut self, metadata: HeaderMap) -> Self {
        self.metadata = metadata;
        self
    }

    /// Read a status out of a trailer (or trailers-only header) block.
    ///
    /// Returns `None` when `grpc-status` is absent. An unparseable
    /// `grpc-status` yields [`Code::Unknown`]. The status headers are left in
    /// `metadata` untouched; decoding them away is the metadata bridge's job.
    pub fn from_header_map(headers: &HeaderMap) -> Option<Self> {
        let raw = headers.get(GRPC_STATUS_HEADER)?;
        let code = raw
            .to_str()
            .ok()
            .and_then(|s| s.parse::<Code>().ok())
            .unwrap_or(Code::Unknown);
        let message = headers
            .get(GRPC_MESSAGE_HEADER)
            .and_then(|v| v.to_str().ok())
            .map(|v| percent_decode_str(v).decode_utf8_lossy().into_owned())
            .unwrap_or_default();

        Some(Self {
            code,
            message,
            metadata: headers.clone(),
        })
    }

    /// Get the status code.
    pub fn code(&self) -> Code {
        self.code
    }

    /// Get the status message.
    pub fn message(&self) -> &str {
        &self.message
    }

    /// Get the trailing metadata.
    pub fn metadata(&self) -> &HeaderMap {
        &self.metadata
    }

    /// Whether the code is [`Code::Ok`].
    pub fn is_ok(&self) -> bool {
        self.code == Code::Ok
    }

    /// Create a cancelled status.
    pub fn cancelled<S: Into<String>>(message: S) -> Self {
        Self::new(Code::Cancelled, message)
    }

    /// Create a deadline exceeded status.
    pub fn deadline_exceeded<S: Into<String>>(message: S) -> Self {
        Self::new(Code::DeadlineExceeded, message)
    }

    /// Create a resource exhausted status.
    pub fn resource_exhausted<S: Into<String>>(message: S) -> Self {
        Self::new(Code::ResourceExhausted, message)
    }

    /// Create an internal status.
    pub fn internal<S: Into<String>>(message: S) -> Self {
        Self::new(Code::Internal, message)
    }

    /// Create an unavailable status.
    pub fn unavailable<S: Into<String>>(message: S) -> Self {
        Self::new(Code::Unavailable, message)
    }
}

impl From<EnvelopeError> for Status {
    fn from(err: EnvelopeError) -> Self {
        match err {
            EnvelopeError::MessageTooLarge { .. } => Status::resource_exhausted(err.to_string()),
            _ => Status::internal(err.to_string()),
        }
    }
}

impl std::fmt::Display for Status {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} {}: {}", self.code.as_i32(), self.code, self.message)
    }
}

impl std::error::Error for Status {}
