//! Dispatcher error types.
//!
//! This module provides [`DispatchError`], the single error type returned by
//! every fallible dispatcher operation.

use cool_grpc_core::{Code, EnvelopeError, Status};

/// Errors that can occur while dispatching a call.
///
/// Every variant carries owned, cloneable data so a failure can be handed to
/// the caller and logged without giving up ownership.
#[derive(Clone, Debug, thiserror::Error)]
pub enum DispatchError {
    /// The schema could not be read, parsed or compiled.
    #[error("failed to load schema: {0}")]
    SchemaLoad(String),

    /// The service or method does not exist in the schema.
    #[error("unknown method {service}.{method}")]
    UnknownMethod { service: String, method: String },

    /// The method is bidirectional streaming.
    #[error("{path} is bidirectional streaming, which is not supported")]
    UnsupportedCallShape { path: String },

    /// TLS material was present but unusable.
    #[error("failed to build credentials: {0}")]
    CredentialConstruction(String),

    /// A request metadata entry could not be turned into a header.
    #[error("invalid metadata {key:?}: {reason}")]
    InvalidMetadata { key: String, reason: String },

    /// The request payload does not match the method's input type.
    #[error("failed to serialize request: {0}")]
    Serialization(String),

    /// A response message does not match the method's output type.
    #[error("failed to decode response: {0}")]
    Decode(String),

    /// The call failed on the wire or finished with a non-OK status.
    #[error("{0}")]
    Transport(Status),
}

impl DispatchError {
    /// Get the gRPC code that best describes this error.
    ///
    /// Pre-dispatch failures map onto the code a server would have used for
    /// the same mistake; [`DispatchError::Transport`] carries its own.
    pub fn code(&self) -> Code {
        match self {
            DispatchError::SchemaLoad(_) => Code::FailedPrecondition,
            DispatchError::UnknownMethod { .. } | DispatchError::UnsupportedCallShape { .. } => {
                Code::Unimplemented
            }
            DispatchError::CredentialConstruction(_) => Code::Unauthenticated,
            DispatchError::InvalidMetadata { .. } | DispatchError::Serialization(_) => {
                Code::InvalidArgument
            }
            DispatchError::Decode(_) => Code::Internal,
            DispatchError::Transport(status) => status.code(),
        }
    }

    /// Get the transport status, if this is a transport error.
    pub fn status(&self) -> Option<&Status> {
        match self {
            DispatchError::Transport(status) => Some(status),
            _ => None,
        }
    }

    /// Shorthand for a transport error with the given code and message.
    pub fn transport<S: Into<String>>(code: Code, message: S) -> Self {
        DispatchError::Transport(Status::new(code, message))
    }

    pub(crate) fn invalid_metadata<K: Into<String>, R: Into<String>>(key: K, reason: R) -> Self {
        DispatchError::InvalidMetadata {
            key: key.into(),
            reason: reason.into(),
        }
    }
}

impl From<Status> for DispatchError {
    fn from(status: Status) -> Self {
        DispatchError::Transport(status)
    }
}

impl From<EnvelopeError> for DispatchError {
    fn from(err: EnvelopeError) -> Self {
        DispatchError::Transport(err.into())
    }
}
