//! Call options for per-request configuration.
//!
//! This module provides [`CallOptions`], the settings a request passes
//! straight through to the transport.

use std::time::Duration;

/// Options for configuring individual RPC calls.
///
/// # Example
///
/// ```
/// use cool_grpc::CallOptions;
/// use std::time::Duration;
///
/// let options = CallOptions::new()
///     .timeout(Duration::from_secs(5))
///     .max_receive_message_size(4 * 1024 * 1024);
///
/// assert_eq!(options.get_timeout(), Some(Duration::from_secs(5)));
/// ```
#[derive(Debug, Clone, Default)]
pub struct CallOptions {
    /// Deadline for this call, measured from dispatch.
    pub(crate) timeout: Option<Duration>,
    /// Largest single response message accepted, in bytes.
    pub(crate) max_receive_message_size: Option<usize>,
}

impl CallOptions {
    /// Create new default call options.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the timeout for this call.
    ///
    /// The timeout is sent to the server in the `grpc-timeout` header and is
    /// also enforced locally: a call still running when it elapses fails with
    /// `DEADLINE_EXCEEDED`.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Get the configured timeout, if any.
    pub fn get_timeout(&self) -> Option<Duration> {
        self.timeout
    }

    /// Limit the size of any single response message.
    ///
    /// Larger messages fail the call with `RESOURCE_EXHAUSTED`.
    pub fn max_receive_message_size(mut self, limit: usize) -> Self {
        self.max_receive_message_size = Some(limit);
        self
    }

    /// Get the configured receive limit, if any.
    pub fn get_max_receive_message_size(&self) -> Option<usize> {
        self.max_receive_message_size
    }
}

/// Largest value allowed in `grpc-timeout` (8 digits).
const MAX_TIMEOUT_VALUE: u128 = 99_999_999;

/// Convert a Duration to the `grpc-timeout` header value.
///
/// Picks the most precise unit whose value fits in 8 digits. Returns `None`
/// when even hours overflow.
pub(crate) fn duration_to_grpc_timeout(duration: Duration) -> Option<String> {
    let secs = duration.as_secs() as u128;
    [
        (duration.as_nanos(), 'n'),
        (duration.as_micros(), 'u'),
        (duration.as_millis(), 'm'),
        (secs, 'S'),
        (secs / 60, 'M'),
        (secs / 3600, 'H'),
    ]
    .into_iter()
    .find(|(value, _)| *value <= MAX_TIMEOUT_VALUE)
    .map(|(value, unit)| format!("{value}{unit}"))
}
