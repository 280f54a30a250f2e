//! Builder for [`Dispatcher`].
//!
//! Provides a fluent API for configuring the default transport and the
//! settings every dispatched call inherits.

use std::sync::Arc;
use std::time::Duration;

use crate::client::Dispatcher;
use crate::transport::{HyperTransport, HyperTransportBuilder};

/// Builder for creating a [`Dispatcher`] over a [`HyperTransport`].
///
/// # Example
///
/// ```
/// use cool_grpc::DispatcherBuilder;
/// use std::time::Duration;
///
/// let dispatcher = DispatcherBuilder::new()
///     .default_timeout(Duration::from_secs(30))
///     .connect_timeout(Duration::from_secs(5))
///     .user_agent("my-tool/1.0")
///     .build();
///
/// assert_eq!(dispatcher.get_default_timeout(), Some(Duration::from_secs(30)));
/// ```
#[derive(Debug, Default)]
pub struct DispatcherBuilder {
    /// Transport settings.
    transport: HyperTransportBuilder,
    /// Timeout for calls that set none.
    default_timeout: Option<Duration>,
}

impl DispatcherBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the timeout applied to calls whose [`CallOptions`](crate::CallOptions)
    /// set none.
    pub fn default_timeout(mut self, timeout: Duration) -> Self {
        self.default_timeout = Some(timeout);
        self
    }

    /// Set the TCP connect timeout.
    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.transport = self.transport.connect_timeout(timeout);
        self
    }

    /// Set `TCP_NODELAY` on new connections.
    pub fn tcp_nodelay(mut self, enabled: bool) -> Self {
        self.transport = self.transport.tcp_nodelay(enabled);
        self
    }

    /// Set the HTTP/2 initial stream window size.
    pub fn h2_initial_stream_window_size(mut self, size: u32) -> Self {
        self.transport = self.transport.h2_initial_stream_window_size(size);
        self
    }

    /// Set the HTTP/2 initial connection window size.
    pub fn h2_initial_connection_window_size(mut self, size: u32) -> Self {
        self.transport = self.transport.h2_initial_connection_window_size(size);
        self
    }

    /// Send HTTP/2 PING frames at this interval.
    pub fn h2_keep_alive_interval(mut self, interval: Duration) -> Self {
        self.transport = self.transport.h2_keep_alive_interval(interval);
        self
    }

    /// Set the HTTP/2 keep-alive timeout.
    pub fn h2_keep_alive_timeout(mut self, timeout: Duration) -> Self {
        self.transport = self.transport.h2_keep_alive_timeout(timeout);
        self
    }

    /// Override the `user-agent` header.
    pub fn user_agent(mut self, user_agent: impl AsRef<str>) -> Self {
        self.transport = self.transport.user_agent(user_agent);
        self
    }

    /// Build the dispatcher.
    pub fn build(self) -> Dispatcher<HyperTransport> {
        Dispatcher::from_parts(Arc::new(self.transport.build()), self.default_timeout)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder_defaults() {
        let dispatcher = DispatcherBuilder::new().build();
        assert!(dispatcher.get_default_timeout().is_none());
    }

    #[test]
    fn test_builder_chaining() {
        let builder = DispatcherBuilder::new()
            .default_timeout(Duration::from_secs(1))
            .connect_timeout(Duration::from_millis(500))
            .tcp_nodelay(false)
            .h2_keep_alive_interval(Duration::from_secs(20));

        assert_eq!(builder.default_timeout, Some(Duration::from_secs(1)));
        let debug = format!("{builder:?}");
        assert!(debug.contains("tcp_nodelay: false"));
        assert!(debug.contains("500ms"));
    }
}
