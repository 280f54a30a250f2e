//! Caller-side description of a call.
//!
//! This module contains:
//! - [`RequestDescriptor`]: Everything needed to make one call
//! - [`RequestData`]: A single payload or a sequence of payloads
//! - [`Hooks`]: Callbacks run before sending and after completion

mod hooks;

use serde_json::Value;
use tokio_util::sync::CancellationToken;

pub use hooks::{AfterResponse, BeforeRequest, Hooks};

use crate::metadata::{MetadataMap, MetadataValue};
use crate::{CallOptions, LoaderOptions, ResponseEnvelope, TlsConfig};

/// Request payload.
///
/// A sequence is only meaningful for client-streaming methods.
#[derive(Clone, Debug, PartialEq)]
pub enum RequestData {
    Single(Value),
    Sequence(Vec<Value>),
}

impl Default for RequestData {
    fn default() -> Self {
        RequestData::Single(Value::Object(Default::default()))
    }
}

impl From<Value> for RequestData {
    /// JSON arrays become sequences, anything else a single payload.
    fn from(value: Value) -> Self {
        match value {
            Value::Array(items) => RequestData::Sequence(items),
            other => RequestData::Single(other),
        }
    }
}

impl From<Vec<Value>> for RequestData {
    fn from(items: Vec<Value>) -> Self {
        RequestData::Sequence(items)
    }
}

/// A single call: where to send it, what to send, and how.
///
/// Fields are public so a `before_request` hook can rewrite them.
///
/// # Example
///
/// ```
/// use cool_grpc::RequestDescriptor;
/// use serde_json::json;
///
/// let request = RequestDescriptor::new("localhost:50051", "helloworld.Greeter", "SayHello")
///     .data(json!({"name": "world"}))
///     .metadata("x-request-id", "abc-123");
///
/// assert_eq!(request.metadata.len(), 1);
/// ```
#[derive(Debug, Default)]
pub struct RequestDescriptor {
    /// `host:port` of the server.
    pub host: String,
    /// Package-qualified service name.
    pub service: String,
    /// Method name within the service.
    pub method: String,
    pub data: RequestData,
    pub metadata: MetadataMap,
    /// TLS settings; `None` or an empty config means plaintext.
    pub tls: Option<TlsConfig>,
    pub hooks: Hooks,
    /// Cancels the call while it is outstanding.
    pub cancellation: Option<CancellationToken>,
    pub call_options: CallOptions,
    pub loader_options: LoaderOptions,
}

impl RequestDescriptor {
    pub fn new(
        host: impl Into<String>,
        service: impl Into<String>,
        method: impl Into<String>,
    ) -> Self {
        Self {
            host: host.into(),
            service: service.into(),
            method: method.into(),
            ..Default::default()
        }
    }

    pub fn data(mut self, data: impl Into<RequestData>) -> Self {
        self.data = data.into();
        self
    }

    /// Add a metadata entry, replacing any previous value for the key.
    pub fn metadata(mut self, key: impl Into<String>, value: impl Into<MetadataValue>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    pub fn tls(mut self, tls: TlsConfig) -> Self {
        self.tls = Some(tls);
        self
    }

    pub fn before_request<F>(mut self, hook: F) -> Self
    where
        F: FnOnce(&mut RequestDescriptor) + Send + 'static,
    {
        self.hooks.before_request = Some(Box::new(hook));
        self
    }

    pub fn after_response<F>(mut self, hook: F) -> Self
    where
        F: FnOnce(&mut ResponseEnvelope) + Send + 'static,
    {
        self.hooks.after_response = Some(Box::new(hook));
        self
    }

    pub fn cancellation(mut self, token: CancellationToken) -> Self {
        self.cancellation = Some(token);
        self
    }

    pub fn call_options(mut self, options: CallOptions) -> Self {
        self.call_options = options;
        self
    }

    pub fn loader_options(mut self, options: LoaderOptions) -> Self {
        self.loader_options = options;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_request_data_from_value() {
        assert_eq!(
            RequestData::from(json!({"x": 1})),
            RequestData::Single(json!({"x": 1}))
        );
        assert_eq!(
            RequestData::from(json!([{"x": 1}, {"x": 2}])),
            RequestData::Sequence(vec![json!({"x": 1}), json!({"x": 2})])
        );
        assert_eq!(RequestData::default(), RequestData::Single(json!({})));
    }

    #[test]
    fn test_request_descriptor_builder() {
        let request = RequestDescriptor::new("localhost:1", "pkg.Svc", "Unary")
            .data(json!({"x": 1}))
            .metadata("a", "1")
            .metadata("a", "2")
            .before_request(|req| req.method = "Other".into());

        assert_eq!(request.host, "localhost:1");
        assert_eq!(request.metadata.len(), 1);
        assert_eq!(request.metadata["a"], MetadataValue::from("2"));
        assert!(request.hooks.before_request.is_some());
        assert!(request.hooks.after_response.is_none());
        assert!(request.tls.is_none());
    }
}
