//! Call dispatcher.
//!
//! This module provides [`Dispatcher`], which turns a [`RequestDescriptor`]
//! into one gRPC call, and [`make_request`], the one-shot entry point that
//! loads the schema first.

use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use cool_grpc_core::Code;
use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;
use tracing::{Instrument, info_span};

use crate::builder::DispatcherBuilder;
use crate::request::AfterResponse;
use crate::transport::{CallEvent, CallHandle, CallRequest, HyperTransport, Transport};
use crate::{
    CallShape, DispatchError, MethodDescriptor, MethodResolver, RequestData, RequestDescriptor,
    ResponseAggregator, ResponseEnvelope, Schema, SchemaSource, build_credentials, metadata,
    resolve,
};

type CallResult = Result<ResponseEnvelope, DispatchError>;

/// Load the schema and make one call.
///
/// # Example
///
/// ```ignore
/// use cool_grpc::{RequestDescriptor, make_request};
/// use serde_json::json;
///
/// let request = RequestDescriptor::new("localhost:50051", "helloworld.Greeter", "SayHello")
///     .data(json!({"name": "world"}));
///
/// let response = make_request(["protos/helloworld.proto"], request).await?;
/// println!("{}", response.data.as_single().unwrap());
/// ```
pub async fn make_request<I, S>(sources: I, request: RequestDescriptor) -> CallResult
where
    I: IntoIterator<Item = S>,
    S: Into<SchemaSource>,
{
    let schema = Schema::load(sources).await?;
    Dispatcher::new().dispatch(&schema, request).await
}

/// Dispatches calls over a [`Transport`].
///
/// The dispatcher holds no per-call state; one instance can serve any number
/// of concurrent calls.
///
/// # Example
///
/// ```ignore
/// use cool_grpc::{Dispatcher, RequestDescriptor, Schema};
/// use std::time::Duration;
///
/// let schema = Schema::load(["protos/helloworld.proto"]).await?;
/// let dispatcher = Dispatcher::builder()
///     .default_timeout(Duration::from_secs(10))
///     .build();
///
/// let response = dispatcher
///     .dispatch(&schema, RequestDescriptor::new("localhost:50051", "helloworld.Greeter", "SayHello"))
///     .await?;
/// ```
#[derive(Debug)]
pub struct Dispatcher<T = HyperTransport> {
    transport: Arc<T>,
    /// Timeout for calls that set none.
    default_timeout: Option<Duration>,
}

impl<T> Clone for Dispatcher<T> {
    fn clone(&self) -> Self {
        Self {
            transport: self.transport.clone(),
            default_timeout: self.default_timeout,
        }
    }
}

impl Dispatcher<HyperTransport> {
    /// A dispatcher over a default [`HyperTransport`].
    pub fn new() -> Self {
        Self::builder().build()
    }

    /// Create a new [`DispatcherBuilder`].
    pub fn builder() -> DispatcherBuilder {
        DispatcherBuilder::new()
    }
}

impl Default for Dispatcher<HyperTransport> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Transport> Dispatcher<T> {
    /// A dispatcher over a custom transport.
    pub fn with_transport(transport: T) -> Self {
        Self::from_parts(Arc::new(transport), None)
    }

    pub(crate) fn from_parts(transport: Arc<T>, default_timeout: Option<Duration>) -> Self {
        Self {
            transport,
            default_timeout,
        }
    }

    /// Set the timeout used by calls that set none.
    pub fn default_timeout(mut self, timeout: Duration) -> Self {
        self.default_timeout = Some(timeout);
        self
    }

    pub fn get_default_timeout(&self) -> Option<Duration> {
        self.default_timeout
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Make one call against an already loaded schema.
    ///
    /// # Errors
    ///
    /// Fails with exactly one [`DispatchError`]: resolution and credential
    /// errors before anything is sent, metadata and payload errors before
    /// the call starts, and transport or decode errors once it runs.
    pub async fn dispatch(&self, schema: &Schema, request: RequestDescriptor) -> CallResult {
        let span = call_span(&request);
        async {
            let method = resolve(
                schema,
                &request.service,
                &request.method,
                request.loader_options,
            )?;
            self.run(method, request).await
        }
        .instrument(span)
        .await
    }

    /// Like [`dispatch`](Self::dispatch), reusing the resolver's cached
    /// method lookups.
    pub async fn dispatch_with(
        &self,
        resolver: &MethodResolver,
        request: RequestDescriptor,
    ) -> CallResult {
        let span = call_span(&request);
        async {
            let method =
                resolver.resolve(&request.service, &request.method, request.loader_options)?;
            self.run(method, request).await
        }
        .instrument(span)
        .await
    }

    async fn run(&self, method: MethodDescriptor, mut request: RequestDescriptor) -> CallResult {
        let shape = method.shape();
        tracing::Span::current().record("rpc.type", shape.as_str());
        tracing::debug!(path = method.path(), "method resolved");

        let credentials = build_credentials(request.tls.as_ref())?;
        tracing::debug!(secure = credentials.is_secure(), "credentials ready");

        let mut hooks = std::mem::take(&mut request.hooks);
        if let Some(before_request) = hooks.before_request.take() {
            before_request(&mut request);
        }
        let after_response = hooks
            .after_response
            .take()
            .or_else(|| request.hooks.after_response.take());

        let headers = metadata::encode(&request.metadata)?;

        let mut options = request.call_options;
        if options.timeout.is_none() {
            options.timeout = self.default_timeout;
        }

        let call = CallRequest {
            address: request.host,
            credentials,
            path: method.path().to_string(),
            metadata: headers,
            options,
        };

        let handle = match shape {
            CallShape::Unary => {
                let message = method.request_serialize(single_payload(&request.data, shape)?)?;
                self.transport.unary_call(call, message)
            }
            CallShape::ClientStreaming => {
                let messages = match &request.data {
                    RequestData::Single(value) => vec![method.request_serialize(value)?],
                    RequestData::Sequence(values) => values
                        .iter()
                        .map(|value| method.request_serialize(value))
                        .collect::<Result<Vec<Bytes>, _>>()?,
                };

                let mut stream = self.transport.client_stream_call(call);
                for message in messages {
                    if !stream.write(message) {
                        tracing::debug!("transport stopped accepting writes");
                        break;
                    }
                }
                stream.end();
                stream.into_call()
            }
            CallShape::ServerStreaming => {
                let message = method.request_serialize(single_payload(&request.data, shape)?)?;
                self.transport.server_stream_call(call, message)
            }
            CallShape::BidiStreaming => {
                return Err(DispatchError::UnsupportedCallShape {
                    path: method.path().to_string(),
                });
            }
        };
        tracing::debug!("call dispatched");

        let (completion, result) = oneshot::channel();
        let pump = EventPump {
            handle,
            aggregator: ResponseAggregator::new(shape),
            method,
            cancellation: request.cancellation.unwrap_or_default(),
            after_response,
        };
        tokio::spawn(pump.run(completion).in_current_span());

        result.await.unwrap_or_else(|_| {
            Err(DispatchError::transport(
                Code::Internal,
                "call ended without a result",
            ))
        })
    }
}

fn call_span(request: &RequestDescriptor) -> tracing::Span {
    info_span!(
        "rpc.call",
        rpc.service = %request.service,
        rpc.method = %request.method,
        rpc.type = tracing::field::Empty,
        otel.kind = "client",
    )
}

fn single_payload(data: &RequestData, shape: CallShape) -> Result<&serde_json::Value, DispatchError> {
    match data {
        RequestData::Single(value) => Ok(value),
        RequestData::Sequence(_) => Err(DispatchError::Serialization(format!(
            "a {shape} call takes a single payload, not a sequence"
        ))),
    }
}

/// Owns one call after it is dispatched and fulfills its result once.
struct EventPump {
    handle: CallHandle,
    aggregator: ResponseAggregator,
    method: MethodDescriptor,
    cancellation: CancellationToken,
    after_response: Option<AfterResponse>,
}

impl EventPump {
    async fn run(self, mut completion: oneshot::Sender<CallResult>) {
        let Self {
            mut handle,
            mut aggregator,
            method,
            cancellation,
            mut after_response,
        } = self;

        let mut cancel_requested = false;

        let outcome = loop {
            let event = tokio::select! {
                biased;
                _ = completion.closed() => {
                    tracing::debug!("caller went away, cancelling call");
                    handle.cancel();
                    return;
                }
                _ = cancellation.cancelled(), if !cancel_requested => {
                    tracing::debug!("cancellation requested");
                    cancel_requested = true;
                    handle.cancel();
                    continue;
                }
                event = handle.next_event() => event,
            };

            match event {
                Some(CallEvent::Metadata(headers)) => aggregator.on_metadata(&headers),
                Some(CallEvent::Message(raw)) => {
                    if let Err(err) =
                        aggregator.on_message(&raw, |bytes| method.response_deserialize(bytes))
                    {
                        handle.cancel();
                        break Err(err);
                    }
                }
                Some(CallEvent::Status(status)) => aggregator.on_status(&status),
                Some(CallEvent::End) => {
                    break aggregator.finish().map(|mut envelope| {
                        if let Some(after_response) = after_response.take() {
                            after_response(&mut envelope);
                        }
                        envelope
                    });
                }
                Some(CallEvent::Error(status)) => {
                    if aggregator.received() > 0 {
                        tracing::debug!(
                            discarded = aggregator.received(),
                            "dropping partial results of a failed call"
                        );
                    }
                    break Err(DispatchError::Transport(status));
                }
                None => {
                    break Err(DispatchError::transport(
                        Code::Internal,
                        "transport closed the call without a result",
                    ));
                }
            }
        };

        match &outcome {
            Ok(envelope) => tracing::debug!(size = envelope.size, "call completed"),
            Err(err) => tracing::debug!(code = %err.code(), error = %err, "call failed"),
        }
        if completion.send(outcome).is_err() {
            tracing::trace!("caller went away before the result arrived");
        }

        while let Some(event) = handle.try_next_event() {
            tracing::trace!(?event, "dropping event after completion");
        }
    }
}
