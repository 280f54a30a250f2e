//! Hyper-based HTTP/2 transport.
//!
//! This module provides [`HyperTransport`], the gRPC transport built on
//! hyper_util's legacy client. Every call gets its own connection, secured
//! with the call's credentials.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use cool_grpc_core::{Code, Status};
use http::header::{CONTENT_TYPE, TE, USER_AGENT};
use http::{HeaderValue, Method, StatusCode, Uri, Version};
use http_body_util::BodyExt;
use hyper::body::Incoming;
use hyper_rustls::HttpsConnector;
use hyper_util::client::legacy::{Builder, Client, connect::HttpConnector};
use hyper_util::rt::{TokioExecutor, TokioTimer};
use tokio::sync::mpsc;
use tracing::Instrument;

use super::body::TransportBody;
use super::connector::{build_http_connector, build_https_connector};
use super::frame::FrameDecoder;
use super::{CallEvent, CallHandle, CallRequest, ClientStreamHandle, EventSender, Transport};
use crate::Credentials;
use crate::config::duration_to_grpc_timeout;

const GRPC_CONTENT_TYPE: &str = "application/grpc";
const GRPC_TIMEOUT_HEADER: &str = "grpc-timeout";

/// Settings shared by every connection the transport opens.
#[derive(Debug)]
struct Settings {
    connect_timeout: Option<Duration>,
    tcp_nodelay: bool,
    h2_initial_stream_window_size: Option<u32>,
    h2_initial_connection_window_size: Option<u32>,
    h2_keep_alive_interval: Option<Duration>,
    h2_keep_alive_timeout: Option<Duration>,
    user_agent: HeaderValue,
}

/// gRPC transport over HTTP/2.
///
/// # Example
///
/// ```
/// use cool_grpc::transport::HyperTransport;
/// use std::time::Duration;
///
/// let transport = HyperTransport::builder()
///     .connect_timeout(Duration::from_secs(5))
///     .build();
/// ```
#[derive(Clone, Debug)]
pub struct HyperTransport {
    settings: Arc<Settings>,
}

impl HyperTransport {
    /// Create a new transport builder.
    pub fn builder() -> HyperTransportBuilder {
        HyperTransportBuilder::new()
    }

    /// Create a new transport with default settings.
    pub fn new() -> Self {
        Self::builder().build()
    }

    fn start(&self, request: CallRequest, body: TransportBody) -> CallHandle {
        let (events, handle) = CallHandle::channel();
        let settings = self.settings.clone();
        tokio::spawn(run_call(settings, request, body, events).in_current_span());
        handle
    }
}

impl Default for HyperTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl Transport for HyperTransport {
    fn unary_call(&self, request: CallRequest, message: Bytes) -> CallHandle {
        self.start(request, TransportBody::message(&message))
    }

    fn client_stream_call(&self, request: CallRequest) -> ClientStreamHandle {
        let (writes, receiver) = mpsc::unbounded_channel();
        let call = self.start(request, TransportBody::from_receiver(receiver));
        ClientStreamHandle::new(writes, call)
    }

    fn server_stream_call(&self, request: CallRequest, message: Bytes) -> CallHandle {
        self.start(request, TransportBody::message(&message))
    }
}

/// Builder for [`HyperTransport`].
#[derive(Debug)]
pub struct HyperTransportBuilder {
    /// TCP connect timeout.
    connect_timeout: Option<Duration>,
    /// Disable Nagle's algorithm.
    tcp_nodelay: bool,
    /// HTTP/2 initial stream window size.
    h2_initial_stream_window_size: Option<u32>,
    /// HTTP/2 initial connection window size.
    h2_initial_connection_window_size: Option<u32>,
    /// HTTP/2 keep-alive interval.
    h2_keep_alive_interval: Option<Duration>,
    /// HTTP/2 keep-alive timeout.
    h2_keep_alive_timeout: Option<Duration>,
    /// `user-agent` header value.
    user_agent: Option<HeaderValue>,
}

impl Default for HyperTransportBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl HyperTransportBuilder {
    /// Create a new transport builder with default settings.
    pub fn new() -> Self {
        Self {
            connect_timeout: None,
            tcp_nodelay: true,
            h2_initial_stream_window_size: None,
            h2_initial_connection_window_size: None,
            h2_keep_alive_interval: None,
            h2_keep_alive_timeout: None,
            user_agent: None,
        }
    }

    /// Set the TCP connect timeout.
    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = Some(timeout);
        self
    }

    /// Set `TCP_NODELAY` on new connections.
    ///
    /// Default: true.
    pub fn tcp_nodelay(mut self, enabled: bool) -> Self {
        self.tcp_nodelay = enabled;
        self
    }

    /// Set the HTTP/2 initial stream window size.
    ///
    /// This controls flow control at the stream level.
    pub fn h2_initial_stream_window_size(mut self, size: u32) -> Self {
        self.h2_initial_stream_window_size = Some(size);
        self
    }

    /// Set the HTTP/2 initial connection window size.
    ///
    /// This controls flow control at the connection level.
    pub fn h2_initial_connection_window_size(mut self, size: u32) -> Self {
        self.h2_initial_connection_window_size = Some(size);
        self
    }

    /// Set the HTTP/2 keep-alive interval.
    ///
    /// If set, the transport will send HTTP/2 PING frames at this interval
    /// to detect dead connections during long streams.
    pub fn h2_keep_alive_interval(mut self, interval: Duration) -> Self {
        self.h2_keep_alive_interval = Some(interval);
        self
    }

    /// Set the HTTP/2 keep-alive timeout.
    ///
    /// Only effective if `h2_keep_alive_interval` is also set.
    pub fn h2_keep_alive_timeout(mut self, timeout: Duration) -> Self {
        self.h2_keep_alive_timeout = Some(timeout);
        self
    }

    /// Override the `user-agent` header.
    ///
    /// Values that are not valid header values are ignored.
    pub fn user_agent(mut self, user_agent: impl AsRef<str>) -> Self {
        match HeaderValue::from_str(user_agent.as_ref()) {
            Ok(value) => self.user_agent = Some(value),
            Err(_) => tracing::warn!("ignoring invalid user agent"),
        }
        self
    }

    /// Build the transport.
    pub fn build(self) -> HyperTransport {
        let user_agent = self.user_agent.unwrap_or_else(|| {
            HeaderValue::from_static(concat!("cool-grpc/", env!("CARGO_PKG_VERSION")))
        });

        HyperTransport {
            settings: Arc::new(Settings {
                connect_timeout: self.connect_timeout,
                tcp_nodelay: self.tcp_nodelay,
                h2_initial_stream_window_size: self.h2_initial_stream_window_size,
                h2_initial_connection_window_size: self.h2_initial_connection_window_size,
                h2_keep_alive_interval: self.h2_keep_alive_interval,
                h2_keep_alive_timeout: self.h2_keep_alive_timeout,
                user_agent,
            }),
        }
    }
}

/// A single-call client, plaintext or TLS.
enum Connection {
    Plain(Client<HttpConnector, TransportBody>),
    Tls(Client<HttpsConnector<HttpConnector>, TransportBody>),
}

impl Connection {
    fn new(settings: &Settings, credentials: &Credentials) -> Self {
        let builder = client_builder(settings);
        let http = build_http_connector(settings.connect_timeout, settings.tcp_nodelay);
        match credentials {
            Credentials::Insecure => Connection::Plain(builder.build(http)),
            Credentials::Secure(config) => {
                Connection::Tls(builder.build(build_https_connector(config, http)))
            }
        }
    }

    async fn request(
        &self,
        request: http::Request<TransportBody>,
    ) -> Result<http::Response<Incoming>, hyper_util::client::legacy::Error> {
        match self {
            Connection::Plain(client) => client.request(request).await,
            Connection::Tls(client) => client.request(request).await,
        }
    }
}

fn client_builder(settings: &Settings) -> Builder {
    let mut builder = Client::builder(TokioExecutor::new());

    builder.timer(TokioTimer::new());
    builder.pool_timer(TokioTimer::new());
    builder.http2_only(true);

    if let Some(size) = settings.h2_initial_stream_window_size {
        builder.http2_initial_stream_window_size(size);
    }

    if let Some(size) = settings.h2_initial_connection_window_size {
        builder.http2_initial_connection_window_size(size);
    }

    if let Some(interval) = settings.h2_keep_alive_interval {
        builder.http2_keep_alive_interval(interval);
        builder.http2_keep_alive_while_idle(true);
    }

    if let Some(timeout) = settings.h2_keep_alive_timeout {
        builder.http2_keep_alive_timeout(timeout);
    }

    builder
}

/// Drive one call to its terminal event.
async fn run_call(
    settings: Arc<Settings>,
    request: CallRequest,
    body: TransportBody,
    events: EventSender,
) {
    let deadline = request.options.timeout;

    let outcome = tokio::select! {
        biased;
        _ = events.cancelled() => Err(Status::cancelled("Cancelled on client")),
        result = with_deadline(deadline, exchange(&settings, request, body, &events)) => result,
    };

    match outcome {
        Ok(()) => {
            tracing::debug!("call completed");
            events.send(CallEvent::End);
        }
        Err(status) => {
            tracing::debug!(code = %status.code(), message = status.message(), "call failed");
            events.send(CallEvent::Error(status));
        }
    }
}

async fn with_deadline<F>(deadline: Option<Duration>, call: F) -> Result<(), Status>
where
    F: Future<Output = Result<(), Status>>,
{
    match deadline {
        Some(deadline) => tokio::time::timeout(deadline, call)
            .await
            .unwrap_or_else(|_| Err(Status::deadline_exceeded("Deadline exceeded"))),
        None => call.await,
    }
}

/// Send the request and turn the response into events.
///
/// Returns `Ok` only when the call ended with an OK status.
async fn exchange(
    settings: &Settings,
    request: CallRequest,
    body: TransportBody,
    events: &EventSender,
) -> Result<(), Status> {
    let CallRequest {
        address,
        credentials,
        path,
        metadata,
        options,
    } = request;

    let scheme = if credentials.is_secure() { "https" } else { "http" };
    let uri: Uri = format!("{scheme}://{address}{path}")
        .parse()
        .map_err(|e| Status::unavailable(format!("invalid address {address:?}: {e}")))?;

    let mut builder = http::Request::builder()
        .method(Method::POST)
        .uri(uri)
        .version(Version::HTTP_2)
        .header(CONTENT_TYPE, GRPC_CONTENT_TYPE)
        .header(TE, "trailers")
        .header(USER_AGENT, settings.user_agent.clone());

    if let Some(timeout) = options.timeout.and_then(duration_to_grpc_timeout) {
        builder = builder.header(GRPC_TIMEOUT_HEADER, timeout);
    }

    let mut http_request = builder
        .body(body)
        .map_err(|e| Status::internal(format!("failed to build request: {e}")))?;
    for (name, value) in &metadata {
        http_request.headers_mut().append(name.clone(), value.clone());
    }

    tracing::debug!(%address, %path, secure = credentials.is_secure(), "sending request");

    let connection = Connection::new(settings, &credentials);
    let response = connection
        .request(http_request)
        .await
        .map_err(request_error)?;

    let (parts, mut body) = response.into_parts();

    if parts.status != StatusCode::OK {
        return Err(Status::new(
            Code::from_http_status(parts.status),
            format!("unexpected HTTP status {}", parts.status),
        ));
    }

    // Trailers-only response
    if let Some(status) = Status::from_header_map(&parts.headers) {
        return report_status(status, events);
    }

    let is_grpc = parts
        .headers
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v.starts_with(GRPC_CONTENT_TYPE));
    if !is_grpc {
        return Err(Status::new(
            Code::Unknown,
            format!("unexpected content-type {:?}", parts.headers.get(CONTENT_TYPE)),
        ));
    }

    events.send(CallEvent::Metadata(parts.headers));

    let mut decoder = FrameDecoder::new(options.max_receive_message_size);
    let mut trailers = None;

    while let Some(frame) = body.frame().await {
        let frame =
            frame.map_err(|e| Status::unavailable(format!("failed to read response: {e}")))?;
        match frame.into_data() {
            Ok(data) => {
                decoder.push(data);
                while let Some(message) = decoder.next_message()? {
                    events.send(CallEvent::Message(message));
                }
            }
            Err(frame) => {
                if let Ok(received) = frame.into_trailers() {
                    trailers = Some(received);
                }
            }
        }
    }
    decoder.finish()?;

    let status = trailers
        .as_ref()
        .and_then(Status::from_header_map)
        .ok_or_else(|| Status::internal("server closed the stream without a status"))?;

    report_status(status, events)
}

/// `UNAVAILABLE` carrying the innermost cause of a failed request.
fn request_error(error: hyper_util::client::legacy::Error) -> Status {
    let mut message = format!("request failed: {error}");
    let root = std::iter::successors(std::error::Error::source(&error), |e| e.source()).last();
    if let Some(cause) = root {
        message.push_str(&format!(": {cause}"));
    }
    Status::unavailable(message)
}

fn report_status(status: Status, events: &EventSender) -> Result<(), Status> {
    events.send(CallEvent::Status(status.clone()));
    if status.is_ok() { Ok(()) } else { Err(status) }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder_defaults() {
        let builder = HyperTransportBuilder::new();
        assert!(builder.tcp_nodelay);
        assert!(builder.connect_timeout.is_none());
        assert!(builder.user_agent.is_none());
    }

    #[test]
    fn test_builder_h2_settings() {
        let builder = HyperTransportBuilder::new()
            .h2_initial_stream_window_size(1024 * 1024)
            .h2_initial_connection_window_size(2 * 1024 * 1024)
            .h2_keep_alive_interval(Duration::from_secs(10))
            .h2_keep_alive_timeout(Duration::from_secs(5));

        assert_eq!(builder.h2_initial_stream_window_size, Some(1024 * 1024));
        assert_eq!(builder.h2_initial_connection_window_size, Some(2 * 1024 * 1024));
        assert_eq!(builder.h2_keep_alive_interval, Some(Duration::from_secs(10)));
        assert_eq!(builder.h2_keep_alive_timeout, Some(Duration::from_secs(5)));
    }

    #[test]
    fn test_builder_user_agent() {
        let transport = HyperTransportBuilder::new().user_agent("custom/1.0").build();
        assert_eq!(transport.settings.user_agent, "custom/1.0");

        let transport = HyperTransportBuilder::new().user_agent("bad\nagent").build();
        assert!(
            transport
                .settings
                .user_agent
                .to_str()
                .unwrap()
                .starts_with("cool-grpc/")
        );
    }

    #[tokio::test]
    async fn test_connection_refused_is_unavailable() {
        // Grab a free port, then close it
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let address = listener.local_addr().unwrap().to_string();
        drop(listener);

        let transport = HyperTransport::new();
        let mut handle = transport.unary_call(
            CallRequest {
                address,
                credentials: Credentials::Insecure,
                path: "/pkg.Svc/Unary".into(),
                metadata: Default::default(),
                options: Default::default(),
            },
            Bytes::new(),
        );

        match handle.next_event().await {
            Some(CallEvent::Error(status)) => {
                assert_eq!(status.code(), Code::Unavailable);
                // Top-level hyper_util message plus the socket error
                assert!(status.message().matches(": ").count() >= 2, "{}", status.message());
            }
            other => panic!("expected an error event, got {other:?}"),
        }
    }
}
