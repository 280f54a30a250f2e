//! Transport layer for dispatched calls.
//!
//! The dispatcher talks to the network only through the [`Transport`] trait:
//! three primitive call shapes on already-encoded message bytes, each
//! reporting back through a stream of [`CallEvent`]s.
//!
//! [`HyperTransport`] is the shipped implementation: gRPC over HTTP/2 using
//! hyper_util's legacy client, with TLS through rustls.
//!
//! # Feature Flags
//!
//! - `tls` (default) - Enables `tls-ring` + `tls-webpki-roots` for convenience
//! - `tls-ring` / `tls-aws-lc` - Crypto providers
//! - `tls-webpki-roots` / `tls-native-roots` - Default root certificates

mod body;
pub(crate) mod connector;
mod frame;
mod hyper;

use std::sync::Arc;

use bytes::Bytes;
use cool_grpc_core::Status;
use http::HeaderMap;
use tokio::sync::mpsc;
use tokio_util::sync::{CancellationToken, DropGuard};

pub use body::TransportBody;
pub use connector::has_tls_support;
pub use frame::{DEFAULT_MAX_RECEIVE_MESSAGE_SIZE, FrameDecoder};
pub use self::hyper::{HyperTransport, HyperTransportBuilder};

use crate::{CallOptions, Credentials};

/// Something that happened on a call.
#[derive(Clone, Debug)]
pub enum CallEvent {
    /// Response headers.
    Metadata(HeaderMap),
    /// One raw response message, unframed.
    Message(Bytes),
    /// The final status, trailers included.
    Status(Status),
    /// The call completed successfully. Terminal.
    End,
    /// The call failed. Terminal.
    Error(Status),
}

impl CallEvent {
    pub fn is_terminal(&self) -> bool {
        matches!(self, CallEvent::End | CallEvent::Error(_))
    }
}

/// What a transport needs to start a call.
#[derive(Clone, Debug)]
pub struct CallRequest {
    /// `host:port` of the server.
    pub address: String,
    pub credentials: Credentials,
    /// `/{package}.{Service}/{Method}`.
    pub path: String,
    /// Encoded request metadata.
    pub metadata: HeaderMap,
    pub options: CallOptions,
}

/// The producing half of a call's event stream, held by the transport.
#[derive(Clone, Debug)]
pub struct EventSender {
    events: mpsc::UnboundedSender<CallEvent>,
    cancel: CancellationToken,
}

impl EventSender {
    /// Deliver an event. Returns `false` once the handle is gone.
    pub fn send(&self, event: CallEvent) -> bool {
        self.events.send(event).is_ok()
    }

    /// Whether the caller asked to cancel.
    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Wait until the caller asks to cancel.
    pub async fn cancelled(&self) {
        self.cancel.cancelled().await
    }
}

/// The consuming half of a call's event stream.
///
/// Dropping the handle cancels the call.
#[derive(Debug)]
pub struct CallHandle {
    events: mpsc::UnboundedReceiver<CallEvent>,
    cancel: CancellationToken,
    _guard: DropGuard,
}

impl CallHandle {
    /// Create a connected sender and handle pair.
    pub fn channel() -> (EventSender, CallHandle) {
        let (tx, rx) = mpsc::unbounded_channel();
        let cancel = CancellationToken::new();
        let sender = EventSender {
            events: tx,
            cancel: cancel.clone(),
        };
        let handle = CallHandle {
            events: rx,
            _guard: cancel.clone().drop_guard(),
            cancel,
        };
        (sender, handle)
    }

    /// Wait for the next event. `None` once every sender is gone.
    pub async fn next_event(&mut self) -> Option<CallEvent> {
        self.events.recv().await
    }

    /// Take an already delivered event without waiting.
    pub fn try_next_event(&mut self) -> Option<CallEvent> {
        self.events.try_recv().ok()
    }

    /// Ask the transport to abandon the call.
    ///
    /// The transport answers with an [`CallEvent::Error`] carrying
    /// `CANCELLED` unless the call already finished.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }
}

/// A client-streaming call in progress.
#[derive(Debug)]
pub struct ClientStreamHandle {
    writes: Option<mpsc::UnboundedSender<Bytes>>,
    call: CallHandle,
}

impl ClientStreamHandle {
    pub fn new(writes: mpsc::UnboundedSender<Bytes>, call: CallHandle) -> Self {
        Self {
            writes: Some(writes),
            call,
        }
    }

    /// Queue one encoded message. Returns `false` after [`end`](Self::end)
    /// or once the transport stopped reading.
    pub fn write(&self, message: Bytes) -> bool {
        self.writes
            .as_ref()
            .is_some_and(|writes| writes.send(message).is_ok())
    }

    /// Signal end of stream.
    pub fn end(&mut self) {
        self.writes = None;
    }

    pub fn cancel(&self) {
        self.call.cancel();
    }

    pub async fn next_event(&mut self) -> Option<CallEvent> {
        self.call.next_event().await
    }

    /// Ends the stream and returns the event half.
    pub fn into_call(mut self) -> CallHandle {
        self.end();
        self.call
    }
}

/// The three primitive call shapes.
///
/// Implementations start the call and return immediately; everything that
/// follows arrives as events on the returned handle. A transport must finish
/// every call with exactly one terminal event, and must answer a cancel
/// request with `CANCELLED` if the call is still running.
///
/// Events must arrive in wire order: `Metadata` first, then `Message`s, then
/// the call's `Status`, then the terminal `End` or `Error`. The dispatcher
/// builds the response from what it has seen when `End` arrives and drops
/// anything sent after it, so a `Status` sent late leaves the response with
/// an `OK` code and an empty message.
pub trait Transport: Send + Sync + 'static {
    fn unary_call(&self, request: CallRequest, message: Bytes) -> CallHandle;

    fn client_stream_call(&self, request: CallRequest) -> ClientStreamHandle;

    fn server_stream_call(&self, request: CallRequest, message: Bytes) -> CallHandle;
}

impl<T: Transport + ?Sized> Transport for Arc<T> {
    fn unary_call(&self, request: CallRequest, message: Bytes) -> CallHandle {
        (**self).unary_call(request, message)
    }

    fn client_stream_call(&self, request: CallRequest) -> ClientStreamHandle {
        (**self).client_stream_call(request)
    }

    fn server_stream_call(&self, request: CallRequest, message: Bytes) -> CallHandle {
        (**self).server_stream_call(request, message)
    }
}
