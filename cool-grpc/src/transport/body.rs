//! Request body types for HTTP transport.
//!
//! This module provides [`TransportBody`], the request body of a gRPC call:
//! one framed message for unary and server-streaming calls, or a stream of
//! framed messages for client-streaming calls.

use std::pin::Pin;
use std::task::{Context, Poll};

use bytes::Bytes;
use cool_grpc_core::{Status, wrap_envelope};
use futures::{Stream, StreamExt};
use http_body::{Body, Frame};
use pin_project_lite::pin_project;
use tokio::sync::mpsc;
use tokio_stream::wrappers::UnboundedReceiverStream;

pin_project! {
    /// A request body for gRPC calls.
    #[project = TransportBodyProj]
    pub enum TransportBody {
        /// Full request body with all data available.
        Full {
            data: Option<Bytes>,
        },
        /// Streaming request body from an async stream.
        Streaming {
            #[pin]
            stream: Pin<Box<dyn Stream<Item = Result<Bytes, Status>> + Send>>,
        },
    }
}

impl TransportBody {
    /// Create a body with the given data.
    pub fn full(data: Bytes) -> Self {
        TransportBody::Full { data: Some(data) }
    }

    /// Create a body carrying one framed message.
    pub fn message(payload: &[u8]) -> Self {
        Self::full(wrap_envelope(payload))
    }

    /// Create a streaming body from the given stream.
    pub fn streaming<S>(stream: S) -> Self
    where
        S: Stream<Item = Result<Bytes, Status>> + Send + 'static,
    {
        TransportBody::Streaming {
            stream: Box::pin(stream),
        }
    }

    /// Frame every message written to the channel; the body ends when the
    /// sender is dropped.
    pub fn from_receiver(receiver: mpsc::UnboundedReceiver<Bytes>) -> Self {
        Self::streaming(
            UnboundedReceiverStream::new(receiver).map(|payload| Ok(wrap_envelope(&payload))),
        )
    }
}

impl Body for TransportBody {
    type Data = Bytes;
    type Error = Status;

    fn poll_frame(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
    ) -> Poll<Option<Result<Frame<Self::Data>, Self::Error>>> {
        match self.project() {
            TransportBodyProj::Full { data } => {
                let result = data.take().map(|d| Ok(Frame::data(d)));
                Poll::Ready(result)
            }
            TransportBodyProj::Streaming { stream } => stream
                .poll_next(cx)
                .map(|item| item.map(|chunk| chunk.map(Frame::data))),
        }
    }

    fn is_end_stream(&self) -> bool {
        match self {
            TransportBody::Full { data } => data.is_none(),
            TransportBody::Streaming { .. } => false, // Can't know without polling
        }
    }

    fn size_hint(&self) -> http_body::SizeHint {
        match self {
            TransportBody::Full { data } => {
                http_body::SizeHint::with_exact(data.as_ref().map_or(0, |d| d.len() as u64))
            }
            TransportBody::Streaming { .. } => http_body::SizeHint::default(),
        }
    }
}

impl std::fmt::Debug for TransportBody {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TransportBody::Full { data } => f
                .debug_struct("TransportBody::Full")
                .field("data_len", &data.as_ref().map(|d| d.len()))
                .finish(),
            TransportBody::Streaming { .. } => write!(f, "TransportBody::Streaming"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use http_body_util::BodyExt;

    #[tokio::test]
    async fn test_message_body() {
        let mut body = TransportBody::message(b"hello");
        assert!(!body.is_end_stream());
        assert_eq!(body.size_hint().exact(), Some(10));

        let collected = Pin::new(&mut body).collect().await.unwrap();
        assert_eq!(collected.to_bytes(), wrap_envelope(b"hello"));
    }

    #[tokio::test]
    async fn test_streaming_body() {
        let chunks = vec![
            Ok(Bytes::from("chunk1")),
            Ok(Bytes::from("chunk2")),
            Ok(Bytes::from("chunk3")),
        ];
        let stream = futures::stream::iter(chunks);
        let mut body = TransportBody::streaming(stream);

        let collected = Pin::new(&mut body).collect().await.unwrap();
        assert_eq!(collected.to_bytes(), Bytes::from("chunk1chunk2chunk3"));
    }

    #[tokio::test]
    async fn test_body_from_receiver() {
        let (tx, rx) = mpsc::unbounded_channel();
        tx.send(Bytes::from_static(b"a")).unwrap();
        tx.send(Bytes::from_static(b"bc")).unwrap();
        drop(tx);

        let body = TransportBody::from_receiver(rx);
        let collected = body.collect().await.unwrap().to_bytes();

        let mut expected = wrap_envelope(b"a").to_vec();
        expected.extend_from_slice(&wrap_envelope(b"bc"));
        assert_eq!(collected, expected);
    }
}
