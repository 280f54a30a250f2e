//! Schema-driven gRPC call dispatch.
//!
//! This crate makes gRPC calls without generated code. A call is described
//! by a [`RequestDescriptor`] (target host, dotted service name, method name,
//! JSON payload, metadata and optional TLS material) and resolved against a
//! [`Schema`] loaded at runtime from `.proto` files or descriptor sets.
//!
//! ## Features
//!
//! - Unary calls
//! - Client streaming calls (the payload is a sequence of messages)
//! - Server streaming calls (the response is a sequence of messages)
//! - Plaintext or TLS transport, with optional client identity
//! - Request metadata, text and binary (`-bin`) values
//! - Cancellation through a [`CancellationToken`](tokio_util::sync::CancellationToken)
//!
//! Bidirectional streaming methods are rejected with
//! [`DispatchError::UnsupportedCallShape`].
//!
//! ## Example
//!
//! ```ignore
//! use cool_grpc::{RequestDescriptor, make_request};
//! use serde_json::json;
//!
//! let request = RequestDescriptor::new("localhost:50051", "helloworld.Greeter", "SayHello")
//!     .data(json!({"name": "world"}))
//!     .metadata("x-request-id", "abc-123");
//!
//! let response = make_request(["protos/helloworld.proto"], request).await?;
//!
//! println!("status: {}", response.status_code);
//! println!("data: {}", response.data.as_single().unwrap());
//! println!("bytes received: {}", response.size);
//! ```
//!
//! ## Server Streaming Example
//!
//! Every message is collected before the call resolves:
//!
//! ```ignore
//! use cool_grpc::{Dispatcher, RequestDescriptor, Schema};
//! use serde_json::json;
//!
//! let schema = Schema::load(["protos/items.proto"]).await?;
//! let dispatcher = Dispatcher::new();
//!
//! let response = dispatcher
//!     .dispatch(
//!         &schema,
//!         RequestDescriptor::new("localhost:50051", "items.v1.ItemService", "ListItems")
//!             .data(json!({"page_size": 10})),
//!     )
//!     .await?;
//!
//! for item in response.data.as_sequence().unwrap() {
//!     println!("item: {item}");
//! }
//! ```
//!
//! ## Client Streaming Example
//!
//! A JSON array is sent as one message per element, in order:
//!
//! ```ignore
//! let request = RequestDescriptor::new("localhost:50051", "math.Calculator", "Sum")
//!     .data(json!([{"value": 1}, {"value": 2}]));
//! ```
//!
//! ## TLS
//!
//! An absent or empty [`TlsConfig`] means plaintext HTTP/2. Anything else
//! builds rustls credentials:
//!
//! ```
//! use cool_grpc::TlsConfig;
//!
//! assert!(TlsConfig::new().is_empty());
//!
//! let tls = TlsConfig::new().root_certs("-----BEGIN CERTIFICATE-----\n...");
//! assert!(!tls.is_empty());
//! ```
//!
//! Without `root_certs` the default root store is used (webpki roots with
//! the default `tls` feature).
//!
//! ## Hooks
//!
//! ```ignore
//! let request = RequestDescriptor::new(host, service, method)
//!     .before_request(|request| {
//!         request.metadata.insert("authorization".into(), "Bearer token".into());
//!     })
//!     .after_response(|response| {
//!         tracing::info!(size = response.size, "call finished");
//!     });
//! ```
//!
//! ## Timeouts and Cancellation
//!
//! [`CallOptions::timeout`] is sent as `grpc-timeout` and enforced on the
//! client, failing with `DEADLINE_EXCEEDED`. Cancelling the request's token
//! while the call runs fails it with `CANCELLED`; cancelling after it
//! completed does nothing.
//!
//! ```
//! use cool_grpc::{CallOptions, RequestDescriptor};
//! use std::time::Duration;
//! use tokio_util::sync::CancellationToken;
//!
//! let token = CancellationToken::new();
//! let request = RequestDescriptor::new("localhost:50051", "pkg.Svc", "Method")
//!     .call_options(CallOptions::new().timeout(Duration::from_secs(5)))
//!     .cancellation(token.clone());
//! assert_eq!(request.call_options.get_timeout(), Some(Duration::from_secs(5)));
//! ```
//!
//! ## JSON Mapping
//!
//! [`LoaderOptions`] controls how payloads map to messages. The defaults keep
//! proto field names, render 64-bit integers and enums as strings, and emit
//! default values.
//!
//! ```
//! use cool_grpc::LoaderOptions;
//!
//! let options = LoaderOptions::new().keep_case(false);
//! assert!(!options.get_keep_case());
//! assert!(options.get_longs_as_strings());
//! ```
//!
//! ## Response
//!
//! ```
//! use cool_grpc::ResponseEnvelope;
//!
//! let envelope = ResponseEnvelope::default();
//! assert_eq!(envelope.size, 0);
//! assert!(envelope.metadata.is_empty());
//! ```
//!
//! ## Custom Transports
//!
//! The dispatcher talks to the network only through
//! [`Transport`](transport::Transport). [`Dispatcher::with_transport`]
//! accepts any implementation.

mod builder;
mod client;
pub mod config;
mod credentials;
mod error;
pub mod metadata;
pub mod request;
mod resolver;
pub mod response;
mod schema;
pub mod transport;

pub use builder::DispatcherBuilder;
pub use client::{Dispatcher, make_request};
pub use error::DispatchError;

// Re-export from config module
pub use config::{CallOptions, LoaderOptions};

pub use credentials::{
    CheckServerIdentity, Credentials, TlsConfig, TlsMaterial, VerifyOptions, build_credentials,
};

pub use metadata::{MetadataMap, MetadataValue, ResponseMetadata};

// Re-export from request module
pub use request::{Hooks, RequestData, RequestDescriptor};

pub use resolver::{CallShape, MethodDescriptor, MethodResolver, resolve, split_service_name};

// Re-export from response module
pub use response::{ResponseAggregator, ResponseData, ResponseEnvelope, aggregate};

pub use schema::{Schema, SchemaSource};

// Re-export transport types at the top level for convenience
pub use transport::{HyperTransport, HyperTransportBuilder};

// Re-export core types that users need
pub use cool_grpc_core::{Code, Status};
