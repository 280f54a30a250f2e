//! Shared fixtures for integration tests.
#![allow(dead_code)]

use std::sync::{Arc, Mutex};
use std::time::Duration;

use bytes::Bytes;
use cool_grpc::transport::{
    CallEvent, CallHandle, CallRequest, ClientStreamHandle, EventSender, Transport,
};
use cool_grpc::{LoaderOptions, MethodDescriptor, Schema, Status, resolve};
use http::HeaderMap;
use prost::Message;
use prost_types::field_descriptor_proto::{Label, Type};
use prost_types::{
    DescriptorProto, FieldDescriptorProto, FileDescriptorProto, FileDescriptorSet,
    MethodDescriptorProto, ServiceDescriptorProto,
};
use serde_json::Value;
use tokio::sync::mpsc;

pub const SERVICE: &str = "pkg.Svc";

/// Route library logs to the test output. Safe to call from every test.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_max_level(tracing::Level::DEBUG)
        .with_test_writer()
        .try_init();
}

fn field(name: &str, json_name: &str, number: i32, ty: Type) -> FieldDescriptorProto {
    FieldDescriptorProto {
        name: Some(name.into()),
        json_name: Some(json_name.into()),
        number: Some(number),
        label: Some(Label::Optional as i32),
        r#type: Some(ty as i32),
        ..Default::default()
    }
}

fn method(name: &str, client_streaming: bool, server_streaming: bool) -> MethodDescriptorProto {
    MethodDescriptorProto {
        name: Some(name.into()),
        input_type: Some(".pkg.Msg".into()),
        output_type: Some(".pkg.Msg".into()),
        client_streaming: Some(client_streaming),
        server_streaming: Some(server_streaming),
        ..Default::default()
    }
}

/// `pkg.Svc` with one method per call shape, plus `Slow` and `Fail` for
/// server-side behavior, all on `pkg.Msg { int32 x; string text; int64 big_num }`.
pub fn descriptor_set() -> FileDescriptorSet {
    let file = FileDescriptorProto {
        name: Some("pkg/svc.proto".into()),
        package: Some("pkg".into()),
        syntax: Some("proto3".into()),
        message_type: vec![DescriptorProto {
            name: Some("Msg".into()),
            field: vec![
                field("x", "x", 1, Type::Int32),
                field("text", "text", 2, Type::String),
                field("big_num", "bigNum", 3, Type::Int64),
            ],
            ..Default::default()
        }],
        service: vec![ServiceDescriptorProto {
            name: Some("Svc".into()),
            method: vec![
                method("Unary", false, false),
                method("Collect", true, false),
                method("Watch", false, true),
                method("Chat", true, true),
                method("Slow", false, false),
                method("Fail", false, false),
            ],
            ..Default::default()
        }],
        ..Default::default()
    };
    FileDescriptorSet { file: vec![file] }
}

pub fn descriptor_set_bytes() -> Bytes {
    Bytes::from(descriptor_set().encode_to_vec())
}

pub fn schema() -> Schema {
    Schema::from_file_descriptor_set(descriptor_set()).unwrap()
}

pub fn method_of(name: &str) -> MethodDescriptor {
    resolve(&schema(), SERVICE, name, LoaderOptions::default()).unwrap()
}

pub fn encode(method: &str, value: &Value) -> Bytes {
    method_of(method).request_serialize(value).unwrap()
}

pub fn decode(method: &str, bytes: &[u8]) -> Value {
    method_of(method).response_deserialize(bytes).unwrap()
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CallKind {
    Unary,
    ClientStream,
    ServerStream,
}

/// What the mock saw of one call.
#[derive(Debug)]
pub struct RecordedCall {
    pub kind: CallKind,
    pub address: String,
    pub path: String,
    pub secure: bool,
    pub metadata: HeaderMap,
    pub timeout: Option<Duration>,
    pub messages: Vec<Bytes>,
    pub ended: bool,
    pub cancelled: bool,
}

#[derive(Clone, Debug)]
pub enum Behavior {
    /// Reply with the last request message, then an OK status.
    Echo,
    /// Emit these events in order once the request is complete.
    Script(Vec<CallEvent>),
    /// Never answer; fail with `CANCELLED` once cancelled.
    Hang,
}

/// A transport that records every call and answers from a [`Behavior`].
#[derive(Clone, Debug)]
pub struct MockTransport {
    behavior: Behavior,
    calls: Arc<Mutex<Vec<RecordedCall>>>,
}

impl MockTransport {
    pub fn new(behavior: Behavior) -> Self {
        Self {
            behavior,
            calls: Arc::default(),
        }
    }

    pub fn echo() -> Self {
        Self::new(Behavior::Echo)
    }

    pub fn calls(&self) -> std::sync::MutexGuard<'_, Vec<RecordedCall>> {
        self.calls.lock().unwrap()
    }

    pub fn call_count(&self) -> usize {
        self.calls().len()
    }

    fn record(&self, kind: CallKind, request: &CallRequest, messages: Vec<Bytes>) -> usize {
        let mut calls = self.calls();
        calls.push(RecordedCall {
            kind,
            address: request.address.clone(),
            path: request.path.clone(),
            secure: request.credentials.is_secure(),
            metadata: request.metadata.clone(),
            timeout: request.options.get_timeout(),
            ended: kind != CallKind::ClientStream,
            messages,
            cancelled: false,
        });
        calls.len() - 1
    }

    fn single(&self, kind: CallKind, request: CallRequest, message: Bytes) -> CallHandle {
        let index = self.record(kind, &request, vec![message.clone()]);
        let (events, handle) = CallHandle::channel();
        tokio::spawn(respond(
            self.behavior.clone(),
            self.calls.clone(),
            index,
            events,
            Some(message),
        ));
        handle
    }
}

impl Transport for MockTransport {
    fn unary_call(&self, request: CallRequest, message: Bytes) -> CallHandle {
        self.single(CallKind::Unary, request, message)
    }

    fn client_stream_call(&self, request: CallRequest) -> ClientStreamHandle {
        let index = self.record(CallKind::ClientStream, &request, Vec::new());
        let (writes, mut receiver) = mpsc::unbounded_channel::<Bytes>();
        let (events, call) = CallHandle::channel();
        let calls = self.calls.clone();
        let behavior = self.behavior.clone();

        tokio::spawn(async move {
            let mut last = None;
            while let Some(message) = receiver.recv().await {
                calls.lock().unwrap()[index].messages.push(message.clone());
                last = Some(message);
            }
            calls.lock().unwrap()[index].ended = true;
            respond(behavior, calls, index, events, last).await;
        });

        ClientStreamHandle::new(writes, call)
    }

    fn server_stream_call(&self, request: CallRequest, message: Bytes) -> CallHandle {
        self.single(CallKind::ServerStream, request, message)
    }
}

async fn respond(
    behavior: Behavior,
    calls: Arc<Mutex<Vec<RecordedCall>>>,
    index: usize,
    events: EventSender,
    last: Option<Bytes>,
) {
    match behavior {
        Behavior::Echo => {
            if let Some(message) = last {
                events.send(CallEvent::Message(message));
            }
            events.send(CallEvent::Status(Status::ok()));
            events.send(CallEvent::End);
        }
        Behavior::Script(script) => {
            for event in script {
                events.send(event);
            }
        }
        Behavior::Hang => {
            events.cancelled().await;
            calls.lock().unwrap()[index].cancelled = true;
            events.send(CallEvent::Error(Status::cancelled("Cancelled on client")));
        }
    }
}
