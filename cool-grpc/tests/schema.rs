//! Schema loading from disk and the one-shot `make_request` entry point.

mod common;

use std::io::Write;

use cool_grpc::{
    CallShape, Code, DispatchError, LoaderOptions, RequestDescriptor, Schema, SchemaSource,
    make_request, resolve,
};
use serde_json::json;

const GREETER_PROTO: &str = r#"
syntax = "proto3";

package helloworld;

service Greeter {
  rpc SayHello (HelloRequest) returns (HelloReply);
  rpc SayHelloStream (HelloRequest) returns (stream HelloReply);
}

message HelloRequest {
  string name = 1;
}

message HelloReply {
  string message = 1;
}
"#;

fn write_proto(dir: &tempfile::TempDir, name: &str, contents: &str) -> std::path::PathBuf {
    let path = dir.path().join(name);
    let mut file = std::fs::File::create(&path).unwrap();
    file.write_all(contents.as_bytes()).unwrap();
    path
}

#[tokio::test]
async fn test_load_proto_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_proto(&dir, "helloworld.proto", GREETER_PROTO);

    let schema = Schema::load([path]).await.unwrap();

    let method = resolve(&schema, "helloworld.Greeter", "SayHello", LoaderOptions::default())
        .unwrap();
    assert_eq!(method.path(), "/helloworld.Greeter/SayHello");
    assert_eq!(method.shape(), CallShape::Unary);

    let method = resolve(
        &schema,
        "helloworld.Greeter",
        "SayHelloStream",
        LoaderOptions::default(),
    )
    .unwrap();
    assert_eq!(method.shape(), CallShape::ServerStreaming);

    let bytes = method.request_serialize(&json!({"name": "world"})).unwrap();
    assert_eq!(bytes.as_ref(), b"\x0a\x05world");
}

#[tokio::test]
async fn test_load_proto_with_import() {
    let dir = tempfile::tempdir().unwrap();
    write_proto(
        &dir,
        "common.proto",
        "syntax = \"proto3\";\npackage common;\nmessage Empty {}\n",
    );
    let path = write_proto(
        &dir,
        "health.proto",
        "syntax = \"proto3\";\npackage health;\nimport \"common.proto\";\n\
         service Health { rpc Check (common.Empty) returns (common.Empty); }\n",
    );

    let schema = Schema::load([path]).await.unwrap();
    assert!(schema.resolve_method("health.Health.Check").is_some());
}

#[tokio::test]
async fn test_load_merges_sources() {
    let dir = tempfile::tempdir().unwrap();
    let greeter = write_proto(&dir, "helloworld.proto", GREETER_PROTO);

    let schema = Schema::load([
        SchemaSource::from(greeter),
        SchemaSource::DescriptorSet(common::descriptor_set_bytes()),
    ])
    .await
    .unwrap();

    assert!(schema.service("helloworld.Greeter").is_some());
    assert!(schema.service("pkg.Svc").is_some());
}

#[tokio::test]
async fn test_load_descriptor_set_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("svc.binpb");
    std::fs::write(&path, common::descriptor_set_bytes()).unwrap();

    let schema = Schema::load([path]).await.unwrap();
    assert!(schema.resolve_method("pkg.Svc.Unary").is_some());
}

#[tokio::test]
async fn test_load_errors() {
    let dir = tempfile::tempdir().unwrap();
    let broken = write_proto(&dir, "broken.proto", "syntax = \"proto3\";\nmessage {");

    let err = Schema::load([broken]).await.unwrap_err();
    assert!(matches!(err, DispatchError::SchemaLoad(_)));
    assert_eq!(err.code(), Code::FailedPrecondition);

    let err = Schema::load([dir.path().join("missing.proto")])
        .await
        .unwrap_err();
    assert!(matches!(err, DispatchError::SchemaLoad(_)));

    let err = Schema::load(Vec::<SchemaSource>::new()).await.unwrap_err();
    assert!(matches!(err, DispatchError::SchemaLoad(_)));
}

#[tokio::test]
async fn test_make_request_unknown_method() {
    let err = make_request(
        [SchemaSource::DescriptorSet(common::descriptor_set_bytes())],
        RequestDescriptor::new("localhost:1", "pkg.Svc", "Method"),
    )
    .await
    .unwrap_err();

    assert!(matches!(err, DispatchError::UnknownMethod { .. }));
}

#[tokio::test]
async fn test_make_request_unreachable_host() {
    // Grab a free port, then close it
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let address = listener.local_addr().unwrap().to_string();
    drop(listener);

    let err = make_request(
        [SchemaSource::DescriptorSet(common::descriptor_set_bytes())],
        RequestDescriptor::new(address, "pkg.Svc", "Unary").data(json!({"x": 1})),
    )
    .await
    .unwrap_err();

    assert_eq!(err.code(), Code::Unavailable);
}
