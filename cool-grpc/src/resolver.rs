//! Method resolution.
//!
//! Turns a dotted service name and a method name into a [`MethodDescriptor`]:
//! the request and response codecs plus the stream direction of each side.

use std::collections::HashMap;
use std::sync::{PoisonError, RwLock};

use bytes::Bytes;
use prost::Message;
use prost_reflect::DynamicMessage;
use serde_json::Value;

use crate::{DispatchError, LoaderOptions, Schema};

/// The stream directions of a method.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum CallShape {
    Unary,
    ClientStreaming,
    ServerStreaming,
    BidiStreaming,
}

impl CallShape {
    pub fn from_flags(request_stream: bool, response_stream: bool) -> Self {
        match (request_stream, response_stream) {
            (false, false) => CallShape::Unary,
            (true, false) => CallShape::ClientStreaming,
            (false, true) => CallShape::ServerStreaming,
            (true, true) => CallShape::BidiStreaming,
        }
    }

    /// Short name used in logs and span fields.
    pub fn as_str(&self) -> &'static str {
        match self {
            CallShape::Unary => "unary",
            CallShape::ClientStreaming => "client_stream",
            CallShape::ServerStreaming => "server_stream",
            CallShape::BidiStreaming => "bidi_stream",
        }
    }
}

impl std::fmt::Display for CallShape {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A resolved method, ready to encode requests and decode responses.
#[derive(Clone, Debug)]
pub struct MethodDescriptor {
    method: prost_reflect::MethodDescriptor,
    path: String,
    options: LoaderOptions,
}

impl MethodDescriptor {
    fn new(method: prost_reflect::MethodDescriptor, options: LoaderOptions) -> Self {
        let path = format!("/{}/{}", method.parent_service().full_name(), method.name());
        Self {
            method,
            path,
            options,
        }
    }

    /// The HTTP/2 request path, `/{package}.{Service}/{Method}`.
    pub fn path(&self) -> &str {
        &self.path
    }

    /// The fully qualified method name, `{package}.{Service}.{Method}`.
    pub fn full_name(&self) -> &str {
        self.method.full_name()
    }

    pub fn request_stream(&self) -> bool {
        self.method.is_client_streaming()
    }

    pub fn response_stream(&self) -> bool {
        self.method.is_server_streaming()
    }

    pub fn shape(&self) -> CallShape {
        CallShape::from_flags(self.request_stream(), self.response_stream())
    }

    /// Get the reflection descriptor this was resolved from.
    pub fn descriptor(&self) -> &prost_reflect::MethodDescriptor {
        &self.method
    }

    /// Encode a JSON payload as the method's input message.
    ///
    /// # Errors
    ///
    /// Returns [`DispatchError::Serialization`] when the payload does not fit
    /// the input type.
    pub fn request_serialize(&self, value: &Value) -> Result<Bytes, DispatchError> {
        let message = DynamicMessage::deserialize_with_options(
            self.method.input(),
            value,
            &self.options.deserialize_options(),
        )
        .map_err(|e| DispatchError::Serialization(e.to_string()))?;
        Ok(Bytes::from(message.encode_to_vec()))
    }

    /// Decode one wire message of the method's output type into JSON.
    ///
    /// # Errors
    ///
    /// Returns [`DispatchError::Decode`] for bytes that are not a valid
    /// output message.
    pub fn response_deserialize(&self, bytes: &[u8]) -> Result<Value, DispatchError> {
        let message = DynamicMessage::decode(self.method.output(), bytes)
            .map_err(|e| DispatchError::Decode(e.to_string()))?;
        message
            .serialize_with_options(serde_json::value::Serializer, &self.options.serialize_options())
            .map_err(|e| DispatchError::Decode(e.to_string()))
    }
}

/// Split a dotted service name on its last dot into package and service.
///
/// A name without a dot has an empty package.
pub fn split_service_name(service: &str) -> (&str, &str) {
    service.rsplit_once('.').unwrap_or(("", service))
}

fn lookup(
    schema: &Schema,
    service: &str,
    method: &str,
) -> Result<prost_reflect::MethodDescriptor, DispatchError> {
    let unknown = || DispatchError::UnknownMethod {
        service: service.to_string(),
        method: method.to_string(),
    };

    let (package, name) = split_service_name(service);
    let qualified = if package.is_empty() {
        name.to_string()
    } else {
        format!("{package}.{name}")
    };

    schema
        .service(&qualified)
        .ok_or_else(unknown)?
        .methods()
        .find(|candidate| candidate.name() == method)
        .ok_or_else(unknown)
}

fn check_shape(resolved: MethodDescriptor) -> Result<MethodDescriptor, DispatchError> {
    if resolved.shape() == CallShape::BidiStreaming {
        return Err(DispatchError::UnsupportedCallShape {
            path: resolved.path().to_string(),
        });
    }
    Ok(resolved)
}

/// Resolve a method against a schema.
///
/// # Errors
///
/// Returns [`DispatchError::UnknownMethod`] when the service or method is not
/// in the schema, and [`DispatchError::UnsupportedCallShape`] for
/// bidirectional streaming methods.
pub fn resolve(
    schema: &Schema,
    service: &str,
    method: &str,
    options: LoaderOptions,
) -> Result<MethodDescriptor, DispatchError> {
    let found = lookup(schema, service, method)?;
    check_shape(MethodDescriptor::new(found, options))
}

/// A resolver that remembers lookups against one schema.
///
/// Descriptors are immutable, so cached entries are shared freely between
/// concurrent calls.
#[derive(Debug)]
pub struct MethodResolver {
    schema: Schema,
    cache: RwLock<HashMap<(String, String), prost_reflect::MethodDescriptor>>,
}

impl MethodResolver {
    pub fn new(schema: Schema) -> Self {
        Self {
            schema,
            cache: RwLock::new(HashMap::new()),
        }
    }

    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    /// Resolve a method, consulting the cache first.
    pub fn resolve(
        &self,
        service: &str,
        method: &str,
        options: LoaderOptions,
    ) -> Result<MethodDescriptor, DispatchError> {
        let key = (service.to_string(), method.to_string());

        let cached = self
            .cache
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&key)
            .cloned();

        let found = match cached {
            Some(found) => found,
            None => {
                let found = lookup(&self.schema, service, method)?;
                self.cache
                    .write()
                    .unwrap_or_else(PoisonError::into_inner)
                    .insert(key, found.clone());
                found
            }
        };

        check_shape(MethodDescriptor::new(found, options))
    }

    /// Number of cached methods.
    pub fn cached(&self) -> usize {
        self.cache
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use prost_types::field_descriptor_proto::{Label, Type};
    use prost_types::{
        DescriptorProto, FieldDescriptorProto, FileDescriptorProto, FileDescriptorSet,
        MethodDescriptorProto, ServiceDescriptorProto,
    };
    use serde_json::json;

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
            input_type: Some(".pkg.v1.Msg".into()),
            output_type: Some(".pkg.v1.Msg".into()),
            client_streaming: Some(client_streaming),
            server_streaming: Some(server_streaming),
            ..Default::default()
        }
    }

    fn schema() -> Schema {
        let file = FileDescriptorProto {
            name: Some("pkg/v1/test.proto".into()),
            package: Some("pkg.v1".into()),
            syntax: Some("proto3".into()),
            message_type: vec![DescriptorProto {
                name: Some("Msg".into()),
                field: vec![
                    field("x", "x", 1, Type::Int32),
                    field("big_num", "bigNum", 2, Type::Int64),
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
                ],
                ..Default::default()
            }],
            ..Default::default()
        };
        Schema::from_file_descriptor_set(FileDescriptorSet { file: vec![file] }).unwrap()
    }

    #[test]
    fn test_call_shape_from_flags() {
        assert_eq!(CallShape::from_flags(false, false), CallShape::Unary);
        assert_eq!(CallShape::from_flags(true, false), CallShape::ClientStreaming);
        assert_eq!(CallShape::from_flags(false, true), CallShape::ServerStreaming);
        assert_eq!(CallShape::from_flags(true, true), CallShape::BidiStreaming);
    }

    #[test]
    fn test_split_service_name() {
        assert_eq!(split_service_name("pkg.v1.Svc"), ("pkg.v1", "Svc"));
        assert_eq!(split_service_name("Svc"), ("", "Svc"));
    }

    #[test]
    fn test_resolve_shapes() {
        let schema = schema();
        let options = LoaderOptions::default();

        let unary = resolve(&schema, "pkg.v1.Svc", "Unary", options).unwrap();
        assert_eq!(unary.shape(), CallShape::Unary);
        assert_eq!(unary.path(), "/pkg.v1.Svc/Unary");
        assert_eq!(unary.full_name(), "pkg.v1.Svc.Unary");

        let collect = resolve(&schema, "pkg.v1.Svc", "Collect", options).unwrap();
        assert!(collect.request_stream());
        assert!(!collect.response_stream());

        let watch = resolve(&schema, "pkg.v1.Svc", "Watch", options).unwrap();
        assert_eq!(watch.shape(), CallShape::ServerStreaming);
    }

    #[test]
    fn test_resolve_rejects_bidi() {
        let err = resolve(&schema(), "pkg.v1.Svc", "Chat", LoaderOptions::default()).unwrap_err();
        assert!(
            matches!(err, DispatchError::UnsupportedCallShape { ref path } if path == "/pkg.v1.Svc/Chat")
        );
    }

    #[test]
    fn test_resolve_unknown() {
        let schema = schema();
        let options = LoaderOptions::default();

        assert!(matches!(
            resolve(&schema, "pkg.v1.Nope", "Unary", options),
            Err(DispatchError::UnknownMethod { .. })
        ));
        assert!(matches!(
            resolve(&schema, "pkg.v1.Svc", "Nope", options),
            Err(DispatchError::UnknownMethod { .. })
        ));
        assert!(matches!(
            resolve(&schema, "Svc", "Unary", options),
            Err(DispatchError::UnknownMethod { .. })
        ));
    }

    #[test]
    fn test_codec_round_trip() {
        let unary = resolve(&schema(), "pkg.v1.Svc", "Unary", LoaderOptions::default()).unwrap();

        let bytes = unary
            .request_serialize(&json!({"x": 5, "big_num": "7"}))
            .unwrap();
        let value = unary.response_deserialize(&bytes).unwrap();
        assert_eq!(value, json!({"x": 5, "big_num": "7"}));
    }

    #[test]
    fn test_codec_respects_loader_options() {
        let options = LoaderOptions::new().keep_case(false).longs_as_strings(false);
        let unary = resolve(&schema(), "pkg.v1.Svc", "Unary", options).unwrap();

        let bytes = unary.request_serialize(&json!({"bigNum": 3})).unwrap();
        let value = unary.response_deserialize(&bytes).unwrap();
        assert_eq!(value, json!({"x": 0, "bigNum": 3}));

        let skip_defaults = resolve(
            &schema(),
            "pkg.v1.Svc",
            "Unary",
            LoaderOptions::new().defaults(false),
        )
        .unwrap();
        assert_eq!(skip_defaults.response_deserialize(&[]).unwrap(), json!({}));
    }

    #[test]
    fn test_codec_errors() {
        let unary = resolve(&schema(), "pkg.v1.Svc", "Unary", LoaderOptions::default()).unwrap();

        assert!(matches!(
            unary.request_serialize(&json!({"x": "not a number"})),
            Err(DispatchError::Serialization(_))
        ));
        // Unknown fields are ignored by default
        assert!(unary.request_serialize(&json!({"missing": 1})).is_ok());

        let strict = resolve(
            &schema(),
            "pkg.v1.Svc",
            "Unary",
            LoaderOptions::new().deny_unknown_fields(true),
        )
        .unwrap();
        assert!(matches!(
            strict.request_serialize(&json!({"missing": 1})),
            Err(DispatchError::Serialization(_))
        ));

        assert!(matches!(
            unary.response_deserialize(&[0xff, 0xff]),
            Err(DispatchError::Decode(_))
        ));
    }

    #[test]
    fn test_method_resolver_caches() {
        let resolver = MethodResolver::new(schema());
        let options = LoaderOptions::default();

        resolver.resolve("pkg.v1.Svc", "Unary", options).unwrap();
        resolver.resolve("pkg.v1.Svc", "Unary", options).unwrap();
        assert_eq!(resolver.cached(), 1);

        assert!(resolver.resolve("pkg.v1.Svc", "Chat", options).is_err());
        assert!(resolver.resolve("pkg.v1.Svc", "Nope", options).is_err());
        assert_eq!(resolver.cached(), 2);
    }
}
