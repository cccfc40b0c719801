//! # protogate
//!
//! A schema-driven gateway exposing RPC services over HTTP with
//! [Axum](https://github.com/tokio-rs/axum).
//!
//! Service and message definitions are loaded at runtime into a
//! [`DescriptorPool`](schema::DescriptorPool). Methods whose options carry an
//! `http.get`, `http.post`, `http.put` or `http.delete` path are exposed as
//! JSON/REST routes; every method is also reachable over a binary transport
//! carrying protobuf wire bytes. Both transports share one request pipeline:
//! decode, verify, invoke, verify, encode.
//!
//! ## Features
//!
//! - **Runtime schemas:** no code generation; services are bound from descriptors.
//! - **Plain implementations:** methods are `async` closures over `serde_json::Value`.
//! - **Uniform status reporting:** every response carries `Status` and `Status-Message` headers.
//! - **OpenAPI:** a document describing the bound routes, optionally served by the gateway.
//!
//! ## Getting Started
//!
//! See [`GatewayBuilder`] and the `action-gateway` binary in `protogate-examples`.

pub mod binding;
pub mod config;
pub mod gateway;
pub mod handler;
pub mod limits;
pub mod openapi;
pub mod schema;
pub mod transport;

pub use binding::{BodyPolicy, HttpMethod, TransportBinding, resolve_request_object};
pub use config::DEFAULT_DEFINITION_ENDPOINT;
pub use gateway::{BuildError, Gateway, GatewayBuilder, MethodEntry, RouteEntry};
pub use handler::{HandleResult, Implementation, Implementations, RequestHandler};
pub use limits::{DEFAULT_MAX_MESSAGE_SIZE, MessageLimits};
pub use openapi::{Components, Info, OpenApiDocument, Operation, Server, Tag};
pub use schema::{MessageSchema, SchemaError};
pub use transport::{STATUS_HEADER, STATUS_MESSAGE_HEADER};

// Re-export several crates
pub use protogate_core;
pub use prost;
pub use prost_reflect;
pub use serde_json;

pub mod prelude {
    //! A prelude for `protogate` providing the most common types.
    pub use crate::gateway::{BuildError, Gateway, GatewayBuilder};
    pub use crate::handler::{HandleResult, Implementations, RequestHandler};
    pub use crate::openapi::{Info, Server, Tag};
    pub use crate::schema::{
        DescriptorPool, EnumDescriptor, FieldDescriptor, FieldType, MessageDescriptor,
        MethodDescriptor, ServiceDescriptor, ToPlainOptions,
    };
    pub use protogate_core::{Code, RpcError};
}
