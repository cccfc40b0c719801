//! Message schemas.
//!
//! The request pipeline only needs a small capability surface from a
//! schema, captured by [`MessageSchema`]. The gateway binds routes with
//! [`MessageType`], a type looked up from a [`DescriptorPool`] and backed by
//! `prost-reflect`: messages are [`DynamicMessage`]s, the binary codec and
//! the JSON mapping are the reflection crate's.

mod descriptor;
mod plain;
mod pool;
mod proto;
mod verify;

pub use descriptor::{
    EnumDescriptor, FieldDescriptor, FieldType, MessageDescriptor, MethodDescriptor,
    ServiceDescriptor,
};
pub use plain::{BytesFormat, EnumFormat, LongFormat, ToPlainOptions};
pub use pool::{DescriptorPool, DescriptorPoolBuilder, EnumType, MessageType};
pub use prost_reflect::{DynamicMessage, Value};

use prost::Message as _;

/// Errors raised by schema construction and message conversion.
#[derive(Clone, Debug, PartialEq, thiserror::Error)]
pub enum SchemaError {
    #[error("Type \"{0}\" not found")]
    TypeNotFound(String),

    #[error("Service \"{0}\" not found")]
    ServiceNotFound(String),

    #[error("duplicate definition of \"{0}\"")]
    DuplicateName(String),

    #[error("{message}: duplicate field number {number}")]
    DuplicateFieldNumber { message: String, number: u32 },

    #[error("{message}: duplicate field name \"{field}\"")]
    DuplicateFieldName { message: String, field: String },

    #[error("{message}.{field}: invalid field number {number}")]
    InvalidFieldNumber {
        message: String,
        field: String,
        number: u32,
    },

    #[error("{owner}: unresolved type \"{type_name}\"")]
    UnresolvedType { owner: String, type_name: String },

    #[error("package \"{0}\" imports itself through its field or method types")]
    ImportCycle(String),

    #[error("{0}")]
    Descriptor(String),

    /// A plain object value that does not fit its field.
    #[error("{0}")]
    Invalid(String),

    #[error("{0}")]
    Decode(String),

    #[error("{0}")]
    Encode(String),

    #[error("{0}: object expected")]
    ObjectExpected(String),

    #[error("{0}")]
    Plain(String),
}

impl From<prost::DecodeError> for SchemaError {
    fn from(err: prost::DecodeError) -> Self {
        SchemaError::Decode(err.to_string())
    }
}

/// The capability surface the request pipeline needs from a message schema.
///
/// A "plain object" is the schema-agnostic JSON rendering of a message, the
/// form implementations receive and return.
pub trait MessageSchema: Send + Sync + 'static {
    /// In-memory representation of a message of this schema.
    type Message: Send + Sync + 'static;

    /// Fully-qualified type name.
    fn full_name(&self) -> &str;

    /// Decode a message from its binary wire form.
    fn decode(&self, buf: &[u8]) -> Result<Self::Message, SchemaError>;

    /// Encode a message to its binary wire form.
    fn encode(&self, message: &Self::Message) -> Result<Vec<u8>, SchemaError>;

    /// Check a candidate message against the schema.
    ///
    /// Returns a human-readable reason when the candidate is invalid.
    fn verify(&self, message: &Self::Message) -> Option<String>;

    /// Build a message from a plain object.
    ///
    /// A value that does not fit its field fails here, with the same kind of
    /// reason [`verify`](Self::verify) gives.
    fn from_plain(&self, object: &serde_json::Value) -> Result<Self::Message, SchemaError>;

    /// Render a message as a plain object.
    fn to_plain(
        &self,
        message: &Self::Message,
        options: &ToPlainOptions,
    ) -> Result<serde_json::Value, SchemaError>;
}

impl MessageSchema for MessageType {
    type Message = DynamicMessage;

    fn full_name(&self) -> &str {
        MessageType::full_name(self)
    }

    fn decode(&self, buf: &[u8]) -> Result<DynamicMessage, SchemaError> {
        Ok(DynamicMessage::decode(self.reflect().clone(), buf)?)
    }

    fn encode(&self, message: &DynamicMessage) -> Result<Vec<u8>, SchemaError> {
        Ok(message.encode_to_vec())
    }

    fn verify(&self, message: &DynamicMessage) -> Option<String> {
        verify::verify(self, message)
    }

    fn from_plain(&self, object: &serde_json::Value) -> Result<DynamicMessage, SchemaError> {
        plain::from_plain(self, object)
    }

    fn to_plain(
        &self,
        message: &DynamicMessage,
        options: &ToPlainOptions,
    ) -> Result<serde_json::Value, SchemaError> {
        plain::to_plain(self, message, options)
    }
}
