//! Plain definitions of messages, enums and services.
//!
//! These are assembled by the caller (or a schema compiler) and handed to
//! [`DescriptorPool::builder`](super::DescriptorPool::builder), which checks
//! them and makes them available for lookup.

use std::collections::BTreeMap;

/// Declared type of a message field.
///
/// Enum and message types are referenced by fully-qualified name. Scalar
/// kinds follow the protobuf scalar value types.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum FieldType {
    Double,
    Float,
    Int32,
    Int64,
    UInt32,
    UInt64,
    SInt32,
    SInt64,
    Fixed32,
    Fixed64,
    SFixed32,
    SFixed64,
    Bool,
    String,
    Bytes,
    Enum(String),
    Message(String),
}

impl FieldType {
    /// 64-bit integer types, rendered as strings in plain objects by default.
    pub fn is_long(&self) -> bool {
        matches!(
            self,
            FieldType::Int64
                | FieldType::UInt64
                | FieldType::SInt64
                | FieldType::Fixed64
                | FieldType::SFixed64
        )
    }

    /// Name used in verification messages and generated documents.
    pub fn type_name(&self) -> &str {
        match self {
            FieldType::Double => "double",
            FieldType::Float => "float",
            FieldType::Int32 => "int32",
            FieldType::Int64 => "int64",
            FieldType::UInt32 => "uint32",
            FieldType::UInt64 => "uint64",
            FieldType::SInt32 => "sint32",
            FieldType::SInt64 => "sint64",
            FieldType::Fixed32 => "fixed32",
            FieldType::Fixed64 => "fixed64",
            FieldType::SFixed32 => "sfixed32",
            FieldType::SFixed64 => "sfixed64",
            FieldType::Bool => "bool",
            FieldType::String => "string",
            FieldType::Bytes => "bytes",
            FieldType::Enum(name) | FieldType::Message(name) => name,
        }
    }
}

/// A single field of a message.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FieldDescriptor {
    pub name: String,
    pub number: u32,
    pub field_type: FieldType,
    pub repeated: bool,
    /// Name of the oneof this field belongs to, if any.
    pub oneof: Option<String>,
    pub comment: Option<String>,
}

impl FieldDescriptor {
    pub fn new<S: Into<String>>(name: S, number: u32, field_type: FieldType) -> Self {
        Self {
            name: name.into(),
            number,
            field_type,
            repeated: false,
            oneof: None,
            comment: None,
        }
    }

    /// Mark the field as repeated.
    pub fn repeated(mut self) -> Self {
        self.repeated = true;
        self
    }

    /// Place the field in the named oneof.
    pub fn in_oneof<S: Into<String>>(mut self, oneof: S) -> Self {
        self.oneof = Some(oneof.into());
        self
    }

    pub fn with_comment<S: Into<String>>(mut self, comment: S) -> Self {
        self.comment = Some(comment.into());
        self
    }
}

/// A message type definition.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MessageDescriptor {
    pub full_name: String,
    /// Fields in declaration order.
    pub fields: Vec<FieldDescriptor>,
    pub comment: Option<String>,
}

impl MessageDescriptor {
    pub fn new<S: Into<String>>(full_name: S) -> Self {
        Self {
            full_name: full_name.into(),
            fields: Vec::new(),
            comment: None,
        }
    }

    pub fn field(mut self, field: FieldDescriptor) -> Self {
        self.fields.push(field);
        self
    }

    pub fn with_comment<S: Into<String>>(mut self, comment: S) -> Self {
        self.comment = Some(comment.into());
        self
    }

    /// Names of the oneofs declared by this message, in first-use order.
    pub fn oneofs(&self) -> Vec<&str> {
        let mut names: Vec<&str> = Vec::new();
        for name in self.fields.iter().filter_map(|f| f.oneof.as_deref()) {
            if !names.contains(&name) {
                names.push(name);
            }
        }
        names
    }
}

/// An enum type definition.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EnumDescriptor {
    pub full_name: String,
    /// `(name, number)` pairs in declaration order.
    pub values: Vec<(String, i32)>,
    pub comment: Option<String>,
}

impl EnumDescriptor {
    pub fn new<S: Into<String>>(full_name: S) -> Self {
        Self {
            full_name: full_name.into(),
            values: Vec::new(),
            comment: None,
        }
    }

    pub fn value<S: Into<String>>(mut self, name: S, number: i32) -> Self {
        self.values.push((name.into(), number));
        self
    }

    pub fn with_comment<S: Into<String>>(mut self, comment: S) -> Self {
        self.comment = Some(comment.into());
        self
    }

    pub fn name_of(&self, number: i32) -> Option<&str> {
        self.values
            .iter()
            .find(|(_, n)| *n == number)
            .map(|(name, _)| name.as_str())
    }

    pub fn number_of(&self, name: &str) -> Option<i32> {
        self.values
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, number)| *number)
    }
}

/// One RPC method of a service.
///
/// `options` is the free-form option map attached to the method; transport
/// bindings are read from it (see [`TransportBinding`](crate::TransportBinding)).
#[derive(Clone, Debug, PartialEq)]
pub struct MethodDescriptor {
    pub name: String,
    pub request_type: String,
    pub response_type: String,
    pub options: BTreeMap<String, serde_json::Value>,
    pub comment: Option<String>,
}

impl MethodDescriptor {
    pub fn new<N, Req, Res>(name: N, request_type: Req, response_type: Res) -> Self
    where
        N: Into<String>,
        Req: Into<String>,
        Res: Into<String>,
    {
        Self {
            name: name.into(),
            request_type: request_type.into(),
            response_type: response_type.into(),
            options: BTreeMap::new(),
            comment: None,
        }
    }

    pub fn option<K, V>(mut self, key: K, value: V) -> Self
    where
        K: Into<String>,
        V: Into<serde_json::Value>,
    {
        self.options.insert(key.into(), value.into());
        self
    }

    pub fn with_comment<S: Into<String>>(mut self, comment: S) -> Self {
        self.comment = Some(comment.into());
        self
    }
}

/// A service definition: an ordered set of uniquely named methods.
#[derive(Clone, Debug, PartialEq)]
pub struct ServiceDescriptor {
    pub full_name: String,
    pub methods: Vec<MethodDescriptor>,
    pub comment: Option<String>,
}

impl ServiceDescriptor {
    pub fn new<S: Into<String>>(full_name: S) -> Self {
        Self {
            full_name: full_name.into(),
            methods: Vec::new(),
            comment: None,
        }
    }

    pub fn method(mut self, method: MethodDescriptor) -> Self {
        self.methods.push(method);
        self
    }

    pub fn with_comment<S: Into<String>>(mut self, comment: S) -> Self {
        self.comment = Some(comment.into());
        self
    }

    /// Short name (last path segment of the full name).
    pub fn name(&self) -> &str {
        short_name(&self.full_name)
    }
}

pub(crate) fn short_name(full_name: &str) -> &str {
    full_name.rsplit('.').next().unwrap_or(full_name)
}
