//! The descriptor pool: a checked, immutable, name-indexed set of types.
//!
//! Definitions are checked here first so that mistakes are reported in
//! their own terms, then lowered into a [`prost_reflect::DescriptorPool`]
//! which backs every message operation.

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::Arc;

use prost_reflect::DynamicMessage;

use super::descriptor::{
    EnumDescriptor, FieldDescriptor, FieldType, MessageDescriptor, ServiceDescriptor, short_name,
};
use super::{SchemaError, proto};

/// Largest field number allowed by the wire format.
const MAX_FIELD_NUMBER: u32 = (1 << 29) - 1;

#[derive(Clone, Copy, Debug)]
enum Definition {
    Message(usize),
    Enum(usize),
}

struct PoolInner {
    reflect: prost_reflect::DescriptorPool,
    messages: Vec<MessageDescriptor>,
    enums: Vec<EnumDescriptor>,
    services: Vec<ServiceDescriptor>,
    names: HashMap<String, Definition>,
    service_names: HashMap<String, usize>,
}

/// An immutable set of message, enum and service definitions.
///
/// Cloning is cheap; all clones share the same definitions.
///
/// # Example
///
/// ```
/// use protogate::schema::{DescriptorPool, FieldDescriptor, FieldType, MessageDescriptor};
///
/// let pool = DescriptorPool::builder()
///     .message(
///         MessageDescriptor::new("ActionRequest")
///             .field(FieldDescriptor::new("random", 1, FieldType::UInt32)),
///     )
///     .build()
///     .unwrap();
///
/// let ty = pool.lookup_message("ActionRequest").unwrap();
/// assert_eq!(ty.fields().len(), 1);
/// assert!(pool.lookup_message("Missing").is_err());
/// ```
#[derive(Clone)]
pub struct DescriptorPool {
    inner: Arc<PoolInner>,
}

impl DescriptorPool {
    pub fn builder() -> DescriptorPoolBuilder {
        DescriptorPoolBuilder::default()
    }

    /// Find a message type by fully-qualified name (a leading `.` is accepted).
    pub fn get_message_by_name(&self, name: &str) -> Option<MessageType> {
        match self.inner.names.get(normalize(name)) {
            Some(Definition::Message(index)) => self.message_at(*index),
            _ => None,
        }
    }

    /// Like [`get_message_by_name`](Self::get_message_by_name), failing with a
    /// descriptive error.
    pub fn lookup_message(&self, name: &str) -> Result<MessageType, SchemaError> {
        self.get_message_by_name(name)
            .ok_or_else(|| SchemaError::TypeNotFound(name.to_string()))
    }

    pub fn get_enum_by_name(&self, name: &str) -> Option<EnumType> {
        match self.inner.names.get(normalize(name)) {
            Some(Definition::Enum(index)) => Some(EnumType {
                pool: self.clone(),
                index: *index,
            }),
            _ => None,
        }
    }

    /// Find a service by fully-qualified name.
    pub fn lookup_service(&self, name: &str) -> Result<&ServiceDescriptor, SchemaError> {
        self.inner
            .service_names
            .get(normalize(name))
            .map(|index| &self.inner.services[*index])
            .ok_or_else(|| SchemaError::ServiceNotFound(name.to_string()))
    }

    pub fn services(&self) -> &[ServiceDescriptor] {
        &self.inner.services
    }

    pub fn messages(&self) -> impl Iterator<Item = MessageType> + '_ {
        (0..self.inner.messages.len()).filter_map(|index| self.message_at(index))
    }

    /// The reflection pool every message type is backed by.
    pub fn reflect(&self) -> &prost_reflect::DescriptorPool {
        &self.inner.reflect
    }

    fn message_at(&self, index: usize) -> Option<MessageType> {
        let definition = self.inner.messages.get(index)?;
        let descriptor = self.inner.reflect.get_message_by_name(&definition.full_name)?;
        Some(MessageType {
            pool: self.clone(),
            index,
            descriptor,
        })
    }

    fn same_pool(&self, other: &DescriptorPool) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl fmt::Debug for DescriptorPool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DescriptorPool")
            .field("messages", &self.inner.messages.len())
            .field("enums", &self.inner.enums.len())
            .field("services", &self.inner.services.len())
            .finish()
    }
}

fn normalize(name: &str) -> &str {
    name.strip_prefix('.').unwrap_or(name)
}

/// Collects definitions and checks them in [`build`](Self::build).
#[derive(Debug, Default)]
pub struct DescriptorPoolBuilder {
    messages: Vec<MessageDescriptor>,
    enums: Vec<EnumDescriptor>,
    services: Vec<ServiceDescriptor>,
}

impl DescriptorPoolBuilder {
    pub fn message(mut self, message: MessageDescriptor) -> Self {
        self.messages.push(message);
        self
    }

    pub fn enumeration(mut self, enumeration: EnumDescriptor) -> Self {
        self.enums.push(enumeration);
        self
    }

    pub fn service(mut self, service: ServiceDescriptor) -> Self {
        self.services.push(service);
        self
    }

    /// Check every definition and freeze the pool.
    ///
    /// Fails on duplicate type, service, method or field names, duplicate or
    /// out-of-range field numbers, and references to undefined types. Each
    /// package becomes one proto3 file, so packages may not import each
    /// other in a cycle, and enum value names share their package scope.
    pub fn build(self) -> Result<DescriptorPool, SchemaError> {
        let Self {
            mut messages,
            mut enums,
            mut services,
        } = self;

        for message in &mut messages {
            message.full_name = normalize(&message.full_name).to_string();
        }
        for enumeration in &mut enums {
            enumeration.full_name = normalize(&enumeration.full_name).to_string();
        }
        for service in &mut services {
            service.full_name = normalize(&service.full_name).to_string();
        }

        let mut names = HashMap::new();
        for (index, message) in messages.iter().enumerate() {
            if names
                .insert(message.full_name.clone(), Definition::Message(index))
                .is_some()
            {
                return Err(SchemaError::DuplicateName(message.full_name.clone()));
            }
        }
        for (index, enumeration) in enums.iter().enumerate() {
            if names
                .insert(enumeration.full_name.clone(), Definition::Enum(index))
                .is_some()
            {
                return Err(SchemaError::DuplicateName(enumeration.full_name.clone()));
            }
        }

        for message in &messages {
            check_fields(message)?;
            for field in &message.fields {
                resolve_field(&names, message, field)?;
            }
        }

        let mut service_names = HashMap::new();
        for (index, service) in services.iter().enumerate() {
            if service_names
                .insert(service.full_name.clone(), index)
                .is_some()
            {
                return Err(SchemaError::DuplicateName(service.full_name.clone()));
            }

            let mut method_names = HashSet::new();
            for method in &service.methods {
                let owner = format!("{}.{}", service.full_name, method.name);
                if !method_names.insert(method.name.as_str()) {
                    return Err(SchemaError::DuplicateName(owner));
                }
                for type_name in [&method.request_type, &method.response_type] {
                    if !matches!(
                        names.get(normalize(type_name)),
                        Some(Definition::Message(_))
                    ) {
                        return Err(SchemaError::UnresolvedType {
                            owner,
                            type_name: type_name.clone(),
                        });
                    }
                }
            }
        }

        let files = proto::file_descriptor_set(&messages, &enums, &services)?;
        let reflect = prost_reflect::DescriptorPool::from_file_descriptor_set(files)
            .map_err(|err| SchemaError::Descriptor(err.to_string()))?;

        Ok(DescriptorPool {
            inner: Arc::new(PoolInner {
                reflect,
                messages,
                enums,
                services,
                names,
                service_names,
            }),
        })
    }
}

fn check_fields(message: &MessageDescriptor) -> Result<(), SchemaError> {
    let mut numbers = HashSet::new();
    let mut field_names = HashSet::new();
    for field in &message.fields {
        if field.number == 0 || field.number > MAX_FIELD_NUMBER {
            return Err(SchemaError::InvalidFieldNumber {
                message: message.full_name.clone(),
                field: field.name.clone(),
                number: field.number,
            });
        }
        if !numbers.insert(field.number) {
            return Err(SchemaError::DuplicateFieldNumber {
                message: message.full_name.clone(),
                number: field.number,
            });
        }
        if !field_names.insert(field.name.as_str()) {
            return Err(SchemaError::DuplicateFieldName {
                message: message.full_name.clone(),
                field: field.name.clone(),
            });
        }
    }
    Ok(())
}

fn resolve_field(
    names: &HashMap<String, Definition>,
    message: &MessageDescriptor,
    field: &FieldDescriptor,
) -> Result<(), SchemaError> {
    let unresolved = |type_name: &str| SchemaError::UnresolvedType {
        owner: format!("{}.{}", message.full_name, field.name),
        type_name: type_name.to_string(),
    };
    match &field.field_type {
        FieldType::Message(type_name) => match names.get(normalize(type_name)) {
            Some(Definition::Message(_)) => Ok(()),
            _ => Err(unresolved(type_name)),
        },
        FieldType::Enum(type_name) => match names.get(normalize(type_name)) {
            Some(Definition::Enum(_)) => Ok(()),
            _ => Err(unresolved(type_name)),
        },
        _ => Ok(()),
    }
}

/// Handle to a message type inside a [`DescriptorPool`].
#[derive(Clone)]
pub struct MessageType {
    pool: DescriptorPool,
    index: usize,
    descriptor: prost_reflect::MessageDescriptor,
}

impl MessageType {
    /// The definition this type was built from.
    pub fn descriptor(&self) -> &MessageDescriptor {
        &self.pool.inner.messages[self.index]
    }

    /// The reflection descriptor messages of this type are built against.
    pub fn reflect(&self) -> &prost_reflect::MessageDescriptor {
        &self.descriptor
    }

    pub fn full_name(&self) -> &str {
        &self.descriptor().full_name
    }

    /// Short name (last path segment of the full name).
    pub fn name(&self) -> &str {
        short_name(self.full_name())
    }

    /// Fields in declaration order.
    pub fn fields(&self) -> &[FieldDescriptor] {
        &self.descriptor().fields
    }

    pub fn field_by_name(&self, name: &str) -> Option<&FieldDescriptor> {
        self.fields().iter().find(|f| f.name == name)
    }

    pub fn field_by_number(&self, number: u32) -> Option<&FieldDescriptor> {
        self.fields().iter().find(|f| f.number == number)
    }

    /// Message type of the field at `index`, if it is a message field.
    pub(crate) fn message_target(&self, index: usize) -> Option<MessageType> {
        match &self.fields().get(index)?.field_type {
            FieldType::Message(name) => self.pool.get_message_by_name(name),
            _ => None,
        }
    }

    /// Enum type of the field at `index`, if it is an enum field.
    pub(crate) fn enum_target(&self, index: usize) -> Option<EnumType> {
        match &self.fields().get(index)?.field_type {
            FieldType::Enum(name) => self.pool.get_enum_by_name(name),
            _ => None,
        }
    }

    /// Message type of the named field, if it is a message field.
    pub fn field_message_type(&self, name: &str) -> Option<MessageType> {
        let index = self.fields().iter().position(|f| f.name == name)?;
        self.message_target(index)
    }

    /// Enum type of the named field, if it is an enum field.
    pub fn field_enum_type(&self, name: &str) -> Option<EnumType> {
        let index = self.fields().iter().position(|f| f.name == name)?;
        self.enum_target(index)
    }

    /// A new message of this type with no fields set.
    pub fn new_message(&self) -> DynamicMessage {
        DynamicMessage::new(self.descriptor.clone())
    }

    pub fn pool(&self) -> &DescriptorPool {
        &self.pool
    }
}

impl PartialEq for MessageType {
    fn eq(&self, other: &Self) -> bool {
        self.index == other.index && self.pool.same_pool(&other.pool)
    }
}

impl fmt::Debug for MessageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("MessageType").field(&self.full_name()).finish()
    }
}

/// Handle to an enum type inside a [`DescriptorPool`].
#[derive(Clone)]
pub struct EnumType {
    pool: DescriptorPool,
    index: usize,
}

impl EnumType {
    pub fn descriptor(&self) -> &EnumDescriptor {
        &self.pool.inner.enums[self.index]
    }

    pub fn full_name(&self) -> &str {
        &self.descriptor().full_name
    }

    pub fn name_of(&self, number: i32) -> Option<&str> {
        self.descriptor().name_of(number)
    }

    pub fn number_of(&self, name: &str) -> Option<i32> {
        self.descriptor().number_of(name)
    }

    /// The first declared value (the proto3 default).
    pub fn default_number(&self) -> i32 {
        self.descriptor().values.first().map(|(_, n)| *n).unwrap_or(0)
    }
}

impl fmt::Debug for EnumType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("EnumType").field(&self.full_name()).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use prost_reflect::ReflectMessage;
    use crate::schema::MethodDescriptor;

    fn base() -> DescriptorPoolBuilder {
        DescriptorPool::builder()
            .enumeration(EnumDescriptor::new("test.Color").value("RED", 0).value("BLUE", 1))
            .message(
                MessageDescriptor::new("test.Inner")
                    .field(FieldDescriptor::new("color", 1, FieldType::Enum("test.Color".into()))),
            )
            .message(
                MessageDescriptor::new("test.Outer")
                    .field(FieldDescriptor::new(
                        "inner",
                        1,
                        FieldType::Message(".test.Inner".into()),
                    ))
                    .field(FieldDescriptor::new("tags", 2, FieldType::String).repeated()),
            )
    }

    #[test]
    fn test_lookup() {
        let pool = base().build().unwrap();
        let outer = pool.lookup_message("test.Outer").unwrap();
        assert_eq!(outer.name(), "Outer");
        assert_eq!(outer.field_by_number(2).unwrap().name, "tags");
        assert_eq!(
            outer.field_message_type("inner").unwrap().full_name(),
            "test.Inner"
        );
        assert!(outer.field_message_type("tags").is_none());

        let inner = pool.lookup_message(".test.Inner").unwrap();
        assert_eq!(inner.field_enum_type("color").unwrap().name_of(1), Some("BLUE"));
        assert!(pool.get_enum_by_name("test.Color").is_some());
        assert!(pool.get_message_by_name("test.Color").is_none());
    }

    #[test]
    fn test_reflection_pool() {
        let pool = base()
            .service(
                crate::schema::ServiceDescriptor::new("test.Svc")
                    .method(MethodDescriptor::new("Do", "test.Inner", "test.Outer")),
            )
            .build()
            .unwrap();

        let outer = pool.lookup_message("test.Outer").unwrap();
        assert_eq!(outer.reflect().full_name(), "test.Outer");
        let tags = outer.reflect().get_field_by_name("tags").unwrap();
        assert!(tags.is_list());
        assert_eq!(tags.json_name(), "tags");
        match outer.reflect().get_field_by_name("inner").unwrap().kind() {
            prost_reflect::Kind::Message(inner) => assert_eq!(inner.full_name(), "test.Inner"),
            other => panic!("unexpected kind {other:?}"),
        }

        let method = pool
            .reflect()
            .get_service_by_name("test.Svc")
            .and_then(|svc| svc.methods().next())
            .unwrap();
        assert_eq!(method.output().full_name(), "test.Outer");
        assert_eq!(outer.new_message().descriptor(), *outer.reflect());
    }

    #[test]
    fn test_lookup_errors() {
        let pool = base().build().unwrap();
        assert_eq!(
            pool.lookup_message("Nope").unwrap_err().to_string(),
            "Type \"Nope\" not found"
        );
        assert_eq!(
            pool.lookup_service("Nope").unwrap_err().to_string(),
            "Service \"Nope\" not found"
        );
    }

    #[test]
    fn test_message_type_equality() {
        let pool = base().build().unwrap();
        let a = pool.lookup_message("test.Outer").unwrap();
        let b = pool.lookup_message("test.Outer").unwrap();
        assert_eq!(a, b);
        assert_ne!(a, pool.lookup_message("test.Inner").unwrap());

        let other = base().build().unwrap();
        assert_ne!(a, other.lookup_message("test.Outer").unwrap());
    }

    #[test]
    fn test_unresolved_field_type() {
        let err = DescriptorPool::builder()
            .message(
                MessageDescriptor::new("A")
                    .field(FieldDescriptor::new("b", 1, FieldType::Message("B".into()))),
            )
            .build()
            .unwrap_err();
        assert_eq!(
            err,
            SchemaError::UnresolvedType {
                owner: "A.b".into(),
                type_name: "B".into()
            }
        );
    }

    #[test]
    fn test_enum_used_as_message_is_unresolved() {
        let err = base()
            .message(
                MessageDescriptor::new("Bad")
                    .field(FieldDescriptor::new("c", 1, FieldType::Message("test.Color".into()))),
            )
            .build()
            .unwrap_err();
        assert!(matches!(err, SchemaError::UnresolvedType { .. }));
    }

    #[test]
    fn test_duplicate_names() {
        let err = base()
            .message(MessageDescriptor::new("test.Inner"))
            .build()
            .unwrap_err();
        assert_eq!(err, SchemaError::DuplicateName("test.Inner".into()));
    }

    #[test]
    fn test_package_import_cycle() {
        let err = DescriptorPool::builder()
            .message(
                MessageDescriptor::new("a.X")
                    .field(FieldDescriptor::new("y", 1, FieldType::Message("b.Y".into()))),
            )
            .message(
                MessageDescriptor::new("b.Y")
                    .field(FieldDescriptor::new("x", 1, FieldType::Message("a.X".into()))),
            )
            .build()
            .unwrap_err();
        assert_eq!(err, SchemaError::ImportCycle("a".into()));
    }

    #[test]
    fn test_field_checks() {
        let err = DescriptorPool::builder()
            .message(
                MessageDescriptor::new("A")
                    .field(FieldDescriptor::new("x", 1, FieldType::Bool))
                    .field(FieldDescriptor::new("y", 1, FieldType::Bool)),
            )
            .build()
            .unwrap_err();
        assert_eq!(
            err,
            SchemaError::DuplicateFieldNumber {
                message: "A".into(),
                number: 1
            }
        );

        let err = DescriptorPool::builder()
            .message(
                MessageDescriptor::new("A").field(FieldDescriptor::new("x", 0, FieldType::Bool)),
            )
            .build()
            .unwrap_err();
        assert!(matches!(err, SchemaError::InvalidFieldNumber { number: 0, .. }));
    }

    #[test]
    fn test_service_checks() {
        let err = base()
            .service(
                crate::schema::ServiceDescriptor::new("test.Svc")
                    .method(MethodDescriptor::new("Do", "test.Inner", "test.Missing")),
            )
            .build()
            .unwrap_err();
        assert_eq!(
            err,
            SchemaError::UnresolvedType {
                owner: "test.Svc.Do".into(),
                type_name: "test.Missing".into()
            }
        );

        let err = base()
            .service(
                crate::schema::ServiceDescriptor::new("test.Svc")
                    .method(MethodDescriptor::new("Do", "test.Inner", "test.Inner"))
                    .method(MethodDescriptor::new("Do", "test.Inner", "test.Inner")),
            )
            .build()
            .unwrap_err();
        assert_eq!(err, SchemaError::DuplicateName("test.Svc.Do".into()));
    }
}
