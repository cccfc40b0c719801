//! Lowering of checked definitions into descriptor protos.
//!
//! Every package becomes one proto3 file. Files import the packages their
//! field and method types live in, and are emitted dependencies first.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use prost_types::field_descriptor_proto::{Label, Type};
use prost_types::{
    DescriptorProto, EnumDescriptorProto, EnumValueDescriptorProto, FieldDescriptorProto,
    FileDescriptorProto, FileDescriptorSet, MethodDescriptorProto, OneofDescriptorProto,
    ServiceDescriptorProto,
};

use super::SchemaError;
use super::descriptor::{
    EnumDescriptor, FieldDescriptor, FieldType, MessageDescriptor, ServiceDescriptor, short_name,
};

#[derive(Default)]
struct File<'a> {
    imports: BTreeSet<&'a str>,
    messages: Vec<DescriptorProto>,
    enums: Vec<EnumDescriptorProto>,
    services: Vec<ServiceDescriptorProto>,
}

impl<'a> File<'a> {
    fn import(&mut self, package: &'a str, type_name: &'a str) {
        let target = package_of(trim_dot(type_name));
        if target != package {
            self.imports.insert(target);
        }
    }
}

/// Build the file set for definitions whose names are already normalized
/// and whose references are known to resolve.
pub(super) fn file_descriptor_set(
    messages: &[MessageDescriptor],
    enums: &[EnumDescriptor],
    services: &[ServiceDescriptor],
) -> Result<FileDescriptorSet, SchemaError> {
    let mut files: BTreeMap<&str, File<'_>> = BTreeMap::new();

    for message in messages {
        let package = package_of(&message.full_name);
        let file = files.entry(package).or_default();
        for field in &message.fields {
            if let FieldType::Enum(name) | FieldType::Message(name) = &field.field_type {
                file.import(package, name);
            }
        }
        file.messages.push(message_proto(message));
    }

    for enumeration in enums {
        let file = files.entry(package_of(&enumeration.full_name)).or_default();
        file.enums.push(enum_proto(enumeration));
    }

    for service in services {
        let package = package_of(&service.full_name);
        let file = files.entry(package).or_default();
        for method in &service.methods {
            file.import(package, &method.request_type);
            file.import(package, &method.response_type);
        }
        file.services.push(service_proto(service));
    }

    let order = dependency_order(&files)?;
    let file = order
        .into_iter()
        .filter_map(|package| {
            let file = files.remove(package)?;
            Some(FileDescriptorProto {
                name: Some(file_name(package)),
                package: (!package.is_empty()).then(|| package.to_string()),
                dependency: file.imports.iter().map(|import| file_name(import)).collect(),
                message_type: file.messages,
                enum_type: file.enums,
                service: file.services,
                syntax: Some("proto3".to_string()),
                ..Default::default()
            })
        })
        .collect();

    Ok(FileDescriptorSet { file })
}

fn dependency_order<'a>(files: &BTreeMap<&'a str, File<'a>>) -> Result<Vec<&'a str>, SchemaError> {
    // false while a package is on the stack, true once emitted
    let mut state: HashMap<&'a str, bool> = HashMap::new();
    let mut order = Vec::with_capacity(files.len());
    for package in files.keys() {
        visit(package, files, &mut state, &mut order)?;
    }
    Ok(order)
}

fn visit<'a>(
    package: &'a str,
    files: &BTreeMap<&'a str, File<'a>>,
    state: &mut HashMap<&'a str, bool>,
    order: &mut Vec<&'a str>,
) -> Result<(), SchemaError> {
    match state.get(package) {
        Some(true) => return Ok(()),
        Some(false) => return Err(SchemaError::ImportCycle(package.to_string())),
        None => {}
    }
    state.insert(package, false);
    if let Some(file) = files.get(package) {
        for import in &file.imports {
            visit(import, files, state, order)?;
        }
    }
    state.insert(package, true);
    order.push(package);
    Ok(())
}

fn message_proto(message: &MessageDescriptor) -> DescriptorProto {
    let oneofs = message.oneofs();
    DescriptorProto {
        name: Some(short_name(&message.full_name).to_string()),
        field: message
            .fields
            .iter()
            .map(|field| field_proto(field, &oneofs))
            .collect(),
        oneof_decl: oneofs
            .iter()
            .map(|name| OneofDescriptorProto {
                name: Some(name.to_string()),
                ..Default::default()
            })
            .collect(),
        ..Default::default()
    }
}

fn field_proto(field: &FieldDescriptor, oneofs: &[&str]) -> FieldDescriptorProto {
    let (kind, type_name) = match &field.field_type {
        FieldType::Double => (Type::Double, None),
        FieldType::Float => (Type::Float, None),
        FieldType::Int32 => (Type::Int32, None),
        FieldType::Int64 => (Type::Int64, None),
        FieldType::UInt32 => (Type::Uint32, None),
        FieldType::UInt64 => (Type::Uint64, None),
        FieldType::SInt32 => (Type::Sint32, None),
        FieldType::SInt64 => (Type::Sint64, None),
        FieldType::Fixed32 => (Type::Fixed32, None),
        FieldType::Fixed64 => (Type::Fixed64, None),
        FieldType::SFixed32 => (Type::Sfixed32, None),
        FieldType::SFixed64 => (Type::Sfixed64, None),
        FieldType::Bool => (Type::Bool, None),
        FieldType::String => (Type::String, None),
        FieldType::Bytes => (Type::Bytes, None),
        FieldType::Enum(name) => (Type::Enum, Some(qualified(name))),
        FieldType::Message(name) => (Type::Message, Some(qualified(name))),
    };
    let label = if field.repeated {
        Label::Repeated
    } else {
        Label::Optional
    };
    let oneof_index = field
        .oneof
        .as_deref()
        .and_then(|oneof| oneofs.iter().position(|name| *name == oneof))
        .and_then(|index| i32::try_from(index).ok());

    FieldDescriptorProto {
        name: Some(field.name.clone()),
        number: i32::try_from(field.number).ok(),
        label: Some(label as i32),
        r#type: Some(kind as i32),
        type_name,
        // plain objects key fields by their declared name
        json_name: Some(field.name.clone()),
        oneof_index,
        ..Default::default()
    }
}

fn enum_proto(enumeration: &EnumDescriptor) -> EnumDescriptorProto {
    EnumDescriptorProto {
        name: Some(short_name(&enumeration.full_name).to_string()),
        value: enumeration
            .values
            .iter()
            .map(|(name, number)| EnumValueDescriptorProto {
                name: Some(name.clone()),
                number: Some(*number),
                ..Default::default()
            })
            .collect(),
        ..Default::default()
    }
}

fn service_proto(service: &ServiceDescriptor) -> ServiceDescriptorProto {
    ServiceDescriptorProto {
        name: Some(service.name().to_string()),
        method: service
            .methods
            .iter()
            .map(|method| MethodDescriptorProto {
                name: Some(method.name.clone()),
                input_type: Some(qualified(&method.request_type)),
                output_type: Some(qualified(&method.response_type)),
                ..Default::default()
            })
            .collect(),
        ..Default::default()
    }
}

fn package_of(full_name: &str) -> &str {
    full_name.rsplit_once('.').map_or("", |(package, _)| package)
}

fn trim_dot(name: &str) -> &str {
    name.strip_prefix('.').unwrap_or(name)
}

fn qualified(name: &str) -> String {
    format!(".{}", trim_dot(name))
}

fn file_name(package: &str) -> String {
    if package.is_empty() {
        "protogate/_.proto".to_string()
    } else {
        format!("protogate/{package}.proto")
    }
}
