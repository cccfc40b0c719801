//! OpenAPI document generation.
//!
//! One operation is recorded per bound route, keyed by the declared path
//! template and lowercase HTTP method. Message and enum schemas are added
//! under `components.schemas` when requested.

use std::collections::BTreeMap;

use serde::Serialize;
use serde_json::{Value, json};

use crate::binding::TransportBinding;
use crate::schema::{EnumType, FieldType, MessageType, MethodDescriptor, ServiceDescriptor};

const SCHEMA_REF_PREFIX: &str = "#/components/schemas/";

/// A generated OpenAPI 3.0 document.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct OpenApiDocument {
    pub openapi: String,
    pub info: Info,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub servers: Vec<Server>,
    pub tags: Vec<Tag>,
    /// `path template -> lowercase method -> operation`.
    pub paths: BTreeMap<String, BTreeMap<String, Operation>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub components: Option<Components>,
}

impl OpenApiDocument {
    pub fn operation(&self, path: &str, method: &str) -> Option<&Operation> {
        self.paths.get(path)?.get(method)
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct Info {
    pub title: String,
    pub version: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl Info {
    pub fn new<T: Into<String>, V: Into<String>>(title: T, version: V) -> Self {
        Self {
            title: title.into(),
            version: version.into(),
            description: None,
        }
    }

    pub fn with_description<S: Into<String>>(mut self, description: S) -> Self {
        self.description = Some(description.into());
        self
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct Server {
    pub url: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl Server {
    pub fn new<S: Into<String>>(url: S) -> Self {
        Self {
            url: url.into(),
            description: None,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct Tag {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl Tag {
    pub fn new<S: Into<String>>(name: S) -> Self {
        Self {
            name: name.into(),
            description: None,
        }
    }
}

/// One `(path, method)` entry.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Operation {
    /// The method's comment.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub operation_id: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub parameters: Vec<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub request_body: Option<Value>,
    pub responses: BTreeMap<String, Value>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct Components {
    pub schemas: BTreeMap<String, Value>,
}

/// Document-level settings.
#[derive(Clone, Debug, Default)]
pub(crate) struct OpenApiConfig {
    pub info: Option<Info>,
    pub servers: Vec<Server>,
    pub tags: Vec<Tag>,
}

/// Accumulates operations while routes are bound.
pub(crate) struct DocumentBuilder {
    document: OpenApiDocument,
    include_schemas: bool,
}

impl DocumentBuilder {
    pub(crate) fn new(config: &OpenApiConfig, default_title: &str, include_schemas: bool) -> Self {
        let info = config
            .info
            .clone()
            .unwrap_or_else(|| Info::new(default_title, "1.0.0"));
        Self {
            document: OpenApiDocument {
                openapi: "3.0.0".to_string(),
                info,
                servers: config.servers.clone(),
                tags: config.tags.clone(),
                paths: BTreeMap::new(),
                components: None,
            },
            include_schemas,
        }
    }

    pub(crate) fn add_operation(
        &mut self,
        service: &ServiceDescriptor,
        method: &MethodDescriptor,
        binding: &TransportBinding,
        request: &MessageType,
        response: &MessageType,
    ) {
        let parameters = binding
            .path_params()
            .into_iter()
            .map(|name| {
                json!({
                    "name": name,
                    "in": "path",
                    "required": true,
                    "schema": { "type": "string" },
                })
            })
            .collect();

        let mut responses = BTreeMap::new();
        let mut ok = json!({ "description": "OK" });
        let mut request_body = None;

        if self.include_schemas {
            self.add_message_schema(request);
            self.add_message_schema(response);
            ok["content"] = json_content(response.full_name());
            if binding.body.reads_body() {
                request_body = Some(json!({ "content": json_content(request.full_name()) }));
            }
        }
        responses.insert("200".to_string(), ok);

        let operation = Operation {
            description: method.comment.clone(),
            operation_id: format!("{}.{}", service.full_name, method.name),
            tags: vec![service.name().to_string()],
            parameters,
            request_body,
            responses,
        };

        self.document
            .paths
            .entry(binding.path.clone())
            .or_default()
            .insert(binding.method.as_str().to_string(), operation);
    }

    fn schemas(&mut self) -> &mut BTreeMap<String, Value> {
        &mut self
            .document
            .components
            .get_or_insert_with(Components::default)
            .schemas
    }

    fn add_message_schema(&mut self, ty: &MessageType) {
        if self.schemas().contains_key(ty.full_name()) {
            return;
        }

        let mut properties = serde_json::Map::new();
        let mut nested_messages = Vec::new();
        let mut nested_enums = Vec::new();

        for (index, field) in ty.fields().iter().enumerate() {
            let mut property = match &field.field_type {
                FieldType::Message(name) => {
                    nested_messages.extend(ty.message_target(index));
                    json!({ "$ref": format!("{SCHEMA_REF_PREFIX}{}", trim_dot(name)) })
                }
                FieldType::Enum(name) => {
                    nested_enums.extend(ty.enum_target(index));
                    json!({ "$ref": format!("{SCHEMA_REF_PREFIX}{}", trim_dot(name)) })
                }
                scalar => scalar_schema(scalar),
            };
            if field.repeated {
                property = json!({ "type": "array", "items": property });
            }
            if let Some(comment) = &field.comment {
                property["description"] = Value::String(comment.clone());
            }
            properties.insert(field.name.clone(), property);
        }

        let mut schema = json!({ "type": "object", "properties": properties });
        if let Some(comment) = &ty.descriptor().comment {
            schema["description"] = Value::String(comment.clone());
        }
        self.schemas().insert(ty.full_name().to_string(), schema);

        for nested in &nested_messages {
            self.add_message_schema(nested);
        }
        for nested in &nested_enums {
            self.add_enum_schema(nested);
        }
    }

    fn add_enum_schema(&mut self, ty: &EnumType) {
        if self.schemas().contains_key(ty.full_name()) {
            return;
        }
        let descriptor = ty.descriptor();
        let names: Vec<&str> = descriptor.values.iter().map(|(name, _)| name.as_str()).collect();
        let mut schema = json!({ "type": "string", "enum": names });
        if let Some(comment) = &descriptor.comment {
            schema["description"] = Value::String(comment.clone());
        }
        self.schemas().insert(ty.full_name().to_string(), schema);
    }

    pub(crate) fn finish(self) -> OpenApiDocument {
        self.document
    }
}

fn json_content(type_name: &str) -> Value {
    json!({
        "application/json": {
            "schema": { "$ref": format!("{SCHEMA_REF_PREFIX}{type_name}") }
        }
    })
}

fn trim_dot(name: &str) -> &str {
    name.strip_prefix('.').unwrap_or(name)
}

fn scalar_schema(field_type: &FieldType) -> Value {
    match field_type {
        FieldType::Double => json!({ "type": "number", "format": "double" }),
        FieldType::Float => json!({ "type": "number", "format": "float" }),
        FieldType::Bool => json!({ "type": "boolean" }),
        FieldType::String => json!({ "type": "string" }),
        FieldType::Bytes => json!({ "type": "string", "format": "byte" }),
        // 64-bit integers travel as strings in plain objects
        long if long.is_long() => json!({ "type": "string", "format": long.type_name() }),
        other => json!({ "type": "integer", "format": other.type_name() }),
    }
}
