//! Conversion between dynamic messages and plain JSON objects.
//!
//! Both directions go through the protobuf JSON mapping of `prost-reflect`.
//! Plain objects are checked and canonicalized first (see `verify`); the
//! rendered form is then shaped by [`ToPlainOptions`].

use prost_reflect::{DeserializeOptions, DynamicMessage, SerializeOptions, Value};
use serde_json::{Map, Value as Json};

use super::SchemaError;
use super::descriptor::{FieldDescriptor, FieldType};
use super::pool::MessageType;
use super::verify::verify_plain;

/// How enum values are rendered.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum EnumFormat {
    #[default]
    Name,
    Number,
}

/// How 64-bit integers are rendered.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum LongFormat {
    #[default]
    String,
    Number,
}

/// How bytes fields are rendered.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum BytesFormat {
    #[default]
    Base64,
    Array,
}

/// Options controlling how a message is rendered as a plain object.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ToPlainOptions {
    pub enums: EnumFormat,
    pub longs: LongFormat,
    pub bytes: BytesFormat,
    /// Emit unset fields with their default values.
    pub defaults: bool,
    /// Emit unset repeated fields as empty arrays.
    pub arrays: bool,
    /// Emit a `"<oneof>": "<member>"` discriminator for each set oneof.
    pub oneofs: bool,
}

impl Default for ToPlainOptions {
    fn default() -> Self {
        Self {
            enums: EnumFormat::Name,
            longs: LongFormat::String,
            bytes: BytesFormat::Base64,
            defaults: false,
            arrays: false,
            oneofs: true,
        }
    }
}

impl ToPlainOptions {
    /// The rendering handed to implementations: like the default, without
    /// oneof discriminators.
    pub fn json() -> Self {
        Self {
            oneofs: false,
            ..Self::default()
        }
    }

    pub fn enums(mut self, enums: EnumFormat) -> Self {
        self.enums = enums;
        self
    }

    pub fn longs(mut self, longs: LongFormat) -> Self {
        self.longs = longs;
        self
    }

    pub fn bytes(mut self, bytes: BytesFormat) -> Self {
        self.bytes = bytes;
        self
    }

    pub fn defaults(mut self, defaults: bool) -> Self {
        self.defaults = defaults;
        self
    }

    pub fn arrays(mut self, arrays: bool) -> Self {
        self.arrays = arrays;
        self
    }

    pub fn oneofs(mut self, oneofs: bool) -> Self {
        self.oneofs = oneofs;
        self
    }

    fn serialize_options(&self) -> SerializeOptions {
        SerializeOptions::new()
            .stringify_64_bit_integers(self.longs == LongFormat::String)
            .use_enum_numbers(self.enums == EnumFormat::Number)
            .use_proto_field_name(true)
            .skip_default_fields(!self.defaults)
    }
}

/// Build a message from a plain object.
///
/// Only objects are accepted. Values are coerced into each field's kind
/// where possible; the first value that cannot be coerced is reported as
/// [`SchemaError::Invalid`]. `null` and unknown keys are ignored.
pub(crate) fn from_plain(ty: &MessageType, object: &Json) -> Result<DynamicMessage, SchemaError> {
    let Json::Object(map) = object else {
        return Err(SchemaError::ObjectExpected(ty.full_name().to_string()));
    };
    let canonical = verify_plain(ty, map).map_err(SchemaError::Invalid)?;

    DynamicMessage::deserialize_with_options(
        ty.reflect().clone(),
        Json::Object(canonical),
        &DeserializeOptions::new().deny_unknown_fields(false),
    )
    .map_err(|err| SchemaError::Plain(err.to_string()))
}

/// Render a message as a plain object.
pub(crate) fn to_plain(
    ty: &MessageType,
    message: &DynamicMessage,
    options: &ToPlainOptions,
) -> Result<Json, SchemaError> {
    let rendered = message
        .serialize_with_options(serde_json::value::Serializer, &options.serialize_options())
        .map_err(|err| SchemaError::Encode(err.to_string()))?;
    Ok(shape(ty, message, rendered, options))
}

/// Reorder a rendered message into declaration order and apply the options
/// the JSON mapping has no switch for.
fn shape(
    ty: &MessageType,
    message: &DynamicMessage,
    rendered: Json,
    options: &ToPlainOptions,
) -> Json {
    let Json::Object(mut rendered) = rendered else {
        return rendered;
    };
    let mut object = Map::new();

    for (index, field) in ty.fields().iter().enumerate() {
        let value = rendered.remove(&field.name);
        let current = message.get_field_by_name(&field.name);

        if field.repeated {
            let items = match (value, current.as_deref()) {
                (Some(Json::Array(items)), Some(Value::List(list))) => items
                    .into_iter()
                    .zip(list)
                    .map(|(item, current)| shape_value(ty, index, current, item, options))
                    .collect(),
                _ => Vec::new(),
            };
            if !items.is_empty() || options.arrays || options.defaults {
                object.insert(field.name.clone(), Json::Array(items));
            }
            continue;
        }

        let set = message.has_field_by_name(&field.name);
        if !set && !(options.defaults && field.oneof.is_none()) {
            continue;
        }
        let shaped = match (value, current.as_deref()) {
            // an unset message field has no meaningful default object
            _ if !set && matches!(field.field_type, FieldType::Message(_)) => Json::Null,
            (Some(value), Some(current)) => shape_value(ty, index, current, value, options),
            _ => default_plain(ty, index, field, options),
        };
        object.insert(field.name.clone(), shaped);

        if set && options.oneofs {
            if let Some(oneof) = &field.oneof {
                object.insert(oneof.clone(), Json::String(field.name.clone()));
            }
        }
    }

    Json::Object(object)
}

fn shape_value(
    ty: &MessageType,
    index: usize,
    current: &Value,
    rendered: Json,
    options: &ToPlainOptions,
) -> Json {
    match (&ty.fields()[index].field_type, current) {
        (FieldType::Message(_), Value::Message(nested)) => match ty.message_target(index) {
            Some(target) => shape(&target, nested, rendered, options),
            None => rendered,
        },
        (FieldType::Bytes, Value::Bytes(bytes)) if options.bytes == BytesFormat::Array => {
            Json::Array(bytes.iter().map(|b| Json::from(*b)).collect())
        }
        _ => rendered,
    }
}

fn default_plain(
    ty: &MessageType,
    index: usize,
    field: &FieldDescriptor,
    options: &ToPlainOptions,
) -> Json {
    match &field.field_type {
        FieldType::Bool => Json::Bool(false),
        FieldType::String => Json::String(String::new()),
        FieldType::Bytes => match options.bytes {
            BytesFormat::Base64 => Json::String(String::new()),
            BytesFormat::Array => Json::Array(Vec::new()),
        },
        FieldType::Float | FieldType::Double => Json::from(0.0),
        FieldType::Enum(_) => {
            let enumeration = ty.enum_target(index);
            let number = enumeration.as_ref().map_or(0, |e| e.default_number());
            match (options.enums, enumeration.as_ref().and_then(|e| e.name_of(number))) {
                (EnumFormat::Name, Some(name)) => Json::String(name.to_string()),
                _ => Json::from(number),
            }
        }
        FieldType::Message(_) => Json::Null,
        long if long.is_long() => match options.longs {
            LongFormat::String => Json::String("0".into()),
            LongFormat::Number => Json::from(0),
        },
        _ => Json::from(0),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{DescriptorPool, EnumDescriptor, MessageDescriptor};
    use bytes::Bytes;
    use serde_json::json;

    fn pool() -> DescriptorPool {
        DescriptorPool::builder()
            .enumeration(EnumDescriptor::new("Kind").value("NONE", 0).value("SOME", 1))
            .message(
                MessageDescriptor::new("Inner")
                    .field(FieldDescriptor::new("label", 1, FieldType::String)),
            )
            .message(
                MessageDescriptor::new("Sample")
                    .field(FieldDescriptor::new("count", 1, FieldType::UInt32))
                    .field(FieldDescriptor::new("total", 2, FieldType::Int64))
                    .field(FieldDescriptor::new("kind", 3, FieldType::Enum("Kind".into())))
                    .field(FieldDescriptor::new("data", 4, FieldType::Bytes))
                    .field(FieldDescriptor::new("tags", 5, FieldType::String).repeated())
                    .field(FieldDescriptor::new("inner", 6, FieldType::Message("Inner".into())))
                    .field(FieldDescriptor::new("ratio", 7, FieldType::Double))
                    .field(FieldDescriptor::new("on", 8, FieldType::Bool))
                    .field(FieldDescriptor::new("text", 9, FieldType::String).in_oneof("choice")),
            )
            .build()
            .unwrap()
    }

    fn sample() -> MessageType {
        pool().lookup_message("Sample").unwrap()
    }

    #[test]
    fn test_from_plain_coercion() {
        let ty = sample();
        let msg = from_plain(
            &ty,
            &json!({
                "count": "42",
                "total": "9007199254740993",
                "kind": "SOME",
                "data": "aGk",
                "tags": ["a", "b"],
                "inner": {"label": "x"},
                "ratio": "0.5",
                "on": "true",
                "unknown": 1,
                "text": null
            }),
        )
        .unwrap();

        let get = |name: &str| msg.get_field_by_name(name).map(|v| v.into_owned());
        assert_eq!(get("count"), Some(Value::U32(42)));
        assert_eq!(get("total"), Some(Value::I64(9_007_199_254_740_993)));
        assert_eq!(get("kind"), Some(Value::EnumNumber(1)));
        assert_eq!(get("data"), Some(Value::Bytes(Bytes::from_static(b"hi"))));
        assert_eq!(
            get("tags"),
            Some(Value::List(vec![
                Value::String("a".into()),
                Value::String("b".into())
            ]))
        );
        assert_eq!(get("ratio"), Some(Value::F64(0.5)));
        assert_eq!(get("on"), Some(Value::Bool(true)));
        assert!(!msg.has_field_by_name("text"));
        assert!(matches!(get("inner"), Some(Value::Message(_))));
    }

    #[test]
    fn test_from_plain_rejects_uncoercible() {
        let ty = sample();
        let reason = |value: serde_json::Value| from_plain(&ty, &value).unwrap_err().to_string();
        assert_eq!(reason(json!({"count": -1})), "count: integer expected");
        assert_eq!(reason(json!({"tags": "a"})), "tags: array expected");
        assert_eq!(reason(json!({"on": 1})), "on: boolean expected");
        assert_eq!(reason(json!({"data": "%%"})), "data: buffer expected");
    }

    #[test]
    fn test_from_plain_requires_object() {
        let err = from_plain(&sample(), &json!([1])).unwrap_err();
        assert_eq!(err.to_string(), "Sample: object expected");
    }

    #[test]
    fn test_to_plain_default_options() {
        let ty = sample();
        let msg = from_plain(
            &ty,
            &json!({
                "count": 1,
                "total": 5,
                "kind": 1,
                "data": [104, 105],
                "text": "t",
                "tags": []
            }),
        )
        .unwrap();

        assert_eq!(
            to_plain(&ty, &msg, &ToPlainOptions::default()).unwrap(),
            json!({
                "count": 1,
                "total": "5",
                "kind": "SOME",
                "data": "aGk=",
                "text": "t",
                "choice": "text"
            })
        );
        assert_eq!(
            to_plain(&ty, &msg, &ToPlainOptions::json()).unwrap(),
            json!({"count": 1, "total": "5", "kind": "SOME", "data": "aGk=", "text": "t"})
        );
    }

    #[test]
    fn test_to_plain_numeric_options() {
        let ty = sample();
        let msg = from_plain(&ty, &json!({"total": 5, "kind": "SOME", "data": "aGk="})).unwrap();
        let options = ToPlainOptions::default()
            .longs(LongFormat::Number)
            .enums(EnumFormat::Number)
            .bytes(BytesFormat::Array);
        assert_eq!(
            to_plain(&ty, &msg, &options).unwrap(),
            json!({"total": 5, "kind": 1, "data": [104, 105]})
        );
    }

    #[test]
    fn test_to_plain_defaults() {
        let ty = sample();
        let msg = ty.new_message();
        assert_eq!(
            to_plain(&ty, &msg, &ToPlainOptions::default().defaults(true)).unwrap(),
            json!({
                "count": 0,
                "total": "0",
                "kind": "NONE",
                "data": "",
                "tags": [],
                "inner": null,
                "ratio": 0.0,
                "on": false
            })
        );
        assert_eq!(
            to_plain(&ty, &msg, &ToPlainOptions::default().arrays(true)).unwrap(),
            json!({"tags": []})
        );
    }

    #[test]
    fn test_non_finite_floats() {
        let ty = sample();
        let msg = from_plain(&ty, &json!({"ratio": "NaN"})).unwrap();
        assert_eq!(
            to_plain(&ty, &msg, &ToPlainOptions::default()).unwrap(),
            json!({"ratio": "NaN"})
        );
        let msg = from_plain(&ty, &json!({"ratio": "-Infinity"})).unwrap();
        assert_eq!(
            to_plain(&ty, &msg, &ToPlainOptions::default()).unwrap(),
            json!({"ratio": "-Infinity"})
        );
    }
}
