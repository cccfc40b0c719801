//! Field checks reported in terms of the declared schema.
//!
//! Plain objects are checked before they reach the reflection layer, so a
//! wrong kind surfaces as `random: integer expected` rather than as a
//! deserializer error. Accepted values are rewritten into the canonical
//! JSON mapping on the way.

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use base64::engine::{DecodePaddingMode, GeneralPurpose, GeneralPurposeConfig};
use prost_reflect::{DynamicMessage, Kind, ReflectMessage, Value};
use serde_json::{Map, Number, Value as Json};

use super::descriptor::FieldType;
use super::pool::MessageType;

/// Accepts base64 input with or without padding.
const BASE64_INDIFFERENT: GeneralPurpose = GeneralPurpose::new(
    &base64::alphabet::STANDARD,
    GeneralPurposeConfig::new().with_decode_padding_mode(DecodePaddingMode::Indifferent),
);

/// Check a structured message.
///
/// Kinds are enforced by the message itself; what remains is the type and
/// enum numbers outside the declared values.
pub(crate) fn verify(ty: &MessageType, message: &DynamicMessage) -> Option<String> {
    if &message.descriptor() != ty.reflect() {
        return Some(format!("{} expected", ty.full_name()));
    }
    verify_enums(message)
}

fn verify_enums(message: &DynamicMessage) -> Option<String> {
    for (field, value) in message.fields() {
        let reason = match (field.kind(), value) {
            (Kind::Enum(enumeration), Value::EnumNumber(number)) => enumeration
                .get_value(*number)
                .is_none()
                .then(|| format!("{}: enum value expected", field.name())),
            (Kind::Enum(enumeration), Value::List(items)) => items
                .iter()
                .any(|item| match item {
                    Value::EnumNumber(number) => enumeration.get_value(*number).is_none(),
                    _ => true,
                })
                .then(|| format!("{}: enum value expected", field.name())),
            (Kind::Message(_), Value::Message(nested)) => {
                verify_enums(nested).map(|err| format!("{}.{err}", field.name()))
            }
            (Kind::Message(_), Value::List(items)) => items
                .iter()
                .find_map(|item| match item {
                    Value::Message(nested) => verify_enums(nested),
                    _ => None,
                })
                .map(|err| format!("{}.{err}", field.name())),
            _ => None,
        };
        if reason.is_some() {
            return reason;
        }
    }
    None
}

/// Check a plain object against `ty`, returning it in canonical form.
///
/// Fields are visited in declaration order and the first problem is
/// reported with its field path. `null` values and unknown keys are
/// dropped.
pub(crate) fn verify_plain(
    ty: &MessageType,
    object: &Map<String, Json>,
) -> Result<Map<String, Json>, String> {
    let mut canonical = Map::new();
    let mut oneofs: Vec<&str> = Vec::new();

    for (index, field) in ty.fields().iter().enumerate() {
        let Some(raw) = object.get(&field.name) else {
            continue;
        };
        if raw.is_null() {
            continue;
        }

        if let Some(oneof) = field.oneof.as_deref() {
            if oneofs.contains(&oneof) {
                return Err(format!("{oneof}: multiple values"));
            }
            oneofs.push(oneof);
        }

        let value = if field.repeated {
            let Json::Array(items) = raw else {
                return Err(format!("{}: array expected", field.name));
            };
            Json::Array(
                items
                    .iter()
                    .map(|item| canonical_value(ty, index, item, true))
                    .collect::<Result<_, _>>()?,
            )
        } else {
            canonical_value(ty, index, raw, false)?
        };
        canonical.insert(field.name.clone(), value);
    }
    Ok(canonical)
}

fn canonical_value(
    ty: &MessageType,
    index: usize,
    raw: &Json,
    repeated: bool,
) -> Result<Json, String> {
    let field = &ty.fields()[index];
    let expected = |kind: &str| {
        let suffix = if repeated { "[]" } else { "" };
        format!("{}: {kind}{suffix} expected", field.name)
    };

    match &field.field_type {
        FieldType::Int32 | FieldType::SInt32 | FieldType::SFixed32 => integer(raw)
            .and_then(|v| i32::try_from(v).ok())
            .map(Json::from)
            .ok_or_else(|| expected("integer")),
        FieldType::UInt32 | FieldType::Fixed32 => integer(raw)
            .and_then(|v| u32::try_from(v).ok())
            .map(Json::from)
            .ok_or_else(|| expected("integer")),
        FieldType::Int64 | FieldType::SInt64 | FieldType::SFixed64 => integer(raw)
            .and_then(|v| i64::try_from(v).ok())
            .map(Json::from)
            .ok_or_else(|| expected("integer|Long")),
        FieldType::UInt64 | FieldType::Fixed64 => integer(raw)
            .and_then(|v| u64::try_from(v).ok())
            .map(Json::from)
            .ok_or_else(|| expected("integer|Long")),
        FieldType::Float | FieldType::Double => float(raw).ok_or_else(|| expected("number")),
        FieldType::Bool => match raw {
            Json::Bool(v) => Ok(Json::Bool(*v)),
            Json::String(s) if s == "true" => Ok(Json::Bool(true)),
            Json::String(s) if s == "false" => Ok(Json::Bool(false)),
            _ => Err(expected("boolean")),
        },
        FieldType::String => match raw {
            Json::String(s) => Ok(Json::String(s.clone())),
            _ => Err(expected("string")),
        },
        FieldType::Bytes => bytes(raw)
            .map(|v| Json::String(STANDARD.encode(v)))
            .ok_or_else(|| expected("buffer")),
        FieldType::Enum(_) => {
            let enumeration = ty.enum_target(index);
            let name = match raw {
                Json::String(name) => enumeration
                    .filter(|e| e.number_of(name).is_some())
                    .map(|_| name.clone()),
                Json::Number(_) => integer(raw)
                    .and_then(|v| i32::try_from(v).ok())
                    .and_then(|number| enumeration?.name_of(number).map(str::to_owned)),
                _ => None,
            };
            name.map(Json::String)
                .ok_or_else(|| format!("{}: enum value expected", field.name))
        }
        FieldType::Message(_) => match (raw, ty.message_target(index)) {
            (Json::Object(nested), Some(target)) => verify_plain(&target, nested)
                .map(Json::Object)
                .map_err(|err| format!("{}.{err}", field.name)),
            _ => Err(format!("{}: object expected", field.name)),
        },
    }
}

/// Integral value of a number or numeric string.
fn integer(raw: &Json) -> Option<i128> {
    match raw {
        Json::Number(n) => {
            if let Some(v) = n.as_i64() {
                Some(i128::from(v))
            } else if let Some(v) = n.as_u64() {
                Some(i128::from(v))
            } else {
                n.as_f64()
                    .filter(|v| v.fract() == 0.0 && v.abs() < 9.007_199_254_740_992e15)
                    .map(|v| v as i128)
            }
        }
        Json::String(s) => s.trim().parse::<i128>().ok(),
        _ => None,
    }
}

fn float(raw: &Json) -> Option<Json> {
    let v = match raw {
        Json::Number(n) => n.as_f64()?,
        Json::String(s) => match s.as_str() {
            "NaN" => f64::NAN,
            "Infinity" => f64::INFINITY,
            "-Infinity" => f64::NEG_INFINITY,
            other => other.trim().parse::<f64>().ok()?,
        },
        _ => return None,
    };
    Some(match Number::from_f64(v) {
        Some(number) => Json::Number(number),
        None if v.is_nan() => Json::String("NaN".into()),
        None if v > 0.0 => Json::String("Infinity".into()),
        None => Json::String("-Infinity".into()),
    })
}

fn bytes(raw: &Json) -> Option<Vec<u8>> {
    match raw {
        Json::String(s) => BASE64_INDIFFERENT.decode(s).ok(),
        Json::Array(items) => items
            .iter()
            .map(|item| item.as_u64().and_then(|b| u8::try_from(b).ok()))
            .collect(),
        _ => None,
    }
}
