//! BSON to plain JSON conversion
//!
//! Field values read from MongoDB are normalised to `serde_json::Value` so the
//! exported snapshot is ordinary JSON rather than MongoDB extended JSON.

use base64::Engine;
use mongodb::bson::{Binary, Bson, DateTime, Decimal128, Document, spec::BinarySubtype};
use serde_json::Value as JsonValue;

use super::FieldData;

/// Convert DateTime to an RFC 3339 string, falling back to epoch millis.
pub fn datetime_to_iso_string(dt: &DateTime) -> String {
    dt.try_to_rfc3339_string()
        .unwrap_or_else(|_| format!("{}", dt.timestamp_millis()))
}

/// Convert Binary data to a base64 string.
pub fn binary_to_base64(bin: &Binary) -> String {
    base64::engine::general_purpose::STANDARD.encode(&bin.bytes)
}

/// Convert Binary data to a hexadecimal string.
pub fn binary_to_hex(bin: &Binary) -> String {
    hex::encode(&bin.bytes)
}

/// Convert a BSON value to plain JSON.
pub fn convert(value: &Bson) -> JsonValue {
    match value {
        Bson::String(s) => JsonValue::String(s.clone()),
        Bson::Int32(n) => JsonValue::Number((*n).into()),
        Bson::Int64(n) => JsonValue::Number((*n).into()),
        Bson::Double(f) => serde_json::Number::from_f64(*f)
            .map(JsonValue::Number)
            .unwrap_or(JsonValue::Null),
        Bson::Boolean(b) => JsonValue::Bool(*b),
        Bson::Null | Bson::Undefined => JsonValue::Null,
        Bson::ObjectId(oid) => JsonValue::String(oid.to_hex()),
        Bson::DateTime(dt) => JsonValue::String(datetime_to_iso_string(dt)),
        Bson::Decimal128(d) => convert_decimal128(d),
        Bson::Array(arr) => JsonValue::Array(arr.iter().map(convert).collect()),
        Bson::Document(doc) => JsonValue::Object(
            doc.iter()
                .map(|(key, value)| (key.clone(), convert(value)))
                .collect(),
        ),
        // MD5 digests read better as hex
        Bson::Binary(bin) if bin.subtype == BinarySubtype::Md5 => {
            JsonValue::String(binary_to_hex(bin))
        }
        Bson::Binary(bin) => JsonValue::String(binary_to_base64(bin)),
        Bson::RegularExpression(regex) => {
            JsonValue::String(format!("/{}/{}", regex.pattern, regex.options))
        }
        Bson::Timestamp(ts) => serde_json::json!({ "t": ts.time, "i": ts.increment }),
        Bson::MinKey => JsonValue::String("MinKey".to_string()),
        Bson::MaxKey => JsonValue::String("MaxKey".to_string()),
        other => JsonValue::String(format!("{other:?}")),
    }
}

fn convert_decimal128(d: &Decimal128) -> JsonValue {
    let s = d.to_string();
    s.parse::<f64>()
        .ok()
        .and_then(serde_json::Number::from_f64)
        .map(JsonValue::Number)
        .unwrap_or(JsonValue::String(s))
}

/// Convert a stored document into field data, dropping the `_id` key which
/// is already the document's identifier.
pub fn document_to_fields(doc: &Document) -> FieldData {
    doc.iter()
        .filter(|(key, _)| key.as_str() != "_id")
        .map(|(key, value)| (key.clone(), convert(value)))
        .collect()
}

/// String form of a document `_id` used as its identifier.
pub fn id_to_string(id: &Bson) -> String {
    match id {
        Bson::String(s) => s.clone(),
        Bson::ObjectId(oid) => oid.to_hex(),
        Bson::Int32(n) => n.to_string(),
        Bson::Int64(n) => n.to_string(),
        other => other.clone().into_relaxed_extjson().to_string(),
    }
}
