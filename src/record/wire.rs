//! Decoding of the DynamoDB typed JSON item format.
//!
//! On the wire every attribute value is an object with exactly one type
//! descriptor, e.g. `{"N": "10.5"}` or `{"M": {...}}`. Numbers arrive as
//! decimal strings and binary values as base64 text.

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use serde_json::{Map, Value};

use super::value::{AttributeValue, Record};
use super::DecodeError;

/// Decodes one wire item (attribute name → typed value) into a [`Record`].
pub fn decode_item(item: &Map<String, Value>) -> Result<Record, DecodeError> {
    item.iter()
        .map(|(name, value)| {
            decode_value(value)
                .map(|v| (name.clone(), v))
                .map_err(|e| e.in_attribute(name))
        })
        .collect()
}

/// Decodes one typed attribute value.
pub fn decode_value(value: &Value) -> Result<AttributeValue, DecodeError> {
    let typed = value
        .as_object()
        .ok_or_else(|| DecodeError::new("attribute value must be an object"))?;

    let mut entries = typed.iter();
    let (descriptor, inner) = match (entries.next(), entries.next()) {
        (Some(entry), None) => entry,
        _ => {
            return Err(DecodeError::new(format!(
                "attribute value must have exactly one type descriptor, found {}",
                typed.len()
            )))
        }
    };

    match descriptor.as_str() {
        "S" => Ok(AttributeValue::String(expect_str(inner, "S")?.to_string())),
        "N" => Ok(AttributeValue::Number(expect_str(inner, "N")?.parse()?)),
        "B" => Ok(AttributeValue::String(decode_binary(inner)?)),
        "BOOL" => inner
            .as_bool()
            .map(AttributeValue::Bool)
            .ok_or_else(|| DecodeError::new("BOOL must hold a boolean")),
        "NULL" => Ok(AttributeValue::Null),
        "M" => {
            let map = inner
                .as_object()
                .ok_or_else(|| DecodeError::new("M must hold an object"))?;
            Ok(AttributeValue::Map(decode_item(map)?))
        }
        "L" => expect_array(inner, "L")?
            .iter()
            .map(decode_value)
            .collect::<Result<Vec<_>, _>>()
            .map(AttributeValue::List),
        "SS" => expect_array(inner, "SS")?
            .iter()
            .map(|v| expect_str(v, "SS").map(|s| AttributeValue::String(s.to_string())))
            .collect::<Result<Vec<_>, _>>()
            .map(AttributeValue::List),
        "NS" => expect_array(inner, "NS")?
            .iter()
            .map(|v| Ok(AttributeValue::Number(expect_str(v, "NS")?.parse()?)))
            .collect::<Result<Vec<_>, DecodeError>>()
            .map(AttributeValue::List),
        "BS" => expect_array(inner, "BS")?
            .iter()
            .map(|v| decode_binary(v).map(AttributeValue::String))
            .collect::<Result<Vec<_>, _>>()
            .map(AttributeValue::List),
        other => Err(DecodeError::new(format!("unknown type descriptor '{}'", other))),
    }
}

fn expect_str<'a>(value: &'a Value, descriptor: &str) -> Result<&'a str, DecodeError> {
    value
        .as_str()
        .ok_or_else(|| DecodeError::new(format!("{} must hold a string", descriptor)))
}

fn expect_array<'a>(value: &'a Value, descriptor: &str) -> Result<&'a Vec<Value>, DecodeError> {
    value
        .as_array()
        .ok_or_else(|| DecodeError::new(format!("{} must hold an array", descriptor)))
}

/// Binary values stay base64 text in the output; they are validated here.
fn decode_binary(value: &Value) -> Result<String, DecodeError> {
    let text = expect_str(value, "B")?;
    STANDARD
        .decode(text)
        .map_err(|e| DecodeError::new(format!("invalid base64 binary value: {}", e)))?;
    Ok(text.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::NumericError;
    use serde_json::json;

    fn item(value: Value) -> Map<String, Value> {
        value.as_object().cloned().expect("object")
    }

    #[test]
    fn test_decode_scalar_types() {
        let record = decode_item(&item(json!({
            "name": {"S": "widget"},
            "price": {"N": "10.50"},
            "count": {"N": "3"},
            "active": {"BOOL": true},
            "deleted": {"NULL": true},
            "blob": {"B": "aGVsbG8="}
        })))
        .unwrap();

        assert_eq!(
            serde_json::to_string(&record).unwrap(),
            r#"{"name":"widget","price":10.5,"count":3,"active":true,"deleted":null,"blob":"aGVsbG8="}"#
        );
    }

    #[test]
    fn test_decode_nested_and_set_types() {
        let record = decode_item(&item(json!({
            "tags": {"SS": ["a", "b"]},
            "sizes": {"NS": ["1", "2.5"]},
            "blobs": {"BS": ["AA==", "AQ=="]},
            "dims": {"M": {"w": {"N": "4"}, "h": {"N": "2"}}},
            "history": {"L": [{"S": "x"}, {"N": "1"}, {"L": []}]}
        })))
        .unwrap();

        assert_eq!(
            serde_json::to_string(&record).unwrap(),
            r#"{"tags":["a","b"],"sizes":[1,2.5],"blobs":["AA==","AQ=="],"dims":{"w":4,"h":2},"history":["x",1,[]]}"#
        );
    }

    #[test]
    fn test_decode_preserves_wire_order() {
        let record = decode_item(&item(json!({
            "z": {"S": "1"},
            "a": {"S": "2"},
            "m": {"S": "3"}
        })))
        .unwrap();
        let names: Vec<&str> = record.iter().map(|(n, _)| n).collect();
        assert_eq!(names, vec!["z", "a", "m"]);
    }

    #[test]
    fn test_invalid_number_names_attribute() {
        let err = decode_item(&item(json!({"price": {"N": "ten"}}))).unwrap_err();
        assert!(err.to_string().contains("price"), "got: {}", err);
        match err {
            DecodeError::Attribute { name, source } => {
                assert_eq!(name, "price");
                assert!(matches!(*source, DecodeError::Number(NumericError::Invalid { .. })));
            }
            other => panic!("Expected Attribute, got: {:?}", other),
        }
    }

    #[test]
    fn test_unknown_descriptor_is_rejected() {
        let err = decode_value(&json!({"X": "1"})).unwrap_err();
        assert!(err.to_string().contains("unknown type descriptor"));
    }

    #[test]
    fn test_multiple_descriptors_are_rejected() {
        assert!(decode_value(&json!({"S": "a", "N": "1"})).is_err());
        assert!(decode_value(&json!({})).is_err());
        assert!(decode_value(&json!("plain")).is_err());
    }

    #[test]
    fn test_invalid_base64_is_rejected() {
        assert!(decode_value(&json!({"B": "not base64!"})).is_err());
    }
}
