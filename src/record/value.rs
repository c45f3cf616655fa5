//! In-memory model of one table item.

use serde::ser::{SerializeMap, SerializeSeq};
use serde::{Serialize, Serializer};

use super::numeric::Number;
use super::DecodeError;

/// A single attribute value.
#[derive(Debug, Clone, PartialEq)]
pub enum AttributeValue {
    Null,
    Bool(bool),
    String(String),
    Number(Number),
    List(Vec<AttributeValue>),
    Map(Record),
}

/// One item of the source table: attribute names mapped to values, in the
/// order the store returned them.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Record {
    fields: Vec<(String, AttributeValue)>,
}

impl Record {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets an attribute, replacing an existing value in place.
    pub fn insert(&mut self, name: impl Into<String>, value: AttributeValue) {
        let name = name.into();
        match self.fields.iter_mut().find(|(n, _)| *n == name) {
            Some(slot) => slot.1 = value,
            None => self.fields.push((name, value)),
        }
    }

    pub fn get(&self, name: &str) -> Option<&AttributeValue> {
        self.fields.iter().find(|(n, _)| n == name).map(|(_, v)| v)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &AttributeValue)> {
        self.fields.iter().map(|(n, v)| (n.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Builds a record from plain JSON (an object). Numbers keep their full
    /// textual precision.
    pub fn from_json(value: serde_json::Value) -> Result<Self, DecodeError> {
        match AttributeValue::from_json(value)? {
            AttributeValue::Map(record) => Ok(record),
            _ => Err(DecodeError::new("record must be a JSON object")),
        }
    }
}

impl FromIterator<(String, AttributeValue)> for Record {
    fn from_iter<I: IntoIterator<Item = (String, AttributeValue)>>(iter: I) -> Self {
        let mut record = Record::new();
        for (name, value) in iter {
            record.insert(name, value);
        }
        record
    }
}

impl AttributeValue {
    /// Converts plain JSON into an attribute value.
    pub fn from_json(value: serde_json::Value) -> Result<Self, DecodeError> {
        Ok(match value {
            serde_json::Value::Null => AttributeValue::Null,
            serde_json::Value::Bool(b) => AttributeValue::Bool(b),
            serde_json::Value::String(s) => AttributeValue::String(s),
            serde_json::Value::Number(n) => AttributeValue::Number(n.to_string().parse()?),
            serde_json::Value::Array(items) => AttributeValue::List(
                items
                    .into_iter()
                    .map(AttributeValue::from_json)
                    .collect::<Result<_, DecodeError>>()?,
            ),
            serde_json::Value::Object(map) => AttributeValue::Map(
                map.into_iter()
                    .map(|(k, v)| AttributeValue::from_json(v).map(|v| (k, v)))
                    .collect::<Result<_, DecodeError>>()?,
            ),
        })
    }
}

impl Serialize for AttributeValue {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match self {
            AttributeValue::Null => serializer.serialize_unit(),
            AttributeValue::Bool(b) => serializer.serialize_bool(*b),
            AttributeValue::String(s) => serializer.serialize_str(s),
            AttributeValue::Number(n) => n.serialize(serializer),
            AttributeValue::List(items) => {
                let mut seq = serializer.serialize_seq(Some(items.len()))?;
                for item in items {
                    seq.serialize_element(item)?;
                }
                seq.end()
            }
            AttributeValue::Map(record) => record.serialize(serializer),
        }
    }
}

impl Serialize for Record {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let mut map = serializer.serialize_map(Some(self.fields.len()))?;
        for (name, value) in &self.fields {
            map.serialize_entry(name, value)?;
        }
        map.end()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_serializes_in_insertion_order() {
        let mut record = Record::new();
        record.insert("zeta", AttributeValue::Bool(true));
        record.insert("alpha", AttributeValue::Null);
        record.insert("mid", AttributeValue::String("x".into()));

        assert_eq!(
            serde_json::to_string(&record).unwrap(),
            r#"{"zeta":true,"alpha":null,"mid":"x"}"#
        );
    }

    #[test]
    fn test_insert_replaces_existing_attribute() {
        let mut record = Record::new();
        record.insert("a", AttributeValue::Number(1.into()));
        record.insert("b", AttributeValue::Null);
        record.insert("a", AttributeValue::Number(2.into()));

        assert_eq!(record.len(), 2);
        assert_eq!(serde_json::to_string(&record).unwrap(), r#"{"a":2,"b":null}"#);
    }

    #[test]
    fn test_nested_values_use_numeric_codec() {
        let record = Record::from_json(json!({
            "id": 7,
            "scores": [1.5, 2, {"deep": 3.25}],
            "meta": {"active": false, "note": null}
        }))
        .unwrap();

        assert_eq!(
            serde_json::to_string(&record).unwrap(),
            r#"{"id":7,"scores":[1.5,2,{"deep":3.25}],"meta":{"active":false,"note":null}}"#
        );
    }

    #[test]
    fn test_from_json_rejects_non_object() {
        assert!(Record::from_json(json!([1, 2])).is_err());
        assert!(Record::from_json(json!("text")).is_err());
    }

    #[test]
    fn test_get_and_iter() {
        let record = Record::from_json(json!({"a": "x", "b": true})).unwrap();
        assert_eq!(record.get("a"), Some(&AttributeValue::String("x".into())));
        assert!(record.get("missing").is_none());
        let names: Vec<&str> = record.iter().map(|(n, _)| n).collect();
        assert_eq!(names, vec!["a", "b"]);
    }
}
