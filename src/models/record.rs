// src/models/record.rs - Schema-agnostic registry records
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;

/// Stable identifier of a record within its registry.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct RecordId(pub String);

impl RecordId {
    pub fn new(id: impl Into<String>) -> Self {
        RecordId(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for RecordId {
    fn from(s: &str) -> Self {
        RecordId(s.to_string())
    }
}

/// Closed value variant for registry fields. Anything that is not a string,
/// number or date collapses to `Null` at read time rather than failing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FieldValue {
    String(String),
    Number(f64),
    Date(NaiveDate),
    Null,
}

impl FieldValue {
    /// String rendering used by similarity and indexing code. `Null` and
    /// blank strings both count as "no value".
    pub fn as_text(&self) -> Option<String> {
        match self {
            FieldValue::String(s) => {
                let t = s.trim();
                if t.is_empty() {
                    None
                } else {
                    Some(t.to_string())
                }
            }
            FieldValue::Number(n) => Some(format!("{}", n)),
            FieldValue::Date(d) => Some(d.format("%Y-%m-%d").to_string()),
            FieldValue::Null => None,
        }
    }

    pub fn as_number(&self) -> Option<f64> {
        match self {
            FieldValue::Number(n) => Some(*n),
            FieldValue::String(s) => s.trim().parse::<f64>().ok(),
            _ => None,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, FieldValue::Null)
    }

    pub fn from_json(value: &Value) -> FieldValue {
        match value {
            Value::String(s) => {
                // Dates are stored as plain strings in both registries.
                if let Ok(d) = NaiveDate::parse_from_str(s, "%Y-%m-%d") {
                    FieldValue::Date(d)
                } else {
                    FieldValue::String(s.clone())
                }
            }
            Value::Number(n) => n
                .as_f64()
                .map(FieldValue::Number)
                .unwrap_or(FieldValue::Null),
            Value::Bool(b) => FieldValue::String(b.to_string()),
            _ => FieldValue::Null,
        }
    }

    pub fn to_json(&self) -> Value {
        match self {
            FieldValue::String(s) => Value::String(s.clone()),
            FieldValue::Number(n) => serde_json::Number::from_f64(*n)
                .map(Value::Number)
                .unwrap_or(Value::Null),
            FieldValue::Date(d) => Value::String(d.format("%Y-%m-%d").to_string()),
            FieldValue::Null => Value::Null,
        }
    }
}

/// One row of a registry: a stable id plus an ordered field map. Immutable
/// for the duration of a matching pass.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Record {
    pub registry: String,
    pub id: RecordId,
    pub fields: BTreeMap<String, FieldValue>,
}

impl Record {
    pub fn new(registry: impl Into<String>, id: impl Into<String>) -> Self {
        Record {
            registry: registry.into(),
            id: RecordId::new(id),
            fields: BTreeMap::new(),
        }
    }

    pub fn with_field(mut self, name: impl Into<String>, value: FieldValue) -> Self {
        self.fields.insert(name.into(), value);
        self
    }

    pub fn with_text(self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.with_field(name, FieldValue::String(value.into()))
    }

    pub fn field(&self, name: &str) -> Option<&FieldValue> {
        self.fields.get(name)
    }

    /// Non-empty text of a field, or `None` when the field is absent, null
    /// or blank. Callers treat `None` uniformly as "no value".
    pub fn text(&self, name: &str) -> Option<String> {
        self.fields.get(name).and_then(|v| v.as_text())
    }

    pub fn number(&self, name: &str) -> Option<f64> {
        self.fields.get(name).and_then(|v| v.as_number())
    }

    /// Fraction of fields that carry a value, used by arbitration tie-breaks.
    pub fn completeness(&self) -> f64 {
        if self.fields.is_empty() {
            return 0.0;
        }
        let filled = self
            .fields
            .values()
            .filter(|v| v.as_text().is_some())
            .count();
        filled as f64 / self.fields.len() as f64
    }

    /// Builds a record from a stored JSON document. The `_id` member carries
    /// the record id; every other member becomes a field.
    pub fn from_document(registry: &str, doc: &Value) -> Option<Record> {
        let obj = doc.as_object()?;
        let id = obj.get("_id")?.as_str()?.to_string();
        let mut fields = BTreeMap::new();
        for (k, v) in obj {
            if k == "_id" {
                continue;
            }
            fields.insert(k.clone(), FieldValue::from_json(v));
        }
        Some(Record {
            registry: registry.to_string(),
            id: RecordId(id),
            fields,
        })
    }

    pub fn to_document(&self) -> Value {
        let mut obj = serde_json::Map::new();
        obj.insert("_id".to_string(), Value::String(self.id.0.clone()));
        for (k, v) in &self.fields {
            obj.insert(k.clone(), v.to_json());
        }
        Value::Object(obj)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_blank_text_is_no_value() {
        let r = Record::new("inspection", "r1")
            .with_text("unit_name", "  ")
            .with_field("code", FieldValue::Null);
        assert_eq!(r.text("unit_name"), None);
        assert_eq!(r.text("code"), None);
        assert_eq!(r.text("missing"), None);
    }

    #[test]
    fn test_document_round_trip() {
        let r = Record::new("supervision", "t9")
            .with_text("unit_name", "上海为民食品厂")
            .with_field("employee_count", FieldValue::Number(42.0));
        let doc = r.to_document();
        let back = Record::from_document("supervision", &doc).unwrap();
        assert_eq!(back.id, r.id);
        assert_eq!(back.text("unit_name").as_deref(), Some("上海为民食品厂"));
        assert_eq!(back.number("employee_count"), Some(42.0));
    }

    #[test]
    fn test_date_detection_from_json() {
        let v = Value::String("2024-05-01".to_string());
        match FieldValue::from_json(&v) {
            FieldValue::Date(d) => assert_eq!(d.format("%Y-%m-%d").to_string(), "2024-05-01"),
            other => panic!("expected date, got {:?}", other),
        }
    }

    #[test]
    fn test_completeness() {
        let r = Record::new("inspection", "r1")
            .with_text("a", "x")
            .with_field("b", FieldValue::Null);
        assert!((r.completeness() - 0.5).abs() < f64::EPSILON);
    }
}
