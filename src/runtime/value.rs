/*!
# Runtime Value Model

Dynamic object graph the executor walks. Objects carry their type name and
a field map; maps preserve insertion order as association pairs so map
iteration and ordinal-based key/value pairing stay deterministic. Enum
values travel as their variant string.
*/

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// One runtime value
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Value {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    Date(NaiveDate),
    List(Vec<Value>),
    /// Insertion-ordered association pairs
    Map(Vec<(Value, Value)>),
    Object(ObjectValue),
}

/// An object instance with its runtime type name
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ObjectValue {
    pub type_name: String,
    pub fields: BTreeMap<String, Value>,
}

impl ObjectValue {
    pub fn new(type_name: impl Into<String>) -> Self {
        Self {
            type_name: type_name.into(),
            fields: BTreeMap::new(),
        }
    }

    pub fn field(&self, name: &str) -> &Value {
        self.fields.get(name).unwrap_or(&Value::Null)
    }

    pub fn set_field(&mut self, name: impl Into<String>, value: Value) {
        self.fields.insert(name.into(), value);
    }
}

impl Value {
    pub fn object(type_name: impl Into<String>) -> Value {
        Value::Object(ObjectValue::new(type_name))
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn as_object(&self) -> Option<&ObjectValue> {
        match self {
            Value::Object(o) => Some(o),
            _ => None,
        }
    }

    pub fn as_object_mut(&mut self) -> Option<&mut ObjectValue> {
        match self {
            Value::Object(o) => Some(o),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&Vec<Value>> {
        match self {
            Value::List(items) => Some(items),
            _ => None,
        }
    }

    pub fn as_map(&self) -> Option<&Vec<(Value, Value)>> {
        match self {
            Value::Map(entries) => Some(entries),
            _ => None,
        }
    }

    /// Canonical string form used to address map entries
    pub fn canonical_key(&self) -> String {
        match self {
            Value::Str(s) => s.clone(),
            Value::Int(i) => i.to_string(),
            Value::Bool(b) => b.to_string(),
            Value::Date(d) => d.format("%Y-%m-%d").to_string(),
            Value::Float(x) => x.to_string(),
            other => format!("{}", other),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => write!(f, "null"),
            Value::Bool(b) => write!(f, "{}", b),
            Value::Int(i) => write!(f, "{}", i),
            Value::Float(x) => write!(f, "{}", x),
            Value::Str(s) => write!(f, "\"{}\"", s),
            Value::Date(d) => write!(f, "{}", d.format("%Y-%m-%d")),
            Value::List(items) => write!(f, "[{} items]", items.len()),
            Value::Map(entries) => write!(f, "{{{} entries}}", entries.len()),
            Value::Object(o) => write!(f, "{}{{..}}", o.type_name),
        }
    }
}

/// One step of a cursor path into the value tree
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PathStep {
    Field(String),
    Elem(usize),
    /// Map entry addressed by canonical key
    MapVal(String),
}

impl Value {
    /// Immutable walk along a cursor path.
    pub fn at_path<'a>(&'a self, path: &[PathStep]) -> Option<&'a Value> {
        let mut current = self;
        for step in path {
            current = match (current, step) {
                (Value::Object(o), PathStep::Field(name)) => o.fields.get(name)?,
                (Value::List(items), PathStep::Elem(i)) => items.get(*i)?,
                (Value::Map(entries), PathStep::MapVal(key)) => {
                    &entries.iter().find(|(k, _)| k.canonical_key() == *key)?.1
                }
                _ => return None,
            };
        }
        Some(current)
    }

    /// Mutable walk along a cursor path.
    pub fn at_path_mut<'a>(&'a mut self, path: &[PathStep]) -> Option<&'a mut Value> {
        let mut current = self;
        for step in path {
            current = match (current, step) {
                (Value::Object(o), PathStep::Field(name)) => o.fields.get_mut(name)?,
                (Value::List(items), PathStep::Elem(i)) => items.get_mut(*i)?,
                (Value::Map(entries), PathStep::MapVal(key)) => {
                    &mut entries
                        .iter_mut()
                        .find(|(k, _)| k.canonical_key() == *key)?
                        .1
                }
                _ => return None,
            };
        }
        Some(current)
    }
}

impl From<serde_json::Value> for Value {
    fn from(v: serde_json::Value) -> Value {
        match v {
            serde_json::Value::Null => Value::Null,
            serde_json::Value::Bool(b) => Value::Bool(b),
            serde_json::Value::Number(n) => {
                if let Some(i) = n.as_i64() {
                    Value::Int(i)
                } else {
                    Value::Float(n.as_f64().unwrap_or(0.0))
                }
            }
            serde_json::Value::String(s) => Value::Str(s),
            serde_json::Value::Array(items) => {
                Value::List(items.into_iter().map(Value::from).collect())
            }
            serde_json::Value::Object(fields) => {
                let mut object = ObjectValue::default();
                for (k, v) in fields {
                    object.fields.insert(k, Value::from(v));
                }
                Value::Object(object)
            }
        }
    }
}

impl From<Value> for serde_json::Value {
    fn from(v: Value) -> serde_json::Value {
        match v {
            Value::Null => serde_json::Value::Null,
            Value::Bool(b) => serde_json::Value::Bool(b),
            Value::Int(i) => serde_json::Value::from(i),
            Value::Float(x) => serde_json::Value::from(x),
            Value::Str(s) => serde_json::Value::String(s),
            Value::Date(d) => serde_json::Value::String(d.format("%Y-%m-%d").to_string()),
            Value::List(items) => {
                serde_json::Value::Array(items.into_iter().map(Into::into).collect())
            }
            Value::Map(entries) => serde_json::Value::Object(
                entries
                    .into_iter()
                    .map(|(k, v)| (k.canonical_key(), v.into()))
                    .collect(),
            ),
            Value::Object(o) => serde_json::Value::Object(
                o.fields.into_iter().map(|(k, v)| (k, v.into())).collect(),
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn path_walks_through_lists_and_maps() {
        let mut root = ObjectValue::new("Root");
        root.set_field(
            "rows",
            Value::List(vec![Value::object("Row"), Value::object("Row")]),
        );
        root.set_field(
            "labels",
            Value::Map(vec![(Value::Str("a".into()), Value::Int(1))]),
        );
        let value = Value::Object(root);

        let path = vec![PathStep::Field("rows".into()), PathStep::Elem(1)];
        assert!(matches!(value.at_path(&path), Some(Value::Object(_))));

        let path = vec![
            PathStep::Field("labels".into()),
            PathStep::MapVal("a".into()),
        ];
        assert_eq!(value.at_path(&path), Some(&Value::Int(1)));
        assert_eq!(value.at_path(&[PathStep::Elem(0)]), None);
    }

    #[test]
    fn json_round_trip_preserves_structure() {
        let json: serde_json::Value =
            serde_json::from_str(r#"{"name":"x","tags":["a","b"],"n":3}"#).unwrap();
        let value = Value::from(json);
        let object = value.as_object().unwrap();
        assert_eq!(object.field("name"), &Value::Str("x".into()));
        assert_eq!(
            object.field("tags").as_list().map(Vec::len),
            Some(2)
        );
        assert_eq!(object.field("n"), &Value::Int(3));
    }
}
