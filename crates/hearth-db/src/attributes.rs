//! Attribute bags.
//!
//! Remote resources carry a loosely-typed bag of attributes (friendly name,
//! unit, device class, area hints, ...). The bag is stored as-is on the
//! entity row and read through typed accessors that fall back to a default
//! when a key is missing or holds a value of another type.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

/// A single attribute value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AttrValue {
    /// No value (null).
    Null,
    /// A boolean value.
    Bool(bool),
    /// An integer value.
    Int(i64),
    /// A floating-point value.
    Float(f64),
    /// A text value.
    Text(String),
    /// Multiple values.
    List(Vec<AttrValue>),
    /// Nested object.
    Map(BTreeMap<String, AttrValue>),
}

impl AttrValue {
    /// Check if this is a null value.
    pub fn is_null(&self) -> bool {
        matches!(self, AttrValue::Null)
    }

    /// Get as text if this is a text value.
    pub fn as_text(&self) -> Option<&str> {
        match self {
            AttrValue::Text(s) => Some(s),
            _ => None,
        }
    }

    /// Get as an integer. Floats with no fractional part are accepted.
    pub fn as_int(&self) -> Option<i64> {
        match self {
            AttrValue::Int(i) => Some(*i),
            AttrValue::Float(f) if f.fract() == 0.0 => Some(*f as i64),
            _ => None,
        }
    }

    /// Get as a float. Integers are widened.
    pub fn as_float(&self) -> Option<f64> {
        match self {
            AttrValue::Float(f) => Some(*f),
            AttrValue::Int(i) => Some(*i as f64),
            _ => None,
        }
    }

    /// Get as a boolean.
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            AttrValue::Bool(b) => Some(*b),
            _ => None,
        }
    }

    /// Get as a list.
    pub fn as_list(&self) -> Option<&[AttrValue]> {
        match self {
            AttrValue::List(items) => Some(items),
            _ => None,
        }
    }
}

impl From<Value> for AttrValue {
    fn from(value: Value) -> Self {
        match value {
            Value::Null => AttrValue::Null,
            Value::Bool(b) => AttrValue::Bool(b),
            Value::Number(n) => match n.as_i64() {
                Some(i) => AttrValue::Int(i),
                None => AttrValue::Float(n.as_f64().unwrap_or_default()),
            },
            Value::String(s) => AttrValue::Text(s),
            Value::Array(items) => AttrValue::List(items.into_iter().map(Into::into).collect()),
            Value::Object(map) => {
                AttrValue::Map(map.into_iter().map(|(k, v)| (k, v.into())).collect())
            }
        }
    }
}

impl From<&str> for AttrValue {
    fn from(s: &str) -> Self {
        AttrValue::Text(s.to_string())
    }
}

impl From<String> for AttrValue {
    fn from(s: String) -> Self {
        AttrValue::Text(s)
    }
}

impl From<i64> for AttrValue {
    fn from(i: i64) -> Self {
        AttrValue::Int(i)
    }
}

impl From<f64> for AttrValue {
    fn from(f: f64) -> Self {
        AttrValue::Float(f)
    }
}

impl From<bool> for AttrValue {
    fn from(b: bool) -> Self {
        AttrValue::Bool(b)
    }
}

/// Ordered map of attribute name to value.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AttributeBag {
    attributes: BTreeMap<String, AttrValue>,
}

impl AttributeBag {
    /// Create a new empty bag.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set an attribute using builder pattern.
    pub fn with(mut self, name: impl Into<String>, value: impl Into<AttrValue>) -> Self {
        self.set(name, value);
        self
    }

    /// Set an attribute value.
    pub fn set(&mut self, name: impl Into<String>, value: impl Into<AttrValue>) {
        self.attributes.insert(name.into(), value.into());
    }

    /// Get an attribute value.
    pub fn get(&self, name: &str) -> Option<&AttrValue> {
        self.attributes.get(name)
    }

    /// Get a text attribute.
    pub fn text(&self, name: &str) -> Option<&str> {
        self.get(name).and_then(AttrValue::as_text)
    }

    /// Get a text attribute or `default`.
    pub fn text_or<'a>(&'a self, name: &str, default: &'a str) -> &'a str {
        self.text(name).unwrap_or(default)
    }

    /// Get an integer attribute or `default`.
    pub fn int_or(&self, name: &str, default: i64) -> i64 {
        self.get(name).and_then(AttrValue::as_int).unwrap_or(default)
    }

    /// Get a float attribute or `default`.
    pub fn float_or(&self, name: &str, default: f64) -> f64 {
        self.get(name)
            .and_then(AttrValue::as_float)
            .unwrap_or(default)
    }

    /// Get a boolean attribute or `default`.
    pub fn bool_or(&self, name: &str, default: bool) -> bool {
        self.get(name)
            .and_then(AttrValue::as_bool)
            .unwrap_or(default)
    }

    /// First non-empty text value among `names`, in order.
    pub fn first_text<S: AsRef<str>>(&self, names: &[S]) -> Option<&str> {
        names
            .iter()
            .filter_map(|name| self.text(name.as_ref()))
            .map(str::trim)
            .find(|value| !value.is_empty())
    }

    /// Check if an attribute exists.
    pub fn has(&self, name: &str) -> bool {
        self.attributes.contains_key(name)
    }

    /// Number of attributes.
    pub fn len(&self) -> usize {
        self.attributes.len()
    }

    /// Check if the bag is empty.
    pub fn is_empty(&self) -> bool {
        self.attributes.is_empty()
    }

    /// Iterate over all attributes in name order.
    pub fn iter(&self) -> impl Iterator<Item = (&String, &AttrValue)> {
        self.attributes.iter()
    }
}

impl FromIterator<(String, AttrValue)> for AttributeBag {
    fn from_iter<T: IntoIterator<Item = (String, AttrValue)>>(iter: T) -> Self {
        Self {
            attributes: iter.into_iter().collect(),
        }
    }
}

impl From<serde_json::Map<String, Value>> for AttributeBag {
    fn from(map: serde_json::Map<String, Value>) -> Self {
        map.into_iter().map(|(k, v)| (k, v.into())).collect()
    }
}
