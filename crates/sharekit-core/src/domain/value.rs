//! Typed property bags
//!
//! Responses from the remote service arrive as JSON objects. They are
//! converted into a [`PropertyBag`]: an ordered mapping from property name to
//! a tagged [`PropertyValue`], so dates, GUIDs and nested entities keep their
//! type through a round trip.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Number, Value};
use uuid::Uuid;

/// A single property value
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum PropertyValue {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
    Guid(Uuid),
    Date(DateTime<Utc>),
    /// Array of scalars (e.g. choice values)
    List(Vec<PropertyValue>),
    /// Nested single entity
    Object(PropertyBag),
    /// Nested entity collection
    Collection(Vec<PropertyBag>),
}

impl PropertyValue {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            PropertyValue::Text(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            PropertyValue::Int(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            PropertyValue::Bool(b) => Some(*b),
            _ => None,
        }
    }

    /// GUIDs parsed on ingestion, or text that still parses as one
    pub fn as_guid(&self) -> Option<Uuid> {
        match self {
            PropertyValue::Guid(g) => Some(*g),
            PropertyValue::Text(s) => Uuid::parse_str(s).ok(),
            _ => None,
        }
    }

    pub fn as_date(&self) -> Option<DateTime<Utc>> {
        match self {
            PropertyValue::Date(d) => Some(*d),
            _ => None,
        }
    }

    pub fn as_object(&self) -> Option<&PropertyBag> {
        match self {
            PropertyValue::Object(bag) => Some(bag),
            _ => None,
        }
    }

    pub fn as_collection(&self) -> Option<&[PropertyBag]> {
        match self {
            PropertyValue::Collection(items) => Some(items),
            _ => None,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, PropertyValue::Null)
    }

    /// Nested values are materialized as child objects, everything else is a
    /// plain property
    pub fn is_nested(&self) -> bool {
        matches!(
            self,
            PropertyValue::Object(_) | PropertyValue::Collection(_)
        )
    }

    /// Text form used when a value fills a path placeholder
    pub fn to_key_string(&self) -> Option<String> {
        match self {
            PropertyValue::Text(s) => Some(s.clone()),
            PropertyValue::Guid(g) => Some(g.to_string()),
            PropertyValue::Int(n) => Some(n.to_string()),
            _ => None,
        }
    }

    /// Converts a JSON value, recognising GUID and RFC 3339 date strings
    pub fn from_json(value: &Value) -> Self {
        match value {
            Value::Null => PropertyValue::Null,
            Value::Bool(b) => PropertyValue::Bool(*b),
            Value::Number(n) => number_value(n),
            Value::String(s) => string_value(s),
            Value::Array(items) => {
                if !items.is_empty() && items.iter().all(Value::is_object) {
                    PropertyValue::Collection(items.iter().map(PropertyBag::from_json).collect())
                } else if items.is_empty() {
                    PropertyValue::Collection(Vec::new())
                } else {
                    PropertyValue::List(items.iter().map(PropertyValue::from_json).collect())
                }
            }
            Value::Object(map) => match map.get("results") {
                // Verbose OData wraps collections as { "results": [...] }
                Some(Value::Array(_)) if map.len() == 1 => PropertyValue::from_json(&map["results"]),
                _ => PropertyValue::Object(PropertyBag::from_json(value)),
            },
        }
    }

    pub fn to_json(&self) -> Value {
        match self {
            PropertyValue::Null => Value::Null,
            PropertyValue::Bool(b) => Value::Bool(*b),
            PropertyValue::Int(n) => Value::from(*n),
            PropertyValue::Float(f) => Number::from_f64(*f).map(Value::Number).unwrap_or(Value::Null),
            PropertyValue::Text(s) => Value::String(s.clone()),
            PropertyValue::Guid(g) => Value::String(g.to_string()),
            PropertyValue::Date(d) => Value::String(d.to_rfc3339()),
            PropertyValue::List(items) => Value::Array(items.iter().map(PropertyValue::to_json).collect()),
            PropertyValue::Object(bag) => bag.to_json(),
            PropertyValue::Collection(items) => {
                Value::Array(items.iter().map(PropertyBag::to_json).collect())
            }
        }
    }
}

fn number_value(n: &Number) -> PropertyValue {
    if let Some(i) = n.as_i64() {
        PropertyValue::Int(i)
    } else if let Some(u) = n.as_u64() {
        i64::try_from(u)
            .map(PropertyValue::Int)
            .unwrap_or(PropertyValue::Float(u as f64))
    } else {
        PropertyValue::Float(n.as_f64().unwrap_or_default())
    }
}

fn string_value(s: &str) -> PropertyValue {
    if s.len() == 36 {
        if let Ok(guid) = Uuid::parse_str(s) {
            return PropertyValue::Guid(guid);
        }
    }
    // Only full timestamps; "2021" or "12:00" stay text
    if s.len() >= 20 && s.as_bytes().get(10) == Some(&b'T') {
        if let Ok(date) = DateTime::parse_from_rfc3339(s) {
            return PropertyValue::Date(date.with_timezone(&Utc));
        }
    }
    PropertyValue::Text(s.to_string())
}

impl From<&str> for PropertyValue {
    fn from(value: &str) -> Self {
        PropertyValue::Text(value.to_string())
    }
}

impl From<String> for PropertyValue {
    fn from(value: String) -> Self {
        PropertyValue::Text(value)
    }
}

impl From<bool> for PropertyValue {
    fn from(value: bool) -> Self {
        PropertyValue::Bool(value)
    }
}

impl From<i64> for PropertyValue {
    fn from(value: i64) -> Self {
        PropertyValue::Int(value)
    }
}

impl From<i32> for PropertyValue {
    fn from(value: i32) -> Self {
        PropertyValue::Int(i64::from(value))
    }
}

impl From<u32> for PropertyValue {
    fn from(value: u32) -> Self {
        PropertyValue::Int(i64::from(value))
    }
}

impl From<f64> for PropertyValue {
    fn from(value: f64) -> Self {
        PropertyValue::Float(value)
    }
}

impl From<Uuid> for PropertyValue {
    fn from(value: Uuid) -> Self {
        PropertyValue::Guid(value)
    }
}

impl From<DateTime<Utc>> for PropertyValue {
    fn from(value: DateTime<Utc>) -> Self {
        PropertyValue::Date(value)
    }
}

impl From<PropertyBag> for PropertyValue {
    fn from(value: PropertyBag) -> Self {
        PropertyValue::Object(value)
    }
}

// ============================================================================
// PropertyBag
// ============================================================================

/// Ordered mapping from property name to value
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PropertyBag(BTreeMap<String, PropertyValue>);

impl PropertyBag {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insert
    #[must_use]
    pub fn with(mut self, name: impl Into<String>, value: impl Into<PropertyValue>) -> Self {
        self.insert(name, value);
        self
    }

    pub fn insert(
        &mut self,
        name: impl Into<String>,
        value: impl Into<PropertyValue>,
    ) -> Option<PropertyValue> {
        self.0.insert(name.into(), value.into())
    }

    pub fn get(&self, name: &str) -> Option<&PropertyValue> {
        self.0.get(name)
    }

    pub fn remove(&mut self, name: &str) -> Option<PropertyValue> {
        self.0.remove(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.0.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &PropertyValue)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Union with `other`; values present in both are taken from `other`
    pub fn merge(&mut self, other: PropertyBag) {
        self.0.extend(other.0);
    }

    /// Converts a JSON object; any other JSON value yields `{ "value": .. }`
    pub fn from_json(value: &Value) -> Self {
        match value {
            Value::Object(map) => Self(
                map.iter()
                    .map(|(k, v)| (k.clone(), PropertyValue::from_json(v)))
                    .collect(),
            ),
            Value::Null => Self::default(),
            other => Self::default().with("value", PropertyValue::from_json(other)),
        }
    }

    pub fn to_json(&self) -> Value {
        let map: Map<String, Value> = self
            .0
            .iter()
            .map(|(k, v)| (k.clone(), v.to_json()))
            .collect();
        Value::Object(map)
    }
}

impl IntoIterator for PropertyBag {
    type Item = (String, PropertyValue);
    type IntoIter = std::collections::btree_map::IntoIter<String, PropertyValue>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}

impl<K: Into<String>, V: Into<PropertyValue>> FromIterator<(K, V)> for PropertyBag {
    fn from_iter<T: IntoIterator<Item = (K, V)>>(iter: T) -> Self {
        Self(
            iter.into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        )
    }
}
