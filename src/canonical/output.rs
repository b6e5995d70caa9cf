//! Classifier answers as read from text.
//!
//! `serde_json::Value` keeps only the last member when an object repeats a
//! key, so a repeated label would silently drop whatever it carried first.
//! These types keep every member in document order and leave the decision to
//! the validator.

use serde::Deserialize;
use serde::de::{Deserializer, MapAccess, Visitor};
use serde_json::{Map, Value};
use std::fmt;
use std::marker::PhantomData;

/// Object members in document order, repeated keys included.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Members<V>(Vec<(String, V)>);

impl<V> Members<V> {
    pub fn new(members: Vec<(String, V)>) -> Self {
        Self(members)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &V)> {
        self.0.iter().map(|(key, value)| (key.as_str(), value))
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(|(key, _)| key.as_str())
    }

    pub fn values(&self) -> impl Iterator<Item = &V> {
        self.0.iter().map(|(_, value)| value)
    }

    /// First member named `key`.
    pub fn get(&self, key: &str) -> Option<&V> {
        self.iter()
            .find(|(candidate, _)| *candidate == key)
            .map(|(_, value)| value)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl From<&Map<String, Value>> for Members<Value> {
    fn from(map: &Map<String, Value>) -> Self {
        Self(map.iter().map(|(key, value)| (key.clone(), value.clone())).collect())
    }
}

impl<'de, V: Deserialize<'de>> Deserialize<'de> for Members<V> {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct MembersVisitor<V>(PhantomData<V>);

        impl<'de, V: Deserialize<'de>> Visitor<'de> for MembersVisitor<V> {
            type Value = Members<V>;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("a JSON object")
            }

            fn visit_map<A: MapAccess<'de>>(self, mut map: A) -> Result<Self::Value, A::Error> {
                let mut members = Vec::with_capacity(map.size_hint().unwrap_or(0));
                while let Some(entry) = map.next_entry::<String, V>()? {
                    members.push(entry);
                }
                Ok(Members(members))
            }
        }

        deserializer.deserialize_map(MembersVisitor(PhantomData))
    }
}

/// A member value. Objects keep their repeated keys.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum Node {
    Object(Members<Value>),
    Other(Value),
}

impl Node {
    /// Collapse to a plain JSON value; a repeated key keeps its last value.
    pub fn to_value(&self) -> Value {
        match self {
            Node::Object(members) => Value::Object(members.0.iter().cloned().collect()),
            Node::Other(value) => value.clone(),
        }
    }
}

impl From<&Value> for Node {
    fn from(value: &Value) -> Self {
        match value {
            Value::Object(map) => Node::Object(Members::from(map)),
            other => Node::Other(other.clone()),
        }
    }
}

/// A parsed classifier answer, before validation.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum ModelOutput {
    Object(Members<Node>),
    Other(Value),
}

impl ModelOutput {
    pub fn from_json(text: &str) -> serde_json::Result<Self> {
        serde_json::from_str(text)
    }

    pub fn to_value(&self) -> Value {
        match self {
            ModelOutput::Object(members) => Value::Object(
                members
                    .iter()
                    .map(|(key, node)| (key.to_string(), node.to_value()))
                    .collect(),
            ),
            ModelOutput::Other(value) => value.clone(),
        }
    }
}

impl From<&Value> for ModelOutput {
    fn from(value: &Value) -> Self {
        match value {
            Value::Object(map) => ModelOutput::Object(Members::new(
                map.iter()
                    .map(|(key, value)| (key.clone(), Node::from(value)))
                    .collect(),
            )),
            other => ModelOutput::Other(other.clone()),
        }
    }
}
