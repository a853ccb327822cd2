//--------------------------------------------------------------------------------------------------
// STRUCTS & ENUMS
//--------------------------------------------------------------------------------------------------
// | Name                    | Description                                       | Key Methods       |
// |-------------------------|---------------------------------------------------|-------------------|
// | Event                   | Immutable topic + property set                    | new, property     |
// | PropertyValue           | Typed value stored in an event property           | as_str, as_i64    |
// | EventError              | Errors raised while building events               |                   |
//--------------------------------------------------------------------------------------------------

use std::collections::HashMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Name of the reserved property that always resolves to the event topic.
pub const EVENT_TOPIC: &str = "event.topics";

/// Separator between topic tokens.
pub const TOPIC_SEPARATOR: char = '/';

/// Errors that can occur while building an event
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EventError {
    /// The topic does not follow the `token(/token)*` grammar
    #[error("Invalid topic: {0:?}")]
    InvalidTopic(String),
}

/// Type alias for Result with EventError
pub type EventResult<T> = Result<T, EventError>;

/// A typed property value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PropertyValue {
    Bool(bool),
    Integer(i64),
    Float(f64),
    String(String),
    List(Vec<PropertyValue>),
}

impl PropertyValue {
    /// Returns the string slice if this is a string value.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            PropertyValue::String(s) => Some(s),
            _ => None,
        }
    }

    /// Returns the integer if this is an integer value.
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            PropertyValue::Integer(i) => Some(*i),
            _ => None,
        }
    }

    /// Returns the boolean if this is a boolean value.
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            PropertyValue::Bool(b) => Some(*b),
            _ => None,
        }
    }
}

impl fmt::Display for PropertyValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PropertyValue::Bool(b) => write!(f, "{b}"),
            PropertyValue::Integer(i) => write!(f, "{i}"),
            PropertyValue::Float(v) => write!(f, "{v}"),
            PropertyValue::String(s) => f.write_str(s),
            PropertyValue::List(items) => {
                f.write_str("[")?;
                for (idx, item) in items.iter().enumerate() {
                    if idx > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{item}")?;
                }
                f.write_str("]")
            }
        }
    }
}

impl From<&str> for PropertyValue {
    fn from(value: &str) -> Self {
        PropertyValue::String(value.to_string())
    }
}

impl From<String> for PropertyValue {
    fn from(value: String) -> Self {
        PropertyValue::String(value)
    }
}

impl From<i64> for PropertyValue {
    fn from(value: i64) -> Self {
        PropertyValue::Integer(value)
    }
}

impl From<i32> for PropertyValue {
    fn from(value: i32) -> Self {
        PropertyValue::Integer(i64::from(value))
    }
}

impl From<f64> for PropertyValue {
    fn from(value: f64) -> Self {
        PropertyValue::Float(value)
    }
}

impl From<bool> for PropertyValue {
    fn from(value: bool) -> Self {
        PropertyValue::Bool(value)
    }
}

impl<T: Into<PropertyValue>> From<Vec<T>> for PropertyValue {
    fn from(values: Vec<T>) -> Self {
        PropertyValue::List(values.into_iter().map(Into::into).collect())
    }
}

/// Property set carried by an event.
pub type Properties = HashMap<String, PropertyValue>;

/// An immutable event: a topic plus a set of properties.
///
/// Events are created by publishers and shared read-only between the
/// dispatching threads, usually behind an `Arc`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    topic: String,
    properties: Properties,
}

impl Event {
    /// Creates a new event after validating the topic.
    ///
    /// # Arguments
    /// * `topic` - Hierarchical topic such as `com/example/Foo`
    /// * `properties` - Event properties
    ///
    /// # Returns
    /// * `Ok(Event)` - If the topic is well formed
    /// * `Err(EventError::InvalidTopic)` - Otherwise
    pub fn new(topic: impl Into<String>, properties: Properties) -> EventResult<Self> {
        let topic = topic.into();
        validate_topic(&topic)?;
        Ok(Self { topic, properties })
    }

    /// Creates an event without properties.
    pub fn with_topic(topic: impl Into<String>) -> EventResult<Self> {
        Self::new(topic, Properties::new())
    }

    /// Adds a property, consuming and returning the event.
    pub fn with_property(mut self, key: impl Into<String>, value: impl Into<PropertyValue>) -> Self {
        self.properties.insert(key.into(), value.into());
        self
    }

    pub fn topic(&self) -> &str {
        &self.topic
    }

    pub fn properties(&self) -> &Properties {
        &self.properties
    }

    /// Looks up a property by exact key.
    pub fn property(&self, key: &str) -> Option<&PropertyValue> {
        self.properties.get(key)
    }

    /// Looks up a property ignoring the case of the key.
    ///
    /// The reserved `event.topics` key always yields the topic, so filters can
    /// match on it even though publishers never set it.
    pub fn property_ignore_case(&self, key: &str) -> Option<PropertyValue> {
        if key.eq_ignore_ascii_case(EVENT_TOPIC) {
            return Some(PropertyValue::String(self.topic.clone()));
        }
        if let Some(value) = self.properties.get(key) {
            return Some(value.clone());
        }
        self.properties
            .iter()
            .find(|(name, _)| name.eq_ignore_ascii_case(key))
            .map(|(_, value)| value.clone())
    }
}

/// Validates a topic against the `token(/token)*` grammar where a token is a
/// non-empty run of ASCII alphanumerics, `_` or `-`.
pub fn validate_topic(topic: &str) -> EventResult<()> {
    if topic.is_empty() {
        return Err(EventError::InvalidTopic(topic.to_string()));
    }
    let valid = topic.split(TOPIC_SEPARATOR).all(|token| {
        !token.is_empty()
            && token
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
    });
    if valid {
        Ok(())
    } else {
        Err(EventError::InvalidTopic(topic.to_string()))
    }
}
