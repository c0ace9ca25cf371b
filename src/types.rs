use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;

/// Unique identifier of a wizard step
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StepId(pub String);

impl StepId {
    /// Create a new step id
    #[inline]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// The id as a string slice
    #[inline]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for StepId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for StepId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl From<String> for StepId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

/// Direction of the most recent navigation move
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NavigationDirection {
    /// Forward to the next step
    Next,
    /// Backward to a previous step
    Prev,
    /// Direct jump to an arbitrary step
    Jump,
}

/// The wizard's working form data
///
/// This is a wrapper around a JSON object with helper methods for
/// reading and mutating individual fields. All step predicates,
/// validators, and hooks observe the data through this type.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FormData {
    fields: Map<String, Value>,
}

impl FormData {
    /// Create an empty data object
    #[inline]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create from a JSON value; returns `None` unless the value is an object
    pub fn from_value(value: Value) -> Option<Self> {
        match value {
            Value::Object(fields) => Some(Self { fields }),
            _ => None,
        }
    }

    /// Get a field value by key
    #[inline]
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.fields.get(key)
    }

    /// Get a field as a string slice
    #[inline]
    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.fields.get(key).and_then(Value::as_str)
    }

    /// Get a field as a number
    #[inline]
    pub fn get_f64(&self, key: &str) -> Option<f64> {
        self.fields.get(key).and_then(Value::as_f64)
    }

    /// Get a field as a boolean
    #[inline]
    pub fn get_bool(&self, key: &str) -> Option<bool> {
        self.fields.get(key).and_then(Value::as_bool)
    }

    /// Set a field value
    #[inline]
    pub fn set(&mut self, key: impl Into<String>, value: Value) {
        self.fields.insert(key.into(), value);
    }

    /// Remove a field, returning its previous value
    #[inline]
    pub fn remove(&mut self, key: &str) -> Option<Value> {
        self.fields.remove(key)
    }

    /// Check whether a field is present
    #[inline]
    pub fn contains(&self, key: &str) -> bool {
        self.fields.contains_key(key)
    }

    /// Merge another data object into this one; colliding keys take the
    /// patch's value
    pub fn merge(&mut self, patch: FormData) {
        for (key, value) in patch.fields {
            self.fields.insert(key, value);
        }
    }

    /// Return a copy of this object with the patch merged in
    pub fn merged(&self, patch: FormData) -> FormData {
        let mut out = self.clone();
        out.merge(patch);
        out
    }

    /// Iterate over the field names
    pub fn keys(&self) -> impl Iterator<Item = &String> {
        self.fields.keys()
    }

    /// Number of fields
    #[inline]
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    /// Check whether there are no fields
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Take ownership of the underlying JSON object
    #[inline]
    pub fn into_value(self) -> Value {
        Value::Object(self.fields)
    }

    /// Borrow the underlying JSON object
    #[inline]
    pub fn as_map(&self) -> &Map<String, Value> {
        &self.fields
    }
}

impl From<Map<String, Value>> for FormData {
    fn from(fields: Map<String, Value>) -> Self {
        Self { fields }
    }
}

impl FromIterator<(String, Value)> for FormData {
    fn from_iter<T: IntoIterator<Item = (String, Value)>>(iter: T) -> Self {
        Self {
            fields: iter.into_iter().collect(),
        }
    }
}
