use serde::{de::DeserializeOwned, Deserialize, Serialize};
use serde_json::{Map, Value};

/// A free-form bag of keyed data carried by workflows, steps, tasks and results
///
/// This is a wrapper around a JSON object with helper methods for the
/// key-wise merging the engine does when building tasks and folding results
/// back into workflow context.
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
#[serde(transparent)]
pub struct DataBag {
    /// The inner JSON object
    pub entries: Map<String, Value>,
}

impl DataBag {
    /// Create an empty data bag
    #[inline]
    pub fn new() -> Self {
        Self { entries: Map::new() }
    }

    /// Create a data bag from a JSON value; non-object values are keyed under `"value"`
    pub fn from_value(value: Value) -> Self {
        match value {
            Value::Object(entries) => Self { entries },
            Value::Null => Self::new(),
            other => {
                let mut entries = Map::new();
                entries.insert("value".to_string(), other);
                Self { entries }
            }
        }
    }

    /// Create a data bag from a serializable value
    pub fn from_serialize<T>(value: &T) -> Result<Self, serde_json::Error>
    where
        T: Serialize,
    {
        Ok(Self::from_value(serde_json::to_value(value)?))
    }

    /// Insert a value under a key, returning the previous value if any
    #[inline]
    pub fn insert(&mut self, key: impl Into<String>, value: Value) -> Option<Value> {
        self.entries.insert(key.into(), value)
    }

    /// Get a value by key
    #[inline]
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.entries.get(key)
    }

    /// Get a string value by key
    #[inline]
    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.entries.get(key).and_then(Value::as_str)
    }

    /// Check whether the bag has no entries
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Number of entries in the bag
    #[inline]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Merge another bag into this one; keys from `other` win on conflict
    pub fn merge(&mut self, other: &DataBag) {
        for (key, value) in &other.entries {
            self.entries.insert(key.clone(), value.clone());
        }
    }

    /// Return a copy of this bag with `other` merged on top
    pub fn merged(&self, other: &DataBag) -> DataBag {
        let mut result = self.clone();
        result.merge(other);
        result
    }

    /// Take ownership of the bag as a JSON value
    #[inline]
    pub fn into_value(self) -> Value {
        Value::Object(self.entries)
    }

    /// Try to deserialize a single entry into a concrete type
    pub fn get_as<T>(&self, key: &str) -> Option<T>
    where
        T: DeserializeOwned,
    {
        self.entries
            .get(key)
            .cloned()
            .and_then(|v| serde_json::from_value(v).ok())
    }
}

impl From<Map<String, Value>> for DataBag {
    fn from(entries: Map<String, Value>) -> Self {
        Self { entries }
    }
}
