//! Flattened records
//!
//! Documents read from a source are flattened into a [`Record`]: a map from a
//! dot-joined field path to a scalar or a list of scalars. Masking, redaction
//! and projection all operate on this flat form. Records can be re-nested on
//! the dot-delimited keys before they are written.

use crate::domain::errors::{value_digest, AnonymizeError, SourceError};
use crate::domain::Result;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::fmt;

/// Separator between path segments of a flattened field
pub const PATH_SEPARATOR: char = '.';

/// A flattened document
///
/// Invariant: no value is a JSON object, and lists only hold scalars.
///
/// # Examples
///
/// ```
/// use anonymize_it::domain::record::Record;
/// use serde_json::json;
///
/// let record = Record::from_document(json!({"user": {"ip": "10.0.0.1"}})).unwrap();
/// assert_eq!(record.get("user.ip"), Some(&json!("10.0.0.1")));
/// ```
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Record(BTreeMap<String, Value>);

impl Record {
    /// Creates an empty record
    pub fn new() -> Self {
        Self::default()
    }

    /// Flattens a JSON document into a record
    ///
    /// Arrays of objects are flattened into one list per leaf path, so
    /// `{"a": [{"b": 1}, {"b": 2}]}` becomes `{"a.b": [1, 2]}`. Empty objects
    /// carry no leaves and are dropped.
    ///
    /// # Errors
    ///
    /// Returns an error if the document is not a JSON object.
    pub fn from_document(document: Value) -> Result<Self> {
        match document {
            Value::Object(map) => {
                let mut fields = BTreeMap::new();
                for (key, value) in map {
                    flatten_value(key, value, &mut fields);
                }
                Ok(Self(fields))
            }
            other => Err(SourceError::InvalidFormat(format!(
                "expected a JSON object, found {}",
                json_kind(&other)
            ))
            .into()),
        }
    }

    /// Returns the value stored at a flattened path
    pub fn get(&self, field: &str) -> Option<&Value> {
        self.0.get(field)
    }

    /// Sets the value of a flattened path
    ///
    /// Object values are flattened beneath the path so the record stays flat.
    pub fn insert(&mut self, field: impl Into<String>, value: Value) {
        flatten_value(field.into(), value, &mut self.0);
    }

    /// Removes a field, returning its previous value
    pub fn remove(&mut self, field: &str) -> Option<Value> {
        self.0.remove(field)
    }

    /// Whether the record holds the field
    pub fn contains(&self, field: &str) -> bool {
        self.0.contains_key(field)
    }

    /// Number of flattened fields
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether the record has no fields
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Iterates over field paths in sorted order
    pub fn fields(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }

    /// Iterates over `(path, value)` pairs in sorted path order
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Mutable access to a field's value
    pub fn get_mut(&mut self, field: &str) -> Option<&mut Value> {
        self.0.get_mut(field)
    }

    /// Keeps only the projected fields
    ///
    /// A field is kept when `includes` is `None` or one of its entries equals
    /// the field path or is a parent path of it, and no entry of `excludes`
    /// does the same.
    pub fn project(mut self, includes: Option<&[String]>, excludes: &[String]) -> Self {
        self.0.retain(|field, _| {
            let included = includes.map_or(true, |paths| paths.iter().any(|p| path_matches(p, field)));
            included && !excludes.iter().any(|p| path_matches(p, field))
        });
        self
    }

    /// Re-nests the record on its dot-delimited keys
    ///
    /// When a path segment is already occupied by a scalar, the remaining
    /// segments are kept as a single dotted key at that level.
    pub fn to_nested(&self) -> Value {
        let mut root = Map::new();
        for (path, value) in &self.0 {
            insert_nested(&mut root, path, value.clone());
        }
        Value::Object(root)
    }

    /// Serializes the record as one JSON line
    ///
    /// # Errors
    ///
    /// Returns a serialization error if the value cannot be encoded.
    pub fn to_json_line(&self, nested: bool) -> Result<String> {
        let line = if nested {
            serde_json::to_string(&self.to_nested())?
        } else {
            serde_json::to_string(&self.0)?
        };
        Ok(line)
    }

    /// Consumes the record and returns the field map
    pub fn into_inner(self) -> BTreeMap<String, Value> {
        self.0
    }
}

impl FromIterator<(String, Value)> for Record {
    fn from_iter<I: IntoIterator<Item = (String, Value)>>(iter: I) -> Self {
        let mut record = Record::new();
        for (field, value) in iter {
            record.insert(field, value);
        }
        record
    }
}

impl TryFrom<Value> for Record {
    type Error = AnonymizeError;

    fn try_from(document: Value) -> Result<Self> {
        Self::from_document(document)
    }
}

/// Canonical key of a scalar field value
///
/// The key is the compact JSON encoding of the value, so the string `"1"` and
/// the number `1` never collide. Keys order deterministically.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ValueKey(String);

impl ValueKey {
    /// Builds the key of a scalar value
    pub fn of(value: &Value) -> Self {
        // Encoding a serde_json::Value into a String cannot fail
        Self(serde_json::to_string(value).unwrap_or_default())
    }

    /// Returns the canonical encoding
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Decodes the key back into the value it was built from
    pub fn to_value(&self) -> Value {
        serde_json::from_str(&self.0).unwrap_or(Value::Null)
    }

    /// Short digest safe to log or report in errors
    pub fn digest(&self) -> String {
        value_digest(&self.0)
    }
}

impl fmt::Display for ValueKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.digest())
    }
}

/// Whether `pattern` names `field` itself or one of its parents
pub fn path_matches(pattern: &str, field: &str) -> bool {
    field == pattern
        || (field.len() > pattern.len()
            && field.starts_with(pattern)
            && field[pattern.len()..].starts_with(PATH_SEPARATOR))
}

fn join_path(prefix: &str, key: &str) -> String {
    if prefix.is_empty() {
        key.to_string()
    } else {
        format!("{prefix}{PATH_SEPARATOR}{key}")
    }
}

fn flatten_value(path: String, value: Value, out: &mut BTreeMap<String, Value>) {
    match value {
        Value::Object(map) => {
            for (key, child) in map {
                flatten_value(join_path(&path, &key), child, out);
            }
        }
        Value::Array(items) => {
            let mut scalars = Vec::new();
            let mut leaves: BTreeMap<String, Vec<Value>> = BTreeMap::new();
            collect_array(&path, items, &mut scalars, &mut leaves);

            if !scalars.is_empty() || leaves.is_empty() {
                out.insert(path, Value::Array(scalars));
            }
            for (leaf, list) in leaves {
                out.insert(leaf, Value::Array(list));
            }
        }
        scalar => {
            out.insert(path, scalar);
        }
    }
}

fn collect_array(
    path: &str,
    items: Vec<Value>,
    scalars: &mut Vec<Value>,
    leaves: &mut BTreeMap<String, Vec<Value>>,
) {
    for item in items {
        match item {
            Value::Array(inner) => collect_array(path, inner, scalars, leaves),
            Value::Object(_) => {
                let mut flat = BTreeMap::new();
                flatten_value(path.to_string(), item, &mut flat);
                for (leaf, value) in flat {
                    let list = leaves.entry(leaf).or_default();
                    match value {
                        Value::Array(values) => list.extend(values),
                        other => list.push(other),
                    }
                }
            }
            scalar => scalars.push(scalar),
        }
    }
}

fn insert_nested(node: &mut Map<String, Value>, path: &str, value: Value) {
    match path.split_once(PATH_SEPARATOR) {
        None => {
            node.insert(path.to_string(), value);
        }
        Some((head, rest)) => {
            let slot = node
                .entry(head.to_string())
                .or_insert_with(|| Value::Object(Map::new()));
            match slot {
                Value::Object(child) => insert_nested(child, rest, value),
                _ => {
                    node.insert(path.to_string(), value);
                }
            }
        }
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}
