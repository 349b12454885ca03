//! Document source abstraction
//!
//! A source is the queryable store records are read from. Every backend
//! implements the same capability set: counting, paged distinct-value
//! enumeration, field type lookup, and a lazy scan.

use crate::domain::{AnonymizeError, FieldType, Record, Result, SourceError, ValueKey};
use async_trait::async_trait;
use futures::stream::BoxStream;
use serde_json::Value;
use std::collections::BTreeMap;

/// Lazy sequence of records produced by [`DocumentSource::scan`]
pub type RecordStream = BoxStream<'static, Result<Record>>;

/// Backend-specific query predicate
///
/// `None` selects every record. The same predicate is used for counting,
/// value enumeration, and the scan.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Query(Option<Value>);

impl Query {
    /// A predicate matching every record
    pub fn match_all() -> Self {
        Self(None)
    }

    /// Wraps a backend predicate
    pub fn new(predicate: Value) -> Self {
        match predicate {
            Value::Null => Self(None),
            other => Self(Some(other)),
        }
    }

    /// The predicate, if any
    pub fn predicate(&self) -> Option<&Value> {
        self.0.as_ref()
    }

    /// Evaluates the predicate against a flattened record
    ///
    /// For backends without a native query language the predicate is an
    /// object of flattened field path to required value. A list field
    /// matches when it contains the value.
    ///
    /// # Errors
    ///
    /// Returns a query error if the predicate is not an object.
    pub fn matches(&self, record: &Record) -> Result<bool> {
        let conditions = match &self.0 {
            None => return Ok(true),
            Some(Value::Object(conditions)) => conditions,
            Some(_) => {
                return Err(SourceError::QueryFailed(
                    "predicate must be an object of field path to value".to_string(),
                )
                .into())
            }
        };

        Ok(conditions.iter().all(|(field, expected)| match record.get(field) {
            Some(Value::Array(items)) => items.contains(expected),
            Some(actual) => actual == expected,
            None => expected.is_null(),
        }))
    }
}

/// Fields requested from a scan
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Projection {
    /// Field paths to return; `None` returns every field
    pub includes: Option<Vec<String>>,
    /// Field paths never returned
    pub excludes: Vec<String>,
}

impl Projection {
    /// A projection returning every field
    pub fn all() -> Self {
        Self::default()
    }

    /// Applies the projection to a record
    pub fn apply(&self, record: Record) -> Record {
        record.project(self.includes.as_deref(), &self.excludes)
    }
}

/// Capability set every source backend implements
#[async_trait]
pub trait DocumentSource: Send + Sync {
    /// Short backend label used in logs
    fn kind(&self) -> &'static str;

    /// Test connectivity to the backing store
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be reached.
    async fn test_connection(&self) -> Result<()>;

    /// Count the records matching a predicate
    ///
    /// # Errors
    ///
    /// Returns a source error if the count request fails.
    async fn count(&self, query: &Query) -> Result<u64>;

    /// Fetch one page of distinct values of a field
    ///
    /// Values are ordered by a stable sort key. The page starts strictly after
    /// `after` and holds at most `page_size` values; a shorter page is the
    /// last one.
    ///
    /// # Arguments
    ///
    /// * `field` - Flattened field path
    /// * `query` - Predicate restricting the records considered
    /// * `after` - Last value of the previous page
    /// * `page_size` - Maximum number of values to return
    ///
    /// # Errors
    ///
    /// Returns a source error if the page cannot be fetched.
    async fn distinct_values_page(
        &self,
        field: &str,
        query: &Query,
        after: Option<&Value>,
        page_size: usize,
    ) -> Result<Vec<Value>>;

    /// Declared type of a field, consistent across all partitions
    ///
    /// Returns `Ok(None)` when no partition declares the field.
    ///
    /// # Errors
    ///
    /// Returns [`AnonymizeError::ProviderInference`] if partitions disagree.
    async fn field_type(&self, field: &str) -> Result<Option<FieldType>>;

    /// Lazily read every record matching the predicate
    ///
    /// # Errors
    ///
    /// Returns a source error if the scan cannot be opened. Errors while
    /// reading later pages are yielded by the stream.
    async fn scan(&self, query: &Query, projection: &Projection) -> Result<RecordStream>;
}

/// Reduces per-partition type tags to a single tag
///
/// # Errors
///
/// Returns [`AnonymizeError::ProviderInference`] naming the field and the
/// disagreeing partitions.
pub fn consistent_field_type<I>(field: &str, observed: I) -> Result<Option<FieldType>>
where
    I: IntoIterator<Item = (String, FieldType)>,
{
    let mut settled: Option<(String, FieldType)> = None;

    for (partition, field_type) in observed {
        match &settled {
            None => settled = Some((partition, field_type)),
            Some((first_partition, first_type)) if *first_type != field_type => {
                return Err(AnonymizeError::ProviderInference {
                    field: field.to_string(),
                    message: format!(
                        "partition '{first_partition}' declares '{first_type}' but partition '{partition}' declares '{field_type}'"
                    ),
                });
            }
            Some(_) => {}
        }
    }

    Ok(settled.map(|(_, field_type)| field_type))
}

/// One page of distinct values from an in-process collection
///
/// Values are ordered by their [`ValueKey`]; lists contribute their elements
/// and nulls are skipped. The page starts strictly after `after`.
pub fn distinct_page<'a, I>(values: I, after: Option<&Value>, page_size: usize) -> Vec<Value>
where
    I: IntoIterator<Item = &'a Value>,
{
    let mut window = DistinctWindow::new(after, page_size);
    for value in values {
        window.offer(value);
    }
    window.into_values()
}

/// Sorted distinct values following a cursor, held up to a fixed capacity
///
/// Only the `capacity` smallest keys strictly after the cursor are kept, so
/// memory is bounded by the capacity rather than by the number of values
/// offered. Dropping a key marks the window truncated.
#[derive(Debug)]
pub struct DistinctWindow {
    after: Option<ValueKey>,
    capacity: usize,
    values: BTreeMap<ValueKey, Value>,
    truncated: bool,
}

impl DistinctWindow {
    /// Creates an empty window starting after `after`
    pub fn new(after: Option<&Value>, capacity: usize) -> Self {
        Self {
            after: after.map(ValueKey::of),
            capacity,
            values: BTreeMap::new(),
            truncated: false,
        }
    }

    /// Adds a field value; lists contribute their elements and nulls are skipped
    pub fn offer(&mut self, value: &Value) {
        match value {
            Value::Null => {}
            Value::Array(items) => items.iter().for_each(|item| self.offer(item)),
            scalar => self.insert(scalar),
        }
    }

    fn insert(&mut self, scalar: &Value) {
        let key = ValueKey::of(scalar);
        if self.after.as_ref().map_or(false, |after| key <= *after) || self.values.contains_key(&key) {
            return;
        }

        if self.values.len() >= self.capacity {
            self.truncated = true;
            match self.values.last_key_value() {
                Some((largest, _)) if key < *largest => {
                    self.values.pop_last();
                }
                _ => return,
            }
        }
        self.values.insert(key, scalar.clone());
    }

    /// Whether a distinct value was dropped for lack of capacity
    pub fn is_truncated(&self) -> bool {
        self.truncated
    }

    /// Number of values held
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Whether no value is held
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Held values in key order
    pub fn into_values(self) -> Vec<Value> {
        self.values.into_values().collect()
    }
}
