//! Elasticsearch request and response models

use serde::Deserialize;
use serde_json::{json, Map, Value};
use std::collections::HashMap;

/// `_count` response
#[derive(Debug, Deserialize)]
pub struct CountResponse {
    pub count: u64,
}

/// `_search` response with scroll support
#[derive(Debug, Deserialize)]
pub struct SearchResponse {
    #[serde(rename = "_scroll_id", default)]
    pub scroll_id: Option<String>,
    pub hits: Hits,
}

#[derive(Debug, Deserialize)]
pub struct Hits {
    #[serde(default)]
    pub hits: Vec<Hit>,
}

#[derive(Debug, Deserialize)]
pub struct Hit {
    #[serde(rename = "_source", default)]
    pub source: Value,
    /// Doc values requested through `docvalue_fields`
    #[serde(default)]
    pub fields: Map<String, Value>,
}

/// `_search` response of a composite aggregation named `values`
#[derive(Debug, Deserialize)]
pub struct CompositeResponse {
    pub aggregations: CompositeAggregations,
}

#[derive(Debug, Deserialize)]
pub struct CompositeAggregations {
    pub values: CompositeAggregation,
}

#[derive(Debug, Deserialize)]
pub struct CompositeAggregation {
    #[serde(default)]
    pub buckets: Vec<CompositeBucket>,
}

#[derive(Debug, Deserialize)]
pub struct CompositeBucket {
    pub key: Map<String, Value>,
}

/// `_mapping/field/<path>` response, keyed by index name
pub type FieldMappingResponse = HashMap<String, IndexFieldMappings>;

#[derive(Debug, Deserialize)]
pub struct IndexFieldMappings {
    #[serde(default)]
    pub mappings: HashMap<String, FieldMapping>,
}

#[derive(Debug, Deserialize)]
pub struct FieldMapping {
    #[serde(default)]
    pub full_name: Option<String>,
    #[serde(default)]
    pub mapping: HashMap<String, TypedMapping>,
}

#[derive(Debug, Deserialize)]
pub struct TypedMapping {
    #[serde(rename = "type")]
    pub kind: Option<String>,
}

/// `_bulk` response
#[derive(Debug, Deserialize)]
pub struct BulkResponse {
    pub errors: bool,
    #[serde(default)]
    pub items: Vec<HashMap<String, BulkItem>>,
}

#[derive(Debug, Deserialize)]
pub struct BulkItem {
    #[serde(default)]
    pub status: u16,
    #[serde(default)]
    pub error: Option<Value>,
}

impl BulkItem {
    /// Whether the item was rejected
    pub fn failed(&self) -> bool {
        self.error.is_some() || self.status >= 300
    }
}

/// Rendering of `date` and `date_nanos` values in aggregation keys and doc values
///
/// Composite `terms` keys of date fields default to epoch milliseconds, while
/// `_source` keeps whatever string was indexed. Both passes ask for this format
/// so enumerated keys and scanned values compare equal.
pub const DATE_FORMAT: &str = "strict_date_optional_time_nanos";

/// Wraps a predicate in a `query` clause, or returns `match_all`
pub fn query_clause(predicate: Option<&Value>) -> Value {
    predicate
        .cloned()
        .unwrap_or_else(|| json!({ "match_all": {} }))
}

/// Body of a composite aggregation page over one field
///
/// `format` is set for date fields, see [`DATE_FORMAT`].
pub fn composite_body(
    field: &str,
    predicate: Option<&Value>,
    after: Option<&Value>,
    page_size: usize,
    format: Option<&str>,
) -> Value {
    let mut terms = json!({ "field": field });
    if let Some(format) = format {
        terms["format"] = json!(format);
    }
    let mut composite = json!({
        "size": page_size,
        "sources": [{ "value": { "terms": terms } }],
    });
    if let Some(after) = after {
        composite["after"] = json!({ "value": after });
    }

    json!({
        "size": 0,
        "query": query_clause(predicate),
        "aggs": { "values": { "composite": composite } },
    })
}
