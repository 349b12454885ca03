//! Elasticsearch document source

use super::client::{ConnectionParams, ElasticsearchClient};
use super::models::{
    composite_body, query_clause, CompositeResponse, CountResponse, FieldMappingResponse, Hit,
    SearchResponse, DATE_FORMAT,
};
use crate::adapters::source::{
    consistent_field_type, DocumentSource, Projection, Query, RecordStream,
};
use crate::core::retry::{retry_with_backoff, RetryPolicy};
use crate::domain::{AnonymizeError, FieldType, Record, Result, SourceError};
use async_trait::async_trait;
use futures::stream;
use reqwest::Method;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Map, Value};
use std::collections::{BTreeSet, HashMap, VecDeque};
use std::sync::Mutex;

/// Parameters of `[source]` with `type = "elasticsearch"`
#[derive(Debug, Clone, Deserialize)]
pub struct ElasticsearchSourceParams {
    #[serde(flatten)]
    pub connection: ConnectionParams,

    /// Index name or pattern, e.g. `logs-*`
    pub index: String,

    /// Scroll context keep-alive
    #[serde(default = "default_scroll_keepalive")]
    pub scroll_keepalive: String,

    /// Documents per scroll page
    #[serde(default = "default_scan_page_size")]
    pub scan_page_size: usize,
}

fn default_scroll_keepalive() -> String {
    "1m".to_string()
}

fn default_scan_page_size() -> usize {
    1000
}

/// Source reading from an Elasticsearch index or index pattern
///
/// Every request is retried on transient failures. The scan uses the scroll
/// API and clears its scroll context when the stream ends or is dropped.
///
/// Date fields are enumerated and scanned in [`DATE_FORMAT`]: a date field
/// whose distinct values were requested is read from its doc values during
/// the scan, replacing the `_source` string.
pub struct ElasticsearchSource {
    client: ElasticsearchClient,
    params: ElasticsearchSourceParams,
    retry: RetryPolicy,
    date_fields: Mutex<HashMap<String, bool>>,
    enumerated_dates: Mutex<BTreeSet<String>>,
}

impl ElasticsearchSource {
    /// Creates a source
    ///
    /// # Errors
    ///
    /// Returns a configuration error if the client cannot be built.
    pub fn new(params: ElasticsearchSourceParams, retry: RetryPolicy) -> Result<Self> {
        if params.index.trim().is_empty() {
            return Err(AnonymizeError::Configuration(
                "source.params.index cannot be empty".to_string(),
            ));
        }
        let client = ElasticsearchClient::new(&params.connection)?;
        Ok(Self {
            client,
            params,
            retry,
            date_fields: Mutex::new(HashMap::new()),
            enumerated_dates: Mutex::new(BTreeSet::new()),
        })
    }

    /// Declared mapping type per index, sorted by index name
    async fn declared_types(&self, field: &str) -> Result<Vec<(String, String)>> {
        let path = format!("{}/_mapping/field/{field}", self.params.index);
        let response: FieldMappingResponse =
            self.call("field_mapping", Method::GET, &path, None).await?;

        let mut declared: Vec<(String, String)> = response
            .into_iter()
            .filter_map(|(index, mappings)| {
                let kind = mappings
                    .mappings
                    .into_values()
                    .filter(|m| m.full_name.as_deref().map_or(true, |name| name == field))
                    .flat_map(|m| m.mapping.into_values())
                    .find_map(|typed| typed.kind)?;
                Some((index, kind))
            })
            .collect();
        declared.sort();

        if let Ok(mut dates) = self.date_fields.lock() {
            dates.insert(
                field.to_string(),
                declared.iter().any(|(_, kind)| is_date_type(kind)),
            );
        }
        Ok(declared)
    }

    async fn is_date_field(&self, field: &str) -> Result<bool> {
        let cached = self
            .date_fields
            .lock()
            .ok()
            .and_then(|dates| dates.get(field).copied());
        match cached {
            Some(is_date) => Ok(is_date),
            None => Ok(self
                .declared_types(field)
                .await?
                .iter()
                .any(|(_, kind)| is_date_type(kind))),
        }
    }

    fn scanned_dates(&self) -> Vec<String> {
        self.enumerated_dates
            .lock()
            .map(|dates| dates.iter().cloned().collect())
            .unwrap_or_default()
    }

    async fn call<T: DeserializeOwned>(
        &self,
        operation: &str,
        method: Method,
        path: &str,
        body: Option<&Value>,
    ) -> Result<T> {
        fetch(&self.client, &self.retry, operation, method, path, body).await
    }
}

fn is_date_type(kind: &str) -> bool {
    matches!(kind, "date" | "date_nanos")
}

async fn fetch<T: DeserializeOwned>(
    client: &ElasticsearchClient,
    retry: &RetryPolicy,
    operation: &str,
    method: Method,
    path: &str,
    body: Option<&Value>,
) -> Result<T> {
    let raw = retry_with_backoff(retry, operation, move || {
        let method = method.clone();
        async move {
            client
                .send(method, path, body)
                .await
                .map_err(|e| AnonymizeError::from(SourceError::from(e)))
        }
    })
    .await?;

    serde_json::from_value(raw).map_err(|e| {
        SourceError::InvalidResponse(format!("unexpected {operation} response: {e}")).into()
    })
}

#[async_trait]
impl DocumentSource for ElasticsearchSource {
    fn kind(&self) -> &'static str {
        "elasticsearch"
    }

    async fn test_connection(&self) -> Result<()> {
        let _: Value = self.call("ping", Method::GET, "/", None).await?;
        tracing::debug!(host = %self.client.base_url(), "Elasticsearch reachable");
        Ok(())
    }

    async fn count(&self, query: &Query) -> Result<u64> {
        let body = json!({ "query": query_clause(query.predicate()) });
        let path = format!("{}/_count", self.params.index);
        let response: CountResponse = self.call("count", Method::POST, &path, Some(&body)).await?;
        Ok(response.count)
    }

    async fn distinct_values_page(
        &self,
        field: &str,
        query: &Query,
        after: Option<&Value>,
        page_size: usize,
    ) -> Result<Vec<Value>> {
        let format = if self.is_date_field(field).await? {
            if let Ok(mut dates) = self.enumerated_dates.lock() {
                dates.insert(field.to_string());
            }
            Some(DATE_FORMAT)
        } else {
            None
        };
        let body = composite_body(field, query.predicate(), after, page_size, format);
        let path = format!("{}/_search", self.params.index);
        let response: CompositeResponse = self
            .call("distinct_values", Method::POST, &path, Some(&body))
            .await?;

        Ok(response
            .aggregations
            .values
            .buckets
            .into_iter()
            .filter_map(|mut bucket| bucket.key.remove("value"))
            .collect())
    }

    async fn field_type(&self, field: &str) -> Result<Option<FieldType>> {
        let observed = self
            .declared_types(field)
            .await?
            .into_iter()
            .map(|(index, kind)| (index, FieldType::from_es_type(&kind)));

        consistent_field_type(field, observed)
    }

    async fn scan(&self, query: &Query, projection: &Projection) -> Result<RecordStream> {
        let mut source_filter = json!({ "excludes": projection.excludes });
        if let Some(includes) = &projection.includes {
            source_filter["includes"] = json!(includes);
        }
        let mut body = json!({
            "size": self.params.scan_page_size,
            "query": query_clause(query.predicate()),
            "_source": source_filter,
            "sort": ["_doc"],
        });
        let dates = self.scanned_dates();
        if !dates.is_empty() {
            body["docvalue_fields"] = dates
                .iter()
                .map(|field| json!({ "field": field, "format": DATE_FORMAT }))
                .collect();
        }
        let path = format!(
            "{}/_search?scroll={}",
            self.params.index, self.params.scroll_keepalive
        );
        let first: SearchResponse = self.call("scan", Method::POST, &path, Some(&body)).await?;

        let state = ScrollState {
            client: self.client.clone(),
            retry: self.retry.clone(),
            keepalive: self.params.scroll_keepalive.clone(),
            projection: projection.clone(),
            dates,
            scroll_id: first.scroll_id.clone(),
            buffer: VecDeque::new(),
            pages: 0,
            exhausted: false,
        }
        .with_page(first);

        Ok(Box::pin(stream::try_unfold(state, next_record)))
    }
}

/// Cursor over an open scroll context
///
/// Dropping a cursor whose scroll is still open clears it in the background.
struct ScrollState {
    client: ElasticsearchClient,
    retry: RetryPolicy,
    keepalive: String,
    projection: Projection,
    dates: Vec<String>,
    scroll_id: Option<String>,
    buffer: VecDeque<Hit>,
    pages: usize,
    exhausted: bool,
}

impl ScrollState {
    fn with_page(mut self, page: SearchResponse) -> Self {
        self.pages += 1;
        if page.scroll_id.is_some() {
            self.scroll_id = page.scroll_id;
        }
        if page.hits.hits.is_empty() {
            self.exhausted = true;
        }
        self.buffer.extend(page.hits.hits);
        self
    }

    async fn fetch_page(mut self) -> Result<Self> {
        let Some(scroll_id) = self.scroll_id.clone() else {
            self.exhausted = true;
            return Ok(self);
        };
        let body = json!({ "scroll": self.keepalive, "scroll_id": scroll_id });
        let page: SearchResponse = fetch(
            &self.client,
            &self.retry,
            "scroll",
            Method::POST,
            "_search/scroll",
            Some(&body),
        )
        .await?;
        Ok(self.with_page(page))
    }

    async fn clear(&mut self) {
        if let Some(scroll_id) = self.scroll_id.take() {
            clear_scroll(&self.client, scroll_id).await;
        }
        tracing::debug!(pages = self.pages, "Scroll finished");
    }
}

impl Drop for ScrollState {
    fn drop(&mut self) {
        let Some(scroll_id) = self.scroll_id.take() else {
            return;
        };
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                tracing::debug!(pages = self.pages, "Scroll abandoned, clearing context");
                let client = self.client.clone();
                handle.spawn(async move { clear_scroll(&client, scroll_id).await });
            }
            Err(_) => {
                tracing::warn!("No runtime to clear scroll context; it expires after its keep-alive");
            }
        }
    }
}

async fn clear_scroll(client: &ElasticsearchClient, scroll_id: String) {
    let body = json!({ "scroll_id": [scroll_id] });
    if let Err(e) = client
        .send(Method::DELETE, "_search/scroll", Some(&body))
        .await
    {
        tracing::warn!(error = ?e, "Failed to clear scroll context");
    }
}

/// Replaces scanned date values with their doc values
fn normalize_dates(record: &mut Record, doc_values: &Map<String, Value>, dates: &[String]) {
    for field in dates {
        if !record.contains(field) {
            continue;
        }
        if let Some(Value::Array(values)) = doc_values.get(field) {
            let value = match values.as_slice() {
                [single] => single.clone(),
                _ => Value::Array(values.clone()),
            };
            record.insert(field.clone(), value);
        }
    }
}

async fn next_record(mut state: ScrollState) -> Result<Option<(Record, ScrollState)>> {
    loop {
        if let Some(hit) = state.buffer.pop_front() {
            let mut record = state.projection.apply(Record::from_document(hit.source)?);
            normalize_dates(&mut record, &hit.fields, &state.dates);
            return Ok(Some((record, state)));
        }
        if state.exhausted {
            state.clear().await;
            return Ok(None);
        }
        state = state.fetch_page().await?;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_params_defaults() {
        let params: ElasticsearchSourceParams = serde_json::from_value(json!({
            "host": "http://localhost:9200",
            "index": "logs-*",
            "username": "elastic",
            "password": "changeme"
        }))
        .unwrap();

        assert_eq!(params.scroll_keepalive, "1m");
        assert_eq!(params.scan_page_size, 1000);
        assert_eq!(params.connection.username.as_deref(), Some("elastic"));
    }

    #[test]
    fn test_normalize_dates_uses_doc_values() {
        let mut record = Record::from_document(json!({
            "event": {"created": "2024-01-01T00:00:00Z", "tags": ["a"]},
            "host": {"name": "db-1"}
        }))
        .unwrap();
        let doc_values = json!({
            "event.created": ["2024-01-01T00:00:00.000Z"],
            "event.seen": ["2024-02-01T00:00:00.000Z"]
        });
        let dates = vec!["event.created".to_string(), "event.seen".to_string()];

        normalize_dates(&mut record, doc_values.as_object().unwrap(), &dates);

        assert_eq!(record.get("event.created"), Some(&json!("2024-01-01T00:00:00.000Z")));
        // Fields projected away stay absent
        assert!(!record.contains("event.seen"));
        assert_eq!(record.get("host.name"), Some(&json!("db-1")));
    }

    #[test]
    fn test_date_types() {
        assert!(is_date_type("date"));
        assert!(is_date_type("date_nanos"));
        assert!(!is_date_type("keyword"));
    }

    #[test]
    fn test_empty_index_rejected() {
        let params: ElasticsearchSourceParams =
            serde_json::from_value(json!({"host": "http://localhost:9200", "index": " "})).unwrap();
        assert!(ElasticsearchSource::new(params, RetryPolicy::none()).is_err());
    }
}
