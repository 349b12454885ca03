//! Elasticsearch bulk sink

use super::client::{ConnectionParams, ElasticsearchClient};
use super::models::BulkResponse;
use crate::adapters::sink::RecordSink;
use crate::domain::{AnonymizeError, Result, SinkError};
use async_trait::async_trait;
use reqwest::Method;
use serde::Deserialize;
use serde_json::json;

/// Parameters of `[dest]` with `type = "elasticsearch"`
#[derive(Debug, Clone, Deserialize)]
pub struct ElasticsearchSinkParams {
    #[serde(flatten)]
    pub connection: ConnectionParams,

    /// Target index
    pub index: String,

    /// Ask Elasticsearch to refresh the index after each batch
    #[serde(default)]
    pub refresh: bool,
}

/// Sink writing batches through the `_bulk` API
///
/// Each record becomes one `index` action. A response with `errors: true`
/// fails the batch.
pub struct ElasticsearchSink {
    client: ElasticsearchClient,
    params: ElasticsearchSinkParams,
}

impl ElasticsearchSink {
    /// Creates a sink
    ///
    /// # Errors
    ///
    /// Returns a configuration error if the client cannot be built.
    pub fn new(params: ElasticsearchSinkParams) -> Result<Self> {
        if params.index.trim().is_empty() {
            return Err(AnonymizeError::Configuration(
                "dest.params.index cannot be empty".to_string(),
            ));
        }
        let client = ElasticsearchClient::new(&params.connection)?;
        Ok(Self { client, params })
    }

    fn bulk_body(&self, records: &[String]) -> String {
        let action = json!({ "index": { "_index": self.params.index } }).to_string();
        let mut body = String::with_capacity(records.iter().map(|r| r.len() + action.len() + 2).sum());
        for record in records {
            body.push_str(&action);
            body.push('\n');
            body.push_str(record);
            body.push('\n');
        }
        body
    }
}

#[async_trait]
impl RecordSink for ElasticsearchSink {
    fn kind(&self) -> &'static str {
        "elasticsearch"
    }

    async fn test_connection(&self) -> Result<()> {
        self.client
            .send(Method::GET, "/", None)
            .await
            .map_err(SinkError::from)?;
        Ok(())
    }

    async fn write_batch(&self, records: &[String], name_hint: Option<&str>) -> Result<()> {
        if records.is_empty() {
            return Ok(());
        }

        let path = if self.params.refresh {
            "_bulk?refresh=true"
        } else {
            "_bulk"
        };
        let raw = self
            .client
            .send_ndjson(path, self.bulk_body(records))
            .await
            .map_err(SinkError::from)?;

        let response: BulkResponse = serde_json::from_value(raw)
            .map_err(|e| SinkError::WriteFailed(format!("unexpected bulk response: {e}")))?;

        if response.errors {
            let failed = response
                .items
                .iter()
                .flat_map(|item| item.values())
                .filter(|item| item.failed())
                .count();
            let total = records.len();
            tracing::error!(
                batch = name_hint.unwrap_or("-"),
                failed,
                total,
                "Bulk request rejected documents"
            );
            return Err(SinkError::BulkOperationFailed {
                successful: total.saturating_sub(failed),
                total,
            }
            .into());
        }

        tracing::debug!(
            batch = name_hint.unwrap_or("-"),
            index = %self.params.index,
            documents = records.len(),
            "Bulk batch indexed"
        );
        Ok(())
    }
}
