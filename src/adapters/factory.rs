//! Backend factory
//!
//! Creates the source and sink named by the `type` of `[source]` and `[dest]`.

use crate::adapters::elasticsearch::{
    ElasticsearchSink, ElasticsearchSinkParams, ElasticsearchSource, ElasticsearchSourceParams,
};
use crate::adapters::ndjson::{FileSource, FileSourceParams, FilesystemSink, FilesystemSinkParams};
use crate::adapters::sink::RecordSink;
use crate::adapters::source::{DocumentSource, Query};
use crate::config::EndpointConfig;
use crate::core::retry::RetryPolicy;
use crate::domain::{AnonymizeError, Result};
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::sync::Arc;

/// Source backends understood by [`create_source`]
pub const SOURCE_KINDS: [&str; 2] = ["elasticsearch", "file"];

/// Sink backends understood by [`create_sink`]
pub const SINK_KINDS: [&str; 2] = ["filesystem", "elasticsearch"];

/// Parameter key holding the source predicate
const QUERY_PARAM: &str = "query";

/// Creates the configured source
///
/// # Arguments
///
/// * `endpoint` - The `[source]` section
/// * `retry` - Backoff schedule for page fetches
///
/// # Errors
///
/// Returns a configuration error for an unknown type or invalid parameters.
pub fn create_source(
    endpoint: &EndpointConfig,
    retry: &RetryPolicy,
) -> Result<Arc<dyn DocumentSource>> {
    let kind = endpoint_kind(endpoint, "source")?;
    let mut params = endpoint.params.clone();
    params.remove(QUERY_PARAM);

    match kind {
        "elasticsearch" => {
            tracing::info!("Creating Elasticsearch source");
            let params: ElasticsearchSourceParams = parse_params(kind, params)?;
            Ok(Arc::new(ElasticsearchSource::new(params, retry.clone())?))
        }
        "file" => {
            tracing::info!("Creating NDJSON file source");
            let params: FileSourceParams = parse_params(kind, params)?;
            Ok(Arc::new(FileSource::new(params)?))
        }
        other => Err(AnonymizeError::Configuration(format!(
            "Unknown source type '{other}'. Expected one of: {}",
            SOURCE_KINDS.join(", ")
        ))),
    }
}

/// Creates the configured sink
///
/// # Errors
///
/// Returns a configuration error for an unknown type or invalid parameters.
pub fn create_sink(endpoint: &EndpointConfig) -> Result<Arc<dyn RecordSink>> {
    let kind = endpoint_kind(endpoint, "dest")?;
    let params = endpoint.params.clone();

    match kind {
        "filesystem" => {
            tracing::info!("Creating filesystem sink");
            let params: FilesystemSinkParams = parse_params(kind, params)?;
            Ok(Arc::new(FilesystemSink::new(params)))
        }
        "elasticsearch" => {
            tracing::info!("Creating Elasticsearch bulk sink");
            let params: ElasticsearchSinkParams = parse_params(kind, params)?;
            Ok(Arc::new(ElasticsearchSink::new(params)?))
        }
        other => Err(AnonymizeError::Configuration(format!(
            "Unknown dest type '{other}'. Expected one of: {}",
            SINK_KINDS.join(", ")
        ))),
    }
}

/// The predicate configured as `[source.params] query`
pub fn source_query(endpoint: &EndpointConfig) -> Query {
    endpoint
        .params
        .get(QUERY_PARAM)
        .cloned()
        .map_or_else(Query::match_all, Query::new)
}

fn endpoint_kind<'a>(endpoint: &'a EndpointConfig, section: &str) -> Result<&'a str> {
    endpoint
        .kind()
        .ok_or_else(|| AnonymizeError::Configuration(format!("{section} type is not defined")))
}

fn parse_params<T: DeserializeOwned>(
    kind: &str,
    params: serde_json::Map<String, Value>,
) -> Result<T> {
    serde_json::from_value(Value::Object(params)).map_err(|e| {
        AnonymizeError::Configuration(format!("Invalid parameters for '{kind}': {e}"))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::TempDir;

    #[test]
    fn test_create_file_source() {
        let dir = TempDir::new().unwrap();
        let endpoint = EndpointConfig::new(
            "file",
            json!({"path": dir.path(), "query": {"kind": "alert"}}),
        );
        let source = create_source(&endpoint, &RetryPolicy::none()).unwrap();
        assert_eq!(source.kind(), "file");
        assert_eq!(
            source_query(&endpoint).predicate(),
            Some(&json!({"kind": "alert"}))
        );
    }

    #[test]
    fn test_unknown_types_rejected() {
        let endpoint = EndpointConfig::new("csv", json!({}));
        let err = create_source(&endpoint, &RetryPolicy::none()).err().unwrap();
        assert!(err.to_string().contains("Unknown source type 'csv'"));

        let err = create_sink(&EndpointConfig::new("s3", json!({}))).err().unwrap();
        assert!(err.is_configuration());
    }

    #[test]
    fn test_missing_params_rejected() {
        let err = create_sink(&EndpointConfig::new("filesystem", json!({}))).err().unwrap();
        assert!(err.to_string().contains("Invalid parameters for 'filesystem'"));
    }

    #[test]
    fn test_missing_query_matches_all() {
        let endpoint = EndpointConfig::new("file", json!({"path": "/tmp"}));
        assert_eq!(source_query(&endpoint), Query::match_all());
    }
}
