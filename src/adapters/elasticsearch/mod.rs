//! Elasticsearch integration
//!
//! Source and sink backends talking to Elasticsearch over its REST API.

pub mod bulk;
pub mod client;
pub mod models;
pub mod source;

pub use bulk::{ElasticsearchSink, ElasticsearchSinkParams};
pub use client::{ConnectionParams, ElasticsearchClient};
pub use source::{ElasticsearchSource, ElasticsearchSourceParams};
