// anonymize-it - Record anonymization pipeline
// Copyright (c) 2025 anonymize-it Contributors
// Licensed under the MIT License

//! # anonymize-it - Record anonymization pipeline
//!
//! anonymize-it reads records from a queryable document store, replaces
//! sensitive field values with consistent synthetic substitutes, redacts or
//! drops records carrying secrets, and writes the result to a sink in batches.
//!
//! ## Overview
//!
//! - **Mapping**: every distinct value of a masked field gets exactly one
//!   synthetic replacement, so joins and aggregations survive anonymization
//! - **Redaction**: sensitive fields are scrubbed of user-identifying
//!   patterns, removed when they carry a secret, and suppress the whole record
//!   when they contain a keyword
//! - **Streaming**: records flow in bounded batches; memory is bounded by the
//!   value maps plus one batch
//!
//! ## Architecture
//!
//! - [`cli`] - Command-line interface and argument parsing
//! - [`core`] - Business logic (mapping, transform, streaming, pipeline)
//! - [`adapters`] - Sources and sinks (Elasticsearch, NDJSON files, memory)
//! - [`domain`] - Records, directives and errors
//! - [`config`] - Configuration management
//! - [`logging`] - Structured logging
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use anonymize_it::adapters::memory::{MemorySink, MemorySource};
//! use anonymize_it::core::pipeline::{PipelineBuilder, PipelineSettings};
//! use anonymize_it::domain::{FieldDirective, MaskStrategy};
//! use serde_json::json;
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let source = MemorySource::from_documents(vec![json!({"user": {"ip": "10.0.0.1"}})])?;
//!     let settings = PipelineSettings {
//!         directives: vec![FieldDirective::new("user.ip", MaskStrategy::parse("ipv4"))?],
//!         ..PipelineSettings::default()
//!     };
//!
//!     let mut pipeline = PipelineBuilder::new()
//!         .source(Arc::new(source))
//!         .sink(Arc::new(MemorySink::new()))
//!         .settings(settings)
//!         .build()?;
//!
//!     let summary = pipeline.run().await?;
//!     println!("Emitted {} records", summary.records_emitted);
//!     Ok(())
//! }
//! ```
//!
//! ## Error Handling
//!
//! Every fallible operation returns [`domain::AnonymizeError`]. Fatal
//! pipeline errors carry the stage they occurred in:
//!
//! ```rust
//! use anonymize_it::domain::{AnonymizeError, PipelineStage};
//!
//! let err = AnonymizeError::PolicyConflict {
//!     field: "message".to_string(),
//!     strategy: "word".to_string(),
//! }
//! .at_stage(PipelineStage::Mapping);
//!
//! assert!(err.to_string().starts_with("mapping stage failed"));
//! assert!(err.is_configuration());
//! ```

pub mod adapters;
pub mod cli;
pub mod config;
pub mod core;
pub mod domain;
pub mod logging;
