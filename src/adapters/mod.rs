//! External system integrations for anonymize-it.
//!
//! This module provides the source and sink backends:
//!
//! - [`source`] - the `DocumentSource` capability set every source implements
//! - [`sink`] - the `RecordSink` capability set every sink implements
//! - [`elasticsearch`] - Elasticsearch source (scroll) and bulk sink
//! - [`ndjson`] - NDJSON file source and filesystem sink
//! - [`memory`] - in-process source and sink
//! - [`factory`] - backend construction from the `[source]` / `[dest]` sections
//!
//! # Example
//!
//! ```rust,no_run
//! use anonymize_it::adapters::factory::{create_sink, create_source};
//! use anonymize_it::config::load_config;
//! use anonymize_it::core::retry::RetryPolicy;
//!
//! # fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = load_config("anonymize.toml")?;
//! let retry = RetryPolicy::from(&config.retry);
//!
//! let source = create_source(config.source_endpoint()?, &retry)?;
//! let sink = create_sink(config.dest_endpoint()?)?;
//! println!("{} -> {}", source.kind(), sink.kind());
//! # Ok(())
//! # }
//! ```

pub mod elasticsearch;
pub mod factory;
pub mod memory;
pub mod ndjson;
pub mod sink;
pub mod source;

pub use factory::{create_sink, create_source, source_query};
pub use sink::RecordSink;
pub use source::{DocumentSource, Projection, Query, RecordStream};
