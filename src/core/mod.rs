//! Core business logic for anonymize-it.
//!
//! # Modules
//!
//! - [`providers`] - Mask provider registry and synthetic value generators
//! - [`mapping`] - Value maps, bucket maps, provider inference, masking plan
//! - [`redaction`] - Secret and user-identifying patterns, suppression keywords
//! - [`transform`] - Per-record masking and sensitive field handling
//! - [`stream`] - Bounded batches over the source scan
//! - [`pipeline`] - Orchestration and run summary
//! - [`retry`] - Exponential backoff for transient failures
//!
//! # Anonymization Workflow
//!
//! 1. **Pre-flight**: Reject policy conflicts and unknown providers before I/O
//! 2. **Map**: Enumerate distinct values of every masked field and assign
//!    synthetic replacements
//! 3. **Stream**: Scan the source in batches of at most `batch_size` records
//! 4. **Transform**: Substitute mapped values, drop or redact sensitive fields
//! 5. **Write**: Flush each batch to the sink, retrying transient failures
//! 6. **Report**: Log the run summary
//!
//! # Example
//!
//! ```rust,no_run
//! use anonymize_it::config::load_config;
//! use anonymize_it::core::pipeline::AnonymizationPipeline;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = load_config("anonymize.toml")?;
//!
//! // Create shutdown signal
//! let (_shutdown_tx, shutdown_rx) = tokio::sync::watch::channel(false);
//!
//! let mut pipeline = AnonymizationPipeline::from_config(&config)?.with_shutdown(shutdown_rx);
//! let summary = pipeline.run().await?;
//!
//! println!("Emitted: {}", summary.records_emitted);
//! println!("Dropped: {}", summary.records_dropped);
//! # Ok(())
//! # }
//! ```

pub mod mapping;
pub mod pipeline;
pub mod providers;
pub mod redaction;
pub mod retry;
pub mod stream;
pub mod transform;
