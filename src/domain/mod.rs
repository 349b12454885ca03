//! Domain models and types for anonymize-it.
//!
//! # Overview
//!
//! The domain layer provides:
//! - **Records** ([`Record`], [`ValueKey`]): flattened documents and canonical value keys
//! - **Directives** ([`FieldDirective`], [`MaskStrategy`], [`FieldType`])
//! - **Error types** ([`AnonymizeError`], [`SourceError`], [`SinkError`])
//! - **Result type alias** ([`Result`])
//!
//! # Error Handling
//!
//! All fallible operations return [`Result<T, AnonymizeError>`]:
//!
//! ```rust
//! use anonymize_it::domain::{Record, Result};
//!
//! fn example() -> Result<()> {
//!     // Errors are automatically converted using the ? operator
//!     let record = Record::from_document(serde_json::json!({"user": {"ip": "10.0.0.1"}}))?;
//!     assert!(record.contains("user.ip"));
//!     Ok(())
//! }
//! ```

pub mod directive;
pub mod errors;
pub mod record;
pub mod result;

// Re-export commonly used types for convenience
pub use directive::{FieldDirective, FieldType, MaskStrategy};
pub use errors::{AnonymizeError, PipelineStage, SinkError, SourceError};
pub use record::{Record, ValueKey};
pub use result::Result;
