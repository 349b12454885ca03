//! Record sink abstraction
//!
//! A sink receives batches of serialized records. Each call writes one batch;
//! a failed call leaves batches written by earlier calls intact.

use crate::domain::Result;
use async_trait::async_trait;

/// Capability set every sink backend implements
#[async_trait]
pub trait RecordSink: Send + Sync {
    /// Short backend label used in logs
    fn kind(&self) -> &'static str;

    /// Test that the destination is reachable and writable
    ///
    /// # Errors
    ///
    /// Returns a sink error if the destination cannot be used.
    async fn test_connection(&self) -> Result<()>;

    /// Write one batch of serialized records
    ///
    /// # Arguments
    ///
    /// * `records` - One JSON document per entry, in emission order
    /// * `name_hint` - Optional name for the batch (file name, log label)
    ///
    /// # Errors
    ///
    /// Returns a sink error if any record of the batch could not be written.
    async fn write_batch(&self, records: &[String], name_hint: Option<&str>) -> Result<()>;
}
