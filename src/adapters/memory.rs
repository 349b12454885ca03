//! In-process source and sink
//!
//! Used when records are already in memory, and by the test suite. The
//! source evaluates predicates the same way as the file source.

use crate::adapters::sink::RecordSink;
use crate::adapters::source::{
    consistent_field_type, distinct_page, DocumentSource, Projection, Query, RecordStream,
};
use crate::domain::{FieldType, Record, Result, SinkError};
use async_trait::async_trait;
use futures::stream;
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

/// Records held in memory, grouped into named partitions
#[derive(Debug, Default)]
pub struct MemorySource {
    partitions: Vec<(String, Vec<Record>)>,
    field_types: BTreeMap<String, FieldType>,
    distinct_page_requests: AtomicUsize,
}

impl MemorySource {
    /// Creates a single-partition source from JSON documents
    ///
    /// # Errors
    ///
    /// Returns an error if a document is not a JSON object.
    pub fn from_documents(documents: Vec<Value>) -> Result<Self> {
        Self::partitioned(vec![("memory".to_string(), documents)])
    }

    /// Creates a source with one partition per entry
    ///
    /// # Errors
    ///
    /// Returns an error if a document is not a JSON object.
    pub fn partitioned(partitions: Vec<(String, Vec<Value>)>) -> Result<Self> {
        let partitions = partitions
            .into_iter()
            .map(|(name, documents)| {
                let records = documents
                    .into_iter()
                    .map(Record::from_document)
                    .collect::<Result<Vec<_>>>()?;
                Ok((name, records))
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(Self {
            partitions,
            ..Self::default()
        })
    }

    /// Declares a field type instead of deriving it from stored values
    pub fn with_field_type(mut self, field: impl Into<String>, field_type: FieldType) -> Self {
        self.field_types.insert(field.into(), field_type);
        self
    }

    /// Number of distinct-value pages served so far
    pub fn distinct_page_requests(&self) -> usize {
        self.distinct_page_requests.load(Ordering::Relaxed)
    }

    fn matching<'a>(&'a self, query: &'a Query) -> impl Iterator<Item = Result<&'a Record>> + 'a {
        self.partitions
            .iter()
            .flat_map(|(_, records)| records.iter())
            .filter_map(move |record| match query.matches(record) {
                Ok(true) => Some(Ok(record)),
                Ok(false) => None,
                Err(e) => Some(Err(e)),
            })
    }
}

#[async_trait]
impl DocumentSource for MemorySource {
    fn kind(&self) -> &'static str {
        "memory"
    }

    async fn test_connection(&self) -> Result<()> {
        Ok(())
    }

    async fn count(&self, query: &Query) -> Result<u64> {
        let mut count = 0;
        for record in self.matching(query) {
            record?;
            count += 1;
        }
        Ok(count)
    }

    async fn distinct_values_page(
        &self,
        field: &str,
        query: &Query,
        after: Option<&Value>,
        page_size: usize,
    ) -> Result<Vec<Value>> {
        self.distinct_page_requests.fetch_add(1, Ordering::Relaxed);
        let records = self.matching(query).collect::<Result<Vec<_>>>()?;
        Ok(distinct_page(
            records.iter().filter_map(|record| record.get(field)),
            after,
            page_size,
        ))
    }

    async fn field_type(&self, field: &str) -> Result<Option<FieldType>> {
        if let Some(declared) = self.field_types.get(field) {
            return Ok(Some(declared.clone()));
        }

        let observed = self.partitions.iter().filter_map(|(name, records)| {
            records
                .iter()
                .find_map(|record| record.get(field).and_then(FieldType::of_value))
                .map(|field_type| (name.clone(), field_type))
        });
        consistent_field_type(field, observed)
    }

    async fn scan(&self, query: &Query, projection: &Projection) -> Result<RecordStream> {
        let records = self
            .matching(query)
            .map(|record| record.map(|r| projection.apply(r.clone())))
            .collect::<Vec<_>>();
        Ok(Box::pin(stream::iter(records)))
    }
}

/// Sink collecting written batches in memory
#[derive(Debug, Default)]
pub struct MemorySink {
    batches: Mutex<Vec<(Option<String>, Vec<String>)>>,
    fail_writes: AtomicUsize,
}

impl MemorySink {
    /// Creates an empty sink
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes the next `count` writes fail with a transient error
    pub fn fail_next_writes(&self, count: usize) {
        self.fail_writes.store(count, Ordering::SeqCst);
    }

    /// Batches written so far with their name hints
    pub fn batches(&self) -> Vec<(Option<String>, Vec<String>)> {
        self.batches
            .lock()
            .map(|batches| batches.clone())
            .unwrap_or_default()
    }

    /// Every written record, parsed back into JSON
    pub fn documents(&self) -> Vec<Value> {
        self.batches()
            .into_iter()
            .flat_map(|(_, records)| records)
            .filter_map(|line| serde_json::from_str(&line).ok())
            .collect()
    }
}

#[async_trait]
impl RecordSink for MemorySink {
    fn kind(&self) -> &'static str {
        "memory"
    }

    async fn test_connection(&self) -> Result<()> {
        Ok(())
    }

    async fn write_batch(&self, records: &[String], name_hint: Option<&str>) -> Result<()> {
        let pending = self.fail_writes.load(Ordering::SeqCst);
        if pending > 0 {
            self.fail_writes.store(pending - 1, Ordering::SeqCst);
            return Err(SinkError::Timeout("simulated write timeout".to_string()).into());
        }

        let mut batches = self
            .batches
            .lock()
            .map_err(|_| SinkError::WriteFailed("memory sink lock poisoned".to_string()))?;
        batches.push((name_hint.map(str::to_string), records.to_vec()));
        Ok(())
    }
}
