//! Batch streaming over a lazy record stream

use crate::domain::{AnonymizeError, Record, Result};
use futures::{Stream, StreamExt};

/// Default maximum records per batch
pub const DEFAULT_BATCH_SIZE: usize = 10_000;

/// An ordered group of records read from the source
#[derive(Debug, Clone, PartialEq)]
pub struct Batch {
    /// Zero-based position of the batch in the stream
    pub sequence: usize,
    /// Records in source order
    pub records: Vec<Record>,
}

impl Batch {
    /// Number of records
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Whether the batch is empty
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Name used for the batch in logs and sink file names
    pub fn name(&self) -> String {
        format!("batch-{:06}", self.sequence)
    }
}

/// Groups a lazy record stream into batches of a fixed size
///
/// Every batch holds exactly `batch_size` records except possibly the last.
/// Only the batch being filled is buffered.
pub struct BatchStreamer<S> {
    inner: S,
    batch_size: usize,
    sequence: usize,
    exhausted: bool,
}

impl<S> BatchStreamer<S>
where
    S: Stream<Item = Result<Record>> + Unpin,
{
    /// Wraps a record stream
    ///
    /// # Errors
    ///
    /// Returns a validation error if `batch_size` is zero.
    pub fn new(inner: S, batch_size: usize) -> Result<Self> {
        if batch_size == 0 {
            return Err(AnonymizeError::Validation(
                "batch size must be greater than 0".to_string(),
            ));
        }
        Ok(Self {
            inner,
            batch_size,
            sequence: 0,
            exhausted: false,
        })
    }

    /// Configured batch size
    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    /// Pulls the next batch, or `None` once the stream is exhausted
    ///
    /// # Errors
    ///
    /// Returns the first error yielded by the underlying stream; records
    /// buffered for the current batch are discarded.
    pub async fn next_batch(&mut self) -> Result<Option<Batch>> {
        if self.exhausted {
            return Ok(None);
        }

        let mut records = Vec::with_capacity(self.batch_size.min(1024));
        while records.len() < self.batch_size {
            match self.inner.next().await {
                Some(record) => records.push(record?),
                None => {
                    self.exhausted = true;
                    break;
                }
            }
        }

        if records.is_empty() {
            return Ok(None);
        }

        let batch = Batch {
            sequence: self.sequence,
            records,
        };
        self.sequence += 1;
        Ok(Some(batch))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::SourceError;
    use futures::stream;
    use serde_json::json;
    use test_case::test_case;

    fn records(n: usize) -> Vec<Result<Record>> {
        (0..n)
            .map(|i| Ok(Record::from_document(json!({"n": i})).unwrap()))
            .collect()
    }

    #[test_case(0, 3, vec![] ; "empty stream")]
    #[test_case(7, 3, vec![3, 3, 1] ; "short last batch")]
    #[test_case(6, 3, vec![3, 3] ; "exact multiple")]
    #[test_case(2, 10, vec![2] ; "smaller than batch")]
    #[tokio::test]
    async fn test_batch_sizes(n: usize, batch_size: usize, expected: Vec<usize>) {
        let mut streamer = BatchStreamer::new(stream::iter(records(n)), batch_size).unwrap();
        let mut sizes = Vec::new();
        while let Some(batch) = streamer.next_batch().await.unwrap() {
            assert_eq!(batch.sequence, sizes.len());
            sizes.push(batch.len());
        }
        assert_eq!(sizes, expected);
    }

    #[tokio::test]
    async fn test_order_is_preserved() {
        let mut streamer = BatchStreamer::new(stream::iter(records(5)), 2).unwrap();
        let mut seen = Vec::new();
        while let Some(batch) = streamer.next_batch().await.unwrap() {
            seen.extend(batch.records.iter().map(|r| r.get("n").cloned().unwrap()));
        }
        assert_eq!(seen, (0..5).map(|i| json!(i)).collect::<Vec<_>>());
    }

    #[tokio::test]
    async fn test_stream_error_aborts_batch() {
        let mut items = records(3);
        items.insert(1, Err(SourceError::Timeout("scroll".to_string()).into()));
        let mut streamer = BatchStreamer::new(stream::iter(items), 10).unwrap();
        assert!(streamer.next_batch().await.is_err());
    }

    #[test]
    fn test_zero_batch_size_rejected() {
        assert!(BatchStreamer::new(stream::iter(records(1)), 0).is_err());
    }

    #[test]
    fn test_batch_name() {
        let batch = Batch {
            sequence: 12,
            records: Vec::new(),
        };
        assert_eq!(batch.name(), "batch-000012");
    }
}
