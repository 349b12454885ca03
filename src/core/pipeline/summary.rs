//! Run summary and reporting

use std::time::Duration;

/// Summary of an anonymization run
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RunSummary {
    /// Record count reported by the source before streaming (best effort)
    pub total_expected: Option<u64>,

    /// Records read from the source
    pub records_seen: u64,

    /// Records handed to the sink
    pub records_emitted: u64,

    /// Records suppressed by a keyword
    pub records_dropped: u64,

    /// Sensitive fields removed by secret rules
    pub secrets_removed: u64,

    /// Batches flushed to the sink
    pub batches_written: u64,

    /// Fields masked by the plan
    pub masked_fields: usize,

    /// Duration of the run
    pub duration: Duration,

    /// The run stopped early on a shutdown signal
    pub interrupted: bool,

    /// Sink writes were skipped
    pub dry_run: bool,
}

impl RunSummary {
    /// Create an empty summary
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the duration
    pub fn with_duration(mut self, duration: Duration) -> Self {
        self.duration = duration;
        self
    }

    /// Whether the source count differs from the records actually read
    pub fn count_drifted(&self) -> bool {
        self.total_expected
            .map_or(false, |expected| expected != self.records_seen)
    }

    /// Records per second over the whole run
    pub fn throughput(&self) -> f64 {
        let secs = self.duration.as_secs_f64();
        if secs == 0.0 {
            return 0.0;
        }
        self.records_seen as f64 / secs
    }

    /// Log the summary
    pub fn log_summary(&self) {
        tracing::info!(
            total_expected = ?self.total_expected,
            records_seen = self.records_seen,
            records_emitted = self.records_emitted,
            records_dropped = self.records_dropped,
            secrets_removed = self.secrets_removed,
            batches_written = self.batches_written,
            masked_fields = self.masked_fields,
            duration_secs = self.duration.as_secs(),
            throughput = format!("{:.1}/s", self.throughput()),
            dry_run = self.dry_run,
            "Anonymization completed"
        );

        if self.count_drifted() {
            tracing::warn!(
                total_expected = ?self.total_expected,
                records_seen = self.records_seen,
                "Source changed between count and scan"
            );
        }

        if self.interrupted {
            tracing::warn!("Anonymization was interrupted before the source was exhausted");
        }
    }
}
