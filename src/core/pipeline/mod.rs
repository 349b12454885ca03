//! Anonymization pipeline
//!
//! Wires the value mapper, provider registry, record transformer and batch
//! streamer together. The pipeline moves through
//! `Init -> MappingBuilt -> Streaming -> Done`; any fatal error moves it to
//! `Failed` and is returned tagged with the stage that raised it.
//!
//! Batches already written when a run fails stay written: a run is
//! at-least-partial, not all-or-nothing.

pub mod summary;

use crate::adapters::factory::{create_sink, create_source, source_query};
use crate::adapters::sink::RecordSink;
use crate::adapters::source::{DocumentSource, Projection, Query};
use crate::config::AnonymizeConfig;
use crate::core::mapping::{MappingSettings, PlanBuilder};
use crate::core::providers::ProviderRegistry;
use crate::core::redaction::{RedactionRules, SuppressionKeywords};
use crate::core::retry::{retry_with_backoff, RetryPolicy};
use crate::core::stream::{Batch, BatchStreamer};
use crate::core::transform::{
    check_policy_conflicts, RecordTransformer, SensitivePolicy, TransformOutcome, UnmappedPolicy,
};
use crate::domain::{AnonymizeError, FieldDirective, PipelineStage, Result};
use crate::log_batch_progress;
use std::fmt;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::watch;

pub use summary::RunSummary;

/// Lifecycle state of a pipeline
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineState {
    /// Source and sink validated, nothing built yet
    Init,
    /// Value maps built and providers resolved
    MappingBuilt,
    /// Batches are being streamed
    Streaming,
    /// Every batch was flushed
    Done,
    /// A fatal error stopped the run
    Failed,
}

impl fmt::Display for PipelineState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Init => write!(f, "INIT"),
            Self::MappingBuilt => write!(f, "MAPPING_BUILT"),
            Self::Streaming => write!(f, "STREAMING"),
            Self::Done => write!(f, "DONE"),
            Self::Failed => write!(f, "FAILED"),
        }
    }
}

/// Run settings derived from the configuration
#[derive(Debug, Clone)]
pub struct PipelineSettings {
    /// Masking directives in field path order
    pub directives: Vec<FieldDirective>,
    /// Emit fields without a directive verbatim
    pub include_rest: bool,
    /// Field paths never emitted
    pub exclude: Vec<String>,
    /// Field paths subject to redaction and suppression
    pub sensitive: Vec<String>,
    /// Predicate shared by count, enumeration and scan
    pub query: Query,
    /// Plan construction tunables
    pub mapping: MappingSettings,
    /// Maximum records per batch
    pub batch_size: usize,
    /// Seed for the provider registry
    pub seed: Option<u64>,
    /// Handling of values missing from a value map
    pub unmapped: UnmappedPolicy,
    /// Re-nest records before writing
    pub nest_output: bool,
    /// Skip sink writes
    pub dry_run: bool,
    /// Backoff schedule for sink writes
    pub retry: RetryPolicy,
}

impl PipelineSettings {
    /// Derives settings from a validated configuration
    pub fn from_config(config: &AnonymizeConfig) -> Self {
        Self {
            directives: config.directives(),
            include_rest: config.include_rest,
            exclude: config.exclude.clone(),
            sensitive: config.sensitive.clone(),
            query: config
                .source
                .as_ref()
                .map_or_else(Query::match_all, source_query),
            mapping: MappingSettings::from(&config.masking),
            batch_size: config.masking.batch_size,
            seed: config.masking.seed,
            unmapped: UnmappedPolicy::from(&config.masking),
            nest_output: config.masking.nest_output,
            dry_run: config.application.dry_run,
            retry: RetryPolicy::from(&config.retry),
        }
    }

    /// Fields requested from the source
    ///
    /// Without `include_rest` only directive and sensitive fields are read.
    pub fn projection(&self) -> Projection {
        let includes = (!self.include_rest).then(|| {
            self.directives
                .iter()
                .map(|d| d.field.clone())
                .chain(self.sensitive.iter().cloned())
                .collect()
        });
        Projection {
            includes,
            excludes: self.exclude.clone(),
        }
    }
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self::from_config(&AnonymizeConfig::default())
    }
}

/// Assembles an [`AnonymizationPipeline`]
#[derive(Default)]
pub struct PipelineBuilder {
    source: Option<Arc<dyn DocumentSource>>,
    sink: Option<Arc<dyn RecordSink>>,
    settings: PipelineSettings,
    rules: RedactionRules,
    keywords: SuppressionKeywords,
}

impl PipelineBuilder {
    /// Creates a builder with default settings and no rules
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the source
    pub fn source(mut self, source: Arc<dyn DocumentSource>) -> Self {
        self.source = Some(source);
        self
    }

    /// Sets the sink
    pub fn sink(mut self, sink: Arc<dyn RecordSink>) -> Self {
        self.sink = Some(sink);
        self
    }

    /// Sets the run settings
    pub fn settings(mut self, settings: PipelineSettings) -> Self {
        self.settings = settings;
        self
    }

    /// Sets the redaction rules
    pub fn rules(mut self, rules: RedactionRules) -> Self {
        self.rules = rules;
        self
    }

    /// Sets the suppression keywords
    pub fn keywords(mut self, keywords: SuppressionKeywords) -> Self {
        self.keywords = keywords;
        self
    }

    /// Validates the collaborators and returns a pipeline in `Init`
    ///
    /// # Errors
    ///
    /// Returns a configuration error tagged with the init stage if the source
    /// or the sink is missing.
    pub fn build(self) -> Result<AnonymizationPipeline> {
        let stage = PipelineStage::Init;
        let source = self.source.ok_or_else(|| {
            AnonymizeError::Configuration("source is not defined".to_string()).at_stage(stage)
        })?;
        let sink = self.sink.ok_or_else(|| {
            AnonymizeError::Configuration("dest is not defined".to_string()).at_stage(stage)
        })?;
        if self.settings.batch_size == 0 {
            return Err(AnonymizeError::Configuration(
                "batch size must be greater than 0".to_string(),
            )
            .at_stage(stage));
        }

        let registry = ProviderRegistry::new(self.settings.seed);
        Ok(AnonymizationPipeline {
            source,
            sink,
            settings: self.settings,
            registry,
            rules: self.rules,
            keywords: self.keywords,
            state: PipelineState::Init,
            transformer: None,
            shutdown: None,
        })
    }
}

/// Orchestrates one anonymization run
pub struct AnonymizationPipeline {
    source: Arc<dyn DocumentSource>,
    sink: Arc<dyn RecordSink>,
    settings: PipelineSettings,
    registry: ProviderRegistry,
    rules: RedactionRules,
    keywords: SuppressionKeywords,
    state: PipelineState,
    transformer: Option<RecordTransformer>,
    shutdown: Option<watch::Receiver<bool>>,
}

impl AnonymizationPipeline {
    /// Creates a pipeline from a validated configuration
    ///
    /// # Errors
    ///
    /// Returns a configuration error tagged with the init stage if a backend
    /// or a redaction rule cannot be created.
    pub fn from_config(config: &AnonymizeConfig) -> Result<Self> {
        let stage = PipelineStage::Init;
        let retry = RetryPolicy::from(&config.retry);

        let source_endpoint = config
            .source_endpoint()
            .map_err(|e| AnonymizeError::Configuration(e).at_stage(stage))?;
        let dest_endpoint = config
            .dest_endpoint()
            .map_err(|e| AnonymizeError::Configuration(e).at_stage(stage))?;

        let source = create_source(source_endpoint, &retry).map_err(|e| e.at_stage(stage))?;
        let sink = create_sink(dest_endpoint).map_err(|e| e.at_stage(stage))?;
        let rules = RedactionRules::from_config(&config.redaction).map_err(|e| e.at_stage(stage))?;

        PipelineBuilder::new()
            .source(source)
            .sink(sink)
            .settings(PipelineSettings::from_config(config))
            .rules(rules)
            .keywords(SuppressionKeywords::new(config.redaction.keywords.clone()))
            .build()
    }

    /// Stops the run between batches once the receiver reads `true`
    pub fn with_shutdown(mut self, shutdown: watch::Receiver<bool>) -> Self {
        self.shutdown = Some(shutdown);
        self
    }

    /// Current state
    pub fn state(&self) -> PipelineState {
        self.state
    }

    /// Run settings
    pub fn settings(&self) -> &PipelineSettings {
        &self.settings
    }

    /// The record transformer, once mappings are built
    pub fn transformer(&self) -> Option<&RecordTransformer> {
        self.transformer.as_ref()
    }

    /// Runs every stage: connectivity checks, mapping, streaming
    ///
    /// # Errors
    ///
    /// Returns the first fatal error, tagged with its stage.
    pub async fn run(&mut self) -> Result<RunSummary> {
        self.check_connections().await?;
        self.build_mappings().await?;
        self.stream().await
    }

    /// Checks that the source and, unless dry-running, the sink are reachable
    ///
    /// # Errors
    ///
    /// Returns the connectivity error tagged with the init stage.
    pub async fn check_connections(&mut self) -> Result<()> {
        self.expect_state(PipelineState::Init, PipelineStage::Init)?;

        let result = async {
            self.source.test_connection().await?;
            if !self.settings.dry_run {
                self.sink.test_connection().await?;
            }
            Ok(())
        }
        .await;

        self.settle(result, PipelineStage::Init, PipelineState::Init)
    }

    /// Builds the masking plan: `Init -> MappingBuilt`
    ///
    /// Policy conflicts are rejected before the source is contacted.
    ///
    /// # Errors
    ///
    /// Returns a configuration, provider, or source error tagged with the
    /// mapping stage.
    pub async fn build_mappings(&mut self) -> Result<()> {
        self.expect_state(PipelineState::Init, PipelineStage::Mapping)?;

        if self.settings.directives.is_empty() {
            tracing::warn!("No masking directives configured; values will not be substituted");
        }

        let started = Instant::now();
        let result = self.build_transformer().await;
        let result = result.map(|transformer| {
            tracing::info!(
                masked_fields = transformer.plan().len(),
                passthrough_fields = transformer.plan().passthrough().len(),
                duration_ms = started.elapsed().as_millis() as u64,
                "Mappings built"
            );
            self.transformer = Some(transformer);
        });

        self.settle(result, PipelineStage::Mapping, PipelineState::MappingBuilt)
    }

    async fn build_transformer(&mut self) -> Result<RecordTransformer> {
        check_policy_conflicts(&self.settings.directives, &self.settings.sensitive)?;

        let plan = PlanBuilder::new(
            self.source.as_ref(),
            &self.settings.query,
            &self.settings.mapping,
        )
        .build(&self.settings.directives, &mut self.registry)
        .await?;

        let sensitive = SensitivePolicy::new(
            self.settings.sensitive.clone(),
            self.rules.clone(),
            self.keywords.clone(),
        );
        RecordTransformer::new(plan, sensitive, self.settings.unmapped.clone())
    }

    /// Streams every record through the transformer into the sink:
    /// `MappingBuilt -> Streaming -> Done`
    ///
    /// # Errors
    ///
    /// Returns a transform, source, or sink error tagged with the streaming
    /// stage. Batches flushed before the error stay written.
    pub async fn stream(&mut self) -> Result<RunSummary> {
        self.expect_state(PipelineState::MappingBuilt, PipelineStage::Streaming)?;
        self.state = PipelineState::Streaming;

        let started = Instant::now();
        let result = self.stream_batches().await;
        let result = result.map(|summary| summary.with_duration(started.elapsed()));

        match result {
            Ok(summary) => {
                self.state = PipelineState::Done;
                summary.log_summary();
                Ok(summary)
            }
            Err(e) => {
                self.state = PipelineState::Failed;
                Err(e.at_stage(PipelineStage::Streaming))
            }
        }
    }

    async fn stream_batches(&self) -> Result<RunSummary> {
        let transformer = self.transformer.as_ref().ok_or_else(|| {
            AnonymizeError::Validation("mappings have not been built".to_string())
        })?;

        let mut summary = RunSummary {
            masked_fields: transformer.plan().len(),
            dry_run: self.settings.dry_run,
            ..RunSummary::new()
        };

        summary.total_expected = match self.source.count(&self.settings.query).await {
            Ok(total) => Some(total),
            Err(e) => {
                tracing::warn!(error = %e, "Could not count source records; progress will omit totals");
                None
            }
        };
        tracing::info!(
            source = self.source.kind(),
            sink = self.sink.kind(),
            total_expected = ?summary.total_expected,
            batch_size = self.settings.batch_size,
            dry_run = self.settings.dry_run,
            "Starting anonymization stream"
        );

        let records = self
            .source
            .scan(&self.settings.query, &self.settings.projection())
            .await?;
        let mut batches = BatchStreamer::new(records, self.settings.batch_size)?;

        loop {
            if self.shutdown_requested() {
                tracing::warn!(
                    batches_written = summary.batches_written,
                    "Shutdown requested, stopping before the next batch"
                );
                summary.interrupted = true;
                break;
            }

            let Some(batch) = batches.next_batch().await? else {
                break;
            };
            self.process_batch(transformer, batch, &mut summary).await?;
            log_batch_progress!(summary.records_emitted, summary.total_expected);
        }

        Ok(summary)
    }

    async fn process_batch(
        &self,
        transformer: &RecordTransformer,
        batch: Batch,
        summary: &mut RunSummary,
    ) -> Result<()> {
        let name = batch.name();
        let seen = batch.len() as u64;
        let mut lines = Vec::with_capacity(batch.len());
        let mut dropped = 0u64;
        let mut secrets = 0u64;

        for record in batch.records {
            match transformer.transform(record)? {
                TransformOutcome::Emit {
                    record,
                    secrets_removed,
                } => {
                    secrets += secrets_removed as u64;
                    lines.push(record.to_json_line(self.settings.nest_output)?);
                }
                TransformOutcome::Drop { .. } => dropped += 1,
            }
        }

        if self.settings.dry_run {
            tracing::debug!(batch = %name, records = lines.len(), "Dry run, batch not written");
        } else if !lines.is_empty() {
            let sink = self.sink.as_ref();
            let records = lines.as_slice();
            let hint = name.as_str();
            retry_with_backoff(&self.settings.retry, "write_batch", move || async move {
                sink.write_batch(records, Some(hint)).await
            })
            .await?;
            summary.batches_written += 1;
        }

        summary.records_seen += seen;
        summary.records_emitted += lines.len() as u64;
        summary.records_dropped += dropped;
        summary.secrets_removed += secrets;

        tracing::debug!(
            batch = %name,
            records = seen,
            emitted = lines.len(),
            dropped,
            "Batch processed"
        );
        Ok(())
    }

    fn shutdown_requested(&self) -> bool {
        self.shutdown
            .as_ref()
            .map_or(false, |receiver| *receiver.borrow())
    }

    fn expect_state(&self, expected: PipelineState, stage: PipelineStage) -> Result<()> {
        if self.state == expected {
            return Ok(());
        }
        Err(AnonymizeError::Validation(format!(
            "pipeline is {} but the {stage} stage requires {expected}",
            self.state
        ))
        .at_stage(stage))
    }

    fn settle(
        &mut self,
        result: Result<()>,
        stage: PipelineStage,
        next: PipelineState,
    ) -> Result<()> {
        match result {
            Ok(()) => {
                self.state = next;
                Ok(())
            }
            Err(e) => {
                self.state = PipelineState::Failed;
                tracing::error!(stage = %stage, error = %e, "Pipeline failed");
                Err(e.at_stage(stage))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::memory::{MemorySink, MemorySource};
    use crate::domain::MaskStrategy;
    use serde_json::json;
    use std::time::Duration;

    fn settings(directives: &[(&str, &str)], sensitive: &[&str]) -> PipelineSettings {
        PipelineSettings {
            directives: directives
                .iter()
                .map(|(field, strategy)| {
                    FieldDirective::new(*field, MaskStrategy::parse(strategy)).unwrap()
                })
                .collect(),
            sensitive: sensitive.iter().map(|s| s.to_string()).collect(),
            include_rest: true,
            batch_size: 2,
            seed: Some(7),
            retry: RetryPolicy {
                max_retries: 2,
                initial_delay: Duration::from_millis(1),
                max_delay: Duration::from_millis(1),
                backoff_multiplier: 1.0,
            },
            ..PipelineSettings::default()
        }
    }

    fn pipeline(
        documents: Vec<serde_json::Value>,
        settings: PipelineSettings,
    ) -> (AnonymizationPipeline, Arc<MemorySink>) {
        let sink = Arc::new(MemorySink::new());
        let pipeline = PipelineBuilder::new()
            .source(Arc::new(MemorySource::from_documents(documents).unwrap()))
            .sink(sink.clone())
            .settings(settings)
            .rules(RedactionRules::builtin().unwrap())
            .keywords(SuppressionKeywords::new(["DROP_ME"]))
            .build()
            .unwrap();
        (pipeline, sink)
    }

    #[tokio::test]
    async fn test_state_machine_reaches_done() {
        let (mut pipeline, sink) = pipeline(
            vec![json!({"user": {"ip": "10.0.0.1"}}), json!({"user": {"ip": "10.0.0.2"}})],
            settings(&[("user.ip", "ipv4")], &[]),
        );
        assert_eq!(pipeline.state(), PipelineState::Init);

        pipeline.build_mappings().await.unwrap();
        assert_eq!(pipeline.state(), PipelineState::MappingBuilt);

        let summary = pipeline.stream().await.unwrap();
        assert_eq!(pipeline.state(), PipelineState::Done);
        assert_eq!(summary.records_emitted, 2);
        assert_eq!(summary.total_expected, Some(2));
        assert_eq!(sink.batches().len(), 1);

        let err = pipeline.stream().await.unwrap_err();
        assert!(err.to_string().starts_with("streaming stage failed"));
    }

    #[test]
    fn test_missing_sink_fails_at_init() {
        let err = PipelineBuilder::new()
            .source(Arc::new(MemorySource::default()))
            .build()
            .err()
            .unwrap();
        assert_eq!(err.to_string(), "init stage failed: Configuration error: dest is not defined");
    }

    #[tokio::test]
    async fn test_policy_conflict_fails_mapping() {
        let (mut pipeline, _sink) = pipeline(
            vec![json!({"message": "hello"})],
            settings(&[("message", "word")], &["message"]),
        );

        let err = pipeline.build_mappings().await.unwrap_err();
        assert_eq!(pipeline.state(), PipelineState::Failed);
        assert!(matches!(err.root(), AnonymizeError::PolicyConflict { .. }));
        assert!(err.to_string().starts_with("mapping stage failed"));
    }

    #[tokio::test]
    async fn test_dry_run_writes_nothing() {
        let mut settings = settings(&[], &[]);
        settings.dry_run = true;
        let (mut pipeline, sink) = pipeline(vec![json!({"a": 1}), json!({"a": 2}), json!({"a": 3})], settings);

        let summary = pipeline.run().await.unwrap();
        assert!(summary.dry_run);
        assert_eq!(summary.records_emitted, 3);
        assert_eq!(summary.batches_written, 0);
        assert!(sink.batches().is_empty());
    }

    #[tokio::test]
    async fn test_transient_sink_failures_are_retried() {
        let (mut pipeline, sink) = pipeline(vec![json!({"a": 1})], settings(&[], &[]));
        sink.fail_next_writes(2);

        let summary = pipeline.run().await.unwrap();
        assert_eq!(summary.batches_written, 1);
        assert_eq!(sink.documents(), vec![json!({"a": 1})]);
    }

    #[tokio::test]
    async fn test_shutdown_stops_between_batches() {
        let (tx, rx) = watch::channel(false);
        let (pipeline, sink) = pipeline(
            (0..6).map(|i| json!({"n": i})).collect(),
            settings(&[], &[]),
        );
        let mut pipeline = pipeline.with_shutdown(rx);
        tx.send(true).unwrap();

        let summary = pipeline.run().await.unwrap();
        assert!(summary.interrupted);
        assert!(sink.batches().is_empty());
    }

    #[test]
    fn test_projection_without_include_rest() {
        let mut settings = settings(&[("user.ip", "ipv4")], &["message"]);
        settings.include_rest = false;
        settings.exclude = vec!["user.password".to_string()];

        let projection = settings.projection();
        assert_eq!(
            projection.includes,
            Some(vec!["user.ip".to_string(), "message".to_string()])
        );
        assert_eq!(projection.excludes, vec!["user.password".to_string()]);
    }
}
