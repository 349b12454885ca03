//! Anonymize command implementation
//!
//! This module implements the `anonymize` command, which runs the full
//! pipeline from the configured source to the configured sink.

use super::{exit_code_for, EXIT_CONFIGURATION, EXIT_INTERRUPTED, EXIT_SUCCESS};
use crate::config::{load_config, AnonymizeConfig};
use crate::core::pipeline::{AnonymizationPipeline, RunSummary};
use crate::domain::{AnonymizeError, PipelineStage};
use clap::Args;
use std::io::{self, Write};
use tokio::sync::watch;

/// Arguments for the anonymize command
#[derive(Args, Debug, Default)]
pub struct AnonymizeArgs {
    /// Skip confirmation prompt
    #[arg(short, long)]
    pub yes: bool,

    /// Dry run mode - transform every record without writing to the sink
    #[arg(long)]
    pub dry_run: bool,

    /// Override the maximum number of records per batch
    #[arg(long, value_name = "N")]
    pub batch_size: Option<usize>,

    /// Treat `infer` directives as `none` instead of querying field types
    #[arg(long)]
    pub no_infer: bool,
}

impl AnonymizeArgs {
    /// Execute the anonymize command
    pub async fn execute(
        &self,
        config_path: &str,
        shutdown_signal: watch::Receiver<bool>,
    ) -> anyhow::Result<i32> {
        tracing::info!("Starting anonymize command");

        let config = match load_config(config_path).and_then(|c| self.apply_overrides(c)) {
            Ok(config) => config,
            Err(e) => {
                tracing::error!(error = %e, "Configuration validation failed");
                eprintln!("Error: {}", e.at_stage(PipelineStage::Init));
                return Ok(EXIT_CONFIGURATION);
            }
        };

        if config.application.dry_run {
            tracing::info!("Dry run mode enabled - no data will be written");
            println!("🔍 DRY RUN MODE - No data will be written to the sink");
            println!();
        }

        // Confirmation prompt (unless --yes or dry-run)
        if !self.yes && !config.application.dry_run && !Self::confirm(&config)? {
            println!("Anonymization cancelled.");
            return Ok(EXIT_SUCCESS);
        }

        let result = match AnonymizationPipeline::from_config(&config) {
            Ok(pipeline) => {
                println!("🚀 Starting anonymization...");
                let mut pipeline = pipeline.with_shutdown(shutdown_signal);
                pipeline.run().await
            }
            Err(e) => Err(e),
        };

        let summary = match result {
            Ok(summary) => summary,
            Err(e) => {
                tracing::error!(error = %e, "Anonymization failed");
                eprintln!("Error: {e}");
                return Ok(exit_code_for(&e));
            }
        };

        Self::print_summary(&summary);

        if summary.interrupted {
            println!("⚠️  Anonymization interrupted gracefully after the last complete batch.");
            tracing::info!("Anonymization interrupted by user signal");
            return Ok(EXIT_INTERRUPTED);
        }

        println!("✅ Anonymization completed successfully!");
        Ok(EXIT_SUCCESS)
    }

    /// Applies command line overrides and re-validates
    fn apply_overrides(&self, mut config: AnonymizeConfig) -> crate::domain::Result<AnonymizeConfig> {
        if self.dry_run {
            tracing::info!("Enabling dry-run mode from CLI");
            config.application.dry_run = true;
        }

        if let Some(batch_size) = self.batch_size {
            tracing::info!(batch_size, "Overriding batch size from CLI");
            config.masking.batch_size = batch_size;
        }

        if self.no_infer {
            tracing::info!("Disabling provider inference from CLI");
            config.masking.infer = false;
        }

        config.validate().map_err(|e| {
            AnonymizeError::Configuration(format!("Configuration validation failed: {e}"))
        })?;
        Ok(config)
    }

    fn confirm(config: &AnonymizeConfig) -> anyhow::Result<bool> {
        let kind = |endpoint: &Option<crate::config::EndpointConfig>| {
            endpoint
                .as_ref()
                .and_then(|e| e.kind())
                .unwrap_or("undefined")
                .to_string()
        };

        println!("Anonymization Configuration:");
        println!("  Source: {}", kind(&config.source));
        println!("  Destination: {}", kind(&config.dest));
        println!("  Masked fields: {}", config.include.len());
        println!("  Sensitive fields: {}", config.sensitive.len());
        println!("  Batch size: {}", config.masking.batch_size);
        println!();
        print!("Proceed with anonymization? [y/N]: ");
        io::stdout().flush()?;

        let mut input = String::new();
        io::stdin().read_line(&mut input)?;
        Ok(input.trim().eq_ignore_ascii_case("y"))
    }

    fn print_summary(summary: &RunSummary) {
        println!();
        println!("📊 Anonymization Summary:");
        if let Some(total) = summary.total_expected {
            println!("  Expected Records: {total}");
        }
        println!("  Records Read: {}", summary.records_seen);
        println!("  Records Emitted: {}", summary.records_emitted);
        println!("  Records Dropped: {}", summary.records_dropped);
        println!("  Secrets Removed: {}", summary.secrets_removed);
        println!("  Masked Fields: {}", summary.masked_fields);
        println!("  Batches Written: {}", summary.batches_written);
        println!("  Duration: {:.2}s", summary.duration.as_secs_f64());
        println!();
    }
}
