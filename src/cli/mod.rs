//! CLI interface and argument parsing
//!
//! This module provides the command-line interface for anonymize-it using clap.

pub mod commands;

use clap::{Parser, Subcommand};

/// anonymize-it - Record anonymization pipeline
#[derive(Parser, Debug)]
#[command(name = "anonymize-it")]
#[command(version, about, long_about = None)]
#[command(author = "anonymize-it Contributors")]
pub struct Cli {
    /// Path to configuration file
    #[arg(short, long, default_value = "anonymize.toml", env = "ANONYMIZE_CONFIG")]
    pub config: String,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, env = "ANONYMIZE_LOG_LEVEL")]
    pub log_level: Option<String>,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,
}

/// Available commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Anonymize records from the configured source into the configured sink
    Anonymize(commands::anonymize::AnonymizeArgs),

    /// Validate configuration file
    ValidateConfig(commands::validate::ValidateArgs),

    /// Initialize a new configuration file
    Init(commands::init::InitArgs),

    /// List registered masking providers
    Providers(commands::providers::ProvidersArgs),
}
