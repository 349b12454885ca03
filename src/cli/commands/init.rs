//! Init command implementation
//!
//! This module implements the `init` command for generating a sample
//! configuration file.

use super::{EXIT_CONFIGURATION, EXIT_FATAL, EXIT_SUCCESS};
use clap::Args;
use std::fs;
use std::path::Path;

/// Arguments for the init command
#[derive(Args, Debug)]
pub struct InitArgs {
    /// Path where to create the configuration file
    #[arg(short, long, default_value = "anonymize.toml")]
    pub output: String,

    /// Include an Elasticsearch example with every option documented
    #[arg(long)]
    pub with_examples: bool,

    /// Overwrite existing file
    #[arg(long)]
    pub force: bool,
}

impl InitArgs {
    /// Execute the init command
    pub async fn execute(&self) -> anyhow::Result<i32> {
        tracing::info!(output = %self.output, "Initializing configuration file");

        println!("📝 Initializing anonymize-it configuration");
        println!();

        if Path::new(&self.output).exists() && !self.force {
            println!("❌ Configuration file already exists: {}", self.output);
            println!("   Use --force to overwrite");
            return Ok(EXIT_CONFIGURATION);
        }

        let config_content = if self.with_examples {
            Self::generate_config_with_examples()
        } else {
            Self::generate_minimal_config()
        };

        match fs::write(&self.output, config_content) {
            Ok(_) => {
                println!("✅ Configuration file created: {}", self.output);
                println!();
                println!("Next steps:");
                println!("  1. Edit {} with your source, destination and fields", self.output);
                println!("  2. Put credentials in a .env file (e.g. ES_PASSWORD)");
                println!("  3. List masking providers: anonymize-it providers");
                println!("  4. Validate configuration: anonymize-it validate-config");
                println!("  5. Try a dry run: anonymize-it anonymize --dry-run");
                println!();
                Ok(EXIT_SUCCESS)
            }
            Err(e) => {
                println!("❌ Failed to write configuration file");
                println!("   Error: {e}");
                Ok(EXIT_FATAL)
            }
        }
    }

    /// Generate minimal configuration
    fn generate_minimal_config() -> String {
        r#"# anonymize-it Configuration File
# Top-level keys must come before the first [section].

include_rest = false
exclude = []
sensitive = ["message"]

[application]
log_level = "info"
dry_run = false

[source]
type = "file"
[source.params]
path = "./data"

[dest]
type = "filesystem"
[dest.params]
directory = "./out"

[include]
"user.ip" = "ipv4"
"user.name" = "user_name"
"host.name" = "infer"
"event.id" = "none"

[masking]
batch_size = 10000
infer = true

[redaction]
builtin_secrets = true
keywords = []

[retry]
max_retries = 3
initial_delay_ms = 1000
max_delay_ms = 30000
backoff_multiplier = 2.0

[logging]
local_enabled = false
local_path = "./logs"
local_rotation = "daily"
"#
        .to_string()
    }

    /// Generate configuration with examples and comments
    fn generate_config_with_examples() -> String {
        r#"# anonymize-it Configuration File
#
# Reads records from a document store, replaces sensitive values with
# consistent synthetic substitutes and writes the result to a sink.
#
# Top-level keys must come before the first [section].

# ============================================================================
# Field Selection
# ============================================================================
# Emit fields without an [include] directive verbatim
include_rest = false

# Fields never emitted
exclude = ["user.password"]

# Fields subject to redaction and keyword suppression.
# A sensitive field cannot also carry a masking strategy.
sensitive = ["message"]

# ============================================================================
# Application Settings
# ============================================================================
[application]
# Log level (trace, debug, info, warn, error)
log_level = "info"

# Dry run mode (transform everything, write nothing)
dry_run = false

# ============================================================================
# Source
# ============================================================================
# Types: elasticsearch | file
[source]
type = "elasticsearch"

[source.params]
host = "https://localhost:9200"
index = "logs-*"
username = "elastic"
password = "${ES_PASSWORD}"
tls_verify = true
timeout_seconds = 60

# Scroll keep-alive and page size
scroll_keepalive = "1m"
scan_page_size = 1000

# Optional predicate shared by counting, value enumeration and scanning
query = { term = { "event.kind" = "alert" } }

# NDJSON files instead of Elasticsearch:
# [source]
# type = "file"
# [source.params]
# path = "./data"                 # a file or a directory of *.ndjson / *.jsonl
# query = { "event.kind" = "alert" }
# distinct_cache_limit = 100000   # distinct values held in memory per field

# ============================================================================
# Destination
# ============================================================================
# Types: filesystem | elasticsearch
[dest]
type = "filesystem"

[dest.params]
# One <batch>.ndjson file per batch
directory = "./out"

# Elasticsearch bulk indexing instead:
# [dest]
# type = "elasticsearch"
# [dest.params]
# host = "https://localhost:9200"
# index = "logs-anonymized"
# username = "elastic"
# password = "${ES_PASSWORD}"
# refresh = false

# ============================================================================
# Masking Directives
# ============================================================================
# field path = provider | "infer" | "none"
# Run `anonymize-it providers` for the provider list.
[include]
"user.ip" = "ipv4"
"file.path" = "file_path"
"session.id" = "token"
"host.name" = "infer"
"event.id" = "none"

# ============================================================================
# Masking Settings
# ============================================================================
[masking]
# Maximum records per batch (1-100000)
batch_size = 10000

# Distinct values fetched per enumeration page (1-10000)
distinct_page_size = 1000

# Resolve "infer" directives from the source field types
infer = true

# Seed for reproducible synthetic values
# seed = 42

# Fields with more distinct values switch to a bucket map
max_distinct_values = 500000

# Pool size for fields switched to a bucket map
default_pool_size = 10000

# Values missing from a value map: fail | sentinel
unmapped_value_policy = "fail"
unmapped_sentinel = "<UNMAPPED>"

# Re-nest records on their dot-delimited keys before writing
nest_output = false

# Fields bucketed from the start, with their pool sizes
[masking.high_cardinality]
"session.id" = 5000

# ============================================================================
# Redaction
# ============================================================================
[redaction]
# Embedded secret pattern library (cloud keys, tokens, private keys)
builtin_secrets = true

# Additional pattern library file
# pattern_library = "extra_patterns.toml"

# Records whose sensitive fields contain any of these are dropped
keywords = ["DROP_ME"]

# Substituted inside sensitive values; the default replacement keeps group 1
[[redaction.user_patterns]]
name = "home_dir"
pattern = '(/home/)[^/\s]+'
replacement = "${1}"

# A match removes the sensitive field from the record
[[redaction.secret_patterns]]
name = "internal_token"
pattern = 'itk_[A-Za-z0-9]{32}'

# ============================================================================
# Retry
# ============================================================================
[retry]
max_retries = 3
initial_delay_ms = 1000
max_delay_ms = 30000
backoff_multiplier = 2.0

# ============================================================================
# Logging
# ============================================================================
[logging]
# JSON log files in addition to the console
local_enabled = false
local_path = "./logs"

# Log rotation: daily | hourly
local_rotation = "daily"
"#
        .to_string()
    }
}
