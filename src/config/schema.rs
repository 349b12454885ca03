//! Configuration schema types
//!
//! This module defines the configuration structure for anonymize-it.
//! Top-level keys (`include_rest`, `exclude`, `sensitive`) must precede the
//! first table header in the TOML file.

use crate::domain::{FieldDirective, MaskStrategy};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};

/// Main configuration
///
/// This is the root configuration structure that maps to the TOML file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AnonymizeConfig {
    /// Emit fields without a directive verbatim
    #[serde(default)]
    pub include_rest: bool,

    /// Field paths that are never emitted
    #[serde(default)]
    pub exclude: Vec<String>,

    /// Field paths subject to redaction and suppression
    #[serde(default)]
    pub sensitive: Vec<String>,

    /// Application-level settings
    #[serde(default)]
    pub application: ApplicationConfig,

    /// Document store the records are read from
    #[serde(default)]
    pub source: Option<EndpointConfig>,

    /// Sink the anonymized batches are written to
    #[serde(default)]
    pub dest: Option<EndpointConfig>,

    /// Field path to masking strategy
    #[serde(default)]
    pub include: BTreeMap<String, MaskStrategy>,

    /// Value map and batching settings
    #[serde(default)]
    pub masking: MaskingConfig,

    /// Redaction rules and suppression keywords
    #[serde(default)]
    pub redaction: RedactionConfig,

    /// Retry settings for source reads and sink writes
    #[serde(default)]
    pub retry: RetryConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl AnonymizeConfig {
    /// Validates the configuration
    ///
    /// Sensitive fields that also carry a masking strategy are not rejected
    /// here; the record transformer raises a policy conflict for them.
    ///
    /// # Errors
    ///
    /// Returns an error if any configuration values are invalid
    pub fn validate(&self) -> Result<(), String> {
        self.application.validate()?;

        match &self.source {
            Some(source) => source.validate("source")?,
            None => return Err("source is not defined".to_string()),
        }
        match &self.dest {
            Some(dest) => dest.validate("dest")?,
            None => return Err("dest is not defined".to_string()),
        }

        for field in self.include.keys() {
            if field.trim().is_empty() {
                return Err("include contains an empty field path".to_string());
            }
        }
        validate_paths("exclude", &self.exclude)?;
        validate_paths("sensitive", &self.sensitive)?;

        if let Some(field) = self.exclude.iter().find(|f| self.include.contains_key(*f)) {
            return Err(format!(
                "Field '{field}' cannot be both included and excluded"
            ));
        }

        for field in self.masking.high_cardinality.keys() {
            match self.include.get(field) {
                Some(strategy) if strategy.is_masking() => {}
                _ => {
                    return Err(format!(
                        "masking.high_cardinality field '{field}' needs a masking strategy in [include]"
                    ))
                }
            }
        }

        self.masking.validate()?;
        self.redaction.validate()?;
        self.retry.validate()?;
        self.logging.validate()?;
        Ok(())
    }

    /// Masking directives in field path order
    pub fn directives(&self) -> Vec<FieldDirective> {
        self.include
            .iter()
            .map(|(field, strategy)| FieldDirective {
                field: field.clone(),
                strategy: strategy.clone(),
            })
            .collect()
    }

    /// Returns the source endpoint, which validation guarantees is present
    pub fn source_endpoint(&self) -> Result<&EndpointConfig, String> {
        self.source
            .as_ref()
            .ok_or_else(|| "source is not defined".to_string())
    }

    /// Returns the destination endpoint
    pub fn dest_endpoint(&self) -> Result<&EndpointConfig, String> {
        self.dest
            .as_ref()
            .ok_or_else(|| "dest is not defined".to_string())
    }
}

fn validate_paths(section: &str, paths: &[String]) -> Result<(), String> {
    let mut seen = HashSet::new();
    for path in paths {
        if path.trim().is_empty() {
            return Err(format!("{section} contains an empty field path"));
        }
        if !seen.insert(path.as_str()) {
            return Err(format!("{section} lists '{path}' more than once"));
        }
    }
    Ok(())
}

/// Application-level configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApplicationConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Dry run mode (transform everything, write nothing)
    #[serde(default)]
    pub dry_run: bool,
}

impl ApplicationConfig {
    fn validate(&self) -> Result<(), String> {
        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.log_level.as_str()) {
            return Err(format!(
                "Invalid log_level '{}'. Must be one of: {}",
                self.log_level,
                valid_levels.join(", ")
            ));
        }
        Ok(())
    }
}

impl Default for ApplicationConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            dry_run: false,
        }
    }
}

/// Source or destination endpoint
///
/// `params` are backend specific and converted into typed parameters by the
/// adapter factories.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EndpointConfig {
    /// Backend type, e.g. `elasticsearch`, `file`, `filesystem`
    #[serde(rename = "type", default)]
    pub kind: Option<String>,

    /// Backend parameters
    #[serde(default)]
    pub params: serde_json::Map<String, serde_json::Value>,
}

impl EndpointConfig {
    /// Creates an endpoint of the given type
    pub fn new(kind: impl Into<String>, params: serde_json::Value) -> Self {
        let params = match params {
            serde_json::Value::Object(map) => map,
            _ => serde_json::Map::new(),
        };
        Self {
            kind: Some(kind.into()),
            params,
        }
    }

    /// Backend type with surrounding whitespace removed
    pub fn kind(&self) -> Option<&str> {
        self.kind.as_deref().map(str::trim).filter(|k| !k.is_empty())
    }

    fn validate(&self, section: &str) -> Result<(), String> {
        if self.kind().is_none() {
            return Err(format!("{section} type is not defined"));
        }
        Ok(())
    }
}

/// What the transformer does with a value absent from its value map
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum UnmappedValuePolicy {
    /// Abort the batch and the run
    #[default]
    Fail,
    /// Replace the value with the configured sentinel
    Sentinel,
}

/// Masking configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MaskingConfig {
    /// Maximum records per batch
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,

    /// Distinct values fetched per enumeration page
    #[serde(default = "default_distinct_page_size")]
    pub distinct_page_size: usize,

    /// Run provider inference for `infer` directives
    #[serde(default = "default_true")]
    pub infer: bool,

    /// Seed for reproducible synthetic values
    #[serde(default)]
    pub seed: Option<u64>,

    /// Fields with more distinct values switch to a bucket map
    #[serde(default = "default_max_distinct_values")]
    pub max_distinct_values: usize,

    /// Pool size for fields switched to a bucket map
    #[serde(default = "default_pool_size")]
    pub default_pool_size: usize,

    /// Handling of values missing from a value map
    #[serde(default)]
    pub unmapped_value_policy: UnmappedValuePolicy,

    /// Replacement used by the sentinel policy
    #[serde(default = "default_unmapped_sentinel")]
    pub unmapped_sentinel: String,

    /// Re-nest records on their dot-delimited keys before writing
    #[serde(default)]
    pub nest_output: bool,

    /// Fields bucketed from the start, with their pool sizes
    #[serde(default)]
    pub high_cardinality: BTreeMap<String, usize>,
}

impl MaskingConfig {
    fn validate(&self) -> Result<(), String> {
        if self.batch_size == 0 || self.batch_size > 100_000 {
            return Err(format!(
                "masking.batch_size must be between 1 and 100000, got {}",
                self.batch_size
            ));
        }

        if self.distinct_page_size == 0 || self.distinct_page_size > 10_000 {
            return Err(format!(
                "masking.distinct_page_size must be between 1 and 10000, got {}",
                self.distinct_page_size
            ));
        }

        if self.max_distinct_values == 0 {
            return Err("masking.max_distinct_values must be > 0".to_string());
        }

        if self.default_pool_size == 0 {
            return Err("masking.default_pool_size must be > 0".to_string());
        }

        if let Some((field, _)) = self.high_cardinality.iter().find(|(_, size)| **size == 0) {
            return Err(format!(
                "masking.high_cardinality pool size for '{field}' must be > 0"
            ));
        }

        if self.unmapped_value_policy == UnmappedValuePolicy::Sentinel
            && self.unmapped_sentinel.is_empty()
        {
            return Err("masking.unmapped_sentinel cannot be empty".to_string());
        }

        Ok(())
    }
}

impl Default for MaskingConfig {
    fn default() -> Self {
        Self {
            batch_size: default_batch_size(),
            distinct_page_size: default_distinct_page_size(),
            infer: true,
            seed: None,
            max_distinct_values: default_max_distinct_values(),
            default_pool_size: default_pool_size(),
            unmapped_value_policy: UnmappedValuePolicy::default(),
            unmapped_sentinel: default_unmapped_sentinel(),
            nest_output: false,
            high_cardinality: BTreeMap::new(),
        }
    }
}

/// A named regular expression from the configuration file
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PatternConfig {
    /// Rule name, used in logs
    pub name: String,

    /// Regular expression
    pub pattern: String,

    /// Substitution for user-identifying patterns
    #[serde(default = "default_replacement")]
    pub replacement: String,
}

/// Redaction and suppression configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RedactionConfig {
    /// Load the embedded secret pattern library
    #[serde(default = "default_true")]
    pub builtin_secrets: bool,

    /// Additional pattern library file
    #[serde(default)]
    pub pattern_library: Option<String>,

    /// Suppression keywords
    #[serde(default)]
    pub keywords: Vec<String>,

    /// Patterns substituted inside values of sensitive fields
    #[serde(default)]
    pub user_patterns: Vec<PatternConfig>,

    /// Patterns that remove a sensitive field when they match
    #[serde(default)]
    pub secret_patterns: Vec<PatternConfig>,
}

impl RedactionConfig {
    fn validate(&self) -> Result<(), String> {
        if self.keywords.iter().any(|k| k.is_empty()) {
            return Err("redaction.keywords cannot contain empty strings".to_string());
        }

        for rule in self.user_patterns.iter().chain(&self.secret_patterns) {
            if rule.name.trim().is_empty() {
                return Err("redaction pattern name cannot be empty".to_string());
            }
            Regex::new(&rule.pattern).map_err(|e| {
                format!("Invalid redaction pattern '{}': {e}", rule.name)
            })?;
        }
        Ok(())
    }
}

impl Default for RedactionConfig {
    fn default() -> Self {
        Self {
            builtin_secrets: true,
            pattern_library: None,
            keywords: Vec::new(),
            user_patterns: Vec::new(),
            secret_patterns: Vec::new(),
        }
    }
}

/// Retry configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Maximum number of retry attempts
    #[serde(default = "default_max_retries")]
    pub max_retries: usize,

    /// Initial delay in milliseconds
    #[serde(default = "default_initial_delay_ms")]
    pub initial_delay_ms: u64,

    /// Maximum delay in milliseconds
    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,

    /// Backoff multiplier
    #[serde(default = "default_backoff_multiplier")]
    pub backoff_multiplier: f64,
}

impl RetryConfig {
    fn validate(&self) -> Result<(), String> {
        if self.max_retries > 10 {
            return Err(format!(
                "retry.max_retries must be <= 10, got {}",
                self.max_retries
            ));
        }
        if self.backoff_multiplier < 1.0 {
            return Err("retry.backoff_multiplier must be >= 1.0".to_string());
        }
        if self.max_delay_ms < self.initial_delay_ms {
            return Err("retry.max_delay_ms must be >= retry.initial_delay_ms".to_string());
        }
        Ok(())
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            initial_delay_ms: default_initial_delay_ms(),
            max_delay_ms: default_max_delay_ms(),
            backoff_multiplier: default_backoff_multiplier(),
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Enable local file logging
    #[serde(default)]
    pub local_enabled: bool,

    /// Local log directory
    #[serde(default = "default_local_path")]
    pub local_path: String,

    /// Log rotation strategy
    #[serde(default = "default_local_rotation")]
    pub local_rotation: String,
}

impl LoggingConfig {
    fn validate(&self) -> Result<(), String> {
        let valid_rotations = ["daily", "hourly"];
        if !valid_rotations.contains(&self.local_rotation.as_str()) {
            return Err(format!(
                "Invalid logging.local_rotation '{}'. Must be one of: {}",
                self.local_rotation,
                valid_rotations.join(", ")
            ));
        }
        Ok(())
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            local_enabled: false,
            local_path: default_local_path(),
            local_rotation: default_local_rotation(),
        }
    }
}

// Default value functions
fn default_log_level() -> String {
    "info".to_string()
}

fn default_true() -> bool {
    true
}

fn default_batch_size() -> usize {
    10_000
}

fn default_distinct_page_size() -> usize {
    1_000
}

fn default_max_distinct_values() -> usize {
    500_000
}

fn default_pool_size() -> usize {
    10_000
}

fn default_unmapped_sentinel() -> String {
    "<UNMAPPED>".to_string()
}

fn default_replacement() -> String {
    "${1}".to_string()
}

fn default_max_retries() -> usize {
    3
}

fn default_initial_delay_ms() -> u64 {
    1000
}

fn default_max_delay_ms() -> u64 {
    30000
}

fn default_backoff_multiplier() -> f64 {
    2.0
}

fn default_local_path() -> String {
    "./logs".to_string()
}

fn default_local_rotation() -> String {
    "daily".to_string()
}
