//! Validate config command implementation
//!
//! This module implements the `validate-config` command for validating
//! the anonymize-it configuration file.

use super::{EXIT_CONFIGURATION, EXIT_SUCCESS};
use crate::adapters::factory::{SINK_KINDS, SOURCE_KINDS};
use crate::config::{load_config, AnonymizeConfig, EndpointConfig};
use crate::core::providers::ProviderRegistry;
use crate::core::transform::check_policy_conflicts;
use crate::domain::MaskStrategy;
use clap::Args;

/// Arguments for the validate-config command
#[derive(Args, Debug)]
pub struct ValidateArgs {}

impl ValidateArgs {
    /// Execute the validate-config command
    ///
    /// Besides the schema rules, unknown backend types, unknown providers and
    /// sensitive fields that also carry a masking strategy are reported here,
    /// without contacting the source or the sink.
    pub async fn execute(&self, config_path: &str) -> anyhow::Result<i32> {
        tracing::info!(config_path = %config_path, "Validating configuration");

        println!("🔍 Validating configuration file: {config_path}");
        println!();

        let config = match load_config(config_path) {
            Ok(c) => {
                println!("✅ Configuration file loaded successfully");
                c
            }
            Err(e) => {
                println!("❌ Failed to load configuration file");
                println!("   Error: {e}");
                return Ok(EXIT_CONFIGURATION);
            }
        };

        match Self::check_plan(&config) {
            Ok(()) => {
                println!("✅ Configuration is valid");
                println!();
                Self::print_summary(&config);
                Ok(EXIT_SUCCESS)
            }
            Err(e) => {
                println!("❌ Configuration validation failed");
                println!("   Error: {e}");
                println!();
                Ok(EXIT_CONFIGURATION)
            }
        }
    }

    fn check_plan(config: &AnonymizeConfig) -> Result<(), String> {
        check_kind("source", config.source_endpoint()?, &SOURCE_KINDS)?;
        check_kind("dest", config.dest_endpoint()?, &SINK_KINDS)?;

        let directives = config.directives();
        let registry = ProviderRegistry::default();
        for directive in &directives {
            if let MaskStrategy::Provider(name) = &directive.strategy {
                registry
                    .resolve(&directive.field, name)
                    .map_err(|e| e.to_string())?;
            }
        }

        check_policy_conflicts(&directives, &config.sensitive).map_err(|e| e.to_string())
    }

    fn print_summary(config: &AnonymizeConfig) {
        let kind = |endpoint: &Option<EndpointConfig>| {
            endpoint
                .as_ref()
                .and_then(|e| e.kind())
                .unwrap_or("undefined")
                .to_string()
        };

        println!("Configuration Summary:");
        println!("  Log Level: {}", config.application.log_level);
        println!("  Dry Run: {}", config.application.dry_run);
        println!("  Source: {}", kind(&config.source));
        println!("  Destination: {}", kind(&config.dest));
        println!("  Include Rest: {}", config.include_rest);
        println!("  Excluded Fields: {:?}", config.exclude);
        println!("  Sensitive Fields: {:?}", config.sensitive);
        println!("  Masking Directives:");
        for directive in config.directives() {
            println!("    {} = {}", directive.field, directive.strategy);
        }
        println!("  Batch Size: {}", config.masking.batch_size);
        println!(
            "  Seed: {}",
            config
                .masking
                .seed
                .map_or_else(|| "random".to_string(), |s| s.to_string())
        );
        println!("  Suppression Keywords: {}", config.redaction.keywords.len());
        println!();
    }
}

fn check_kind(section: &str, endpoint: &EndpointConfig, known: &[&str]) -> Result<(), String> {
    match endpoint.kind() {
        Some(kind) if known.contains(&kind) => Ok(()),
        Some(kind) => Err(format!(
            "Unknown {section} type '{kind}'. Expected one of: {}",
            known.join(", ")
        )),
        None => Err(format!("{section} type is not defined")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::collections::BTreeMap;

    fn config(include: &[(&str, &str)], sensitive: &[&str]) -> AnonymizeConfig {
        AnonymizeConfig {
            source: Some(EndpointConfig::new("file", json!({"path": "./data"}))),
            dest: Some(EndpointConfig::new("filesystem", json!({"directory": "./out"}))),
            include: include
                .iter()
                .map(|(f, s)| (f.to_string(), MaskStrategy::parse(s)))
                .collect::<BTreeMap<_, _>>(),
            sensitive: sensitive.iter().map(|s| s.to_string()).collect(),
            ..AnonymizeConfig::default()
        }
    }

    #[test]
    fn test_valid_plan() {
        assert!(ValidateArgs::check_plan(&config(&[("user.ip", "ipv4")], &["message"])).is_ok());
    }

    #[test]
    fn test_unknown_provider_reported() {
        let err = ValidateArgs::check_plan(&config(&[("user.name", "alias")], &[])).unwrap_err();
        assert!(err.contains("alias"));
    }

    #[test]
    fn test_policy_conflict_reported() {
        let err =
            ValidateArgs::check_plan(&config(&[("message", "word")], &["message"])).unwrap_err();
        assert!(err.contains("Policy conflict"));
    }

    #[test]
    fn test_unknown_backend_reported() {
        let mut config = config(&[], &[]);
        config.dest = Some(EndpointConfig::new("s3", json!({})));
        let err = ValidateArgs::check_plan(&config).unwrap_err();
        assert!(err.contains("Unknown dest type 's3'"));
    }

    #[tokio::test]
    async fn test_missing_file() {
        let code = ValidateArgs {}
            .execute("/nonexistent/anonymize.toml")
            .await
            .unwrap();
        assert_eq!(code, EXIT_CONFIGURATION);
    }
}
