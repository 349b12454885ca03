//! Providers command implementation
//!
//! Lists the masking strategies accepted in `[include]`.

use super::EXIT_SUCCESS;
use crate::core::providers::ProviderRegistry;
use clap::Args;

/// Arguments for the providers command
#[derive(Args, Debug, Default)]
pub struct ProvidersArgs {
    /// Print one sample value per provider, generated from this seed
    #[arg(long, value_name = "SEED")]
    pub sample_seed: Option<u64>,
}

impl ProvidersArgs {
    /// Execute the providers command
    pub async fn execute(&self) -> anyhow::Result<i32> {
        for line in self.lines() {
            println!("{line}");
        }
        Ok(EXIT_SUCCESS)
    }

    fn lines(&self) -> Vec<String> {
        let mut registry = self.sample_seed.map(|seed| ProviderRegistry::new(Some(seed)));
        let mut lines = vec!["Available masking providers:".to_string()];

        for (name, description) in ProviderRegistry::catalogue() {
            let sample = registry.as_mut().and_then(|registry| {
                ProviderRegistry::lookup(name).map(|provider| registry.generate(&provider))
            });
            lines.push(match sample {
                Some(sample) => format!("  {name:<14} {description} (e.g. {sample})"),
                None => format!("  {name:<14} {description}"),
            });
        }

        lines.push(String::new());
        lines.push("Special strategies:".to_string());
        lines.push(format!("  {:<14} Resolve from the source field type", "infer"));
        lines.push(format!("  {:<14} Emit the field verbatim", "none"));
        lines
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lists_every_provider() {
        let lines = ProvidersArgs::default().lines();
        for name in ["file_path", "ipv4", "email", "token", "date"] {
            assert!(lines.iter().any(|l| l.trim_start().starts_with(name)), "{name}");
        }
        assert!(lines.iter().any(|l| l.contains("infer")));
    }

    #[test]
    fn test_samples_are_reproducible() {
        let args = ProvidersArgs {
            sample_seed: Some(42),
        };
        let lines = args.lines();
        assert_eq!(lines, args.lines());
        assert!(lines[1].contains("(e.g. "));
    }
}
