//! Configuration loader with TOML parsing and environment variable overrides

use super::schema::AnonymizeConfig;
use crate::domain::errors::AnonymizeError;
use crate::domain::result::Result;
use regex::Regex;
use std::fs;
use std::path::Path;
use std::sync::OnceLock;

/// Prefix of environment variable overrides
const ENV_PREFIX: &str = "ANONYMIZE";

/// Loads configuration from a TOML file
///
/// This function:
/// 1. Reads the TOML file
/// 2. Performs environment variable substitution (${VAR} syntax)
/// 3. Parses the TOML into [`AnonymizeConfig`]
/// 4. Applies environment variable overrides (ANONYMIZE_* prefix)
/// 5. Validates the configuration
///
/// # Errors
///
/// Returns [`AnonymizeError::Configuration`] if the file cannot be read or
/// parsed, a referenced environment variable is missing, or validation fails.
///
/// # Examples
///
/// ```no_run
/// use anonymize_it::config::loader::load_config;
///
/// let config = load_config("anonymize.toml").expect("Failed to load config");
/// ```
pub fn load_config(path: impl AsRef<Path>) -> Result<AnonymizeConfig> {
    let path = path.as_ref();

    if !path.exists() {
        return Err(AnonymizeError::Configuration(format!(
            "Configuration file not found: {}",
            path.display()
        )));
    }

    let contents = fs::read_to_string(path).map_err(|e| {
        AnonymizeError::Configuration(format!(
            "Failed to read configuration file {}: {}",
            path.display(),
            e
        ))
    })?;

    parse_config(&contents)
}

/// Parses and validates configuration from a TOML string
///
/// # Errors
///
/// Same as [`load_config`], minus file access.
pub fn parse_config(contents: &str) -> Result<AnonymizeConfig> {
    let contents = substitute_env_vars(contents)?;

    let mut config: AnonymizeConfig = toml::from_str(&contents)?;

    apply_env_overrides(&mut config);

    config.validate().map_err(|e| {
        AnonymizeError::Configuration(format!("Configuration validation failed: {e}"))
    })?;

    if config.include.is_empty() {
        tracing::warn!("No masking directives in [include]; records pass through without substitution");
    }

    Ok(config)
}

fn env_var_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"\$\{([A-Z_][A-Z0-9_]*)\}").expect("env var pattern is valid")
    })
}

/// Substitutes environment variables in the format ${VAR_NAME}
///
/// Comment lines are copied untouched. Placeholders whose name does not start
/// with an upper-case letter or underscore, such as `${1}`, are left alone.
///
/// # Errors
///
/// Returns an error if a referenced environment variable is not set
fn substitute_env_vars(input: &str) -> Result<String> {
    let re = env_var_pattern();
    let mut lines = Vec::new();
    let mut missing_vars: Vec<String> = Vec::new();

    for line in input.lines() {
        if line.trim_start().starts_with('#') {
            lines.push(line.to_string());
            continue;
        }

        let processed = re.replace_all(line, |caps: &regex::Captures<'_>| {
            let var_name = &caps[1];
            match std::env::var(var_name) {
                Ok(value) => value,
                Err(_) => {
                    if !missing_vars.iter().any(|v| v == var_name) {
                        missing_vars.push(var_name.to_string());
                    }
                    caps[0].to_string()
                }
            }
        });
        lines.push(processed.into_owned());
    }

    if !missing_vars.is_empty() {
        return Err(AnonymizeError::Configuration(format!(
            "Missing required environment variables: {}",
            missing_vars.join(", ")
        )));
    }

    Ok(lines.join("\n"))
}

fn env_override(section: &str, key: &str) -> Option<String> {
    std::env::var(format!("{ENV_PREFIX}_{section}_{key}")).ok()
}

/// Applies environment variable overrides using the ANONYMIZE_* prefix
///
/// Environment variables follow the pattern: ANONYMIZE_<SECTION>_<KEY>
/// For example: ANONYMIZE_MASKING_BATCH_SIZE, ANONYMIZE_APPLICATION_DRY_RUN
fn apply_env_overrides(config: &mut AnonymizeConfig) {
    // Application overrides
    if let Some(val) = env_override("APPLICATION", "LOG_LEVEL") {
        config.application.log_level = val;
    }
    if let Some(val) = env_override("APPLICATION", "DRY_RUN") {
        config.application.dry_run = val.parse().unwrap_or(false);
    }

    // Endpoint type overrides
    if let Some(val) = env_override("SOURCE", "TYPE") {
        config.source.get_or_insert_with(Default::default).kind = Some(val);
    }
    if let Some(val) = env_override("DEST", "TYPE") {
        config.dest.get_or_insert_with(Default::default).kind = Some(val);
    }

    // Masking overrides
    if let Some(size) = env_override("MASKING", "BATCH_SIZE").and_then(|v| v.parse().ok()) {
        config.masking.batch_size = size;
    }
    if let Some(size) = env_override("MASKING", "DISTINCT_PAGE_SIZE").and_then(|v| v.parse().ok())
    {
        config.masking.distinct_page_size = size;
    }
    if let Some(val) = env_override("MASKING", "INFER") {
        config.masking.infer = val.parse().unwrap_or(true);
    }
    if let Some(seed) = env_override("MASKING", "SEED").and_then(|v| v.parse().ok()) {
        config.masking.seed = Some(seed);
    }
    if let Some(val) = env_override("MASKING", "NEST_OUTPUT") {
        config.masking.nest_output = val.parse().unwrap_or(false);
    }

    // Retry overrides
    if let Some(retries) = env_override("RETRY", "MAX_RETRIES").and_then(|v| v.parse().ok()) {
        config.retry.max_retries = retries;
    }

    // Logging overrides
    if let Some(val) = env_override("LOGGING", "LOCAL_ENABLED") {
        config.logging.local_enabled = val.parse().unwrap_or(false);
    }
    if let Some(val) = env_override("LOGGING", "LOCAL_PATH") {
        config.logging.local_path = val;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    const VALID: &str = r#"
sensitive = ["message"]

[source]
type = "file"
[source.params]
path = "records.ndjson"

[dest]
type = "filesystem"
[dest.params]
directory = "out"

[include]
"user.ip" = "ipv4"
"#;

    #[test]
    fn test_substitute_env_vars() {
        std::env::set_var("ANONYMIZE_TEST_VAR", "test_value");
        let input = "password = \"${ANONYMIZE_TEST_VAR}\"";
        let result = substitute_env_vars(input).unwrap();
        assert_eq!(result, "password = \"test_value\"");
        std::env::remove_var("ANONYMIZE_TEST_VAR");
    }

    #[test]
    fn test_substitute_env_vars_missing() {
        std::env::remove_var("ANONYMIZE_MISSING_VAR");
        let input = "password = \"${ANONYMIZE_MISSING_VAR}\"";
        let err = substitute_env_vars(input).unwrap_err();
        assert!(err.to_string().contains("ANONYMIZE_MISSING_VAR"));
    }

    #[test]
    fn test_substitute_skips_comments_and_capture_groups() {
        let input = "# password = \"${NOT_SET_ANYWHERE}\"\nreplacement = \"${1}\"";
        let result = substitute_env_vars(input).unwrap();
        assert_eq!(result, input);
    }

    #[test]
    fn test_load_config_missing_file() {
        let err = load_config("nonexistent.toml").unwrap_err();
        assert!(matches!(err, AnonymizeError::Configuration(_)));
    }

    #[test]
    fn test_load_config_valid() {
        let mut temp_file = NamedTempFile::new().unwrap();
        temp_file.write_all(VALID.as_bytes()).unwrap();
        temp_file.flush().unwrap();

        let config = load_config(temp_file.path()).unwrap();
        assert_eq!(config.sensitive, vec!["message".to_string()]);
        assert_eq!(config.source.unwrap().kind(), Some("file"));
        assert_eq!(config.masking.batch_size, 10_000);
    }

    #[test]
    fn test_missing_dest_is_configuration_error() {
        let err = parse_config("[source]\ntype = \"file\"\n").unwrap_err();
        assert!(matches!(err, AnonymizeError::Configuration(_)));
        assert!(err.to_string().contains("dest is not defined"));
    }

    #[test]
    fn test_empty_include_is_not_an_error() {
        let contents = VALID.replace("[include]\n\"user.ip\" = \"ipv4\"\n", "");
        let config = parse_config(&contents).unwrap();
        assert!(config.include.is_empty());
    }

    #[test]
    fn test_invalid_toml() {
        let err = parse_config("source = = 1").unwrap_err();
        assert!(err.to_string().contains("TOML parse error"));
    }
}
