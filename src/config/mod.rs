//! Configuration management for anonymize-it.
//!
//! anonymize-it uses TOML configuration files with support for:
//! - Environment variable substitution (`${VAR_NAME}`)
//! - `ANONYMIZE_<SECTION>_<KEY>` environment overrides
//! - Default values for optional settings
//! - Validation before any source or sink is contacted
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use anonymize_it::config::load_config;
//!
//! # fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = load_config("anonymize.toml")?;
//!
//! for directive in config.directives() {
//!     println!("{} -> {}", directive.field, directive.strategy);
//! }
//! # Ok(())
//! # }
//! ```
//!
//! # Example Configuration
//!
//! ```toml
//! include_rest = false
//! sensitive = ["message"]
//!
//! [source]
//! type = "elasticsearch"
//! [source.params]
//! host = "https://localhost:9200"
//! index = "logs-*"
//! password = "${ES_PASSWORD}"
//!
//! [dest]
//! type = "filesystem"
//! [dest.params]
//! directory = "./out"
//!
//! [include]
//! "user.ip" = "ipv4"
//! "host.name" = "infer"
//! ```

pub mod loader;
pub mod schema;
pub mod secret;

// Re-export commonly used types
pub use loader::{load_config, parse_config};
pub use schema::{
    AnonymizeConfig, ApplicationConfig, EndpointConfig, LoggingConfig, MaskingConfig,
    PatternConfig, RedactionConfig, RetryConfig, UnmappedValuePolicy,
};
pub use secret::{secret_string, SecretString, SecretValue};
